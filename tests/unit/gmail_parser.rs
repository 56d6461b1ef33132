use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{TimeZone, Utc};
use mailbox_archiver::fetcher::gmail::classify_status;
use mailbox_archiver::fetcher::gmail_parser::{
    decode_base64url, parse_message_date, GmailParser, MessageResponse,
};
use mailbox_archiver::fetcher::FetcherError;
use reqwest::StatusCode;
use serde_json::json;

fn b64(text: &str) -> String {
    URL_SAFE_NO_PAD.encode(text.as_bytes())
}

fn nested_message() -> MessageResponse {
    serde_json::from_value(json!({
        "id": "18c2f3a9d0e1",
        "threadId": "18c2f3a9d0e1",
        "labelIds": ["INBOX", "IMPORTANT"],
        "snippet": "See attached",
        "internalDate": "1705311000000",
        "payload": {
            "mimeType": "multipart/mixed",
            "headers": [
                {"name": "Subject", "value": "Q4 numbers"},
                {"name": "From", "value": "Ana <ana@example.com>"},
                {"name": "to", "value": "team@example.com"},
                {"name": "Date", "value": "Mon, 15 Jan 2024 10:30:00 +0100 (CET)"}
            ],
            "parts": [
                {
                    "partId": "0",
                    "mimeType": "multipart/alternative",
                    "parts": [
                        {
                            "partId": "0.0",
                            "mimeType": "text/plain",
                            "body": {"size": 5, "data": b64("plain")}
                        },
                        {
                            "partId": "0.1",
                            "mimeType": "text/html",
                            "body": {"size": 11, "data": b64("<p>html</p>")}
                        }
                    ]
                },
                {
                    "partId": "1",
                    "mimeType": "application/pdf",
                    "filename": "q4.pdf",
                    "body": {"attachmentId": "ANGjdJ8", "size": 48213}
                },
                {
                    "partId": "2",
                    "mimeType": "text/plain",
                    "filename": "notes.txt",
                    "body": {"size": 5, "data": b64("notes")}
                }
            ]
        }
    }))
    .unwrap()
}

#[test]
fn nested_multipart_message_is_flattened() {
    let detail = GmailParser::parse_message(nested_message()).unwrap();

    assert_eq!(detail.id.as_str(), "18c2f3a9d0e1");
    assert_eq!(detail.subject, "Q4 numbers");
    assert_eq!(detail.sender, "Ana <ana@example.com>");
    assert_eq!(detail.to, "team@example.com");
    assert_eq!(detail.labels, vec!["INBOX", "IMPORTANT"]);
    assert_eq!(detail.body.text, vec!["plain"]);
    assert_eq!(detail.body.html, vec!["<p>html</p>"]);
    assert_eq!(
        detail.timestamp,
        Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap()
    );

    assert_eq!(detail.sub_resources.len(), 2);
    let remote = &detail.sub_resources[0];
    assert_eq!(remote.id, "ANGjdJ8");
    assert_eq!(remote.filename, "q4.pdf");
    assert_eq!(remote.size, 48213);
    assert!(remote.inline_data.is_none());

    let inline = &detail.sub_resources[1];
    assert_eq!(inline.id, "2");
    assert_eq!(inline.inline_data.as_deref(), Some(&b"notes"[..]));
}

#[test]
fn forwarded_message_body_is_kept() {
    let response: MessageResponse = serde_json::from_value(json!({
        "id": "fwd1",
        "internalDate": "1705311000000",
        "payload": {
            "mimeType": "multipart/mixed",
            "headers": [{"name": "Subject", "value": "Fwd: minutes"}],
            "parts": [
                {
                    "partId": "0",
                    "mimeType": "text/plain",
                    "body": {"size": 10, "data": b64("first part")}
                },
                {
                    "partId": "1",
                    "mimeType": "message/rfc822",
                    "body": {"size": 0},
                    "parts": [
                        {
                            "partId": "1.0",
                            "mimeType": "multipart/alternative",
                            "parts": [
                                {
                                    "partId": "1.0.0",
                                    "mimeType": "text/plain",
                                    "body": {"size": 14, "data": b64("FORWARDED BODY")}
                                },
                                {
                                    "partId": "1.0.1",
                                    "mimeType": "text/html",
                                    "body": {"size": 21, "data": b64("<b>FORWARDED BODY</b>")}
                                }
                            ]
                        }
                    ]
                },
                {
                    "partId": "2",
                    "mimeType": "text/plain",
                    "body": {"size": 6, "data": b64("footer")}
                }
            ]
        }
    }))
    .unwrap();

    let detail = GmailParser::parse_message(response).unwrap();

    assert_eq!(detail.body.text, vec!["first part", "FORWARDED BODY", "footer"]);
    assert_eq!(detail.body.html, vec!["<b>FORWARDED BODY</b>"]);
    assert!(detail.sub_resources.is_empty());
}

#[test]
fn decode_accepts_padding_and_standard_alphabet() {
    let raw = [0xfbu8, 0xff, 0xfe, 0x00, 0x41];
    let decoded = decode_base64url(&STANDARD.encode(raw)).unwrap();
    assert_eq!(decoded, raw);

    let wrapped = format!("{}\r\n", URL_SAFE_NO_PAD.encode(raw));
    assert_eq!(decode_base64url(&wrapped).unwrap(), raw);

    assert!(matches!(
        decode_base64url("not base64!"),
        Err(FetcherError::ParseError(_))
    ));
}

#[test]
fn date_falls_back_to_internal_then_now() {
    let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
    let internal = Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap();

    assert_eq!(
        parse_message_date("garbage", Some(internal.timestamp_millis()), now),
        internal
    );
    assert_eq!(parse_message_date("", None, now), now);
}

#[test]
fn status_codes_classify_into_fetcher_errors() {
    assert_eq!(
        classify_status(StatusCode::TOO_MANY_REQUESTS, ""),
        FetcherError::RateLimited
    );
    assert_eq!(
        classify_status(
            StatusCode::FORBIDDEN,
            r#"{"error":{"errors":[{"reason":"userRateLimitExceeded"}]}}"#
        ),
        FetcherError::RateLimited
    );
    assert!(matches!(
        classify_status(StatusCode::UNAUTHORIZED, "Invalid Credentials"),
        FetcherError::AuthExpired(_)
    ));
    assert!(matches!(
        classify_status(StatusCode::GONE, ""),
        FetcherError::NotFound(_)
    ));
    assert_eq!(
        classify_status(StatusCode::SERVICE_UNAVAILABLE, ""),
        FetcherError::TransientServer(503)
    );
    assert_eq!(
        classify_status(StatusCode::BAD_GATEWAY, ""),
        FetcherError::ServerError(502)
    );
}
