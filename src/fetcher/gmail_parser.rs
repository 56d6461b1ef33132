//! Gmail response parser
//!
//! Stateless conversion of Gmail REST v1 JSON payloads into the crate's
//! domain types. Message payloads are MIME trees; parts are walked
//! recursively so nested `multipart/*` containers are flattened.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use crate::fetcher::{FetcherError, FetcherResult, ListPage};
use crate::{Body, ItemDetail, ItemId, SubResourceRef};

/// `users.messages.list` response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
    next_page_token: Option<String>,
    result_size_estimate: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

/// `users.messages.get?format=full` response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    id: String,
    thread_id: Option<String>,
    #[serde(default)]
    label_ids: Vec<String>,
    #[serde(default)]
    snippet: String,
    // Milliseconds since epoch, sent as a string
    internal_date: Option<String>,
    payload: Option<MessagePart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagePart {
    part_id: Option<String>,
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    filename: String,
    #[serde(default)]
    headers: Vec<Header>,
    body: Option<PartBody>,
    #[serde(default)]
    parts: Vec<MessagePart>,
}

#[derive(Debug, Deserialize)]
struct Header {
    name: String,
    value: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartBody {
    attachment_id: Option<String>,
    #[serde(default)]
    size: u64,
    data: Option<String>,
}

/// `users.messages.attachments.get` response
#[derive(Debug, Deserialize)]
pub struct AttachmentResponse {
    data: Option<String>,
}

/// Stateless parser for Gmail API responses
pub struct GmailParser;

impl GmailParser {
    /// Convert a listing response into a [`ListPage`]
    pub fn parse_list(response: ListResponse) -> ListPage {
        ListPage {
            ids: response
                .messages
                .into_iter()
                .map(|m| ItemId::new(m.id))
                .collect(),
            next_page_token: response.next_page_token.filter(|t| !t.is_empty()),
            result_size_estimate: response.result_size_estimate,
        }
    }

    /// Convert a full message into an [`ItemDetail`]
    ///
    /// # Errors
    /// Returns `FetcherError::ParseError` if a body part is not valid base64url
    pub fn parse_message(response: MessageResponse) -> FetcherResult<ItemDetail> {
        let payload = response.payload.unwrap_or_default();

        let subject = header_value(&payload.headers, "Subject").unwrap_or_default();
        let date_header = header_value(&payload.headers, "Date").unwrap_or_default();
        let internal_ms = response
            .internal_date
            .as_deref()
            .and_then(|ms| ms.parse::<i64>().ok());

        let mut detail = ItemDetail::new(
            response.id,
            subject,
            parse_message_date(&date_header, internal_ms, Utc::now()),
        );
        detail.thread_id = response.thread_id;
        detail.sender = header_value(&payload.headers, "From").unwrap_or_default();
        detail.to = header_value(&payload.headers, "To").unwrap_or_default();
        detail.cc = header_value(&payload.headers, "Cc").unwrap_or_default();
        detail.date_header = date_header;
        detail.labels = response.label_ids;
        detail.snippet = response.snippet;

        let mut inline_counter = 0usize;
        walk_part(
            &payload,
            &mut detail.body,
            &mut detail.sub_resources,
            &mut inline_counter,
        )?;

        Ok(detail)
    }

    /// Extract attachment bytes
    ///
    /// # Errors
    /// Returns `FetcherError::ParseError` if `data` is missing or undecodable
    pub fn parse_attachment(response: AttachmentResponse) -> FetcherResult<Vec<u8>> {
        let data = response.data.ok_or_else(|| {
            FetcherError::ParseError("attachment response has no data".to_string())
        })?;
        decode_base64url(&data)
    }
}

fn walk_part(
    part: &MessagePart,
    body: &mut Body,
    attachments: &mut Vec<SubResourceRef>,
    inline_counter: &mut usize,
) -> FetcherResult<()> {
    let part_body = part.body.as_ref();

    if !part.filename.is_empty() {
        if let Some(attachment_id) = part_body.and_then(|b| b.attachment_id.as_deref()) {
            let size = part_body.map(|b| b.size).unwrap_or(0);
            attachments.push(SubResourceRef::remote(attachment_id, &part.filename, size));
        } else if let Some(data) = part_body.and_then(|b| b.data.as_deref()) {
            let id = part.part_id.clone().unwrap_or_else(|| {
                *inline_counter += 1;
                format!("inline-{inline_counter}")
            });
            attachments.push(SubResourceRef::inline(id, &part.filename, decode_base64url(data)?));
        }
        return Ok(());
    }

    let data = part_body.and_then(|b| b.data.as_deref()).filter(|d| !d.is_empty());
    match (part.mime_type.as_str(), data) {
        ("text/plain", Some(data)) => body.text.push(decode_text(data)?),
        ("text/html", Some(data)) => body.html.push(decode_text(data)?),
        _ => {}
    }

    for child in &part.parts {
        walk_part(child, body, attachments, inline_counter)?;
    }
    Ok(())
}

fn header_value(headers: &[Header], name: &str) -> Option<String> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.clone())
}

fn decode_text(data: &str) -> FetcherResult<String> {
    let bytes = decode_base64url(data)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Decode base64url, tolerating padding, whitespace and the standard alphabet
pub fn decode_base64url(data: &str) -> FetcherResult<Vec<u8>> {
    let normalized: String = data
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '=')
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();

    URL_SAFE_NO_PAD
        .decode(normalized.as_bytes())
        .map_err(|e| FetcherError::ParseError(format!("invalid base64url payload: {e}")))
}

/// Resolve a message timestamp
///
/// Tries the RFC 2822 `Date` header first, then the provider's internal
/// receive time (ms since epoch), then `now`.
pub fn parse_message_date(
    date_header: &str,
    internal_ms: Option<i64>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let trimmed = strip_trailing_comment(date_header.trim());
    if !trimmed.is_empty() {
        if let Ok(parsed) = DateTime::parse_from_rfc2822(trimmed) {
            return parsed.with_timezone(&Utc);
        }
        tracing::debug!(date = date_header, "Unparseable Date header, falling back");
    }

    internal_ms
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .unwrap_or(now)
}

// "Tue, 1 Jul 2003 10:52:37 +0200 (CEST)" -> drop the "(CEST)"
fn strip_trailing_comment(value: &str) -> &str {
    match value.rfind('(') {
        Some(idx) if value.ends_with(')') => value[..idx].trim_end(),
        _ => value,
    }
}
