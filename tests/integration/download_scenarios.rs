//! End-to-end archive runs against a scripted transport

use std::fs;
use std::path::Path;
use std::sync::Arc;

use mailbox_archiver::downloader::{Downloader, RunStatistics};
use mailbox_archiver::fetcher::{FetcherError, MailApi};
use mailbox_archiver::status::{
    load_snapshot, ConfigSummary, RunState, StatusReporter, StatusSnapshot,
};
use mailbox_archiver::SubResourceRef;
use tempfile::TempDir;

use crate::common::mock_api::{sample_detail, test_config, ScriptedApi};

fn day_dir(root: &Path) -> std::path::PathBuf {
    root.join("2024").join("01").join("15")
}

fn record_dirs(root: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(day_dir(root))
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[tokio::test]
async fn archives_every_listed_message_across_pages() {
    let temp = TempDir::new().unwrap();
    let query = r#"from:"a b" -label:x {subject:(q1 OR q2)} after:2024/01/01"#;
    let api = Arc::new(
        ScriptedApi::new()
            .page(&["m1", "m2"], Some("p2"))
            .page(&["m3"], None)
            .detail(sample_detail("m1", "First"))
            .detail(sample_detail("m2", "Second"))
            .detail(sample_detail("m3", "Third")),
    );

    let mut config = test_config(temp.path());
    config.query = query.to_string();
    let mut downloader = Downloader::new(config, api.clone());
    let report = downloader.run().await.unwrap();

    assert_eq!(report.state, RunState::Complete);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.stats.total_emails, 3);
    assert_eq!(report.stats.downloaded_emails, 3);
    assert_eq!(report.stats.errors, 0);
    assert!(report.stats.total_size_bytes > 0);
    // Query reaches the transport byte for byte on every page
    assert_eq!(
        api.calls()[..2],
        [format!("list:{query}:"), format!("list:{query}:p2")]
    );

    assert_eq!(
        record_dirs(temp.path()),
        vec!["093000_First_m1", "093000_Second_m2", "093000_Third_m3"]
    );

    let record = day_dir(temp.path()).join("093000_First_m1");
    let metadata: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(record.join("metadata.json")).unwrap()).unwrap();
    assert_eq!(metadata["id"], "m1");
    assert_eq!(metadata["subject"], "First");
    assert_eq!(
        fs::read_to_string(record.join("body.txt")).unwrap(),
        "body of m1"
    );
}

#[tokio::test]
async fn missing_message_is_counted_and_skipped() {
    let temp = TempDir::new().unwrap();
    let api = Arc::new(
        ScriptedApi::new()
            .page(&["m1", "m2", "m3"], None)
            .detail(sample_detail("m1", "One"))
            .detail_result("m2", Err(FetcherError::NotFound("m2".to_string())))
            .detail(sample_detail("m3", "Three")),
    );

    let report = Downloader::new(test_config(temp.path()), api.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(report.state, RunState::Complete);
    assert_eq!(report.stats.downloaded_emails, 2);
    assert_eq!(report.stats.errors, 1);
    assert_eq!(report.stats.retries, 0);
    assert_eq!(api.count_calls("detail:m2"), 1);
}

#[tokio::test(start_paused = true)]
async fn rate_limited_detail_is_retried_then_archived() {
    let temp = TempDir::new().unwrap();
    let api = Arc::new(
        ScriptedApi::new()
            .page(&["m1"], None)
            .detail_result("m1", Err(FetcherError::RateLimited))
            .detail_result("m1", Err(FetcherError::RateLimited))
            .detail(sample_detail("m1", "Eventually")),
    );

    let report = Downloader::new(test_config(temp.path()), api.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(report.state, RunState::Complete);
    assert_eq!(report.stats.downloaded_emails, 1);
    assert_eq!(report.stats.retries, 2);
    assert_eq!(report.stats.rate_limit_hits, 2);
    assert_eq!(report.stats.errors, 0);
    assert_eq!(api.count_calls("detail:m1"), 3);
}

#[tokio::test]
async fn emoji_subject_produces_bounded_utf8_directory() {
    let temp = TempDir::new().unwrap();
    let subject = "🎉".repeat(16);
    let api = Arc::new(
        ScriptedApi::new()
            .page(&["m1"], None)
            .detail(sample_detail("m1", &subject)),
    );

    let report = Downloader::new(test_config(temp.path()), api)
        .run()
        .await
        .unwrap();
    assert_eq!(report.stats.downloaded_emails, 1);

    let dirs = record_dirs(temp.path());
    assert_eq!(dirs.len(), 1);
    let expected = format!("093000_{}_m1", "🎉".repeat(12));
    assert_eq!(dirs[0], expected);
}

#[tokio::test]
async fn attachments_are_saved_and_failures_counted() {
    let temp = TempDir::new().unwrap();
    let mut detail = sample_detail("m1", "Invoice");
    detail.sub_resources = vec![
        SubResourceRef::remote("att-1", "invoice.pdf", 4),
        SubResourceRef::inline("0.2", "logo.png", vec![1, 2, 3]),
        SubResourceRef::remote("att-gone", "lost.txt", 10),
    ];
    let api = Arc::new(
        ScriptedApi::new()
            .page(&["m1"], None)
            .detail(detail)
            .attachment("m1", "att-1", Ok(b"%PDF".to_vec())),
    );

    let report = Downloader::new(test_config(temp.path()), api.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(report.state, RunState::Complete);
    assert_eq!(report.stats.downloaded_emails, 1);
    assert_eq!(report.stats.total_attachments, 2);
    assert_eq!(report.stats.errors, 1);
    // Inline data never hits the API
    assert_eq!(api.count_calls("attachment:"), 2);

    let attachments = day_dir(temp.path())
        .join("093000_Invoice_m1")
        .join("attachments");
    assert_eq!(fs::read(attachments.join("invoice.pdf")).unwrap(), b"%PDF");
    assert_eq!(fs::read(attachments.join("logo.png")).unwrap(), vec![1, 2, 3]);
}

#[tokio::test]
async fn attachments_skipped_when_disabled() {
    let temp = TempDir::new().unwrap();
    let mut detail = sample_detail("m1", "Photos");
    detail.sub_resources = vec![SubResourceRef::remote("att-1", "a.jpg", 100)];
    let api = Arc::new(ScriptedApi::new().page(&["m1"], None).detail(detail));

    let config = test_config(temp.path()).with_attachments(false);
    let report = Downloader::new(config, api.clone()).run().await.unwrap();

    assert_eq!(report.stats.downloaded_emails, 1);
    assert_eq!(report.stats.total_attachments, 0);
    assert_eq!(api.count_calls("attachment:"), 0);
}

#[tokio::test]
async fn expired_authorization_aborts_the_run() {
    let temp = TempDir::new().unwrap();
    let api = Arc::new(
        ScriptedApi::new()
            .page(&["m1", "m2", "m3"], None)
            .detail(sample_detail("m1", "One"))
            .detail_result("m2", Err(FetcherError::AuthExpired("token revoked".to_string())))
            .detail(sample_detail("m3", "Three")),
    );

    let report = Downloader::new(test_config(temp.path()), api.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(report.state, RunState::Error);
    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.stats.downloaded_emails, 1);
    assert_eq!(report.stats.errors, 1);
    assert!(report.fatal.as_deref().unwrap().contains("token revoked"));
    assert_eq!(api.count_calls("detail:m3"), 0);
}

#[tokio::test]
async fn listing_failure_is_fatal() {
    let temp = TempDir::new().unwrap();
    let api = Arc::new(ScriptedApi::new().list_error(FetcherError::ClientError {
        status: 400,
        message: "Invalid query".to_string(),
    }));

    let report = Downloader::new(test_config(temp.path()), api.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(report.state, RunState::Error);
    assert_eq!(report.stats.errors, 1);
    assert_eq!(report.stats.total_emails, 0);
    assert!(report.fatal.as_deref().unwrap().starts_with("listing failed"));
    assert_eq!(api.count_calls("detail:"), 0);
}

#[tokio::test]
async fn max_results_caps_listing() {
    let temp = TempDir::new().unwrap();
    let api = Arc::new(
        ScriptedApi::new()
            .page(&["m1", "m2", "m3"], Some("p2"))
            .page(&["m4", "m5", "m6"], Some("p3"))
            .page(&["m7"], None)
            .detail(sample_detail("m1", "a"))
            .detail(sample_detail("m2", "b"))
            .detail(sample_detail("m3", "c"))
            .detail(sample_detail("m4", "d")),
    );

    let config = test_config(temp.path()).with_max_results(Some(4));
    let report = Downloader::new(config, api.clone()).run().await.unwrap();

    assert_eq!(report.stats.total_emails, 4);
    assert_eq!(report.stats.downloaded_emails, 4);
    assert_eq!(api.count_calls("list:"), 2);
    assert_eq!(api.count_calls("detail:m5"), 0);
}

#[tokio::test]
async fn repeated_io_failures_abort_the_run() {
    let temp = TempDir::new().unwrap();
    // A regular file where the year directory belongs
    fs::write(temp.path().join("2024"), b"blocker").unwrap();

    let ids = ["m1", "m2", "m3", "m4", "m5"];
    let mut api = ScriptedApi::new().page(&ids, None);
    for id in ids {
        api = api.detail(sample_detail(id, "Blocked"));
    }
    let api = Arc::new(api);

    let config = test_config(temp.path()).with_max_consecutive_io_failures(3);
    let report = Downloader::new(config, api.clone()).run().await.unwrap();

    assert_eq!(report.state, RunState::Error);
    assert_eq!(report.stats.errors, 3);
    assert_eq!(report.stats.downloaded_emails, 0);
    assert_eq!(api.count_calls("detail:"), 3);
    assert!(report.fatal.as_deref().unwrap().contains('3'));
}

#[tokio::test]
async fn io_failures_tolerated_when_threshold_disabled() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("2024"), b"blocker").unwrap();

    let api = Arc::new(
        ScriptedApi::new()
            .page(&["m1", "m2"], None)
            .detail(sample_detail("m1", "x"))
            .detail(sample_detail("m2", "y")),
    );

    let config = test_config(temp.path()).with_max_consecutive_io_failures(0);
    let report = Downloader::new(config, api).run().await.unwrap();

    assert_eq!(report.state, RunState::Complete);
    assert_eq!(report.stats.errors, 2);
}

#[tokio::test]
async fn delete_after_download_removes_archived_messages_only() {
    let temp = TempDir::new().unwrap();
    let mut partial = sample_detail("m2", "Partial");
    partial.sub_resources = vec![SubResourceRef::remote("att-missing", "x.bin", 1)];
    let api = Arc::new(
        ScriptedApi::new()
            .page(&["m1", "m2"], None)
            .detail(sample_detail("m1", "Whole"))
            .detail(partial),
    );

    let config = test_config(temp.path()).with_delete_after_download(true);
    let report = Downloader::new(config, api.clone()).run().await.unwrap();

    assert_eq!(report.state, RunState::Complete);
    assert_eq!(api.count_calls("delete:m1"), 1);
    assert_eq!(api.count_calls("delete:m2"), 0);
}

#[tokio::test]
async fn final_status_is_published() {
    let temp = TempDir::new().unwrap();
    let status_path = temp.path().join("status.json");
    let api: Arc<dyn MailApi> = Arc::new(
        ScriptedApi::new()
            .page(&["m1"], None)
            .detail(sample_detail("m1", "Done")),
    );

    let report = Downloader::new(test_config(&temp.path().join("emails")), api)
        .with_status_reporter(StatusReporter::new(&status_path))
        .run()
        .await
        .unwrap();
    assert_eq!(report.state, RunState::Complete);

    let snapshot = load_snapshot(&status_path).unwrap().unwrap();
    assert_eq!(snapshot.status, RunState::Complete);
    assert_eq!(snapshot.stats.downloaded_emails, 1);
    assert_eq!(snapshot.stats.total_emails, 1);
    assert_eq!(snapshot.config.query, "in:anywhere");
}

#[tokio::test]
async fn invalid_configuration_is_rejected_before_any_call() {
    let temp = TempDir::new().unwrap();
    let api = Arc::new(ScriptedApi::new().page(&["m1"], None));

    let config = test_config(temp.path()).with_requests_per_second(-1.0);
    let result = Downloader::new(config, api.clone()).run().await;

    assert!(result.is_err());
    assert!(api.calls().is_empty());
}

#[tokio::test]
async fn unusable_output_root_finalizes_status_as_error() {
    let temp = TempDir::new().unwrap();
    let status_path = temp.path().join("status.json");
    let reporter = StatusReporter::new(&status_path);
    reporter
        .publish(&StatusSnapshot::new(
            RunState::Complete,
            RunStatistics::default(),
            ConfigSummary {
                query: "old".to_string(),
                output_dir: "/old".to_string(),
            },
        ))
        .unwrap();

    let blocker = temp.path().join("blocker");
    fs::write(&blocker, b"not a directory").unwrap();
    let api = Arc::new(ScriptedApi::new().page(&["m1"], None));

    let result = Downloader::new(test_config(&blocker.join("emails")), api.clone())
        .with_status_reporter(reporter)
        .run()
        .await;

    assert!(result.is_err());
    assert!(api.calls().is_empty());
    let snapshot = load_snapshot(&status_path).unwrap().unwrap();
    assert_eq!(snapshot.status, RunState::Error);
    assert_eq!(snapshot.config.query, "in:anywhere");
    assert_eq!(snapshot.stats, RunStatistics::default());
}

#[tokio::test]
async fn invalid_configuration_finalizes_status_as_error() {
    let temp = TempDir::new().unwrap();
    let status_path = temp.path().join("status.json");
    let api = Arc::new(ScriptedApi::new().page(&["m1"], None));

    let config = test_config(&temp.path().join("emails")).with_requests_per_second(-1.0);
    let result = Downloader::new(config, api)
        .with_status_reporter(StatusReporter::new(&status_path))
        .run()
        .await;

    assert!(result.is_err());
    let snapshot = load_snapshot(&status_path).unwrap().unwrap();
    assert_eq!(snapshot.status, RunState::Error);
}

#[tokio::test]
async fn empty_mailbox_completes() {
    let temp = TempDir::new().unwrap();
    let api = Arc::new(ScriptedApi::new().page(&[], None));

    let report = Downloader::new(test_config(temp.path()), api)
        .run()
        .await
        .unwrap();

    assert_eq!(report.state, RunState::Complete);
    assert_eq!(report.stats.total_emails, 0);
    assert_eq!(report.stats.percentage(), None);
}
