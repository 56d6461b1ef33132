//! Archive run state machine
//!
//! `Listing → Processing(item) → (Processing next | Draining) → Finished`.
//! Everything runs on one task with one request in flight; shutdown is
//! honoured between items (and between listing pages).

use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn, Instrument};

use super::config::ArchiveConfig;
use super::stats::{ProgressLog, RunStatistics};
use super::DownloadError;
use crate::fetcher::{CallReport, FetchClient, FetchFailure, FetcherError, Fetched, MailApi};
use crate::metrics;
use crate::output::{OutputError, RecordPathBuilder, RecordWriter};
use crate::shutdown::SharedShutdown;
use crate::status::{ConfigSummary, RunState, StatusReporter, StatusSnapshot};
use crate::ItemId;

/// Callback receiving a copy of the statistics after every item boundary
pub type ProgressCallback = Box<dyn Fn(&RunStatistics) + Send + Sync>;

/// Final outcome of [`Downloader::run`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Terminal state
    pub state: RunState,
    /// Final counters
    pub stats: RunStatistics,
    /// Reason the run stopped early, if it was fatal
    pub fatal: Option<String>,
}

impl RunReport {
    /// Process exit code: 0 complete, 130 cancelled, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        match self.state {
            RunState::Complete => 0,
            RunState::Cancelled => 130,
            _ => 1,
        }
    }
}

/// Why processing stopped before the queue was exhausted
#[derive(Debug)]
enum Stop {
    Fatal(String),
    Cancelled,
}

#[derive(Debug, Default, Clone, Copy)]
struct ItemOutcome {
    io_failure: bool,
}

/// Orchestrates listing, fetching and writing for one mailbox
pub struct Downloader {
    config: ArchiveConfig,
    client: FetchClient,
    paths: RecordPathBuilder,
    status: Option<StatusReporter>,
    shutdown: Option<SharedShutdown>,
    progress: Option<ProgressCallback>,
    progress_log: ProgressLog,
    stats: RunStatistics,
    state: RunState,
    consecutive_io_failures: u32,
}

impl fmt::Debug for Downloader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Downloader")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Downloader {
    /// Downloader over `api`, paced and retried per `config`
    pub fn new(config: ArchiveConfig, api: Arc<dyn MailApi>) -> Self {
        let client = FetchClient::from_config(api, &config);
        Self::with_client(config, client)
    }

    /// Downloader over an already-built client
    pub fn with_client(config: ArchiveConfig, client: FetchClient) -> Self {
        Self {
            paths: RecordPathBuilder::new(config.output_dir.clone()),
            config,
            client,
            status: None,
            shutdown: None,
            progress: None,
            progress_log: ProgressLog::default(),
            stats: RunStatistics::default(),
            state: RunState::Starting,
            consecutive_io_failures: 0,
        }
    }

    /// Publish snapshots to a status file
    pub fn with_status_reporter(mut self, reporter: StatusReporter) -> Self {
        self.status = Some(reporter);
        self
    }

    /// Attach a shared shutdown handle for graceful cancellation
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Receive statistics after every item boundary
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Copy of the current statistics
    pub fn stats(&self) -> RunStatistics {
        self.stats
    }

    /// Current lifecycle state
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Configuration in effect
    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    /// Run the archive to completion, cancellation or a fatal error
    ///
    /// # Errors
    /// Only setup failures (invalid configuration, unusable output root) are
    /// returned as `Err`; the status file is still finalized as `error`.
    /// Failures during the run end in a [`RunReport`] with state `error`.
    pub async fn run(&mut self) -> Result<RunReport, DownloadError> {
        if let Err(e) = self.prepare() {
            error!(error = %e, "Archive run could not start");
            self.stats = RunStatistics::default();
            self.state = RunState::Error;
            self.publish_status();
            return Err(e);
        }

        let span = tracing::info_span!(
            "archive_run",
            query = %self.config.query,
            output_dir = %self.config.output_dir.display(),
        );
        Ok(self.run_inner().instrument(span).await)
    }

    fn prepare(&self) -> Result<(), DownloadError> {
        for warning in self.config.validate()? {
            warn!("{}", warning);
        }

        std::fs::create_dir_all(&self.config.output_dir).map_err(|e| {
            DownloadError::IoError(format!(
                "Failed to create output directory {}: {}",
                self.config.output_dir.display(),
                e
            ))
        })
    }

    async fn run_inner(&mut self) -> RunReport {
        let started = Instant::now();
        self.stats = RunStatistics::default();
        self.consecutive_io_failures = 0;
        self.progress_log = ProgressLog::default();

        self.state = RunState::Starting;
        info!("Starting mailbox archive");
        self.publish_status();

        let (state, fatal) = match self.execute().await {
            Ok(()) => (RunState::Complete, None),
            Err(Stop::Cancelled) => {
                info!("Shutdown requested - stopping before the next message");
                (RunState::Cancelled, None)
            }
            Err(Stop::Fatal(reason)) => {
                error!(reason = %reason, "Archive run aborted");
                (RunState::Error, Some(reason))
            }
        };

        // Draining
        self.state = state;
        self.publish_status();
        metrics::record_run_finished(state, started.elapsed());

        info!(
            state = %state,
            downloaded = self.stats.downloaded_emails,
            total = self.stats.total_emails,
            attachments = self.stats.total_attachments,
            bytes = self.stats.total_size_bytes,
            errors = self.stats.errors,
            retries = self.stats.retries,
            rate_limit_hits = self.stats.rate_limit_hits,
            duration_secs = started.elapsed().as_secs(),
            "Archive run finished"
        );

        RunReport {
            state,
            stats: self.stats,
            fatal,
        }
    }

    async fn execute(&mut self) -> Result<(), Stop> {
        self.state = RunState::Running;
        let ids = self.list_all().await?;
        info!(messages = ids.len(), "Listing complete");

        for id in &ids {
            if self.shutdown_requested() {
                return Err(Stop::Cancelled);
            }

            let outcome = self.process_item(id).await?;
            self.track_io_streak(outcome)?;

            self.publish_status();
            if self.progress_log.should_emit(&self.stats) {
                info!("{}", self.progress_log.format_progress(&self.stats));
                self.progress_log.mark_emitted(&self.stats);
            }
        }

        Ok(())
    }

    async fn list_all(&mut self) -> Result<Vec<ItemId>, Stop> {
        let mut ids: Vec<ItemId> = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0u32;

        loop {
            if self.shutdown_requested() {
                return Err(Stop::Cancelled);
            }

            let result = self
                .client
                .list_page(&self.config.query, page_token.as_deref())
                .await;

            let page = match result {
                Ok(Fetched { value, report }) => {
                    self.record_call(&report);
                    value
                }
                Err(FetchFailure { error, report }) => {
                    self.record_call(&report);
                    self.stats.record_error();
                    metrics::record_error("list");
                    return Err(Stop::Fatal(format!("listing failed: {error}")));
                }
            };

            pages += 1;
            ids.extend(page.ids);

            let capped = match self.config.max_results {
                Some(cap) if ids.len() as u64 >= cap => {
                    ids.truncate(usize::try_from(cap).unwrap_or(usize::MAX));
                    true
                }
                _ => false,
            };

            self.stats.total_emails = ids.len() as u64;
            debug!(
                page = pages,
                listed = ids.len(),
                estimate = page.result_size_estimate,
                "Listed page"
            );
            self.publish_status();

            match page.next_page_token {
                Some(token) if !capped => page_token = Some(token),
                _ => break,
            }
        }

        Ok(ids)
    }

    async fn process_item(&mut self, id: &ItemId) -> Result<ItemOutcome, Stop> {
        let mut outcome = ItemOutcome::default();

        let detail = match self.client.get_detail(id).await {
            Ok(Fetched { value, report }) => {
                self.record_call(&report);
                value
            }
            Err(FetchFailure { error, report }) => {
                self.record_call(&report);
                self.fetch_failed(id, "detail", &error)?;
                return Ok(outcome);
            }
        };

        let dir = self.paths.build(&detail);
        let written = RecordWriter::create(&dir).and_then(|mut writer| {
            writer.write_metadata(&detail)?;
            writer.write_body(&detail.body)?;
            Ok(writer)
        });
        let mut writer = match written {
            Ok(writer) => writer,
            Err(e) => {
                self.output_failed(id, "write", &e);
                outcome.io_failure = e.is_io();
                return Ok(outcome);
            }
        };

        let mut all_attachments_saved = true;
        if self.config.include_attachments {
            for sub in &detail.sub_resources {
                let fetched;
                let data: &[u8] = match &sub.inline_data {
                    Some(inline) => inline,
                    None => match self.client.get_sub_resource(id, &sub.id).await {
                        Ok(Fetched { value, report }) => {
                            self.record_call(&report);
                            fetched = value;
                            &fetched
                        }
                        Err(FetchFailure { error, report }) => {
                            self.record_call(&report);
                            self.fetch_failed(id, "attachment", &error)?;
                            all_attachments_saved = false;
                            continue;
                        }
                    },
                };

                match writer.write_attachment(&sub.filename, data) {
                    Ok(path) => {
                        self.stats.total_attachments += 1;
                        metrics::record_attachment_downloaded();
                        debug!(
                            item_id = %id,
                            path = %path.display(),
                            bytes = data.len(),
                            "Saved attachment"
                        );
                    }
                    Err(e) => {
                        self.output_failed(id, "attachment", &e);
                        outcome.io_failure |= e.is_io();
                        all_attachments_saved = false;
                    }
                }
            }
        }

        let bytes = writer.bytes_written();
        self.stats.record_bytes(bytes);
        self.stats.downloaded_emails += 1;
        metrics::record_bytes_written(bytes);
        metrics::record_message_downloaded();
        debug!(item_id = %id, dir = %dir.display(), bytes, "Archived message");

        if self.config.delete_after_download {
            if all_attachments_saved {
                self.delete_remote(id).await?;
            } else {
                warn!(
                    item_id = %id,
                    "Keeping message on the server: not every attachment was archived"
                );
            }
        }

        Ok(outcome)
    }

    async fn delete_remote(&mut self, id: &ItemId) -> Result<(), Stop> {
        match self.client.delete_item(id).await {
            Ok(Fetched { report, .. }) => {
                self.record_call(&report);
                debug!(item_id = %id, "Deleted message from server");
                Ok(())
            }
            Err(FetchFailure { error, report }) => {
                self.record_call(&report);
                self.fetch_failed(id, "delete", &error)
            }
        }
    }

    fn fetch_failed(
        &mut self,
        id: &ItemId,
        phase: &'static str,
        error: &FetcherError,
    ) -> Result<(), Stop> {
        self.stats.record_error();
        metrics::record_error(phase);
        if error.is_run_fatal() {
            return Err(Stop::Fatal(format!("{phase} for {id}: {error}")));
        }
        warn!(item_id = %id, phase, error = %error, "Failed to archive message");
        Ok(())
    }

    fn output_failed(&mut self, id: &ItemId, phase: &'static str, error: &OutputError) {
        self.stats.record_error();
        metrics::record_error(phase);
        warn!(item_id = %id, phase, error = %error, "Failed to write message");
    }

    fn track_io_streak(&mut self, outcome: ItemOutcome) -> Result<(), Stop> {
        if !outcome.io_failure {
            self.consecutive_io_failures = 0;
            return Ok(());
        }

        self.consecutive_io_failures += 1;
        let threshold = self.config.max_consecutive_io_failures;
        if threshold > 0 && self.consecutive_io_failures >= threshold {
            let error = DownloadError::RepeatedIoFailure {
                count: self.consecutive_io_failures,
            };
            return Err(Stop::Fatal(error.to_string()));
        }
        Ok(())
    }

    fn record_call(&mut self, report: &CallReport) {
        self.stats.record_call(report);
        metrics::record_call(report);
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .map(|s| s.is_shutdown_requested())
            .unwrap_or(false)
    }

    fn publish_status(&self) {
        if let Some(reporter) = &self.status {
            let snapshot =
                StatusSnapshot::new(self.state, self.stats, ConfigSummary::from(&self.config));
            if let Err(e) = reporter.publish(&snapshot) {
                warn!(path = %reporter.path().display(), error = %e, "Failed to publish status");
            }
        }
        if let Some(callback) = &self.progress {
            callback(&self.stats);
        }
    }
}
