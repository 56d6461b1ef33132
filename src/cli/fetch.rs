//! `fetch` command: run one archive pass

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args};
use indicatif::{ProgressBar, ProgressStyle};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::CliError;
use crate::downloader::config::{
    DEFAULT_QUERY, DEFAULT_REQUESTS_PER_SECOND, INITIAL_BACKOFF_MS, MAX_CONSECUTIVE_IO_FAILURES,
    MAX_RETRIES,
};
use crate::downloader::{ArchiveConfig, Downloader, RunReport};
use crate::fetcher::auth::{StaticTokenProvider, TokenProvider};
use crate::fetcher::gmail::{GmailApi, GMAIL_BASE_URL};
use crate::shutdown::SharedShutdown;
use crate::status::{StatusReporter, DEFAULT_STATUS_FILE};

/// Arguments of the `fetch` command
#[derive(Args, Debug, Clone)]
pub struct FetchArgs {
    /// Gmail search query, forwarded verbatim
    #[arg(long, env = "GMAIL_QUERY", default_value = DEFAULT_QUERY)]
    pub query: String,

    /// Base data directory; messages go to `<data-dir>/emails`
    #[arg(long, env = "DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Request ceiling per second (0 disables pacing)
    #[arg(
        long,
        env = "REQUESTS_PER_SECOND",
        default_value_t = DEFAULT_REQUESTS_PER_SECOND,
        allow_negative_numbers = true
    )]
    pub requests_per_second: f64,

    /// Retries per call for 429/500/503 responses
    #[arg(long, env = "MAX_RETRIES", default_value_t = MAX_RETRIES)]
    pub max_retries: u32,

    /// Backoff before the first retry, in milliseconds
    #[arg(long, default_value_t = INITIAL_BACKOFF_MS)]
    pub base_retry_delay_ms: u64,

    /// Stop after this many messages (0 = unlimited)
    #[arg(long, env = "MAX_RESULTS")]
    pub max_results: Option<u64>,

    /// Download attachments
    #[arg(
        long,
        env = "INCLUDE_ATTACHMENTS",
        default_value_t = true,
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub include_attachments: bool,

    /// Delete each message from the server once it is archived
    #[arg(
        long,
        env = "DELETE_AFTER_DOWNLOAD",
        default_value_t = false,
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub delete_after_download: bool,

    /// Consecutive messages failing on disk before aborting (0 = never)
    #[arg(long, default_value_t = MAX_CONSECUTIVE_IO_FAILURES)]
    pub max_consecutive_io_failures: u32,

    /// OAuth access token (takes precedence over --token-path)
    #[arg(long, env = "ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Token file written by the authorization tool (default: `<data-dir>/token.json`)
    #[arg(long, env = "TOKEN_PATH")]
    pub token_path: Option<PathBuf>,

    /// Gmail API root (for proxies and test servers)
    #[arg(long, default_value = GMAIL_BASE_URL, hide = true)]
    pub api_base_url: String,

    /// No progress bar; publish progress to the status file instead
    #[arg(long, default_value_t = false)]
    pub headless: bool,

    /// Status file written in headless mode
    #[arg(long, env = "STATUS_FILE", default_value = DEFAULT_STATUS_FILE)]
    pub status_file: PathBuf,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9090)
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,
}

impl FetchArgs {
    /// Build the run configuration
    pub fn to_config(&self) -> ArchiveConfig {
        ArchiveConfig::new(self.query.clone(), self.data_dir.join("emails"))
            .with_requests_per_second(self.requests_per_second)
            .with_max_retries(self.max_retries)
            .with_base_retry_delay(Duration::from_millis(self.base_retry_delay_ms))
            .with_max_results(self.max_results.filter(|&n| n > 0))
            .with_attachments(self.include_attachments)
            .with_delete_after_download(self.delete_after_download)
            .with_max_consecutive_io_failures(self.max_consecutive_io_failures)
    }

    fn token_provider(&self) -> Result<StaticTokenProvider, CliError> {
        if let Some(token) = self.access_token.as_deref().filter(|t| !t.trim().is_empty()) {
            return Ok(StaticTokenProvider::new(token));
        }

        let path = self
            .token_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("token.json"));
        StaticTokenProvider::from_file(&path).map_err(|e| {
            CliError::ConfigurationError(format!(
                "{e}. Provide --access-token or run the authorization tool to create {}",
                path.display()
            ))
        })
    }

    /// Execute the command
    pub async fn execute(&self, shutdown: SharedShutdown) -> Result<RunReport, CliError> {
        if let Some(addr) = self.metrics_addr {
            crate::metrics::init_metrics(addr)?;
        }

        let config = self.to_config();
        let tokens: Arc<dyn TokenProvider> = Arc::new(self.token_provider()?);
        let api = Arc::new(GmailApi::with_base_url(tokens, self.api_base_url.clone())?);

        info!(
            query = %config.query,
            output_dir = %config.output_dir.display(),
            requests_per_second = config.requests_per_second,
            max_retries = config.max_retries,
            "Starting fetch"
        );

        let mut downloader = Downloader::new(config, api).with_shutdown(shutdown);

        let progress_bar = if self.headless {
            info!(status_file = %self.status_file.display(), "Headless mode");
            downloader =
                downloader.with_status_reporter(StatusReporter::new(self.status_file.clone()));
            None
        } else {
            let bar = create_progress_bar();
            let callback_bar = bar.clone();
            downloader = downloader.with_progress(Box::new(move |stats| {
                callback_bar.set_length(stats.total_emails);
                callback_bar.set_position(stats.downloaded_emails);
                callback_bar.set_message(format!(
                    "{} attachments, {} errors",
                    stats.total_attachments, stats.errors
                ));
            }));
            Some(bar)
        };

        let result = downloader.run().await;
        if let Some(bar) = progress_bar {
            bar.finish_and_clear();
        }
        let report = result?;

        println!(
            "{}: {}/{} messages, {} attachments, {} bytes, \
             {} errors, {} retries, {} rate-limit hits",
            report.state,
            report.stats.downloaded_emails,
            report.stats.total_emails,
            report.stats.total_attachments,
            report.stats.total_size_bytes,
            report.stats.errors,
            report.stats.retries,
            report.stats.rate_limit_hits,
        );
        if let Some(reason) = &report.fatal {
            eprintln!("Stopped early: {reason}");
        }
        Ok(report)
    }
}

fn create_progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::default_bar()
        .template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] \
             {pos}/{len} ({percent}%) {msg}",
        )
    {
        bar.set_style(style.progress_chars("#>-"));
    }
    bar.set_message("Listing messages");
    bar
}
