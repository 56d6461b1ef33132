//! Prometheus counters mirroring the run statistics
//!
//! Recording is always cheap: without an installed exporter the `metrics`
//! macros are no-ops. [`init_metrics`] installs the exporter once; later
//! calls are ignored.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{debug, info};

use crate::fetcher::CallReport;
use crate::status::RunState;

static METRICS_ADDR: OnceCell<SocketAddr> = OnceCell::new();

/// Metrics setup errors
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Exporter could not be installed (address in use, recorder already set)
    #[error("failed to install Prometheus exporter on {addr}: {message}")]
    InstallFailed {
        /// Requested listen address
        addr: SocketAddr,
        /// Underlying error
        message: String,
    },
}

/// Install the Prometheus exporter serving `/metrics` on `addr`
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), MetricsError> {
    if let Some(existing) = METRICS_ADDR.get() {
        debug!(addr = %existing, "Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics exporter on {}", addr);
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsError::InstallFailed {
            addr,
            message: e.to_string(),
        })?;

    describe_metrics();
    let _ = METRICS_ADDR.set(addr);
    Ok(())
}

fn describe_metrics() {
    describe_counter!(
        "messages_downloaded_total",
        Unit::Count,
        "Messages whose record was written to disk"
    );
    describe_counter!(
        "attachments_downloaded_total",
        Unit::Count,
        "Attachments written to disk"
    );
    describe_counter!(
        "bytes_written_total",
        Unit::Bytes,
        "Bytes written to the record tree"
    );
    describe_counter!(
        "archive_errors_total",
        Unit::Count,
        "Item-scoped failures, labelled by phase"
    );
    describe_counter!(
        "api_retries_total",
        Unit::Count,
        "Retries performed by the fetch client"
    );
    describe_counter!(
        "api_rate_limit_hits_total",
        Unit::Count,
        "429 responses received"
    );
    describe_counter!(
        "runs_finished_total",
        Unit::Count,
        "Runs that reached a terminal state, labelled by state"
    );
    describe_histogram!(
        "run_duration_seconds",
        Unit::Seconds,
        "Wall-clock duration of a run"
    );
}

/// Fold one call's retry accounting into the counters
pub fn record_call(report: &CallReport) {
    if report.retries > 0 {
        counter!("api_retries_total").increment(u64::from(report.retries));
    }
    if report.rate_limit_hits > 0 {
        counter!("api_rate_limit_hits_total").increment(u64::from(report.rate_limit_hits));
    }
}

/// One message archived
pub fn record_message_downloaded() {
    counter!("messages_downloaded_total").increment(1);
}

/// One attachment written
pub fn record_attachment_downloaded() {
    counter!("attachments_downloaded_total").increment(1);
}

/// Bytes written to disk
pub fn record_bytes_written(bytes: u64) {
    counter!("bytes_written_total").increment(bytes);
}

/// One item-scoped failure in `phase`
pub fn record_error(phase: &'static str) {
    counter!("archive_errors_total", "phase" => phase).increment(1);
}

/// A run reached its terminal state
pub fn record_run_finished(state: RunState, duration: Duration) {
    counter!("runs_finished_total", "state" => state.to_string()).increment(1);
    histogram!("run_duration_seconds").record(duration.as_secs_f64());
}
