//! Run statistics and periodic progress logging
//!
//! [`RunStatistics`] is owned and mutated only by the downloader; everything
//! else receives copies. [`ProgressLog`] decides when a human-readable
//! progress line is worth emitting and formats it.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::fetcher::CallReport;

const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_PERCENTAGE_STEP: f64 = 10.0;

/// Counters describing a run. Field names match the status file schema.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatistics {
    /// Items known from listing so far
    pub total_emails: u64,
    /// Items whose record was written
    pub downloaded_emails: u64,
    /// Attachments written
    pub total_attachments: u64,
    /// Bytes written to disk (metadata, bodies and attachments)
    pub total_size_bytes: u64,
    /// Item- and attachment-scoped failures
    pub errors: u64,
    /// 429 responses observed
    pub rate_limit_hits: u64,
    /// Retries performed
    pub retries: u64,
}

impl RunStatistics {
    /// Fold in the retry/rate-limit side effects of one API call
    pub fn record_call(&mut self, report: &CallReport) {
        self.retries = self.retries.saturating_add(u64::from(report.retries));
        self.rate_limit_hits = self
            .rate_limit_hits
            .saturating_add(u64::from(report.rate_limit_hits));
    }

    /// Count one failure
    pub fn record_error(&mut self) {
        self.errors = self.errors.saturating_add(1);
    }

    /// Count bytes written to disk
    pub fn record_bytes(&mut self, bytes: u64) {
        self.total_size_bytes = self.total_size_bytes.saturating_add(bytes);
    }

    /// Completion percentage (0-100), if anything is known to exist
    pub fn percentage(&self) -> Option<f64> {
        if self.total_emails == 0 {
            return None;
        }
        Some((self.downloaded_emails as f64 / self.total_emails as f64) * 100.0)
    }
}

/// Controls how often progress lines are logged during a run
#[derive(Debug, Clone)]
pub struct ProgressLog {
    start_time: Instant,
    last_update: Instant,
    update_interval: Duration,
    min_percentage_step: f64,
    last_reported_percentage: f64,
}

impl Default for ProgressLog {
    fn default() -> Self {
        Self::new(DEFAULT_UPDATE_INTERVAL, DEFAULT_PERCENTAGE_STEP)
    }
}

impl ProgressLog {
    /// Create a log emitting at most every `update_interval`, or sooner on a percentage jump
    pub fn new(update_interval: Duration, min_percentage_step: f64) -> Self {
        let now = Instant::now();
        Self {
            start_time: now,
            last_update: now,
            update_interval,
            min_percentage_step,
            last_reported_percentage: 0.0,
        }
    }

    /// Whether a progress line should be emitted for `stats`
    pub fn should_emit(&self, stats: &RunStatistics) -> bool {
        if stats.downloaded_emails == 0 {
            return false;
        }

        let percentage_jump = stats
            .percentage()
            .map(|pct| pct - self.last_reported_percentage >= self.min_percentage_step)
            .unwrap_or(false);

        percentage_jump || self.last_update.elapsed() >= self.update_interval
    }

    /// Reset timers after a line was emitted
    pub fn mark_emitted(&mut self, stats: &RunStatistics) {
        self.last_update = Instant::now();
        if let Some(pct) = stats.percentage() {
            self.last_reported_percentage = pct;
        }
    }

    /// Items per second since the run started
    pub fn rate(&self, stats: &RunStatistics) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            stats.downloaded_emails as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Estimated time left, when the total and a positive rate are known
    pub fn estimate_remaining(&self, stats: &RunStatistics) -> Option<Duration> {
        let rate = self.rate(stats);
        if rate <= 0.0 {
            return None;
        }
        let remaining = stats.total_emails.saturating_sub(stats.downloaded_emails);
        if remaining == 0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining as f64 / rate))
    }

    /// Human-readable progress line
    pub fn format_progress(&self, stats: &RunStatistics) -> String {
        let mut parts = vec![format!(
            "[PROGRESS] Archived {}/{} messages",
            stats.downloaded_emails, stats.total_emails
        )];

        if let Some(pct) = stats.percentage() {
            parts.push(format!("- {pct:.1}% complete"));
        }

        parts.push(format!(
            "({} attachments, {})",
            stats.total_attachments,
            format_bytes(stats.total_size_bytes)
        ));

        let rate = self.rate(stats);
        if rate > 0.0 {
            parts.push(format!("at {rate:.1} msg/sec"));
        }

        if let Some(remaining) = self.estimate_remaining(stats) {
            parts.push(format!("- ~{} remaining", format_duration(remaining)));
        }

        if stats.errors > 0 {
            parts.push(format!("[{} errors]", stats.errors));
        }

        parts.join(" ")
    }
}

/// Format a byte count as B/KB/MB/GB
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        format!("{:.1}h", secs as f64 / 3600.0)
    }
}
