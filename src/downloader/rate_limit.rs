//! Request pacing
//!
//! Enforces a minimum interval between outbound calls. The interval is
//! `1 / requests_per_second`; a ceiling of zero or below disables pacing.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Paces outbound calls to a configured ceiling
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Option<Duration>,
    // Held across the pacing sleep so concurrent callers queue up behind it.
    last_permit: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Create a limiter allowing at most `requests_per_second` calls per second
    ///
    /// # Arguments
    /// * `requests_per_second` - Ceiling; `<= 0`, NaN or infinity disables pacing
    pub fn new(requests_per_second: f64) -> Self {
        let min_interval = if requests_per_second.is_finite() && requests_per_second > 0.0 {
            Some(Duration::from_secs_f64(1.0 / requests_per_second))
        } else {
            None
        };

        Self {
            min_interval,
            last_permit: Mutex::new(None),
        }
    }

    /// Create a limiter that never waits
    pub fn disabled() -> Self {
        Self::new(0.0)
    }

    /// Whether pacing is active
    pub fn is_enabled(&self) -> bool {
        self.min_interval.is_some()
    }

    /// Minimum spacing between permits, if pacing is active
    pub fn min_interval(&self) -> Option<Duration> {
        self.min_interval
    }

    /// Wait until one more call is permissible, then claim the slot
    pub async fn acquire(&self) {
        let Some(interval) = self.min_interval else {
            return;
        };

        let mut last_permit = self.last_permit.lock().await;

        if let Some(previous) = *last_permit {
            let elapsed = previous.elapsed();
            if elapsed < interval {
                let shortfall = interval - elapsed;
                debug!(wait_ms = shortfall.as_millis() as u64, "Rate limiting: pacing next call");
                sleep(shortfall).await;
            }
        }

        *last_permit = Some(Instant::now());
    }
}
