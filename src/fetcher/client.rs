//! Paced, retrying wrapper around a [`MailApi`]
//!
//! Every operation is `acquire()` + call + retry loop. The outcome of each
//! call carries a [`CallReport`] so the caller can account for retries and
//! quota rejections without this type touching run statistics.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::retry_formatter::RetryContext;
use super::{FetcherError, FetcherResult, ListPage, MailApi};
use crate::downloader::config::ArchiveConfig;
use crate::downloader::rate_limit::RateLimiter;
use crate::downloader::retry::{RetryDecision, RetryPolicy};
use crate::{ItemDetail, ItemId};

/// Side effects of one logical call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallReport {
    /// Retries performed before the final outcome
    pub retries: u32,
    /// 429 responses observed, including the final one
    pub rate_limit_hits: u32,
}

/// Successful call
#[derive(Debug)]
pub struct Fetched<T> {
    /// Returned value
    pub value: T,
    /// Retry accounting
    pub report: CallReport,
}

/// Failed call, after retries were exhausted or refused
#[derive(Debug)]
pub struct FetchFailure {
    /// Last error observed
    pub error: FetcherError,
    /// Retry accounting
    pub report: CallReport,
}

/// Outcome of a [`FetchClient`] operation
pub type FetchOutcome<T> = Result<Fetched<T>, FetchFailure>;

/// Rate-limited, retrying client over a [`MailApi`] transport
pub struct FetchClient {
    api: Arc<dyn MailApi>,
    rate_limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
}

impl FetchClient {
    /// Create a client
    ///
    /// # Arguments
    /// * `api` - Transport performing the raw calls
    /// * `rate_limiter` - Shared limiter (one quota per credential)
    /// * `retry` - Policy for retryable failures
    pub fn new(api: Arc<dyn MailApi>, rate_limiter: Arc<RateLimiter>, retry: RetryPolicy) -> Self {
        Self {
            api,
            rate_limiter,
            retry,
        }
    }

    /// Create a client paced and retried according to `config`
    pub fn from_config(api: Arc<dyn MailApi>, config: &ArchiveConfig) -> Self {
        Self::new(
            api,
            Arc::new(RateLimiter::new(config.requests_per_second)),
            RetryPolicy::new(config.base_retry_delay, config.max_retries),
        )
    }

    /// List one page of ids; `query` is forwarded verbatim
    pub async fn list_page(&self, query: &str, page_token: Option<&str>) -> FetchOutcome<ListPage> {
        let api: &dyn MailApi = self.api.as_ref();
        self.call("list_page", None, move || api.list_page(query, page_token))
            .await
    }

    /// Fetch the full detail of one item
    pub async fn get_detail(&self, id: &ItemId) -> FetchOutcome<ItemDetail> {
        let api: &dyn MailApi = self.api.as_ref();
        self.call("get_detail", Some(id.as_str()), move || api.get_detail(id))
            .await
    }

    /// Fetch the bytes of one attachment
    pub async fn get_sub_resource(&self, item_id: &ItemId, sub_id: &str) -> FetchOutcome<Vec<u8>> {
        let api: &dyn MailApi = self.api.as_ref();
        self.call("get_sub_resource", Some(item_id.as_str()), move || {
            api.get_sub_resource(item_id, sub_id)
        })
        .await
    }

    /// Permanently delete one item
    pub async fn delete_item(&self, id: &ItemId) -> FetchOutcome<()> {
        let api: &dyn MailApi = self.api.as_ref();
        self.call("delete_item", Some(id.as_str()), move || api.delete_item(id))
            .await
    }

    async fn call<T, F, Fut>(
        &self,
        operation: &'static str,
        item_id: Option<&str>,
        mut op: F,
    ) -> FetchOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = FetcherResult<T>>,
    {
        let mut report = CallReport::default();
        let max_attempts = self.retry.max_retries().saturating_add(1);
        let mut attempt: u32 = 0;
        let mut last_error: Option<FetcherError> = None;

        loop {
            self.rate_limiter.acquire().await;

            let error = match op().await {
                Ok(value) => {
                    if let Some(previous) = &last_error {
                        let ctx = RetryContext::new(
                            attempt + 1,
                            max_attempts,
                            previous,
                            Duration::ZERO,
                            operation,
                            item_id,
                        );
                        info!(operation, attempt = attempt + 1, "{}", ctx.format_success());
                    }
                    return Ok(Fetched { value, report });
                }
                Err(error) => error,
            };

            if error.is_rate_limit() {
                report.rate_limit_hits = report.rate_limit_hits.saturating_add(1);
            }

            match self.retry.decide(&error, attempt) {
                RetryDecision::RetryAfter(delay) => {
                    let ctx = RetryContext::new(
                        attempt + 1,
                        max_attempts,
                        &error,
                        delay,
                        operation,
                        item_id,
                    );
                    warn!(
                        operation,
                        attempt = attempt + 1,
                        backoff_ms = delay.as_millis() as u64,
                        "{}",
                        ctx.format_retry()
                    );
                    sleep(delay).await;
                    report.retries = report.retries.saturating_add(1);
                    attempt += 1;
                    last_error = Some(error);
                }
                RetryDecision::GiveUp => {
                    if error.is_retryable() {
                        let ctx = RetryContext::new(
                            attempt + 1,
                            max_attempts,
                            &error,
                            Duration::ZERO,
                            operation,
                            item_id,
                        );
                        warn!(operation, attempts = attempt + 1, "{}", ctx.format_failure());
                    } else {
                        debug!(operation, error = %error, "Non-retryable failure");
                    }
                    return Err(FetchFailure { error, report });
                }
            }
        }
    }
}
