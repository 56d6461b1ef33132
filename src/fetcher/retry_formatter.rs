//! Retry message formatting
//!
//! Builds consistent, user-facing log lines for retries, late successes and
//! final failures. Messages name the operation and item, never credentials.

use std::time::Duration;

use super::FetcherError;

/// Classification of failures for user messaging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryErrorType {
    /// HTTP 429
    RateLimit,
    /// HTTP 5xx
    ServerError(u16),
    /// Item or attachment no longer exists
    NotFound,
    /// HTTP 401
    AuthExpired,
    /// Other 4xx
    ClientError(u16),
    /// Transport failure
    Network,
    /// Undecodable response
    MalformedResponse,
}

impl RetryErrorType {
    /// Short description used inside log messages
    pub fn description(&self) -> &'static str {
        match self {
            Self::RateLimit => "rate limit exceeded",
            Self::ServerError(code) => match code {
                500 => "internal server error",
                502 => "bad gateway",
                503 => "service unavailable",
                504 => "gateway timeout",
                _ => "server error",
            },
            Self::NotFound => "message not found",
            Self::AuthExpired => "authorization expired (401)",
            Self::ClientError(code) => match code {
                400 => "invalid request",
                403 => "permission denied",
                _ => "client error",
            },
            Self::Network => "network error",
            Self::MalformedResponse => "malformed response",
        }
    }

    /// Suggested remediation shown after a final failure
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::RateLimit => "Lower --requests-per-second or wait for the quota window to reset",
            Self::ServerError(_) => "The provider may be degraded, try again later",
            Self::NotFound => "The message was probably deleted while the run was in progress",
            Self::AuthExpired => "Re-run the authorization tool to refresh the access token",
            Self::ClientError(_) => "Check the search query and the token's granted scopes",
            Self::Network => "Check network connectivity and DNS resolution",
            Self::MalformedResponse => "Report the message id; the response could not be decoded",
        }
    }
}

impl From<&FetcherError> for RetryErrorType {
    fn from(error: &FetcherError) -> Self {
        match error {
            FetcherError::RateLimited => Self::RateLimit,
            FetcherError::TransientServer(code) | FetcherError::ServerError(code) => {
                Self::ServerError(*code)
            }
            FetcherError::NotFound(_) => Self::NotFound,
            FetcherError::AuthExpired(_) => Self::AuthExpired,
            FetcherError::ClientError { status, .. } => Self::ClientError(*status),
            FetcherError::NetworkError(_) => Self::Network,
            FetcherError::ParseError(_) => Self::MalformedResponse,
        }
    }
}

/// Context for formatting retry messages
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Current attempt number (1-based)
    pub attempt: u32,
    /// Total attempts allowed (initial call plus retries)
    pub max_attempts: u32,
    /// Failure that triggered the message
    pub error_type: RetryErrorType,
    /// Wait before the next attempt
    pub backoff_duration: Duration,
    /// Operation being performed, e.g. `get_detail`
    pub operation: String,
    /// Item the call concerns, if any
    pub item_id: Option<String>,
    /// Original error text
    pub error_message: String,
}

impl RetryContext {
    /// Build a context from a failed call
    pub fn new(
        attempt: u32,
        max_attempts: u32,
        error: &FetcherError,
        backoff_duration: Duration,
        operation: impl Into<String>,
        item_id: Option<&str>,
    ) -> Self {
        Self {
            attempt,
            max_attempts,
            error_type: RetryErrorType::from(error),
            backoff_duration,
            operation: operation.into(),
            item_id: item_id.map(str::to_string),
            error_message: error.to_string(),
        }
    }

    /// Retry announcement with attempt counters and wait time
    pub fn format_retry(&self) -> String {
        let mut message = format!(
            "Retrying {} (attempt {}/{}) after {} - waiting {:.1} seconds...",
            self.operation,
            self.attempt,
            self.max_attempts,
            self.error_type.description(),
            self.backoff_duration.as_secs_f64()
        );
        self.append_item(&mut message);
        message
    }

    /// Message for a call that succeeded after at least one retry
    pub fn format_success(&self) -> String {
        let mut message = format!(
            "{} succeeded on attempt {}/{}",
            self.operation, self.attempt, self.max_attempts
        );
        self.append_item(&mut message);
        message
    }

    /// Multi-line failure summary with suggestions
    pub fn format_failure(&self) -> String {
        let mut lines = vec![
            format!(
                "[FAILED] {} failed after {} attempt(s)",
                self.operation, self.attempt
            ),
            format!("  Last error: {}", self.error_message),
            format!("  Item: {}", self.item_id.as_deref().unwrap_or("none")),
            "  Suggestions:".to_string(),
        ];

        for suggestion in self.format_suggestions() {
            lines.push(format!("    - {suggestion}"));
        }

        lines.join("\n")
    }

    /// Suggestions tailored to the failure
    pub fn format_suggestions(&self) -> Vec<String> {
        let mut suggestions = vec![self.error_type.suggestion().to_string()];
        if matches!(
            self.error_type,
            RetryErrorType::RateLimit | RetryErrorType::ServerError(_)
        ) {
            suggestions.push(format!(
                "Try increasing --max-retries (current: {})",
                self.max_attempts.saturating_sub(1)
            ));
        }
        suggestions
    }

    fn append_item(&self, buffer: &mut String) {
        if let Some(id) = &self.item_id {
            buffer.push_str(" (");
            buffer.push_str(id);
            buffer.push(')');
        }
    }
}
