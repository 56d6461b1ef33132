//! Bearer credential supply
//!
//! Acquiring and refreshing tokens is the job of an external authorization
//! tool. This module only reads what it produced.

use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

use super::{FetcherError, FetcherResult};

/// Supplies the bearer token attached to every request
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Current access token
    async fn access_token(&self) -> FetcherResult<String>;
}

/// Token held in memory for the lifetime of the process
#[derive(Clone)]
pub struct StaticTokenProvider {
    token: String,
    source: Option<PathBuf>,
}

impl StaticTokenProvider {
    /// Wrap an already-obtained token
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            source: None,
        }
    }

    /// Read the `token` (or `access_token`) field of a JSON token file
    pub fn from_file(path: impl AsRef<Path>) -> FetcherResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            FetcherError::AuthExpired(format!("cannot read token file {}: {}", path.display(), e))
        })?;
        let token = parse_token_file(&content)?;
        Ok(Self {
            token,
            source: Some(path.to_path_buf()),
        })
    }
}

// Never print the credential itself.
impl fmt::Debug for StaticTokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticTokenProvider")
            .field("token", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> FetcherResult<String> {
        Ok(self.token.clone())
    }
}

#[derive(Deserialize)]
struct TokenFile {
    token: Option<String>,
    access_token: Option<String>,
}

fn parse_token_file(content: &str) -> FetcherResult<String> {
    let parsed: TokenFile = serde_json::from_str(content)
        .map_err(|e| FetcherError::ParseError(format!("invalid token file: {e}")))?;

    parsed
        .token
        .or(parsed.access_token)
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| {
            FetcherError::AuthExpired(
                "token file has no `token` or `access_token` field".to_string(),
            )
        })
}
