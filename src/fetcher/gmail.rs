//! Gmail REST v1 transport
//!
//! One HTTP request per [`MailApi`] call. Pacing and retries are layered on
//! top by [`super::FetchClient`].

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::auth::TokenProvider;
use super::gmail_parser::{AttachmentResponse, GmailParser, ListResponse, MessageResponse};
use super::{FetcherError, FetcherResult, ListPage, MailApi};
use crate::downloader::config::LIST_PAGE_SIZE;
use crate::{ItemDetail, ItemId};

/// Production API root for the authenticated user
pub const GMAIL_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Gmail transport over `reqwest`
pub struct GmailApi {
    client: Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
}

impl GmailApi {
    /// Create a transport against the production endpoint
    ///
    /// # Errors
    /// Returns `FetcherError::NetworkError` if the HTTP client cannot be built
    pub fn new(tokens: Arc<dyn TokenProvider>) -> FetcherResult<Self> {
        Self::with_base_url(tokens, GMAIL_BASE_URL)
    }

    /// Create a transport against a custom endpoint (proxies, test servers)
    pub fn with_base_url(
        tokens: Arc<dyn TokenProvider>,
        base_url: impl Into<String>,
    ) -> FetcherResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("mailbox-archiver/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetcherError::NetworkError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
        })
    }

    /// Endpoint root
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T>(&self, path: &str, params: &[(&str, String)]) -> FetcherResult<T>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let token = self.tokens.access_token().await?;

        debug!(path, params = params.len(), "GET");
        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(params)
            .send()
            .await
            .map_err(network_error)?;

        let response = check_status(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| FetcherError::ParseError(format!("failed to deserialize {path}: {e}")))
    }
}

impl fmt::Debug for GmailApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GmailApi")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl MailApi for GmailApi {
    async fn list_page(&self, query: &str, page_token: Option<&str>) -> FetcherResult<ListPage> {
        let mut params = vec![("maxResults", LIST_PAGE_SIZE.to_string())];
        if !query.is_empty() {
            params.push(("q", query.to_string()));
        }
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }

        let response: ListResponse = self.get_json("/messages", &params).await?;
        Ok(GmailParser::parse_list(response))
    }

    async fn get_detail(&self, id: &ItemId) -> FetcherResult<ItemDetail> {
        let path = format!("/messages/{}", id.as_str());
        let response: MessageResponse = self
            .get_json(&path, &[("format", "full".to_string())])
            .await?;
        GmailParser::parse_message(response)
    }

    async fn get_sub_resource(&self, item_id: &ItemId, sub_id: &str) -> FetcherResult<Vec<u8>> {
        let path = format!("/messages/{}/attachments/{}", item_id.as_str(), sub_id);
        let response: AttachmentResponse = self.get_json(&path, &[]).await?;
        GmailParser::parse_attachment(response)
    }

    async fn delete_item(&self, id: &ItemId) -> FetcherResult<()> {
        let url = format!("{}/messages/{}", self.base_url, id.as_str());
        let token = self.tokens.access_token().await?;

        let response = self
            .client
            .delete(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(network_error)?;
        check_status(response).await?;
        Ok(())
    }
}

fn network_error(err: reqwest::Error) -> FetcherError {
    let kind = if err.is_timeout() {
        "timeout"
    } else if err.is_connect() {
        "connection failed"
    } else {
        "request failed"
    };
    FetcherError::NetworkError(format!("{kind}: {}", err.without_url()))
}

async fn check_status(response: Response) -> FetcherResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, &body))
}

/// Map a non-success status and its body onto [`FetcherError`]
///
/// Gmail reports per-user quota exhaustion as 403 `userRateLimitExceeded`
/// or `rateLimitExceeded`; those are treated like 429.
pub fn classify_status(status: StatusCode, body: &str) -> FetcherError {
    if status == StatusCode::FORBIDDEN && body.contains("ateLimitExceeded") {
        return FetcherError::RateLimited;
    }

    let mut message: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    if message.trim().is_empty() {
        message = status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string();
    }
    FetcherError::from_status(status.as_u16(), message)
}
