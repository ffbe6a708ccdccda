//! Asynchronous client for the channel log endpoints.
//!
//! Covers the three remote surfaces the viewer talks to: the paged history
//! endpoint (HTML fragments with cursor headers), the server-push stream, and
//! the signup form.

mod push;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

pub use push::{parse_location, PushEvent, PushSource};

pub const PREV_PAGE_HEADER: &str = "X-PrevPage";
pub const NEXT_PAGE_HEADER: &str = "X-NextPage";
pub const TIMEZONE_HEADER: &str = "X-Timezone";

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("page not found")]
    NotFound,
    #[error("unexpected status: {status} body={body}")]
    UnexpectedStatus { status: StatusCode, body: String },
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("push stream unavailable: {0}")]
    Stream(String),
}

/// One page of history as returned by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageResponse {
    pub body: String,
    pub prev_page: Option<String>,
    pub next_page: Option<String>,
    pub timezone: Option<String>,
}

impl PageResponse {
    fn from_parts(headers: &HeaderMap, body: String) -> Self {
        Self {
            body,
            prev_page: header_value(headers, PREV_PAGE_HEADER),
            next_page: header_value(headers, NEXT_PAGE_HEADER),
            timezone: header_value(headers, TIMEZONE_HEADER),
        }
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Anything that can serve a page of history for a cursor URL.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, url: &str) -> Result<PageResponse, HistoryError>;
}

#[derive(Debug, Deserialize)]
struct SubscribeReply {
    #[serde(default)]
    success: bool,
}

#[derive(Clone, Debug)]
pub struct HistoryClient {
    http: Client,
    base_url: Url,
}

impl HistoryClient {
    pub fn new(base_url: &str) -> Result<Self, HistoryError> {
        let base_url = Url::parse(base_url).map_err(|err| HistoryError::InvalidUrl {
            url: base_url.to_string(),
            reason: err.to_string(),
        })?;
        Ok(Self {
            http: Client::new(),
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolves a server-supplied cursor (usually a path plus query) against the base url.
    pub fn resolve(&self, cursor: &str) -> Result<Url, HistoryError> {
        self.base_url
            .join(cursor)
            .map_err(|err| HistoryError::InvalidUrl {
                url: cursor.to_string(),
                reason: err.to_string(),
            })
    }

    /// Fetches a full channel page, the way a browser would on first load.
    pub async fn fetch_shell(&self, url: &str) -> Result<String, HistoryError> {
        let url = self.resolve(url)?;
        let res = self.http.get(url).send().await?;
        let status = res.status();
        if status == StatusCode::NOT_FOUND {
            return Err(HistoryError::NotFound);
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(HistoryError::UnexpectedStatus { status, body });
        }
        Ok(res.text().await?)
    }

    /// Posts the signup form. Returns the server's verdict.
    pub async fn subscribe_email(
        &self,
        action: &str,
        email: &str,
        csrf_token: Option<&str>,
    ) -> Result<bool, HistoryError> {
        let url = self.resolve(action)?;
        let mut form = vec![("email", email)];
        if let Some(token) = csrf_token {
            form.push(("csrfmiddlewaretoken", token));
        }
        let res = self.http.post(url).form(&form).send().await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(HistoryError::UnexpectedStatus { status, body });
        }
        let reply = res.json::<SubscribeReply>().await?;
        Ok(reply.success)
    }
}

#[async_trait]
impl PageSource for HistoryClient {
    async fn fetch_page(&self, url: &str) -> Result<PageResponse, HistoryError> {
        let url = self.resolve(url)?;
        debug!(target = "history.page", %url, "fetching page");
        let res = self
            .http
            .get(url)
            .header("X-Requested-With", "XMLHttpRequest")
            .send()
            .await?;
        let status = res.status();
        if status == StatusCode::NOT_FOUND {
            return Err(HistoryError::NotFound);
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(HistoryError::UnexpectedStatus { status, body });
        }
        let headers = res.headers().clone();
        let body = res.text().await?;
        Ok(PageResponse::from_parts(&headers, body))
    }
}
