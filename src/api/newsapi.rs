use futures::StreamExt;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use super::{HeadlinesQuery, NewsSource, SearchQuery};
use crate::storage::Article;

pub const DEFAULT_BASE_URL: &str = "https://newsapi.org/v2";

const MAX_RESPONSE_SIZE: usize = 5 * 1024 * 1024; // 5MB
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);
const API_KEY_HEADER: &str = "X-Api-Key";

/// Title NewsAPI substitutes for articles withdrawn by their publisher.
const REMOVED_TITLE: &str = "[Removed]";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("News API rejected the request (HTTP {status}, {code}): {message}")]
    Rejected {
        status: u16,
        code: String,
        message: String,
    },
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    #[error("Invalid UTF-8 in response")]
    InvalidUtf8,
    #[error("Malformed response: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),
    #[error("Insecure base URL: HTTPS required (except localhost for testing)")]
    InsecureBaseUrl,
}

// ============================================================================
// Wire Format
// ============================================================================

/// Shared envelope for `/top-headlines` and `/everything`, success or error.
#[derive(Debug, Deserialize)]
struct Envelope {
    status: Option<String>,
    #[serde(default)]
    articles: Vec<WireArticle>,
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireArticle {
    url: Option<String>,
    title: Option<String>,
    description: Option<String>,
    #[serde(rename = "urlToImage")]
    url_to_image: Option<String>,
}

impl Envelope {
    fn rejection(self, status: StatusCode) -> ApiError {
        ApiError::Rejected {
            status: status.as_u16(),
            code: self.code.unwrap_or_else(|| "unknown".to_string()),
            message: self.message.unwrap_or_else(|| "no message".to_string()),
        }
    }
}

/// Map wire items onto articles, dropping items without a usable identity.
fn into_articles(items: Vec<WireArticle>) -> Vec<Article> {
    let mut seen = HashSet::with_capacity(items.len());
    let mut articles = Vec::with_capacity(items.len());

    for item in items {
        let url = match item.url.map(|u| u.trim().to_string()) {
            Some(url) if !url.is_empty() => url,
            _ => {
                tracing::debug!(title = ?item.title, "Dropping article without url");
                continue;
            }
        };
        let title = item.title.unwrap_or_default();
        if title == REMOVED_TITLE {
            tracing::debug!(url = %url, "Dropping removed article");
            continue;
        }
        if !seen.insert(url.clone()) {
            tracing::debug!(url = %url, "Dropping duplicate article in response");
            continue;
        }

        articles.push(Article {
            url,
            title,
            description: item.description.unwrap_or_default(),
            image_url: item.url_to_image.unwrap_or_default(),
            is_favorite: false,
        });
    }

    articles
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

// ============================================================================
// Client
// ============================================================================

/// HTTP client for a NewsAPI-compatible service.
pub struct NewsApiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
    timeout: Duration,
}

impl NewsApiClient {
    /// Build a client for `base_url` (defaults to [`DEFAULT_BASE_URL`]).
    ///
    /// # Errors
    ///
    /// `InvalidBaseUrl` if the URL does not parse, `InsecureBaseUrl` if it is
    /// not HTTPS and not a loopback host.
    pub fn new(
        client: reqwest::Client,
        base_url: Option<&str>,
        api_key: Option<SecretString>,
    ) -> Result<Self, ApiError> {
        let base = base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/');
        let parsed = Url::parse(base)?;

        // The API key travels in a header, so plain HTTP is only accepted for
        // local test servers.
        match parsed.scheme() {
            "https" => {}
            "http" if matches!(parsed.host_str(), Some("localhost") | Some("127.0.0.1")) => {
                tracing::warn!(base_url = %base, "Using non-HTTPS news API base URL (localhost only)");
            }
            _ => {
                tracing::error!(base_url = %base, "Rejecting non-HTTPS base URL");
                return Err(ApiError::InsecureBaseUrl);
            }
        }

        if api_key.is_none() {
            tracing::debug!("No news API key configured; requests may be rejected");
        }

        Ok(Self {
            client,
            base_url: base.to_string(),
            api_key,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Override the per-request timeout (covers connect, send and body).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self, path: &str, params: &[(&str, &str)]) -> Result<Url, ApiError> {
        let url = Url::parse_with_params(&format!("{}/{}", self.base_url, path), params)?;
        Ok(url)
    }

    async fn get_articles(&self, url: Url) -> Result<Vec<Article>, ApiError> {
        let endpoint = url.path().to_string();
        let (status, body) = tokio::time::timeout(self.timeout, self.fetch_body(url))
            .await
            .map_err(|_| ApiError::Timeout(self.timeout))??;

        if !status.is_success() {
            tracing::debug!(endpoint = %endpoint, status = status.as_u16(), "News API returned error status");
            return Err(match serde_json::from_str::<Envelope>(&body) {
                Ok(envelope) if envelope.code.is_some() || envelope.message.is_some() => {
                    envelope.rejection(status)
                }
                _ => ApiError::HttpStatus(status.as_u16()),
            });
        }

        let envelope: Envelope = serde_json::from_str(&body)?;
        if envelope.status.as_deref().is_some_and(|s| s != "ok") {
            return Err(envelope.rejection(status));
        }

        let received = envelope.articles.len();
        let articles = into_articles(envelope.articles);
        tracing::debug!(
            endpoint = %endpoint,
            received = received,
            kept = articles.len(),
            "Fetched articles"
        );
        Ok(articles)
    }

    async fn fetch_body(&self, url: Url) -> Result<(StatusCode, String), ApiError> {
        let mut request = self.client.get(url);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key.expose_secret());
        }

        let response = request.send().await.map_err(ApiError::Network)?;
        let status = response.status();
        let body = read_limited_text(response, MAX_RESPONSE_SIZE).await?;
        Ok((status, body))
    }
}

#[async_trait::async_trait]
impl NewsSource for NewsApiClient {
    async fn top_headlines(&self, query: &HeadlinesQuery) -> Result<Vec<Article>, ApiError> {
        let mut params: Vec<(&str, &str)> = Vec::with_capacity(3);
        let country = query.country.trim();
        if !country.is_empty() {
            params.push(("country", country));
        }
        if let Some(category) = non_empty(&query.category) {
            params.push(("category", category));
        }
        if let Some(q) = non_empty(&query.query) {
            params.push(("q", q));
        }

        let url = self.endpoint("top-headlines", &params)?;
        self.get_articles(url).await
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<Article>, ApiError> {
        let from = query.from.map(|d| d.format("%Y-%m-%d").to_string());
        let to = query.to.map(|d| d.format("%Y-%m-%d").to_string());

        let mut params: Vec<(&str, &str)> = vec![("q", query.query.trim())];
        if let Some(from) = from.as_deref() {
            params.push(("from", from));
        }
        if let Some(to) = to.as_deref() {
            params.push(("to", to));
        }

        let url = self.endpoint("everything", &params)?;
        self.get_articles(url).await
    }
}

async fn read_limited_text(response: reqwest::Response, limit: usize) -> Result<String, ApiError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(ApiError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(ApiError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(ApiError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    String::from_utf8(bytes).map_err(|_| ApiError::InvalidUtf8)
}
