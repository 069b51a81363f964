//! Remote news source.
//!
//! [`NewsSource`] is the seam the repository depends on; [`NewsApiClient`]
//! implements it against a NewsAPI-compatible HTTP service.

mod newsapi;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::storage::Article;

pub use newsapi::{ApiError, NewsApiClient, DEFAULT_BASE_URL};

/// Country used for headlines when the caller does not pick one.
pub const DEFAULT_COUNTRY: &str = "us";

/// Filters for a top-headlines request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadlinesQuery {
    pub country: String,
    pub category: Option<String>,
    pub query: Option<String>,
}

impl Default for HeadlinesQuery {
    fn default() -> Self {
        Self {
            country: DEFAULT_COUNTRY.to_string(),
            category: None,
            query: None,
        }
    }
}

/// Free-text search bounded by an optional date range (inclusive).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub query: String,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            from: None,
            to: None,
        }
    }
}

/// Read-only queries against a remote news service.
///
/// Implementations return articles with `is_favorite = false`; favorite
/// state is local only.
#[async_trait]
pub trait NewsSource: Send + Sync {
    async fn top_headlines(&self, query: &HeadlinesQuery) -> Result<Vec<Article>, ApiError>;

    async fn search(&self, query: &SearchQuery) -> Result<Vec<Article>, ApiError>;
}
