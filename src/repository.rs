//! Read/write policy between the remote news source, the article cache and
//! user preferences.
//!
//! [`Repository`] owns no data. Every call is a short, strictly sequential
//! exchange with its injected collaborators (fetch, then upsert, then return),
//! and every hard failure is handed back unchanged.
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

use crate::api::{ApiError, HeadlinesQuery, NewsSource, SearchQuery, DEFAULT_COUNTRY};
use crate::storage::{Article, ArticleStore, PreferenceStore, StoreError};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Remote(#[from] ApiError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// When `top_headlines` may answer from the local cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CachePolicy {
    /// Any cached article short-circuits the network, whatever the filters.
    #[default]
    CacheFirst,
    /// Serve the cache only for the same filters this instance last fetched.
    FilterAware,
}

#[derive(Clone)]
pub struct Repository {
    source: Arc<dyn NewsSource>,
    articles: Arc<dyn ArticleStore>,
    preferences: Arc<dyn PreferenceStore>,
    policy: CachePolicy,
    country: String,
}

impl Repository {
    pub fn new(
        source: Arc<dyn NewsSource>,
        articles: Arc<dyn ArticleStore>,
        preferences: Arc<dyn PreferenceStore>,
    ) -> Self {
        Self {
            source,
            articles,
            preferences,
            policy: CachePolicy::default(),
            country: DEFAULT_COUNTRY.to_string(),
        }
    }

    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Country used for personalized recommendations.
    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = country.into();
        self
    }

    pub fn cache_policy(&self) -> CachePolicy {
        self.policy
    }

    /// Top headlines, answered from the cache when it holds anything.
    ///
    /// Under [`CachePolicy::CacheFirst`] a non-empty cache is returned as-is
    /// even when `query` differs from what was fetched; that case is logged
    /// as a warning. [`CachePolicy::FilterAware`] refetches instead. The
    /// last fetched filters live in the article store, so they carry over
    /// between runs.
    pub async fn top_headlines(
        &self,
        query: &HeadlinesQuery,
    ) -> Result<Vec<Article>, RepositoryError> {
        let cached = self.articles.all_articles().await?;
        if !cached.is_empty() {
            let last = self.last_headlines().await?;
            match self.policy {
                CachePolicy::CacheFirst => {
                    if last.as_ref().is_some_and(|last| last != query) {
                        tracing::warn!(
                            requested = ?query,
                            fetched = ?last,
                            "Serving cached headlines fetched with different filters"
                        );
                    }
                    tracing::debug!(count = cached.len(), "Headlines served from cache");
                    return Ok(cached);
                }
                CachePolicy::FilterAware if last.as_ref() == Some(query) => {
                    tracing::debug!(count = cached.len(), "Headlines served from cache");
                    return Ok(cached);
                }
                CachePolicy::FilterAware => {
                    tracing::debug!(requested = ?query, "Headline filters changed, refetching");
                }
            }
        }

        self.fetch_headlines(query).await
    }

    /// Top headlines straight from the network, bypassing the cache check.
    pub async fn refresh_top_headlines(
        &self,
        query: &HeadlinesQuery,
    ) -> Result<Vec<Article>, RepositoryError> {
        self.fetch_headlines(query).await
    }

    /// Free-text search; always hits the network and always caches the results.
    pub async fn search_articles(
        &self,
        query: &SearchQuery,
    ) -> Result<Vec<Article>, RepositoryError> {
        let fetched = self.source.search(query).await?;
        tracing::debug!(query = %query.query, count = fetched.len(), "Search fetched");
        Ok(self.articles.upsert_articles(&fetched).await?)
    }

    pub async fn favorite_articles(&self) -> Result<Vec<Article>, RepositoryError> {
        Ok(self.articles.favorite_articles().await?)
    }

    /// Flip the favorite flag of the stored article with the same url.
    ///
    /// Returns the updated article, or `None` when the url is not cached
    /// (nothing is inserted). The read and the write are separate store calls,
    /// so two concurrent toggles of one article can lose an update.
    pub async fn toggle_favorite(
        &self,
        article: &Article,
    ) -> Result<Option<Article>, RepositoryError> {
        let Some(mut stored) = self.articles.article_by_url(&article.url).await? else {
            tracing::debug!(url = %article.url, "Toggle favorite on uncached article ignored");
            return Ok(None);
        };

        stored.is_favorite = !stored.is_favorite;
        if !self.articles.update_article(&stored).await? {
            // Row vanished between the read and the write
            tracing::debug!(url = %stored.url, "Toggle favorite lost its row");
            return Ok(None);
        }

        tracing::info!(url = %stored.url, favorite = stored.is_favorite, "Favorite toggled");
        Ok(Some(stored))
    }

    /// Headlines for the stored preferences; always hits the network.
    pub async fn personalized_recommendations(&self) -> Result<Vec<Article>, RepositoryError> {
        let prefs = self.preferences.user_preferences().await?;
        let query = HeadlinesQuery {
            country: self.country.clone(),
            category: prefs.preferred_category,
            query: prefs.preferred_keywords,
        };
        tracing::debug!(query = ?query, "Fetching recommendations");

        let fetched = self.source.top_headlines(&query).await?;
        Ok(self.articles.upsert_articles(&fetched).await?)
    }

    async fn fetch_headlines(
        &self,
        query: &HeadlinesQuery,
    ) -> Result<Vec<Article>, RepositoryError> {
        let fetched = self.source.top_headlines(query).await?;
        tracing::debug!(count = fetched.len(), "Headlines fetched");
        let stored = self.articles.upsert_articles(&fetched).await?;
        self.remember_headlines(query).await?;
        Ok(stored)
    }

    async fn last_headlines(&self) -> Result<Option<HeadlinesQuery>, RepositoryError> {
        let Some(encoded) = self.articles.headlines_filter().await? else {
            return Ok(None);
        };
        match serde_json::from_str(&encoded) {
            Ok(query) => Ok(Some(query)),
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring unreadable headlines filter");
                Ok(None)
            }
        }
    }

    async fn remember_headlines(&self, query: &HeadlinesQuery) -> Result<(), RepositoryError> {
        match serde_json::to_string(query) {
            Ok(encoded) => self.articles.set_headlines_filter(&encoded).await?,
            Err(e) => tracing::warn!(error = %e, "Failed to encode headlines filter"),
        }
        Ok(())
    }
}
