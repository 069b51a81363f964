//! Local persistence for cached articles and user preferences.
//!
//! The repository talks to storage only through [`ArticleStore`] and
//! [`PreferenceStore`], so any keyed store can stand in for the SQLite
//! [`Database`] shipped here.

mod articles;
mod preferences;
mod schema;
mod types;

use async_trait::async_trait;

pub use schema::Database;
pub use types::{Article, StoreError, UserPreferences};

/// Article persistence keyed by URL.
///
/// Each call is atomic on its own; nothing spans multiple calls.
#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Insert or replace articles by URL, returning the stored rows in input order.
    ///
    /// Remote fields are overwritten on conflict; `is_favorite` keeps its
    /// stored value.
    async fn upsert_articles(&self, articles: &[Article]) -> Result<Vec<Article>, StoreError>;

    /// Every stored article, oldest first.
    async fn all_articles(&self) -> Result<Vec<Article>, StoreError>;

    /// Every stored article with `is_favorite = true`, oldest first.
    async fn favorite_articles(&self) -> Result<Vec<Article>, StoreError>;

    async fn article_by_url(&self, url: &str) -> Result<Option<Article>, StoreError>;

    /// Overwrite a single row, returning whether a row with that URL existed.
    async fn update_article(&self, article: &Article) -> Result<bool, StoreError>;

    /// Encoded filters the cached headlines were last fetched with, if any.
    async fn headlines_filter(&self) -> Result<Option<String>, StoreError>;

    async fn set_headlines_filter(&self, filter: &str) -> Result<(), StoreError>;
}

/// Read access to the current user's preferences.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn user_preferences(&self) -> Result<UserPreferences, StoreError>;
}
