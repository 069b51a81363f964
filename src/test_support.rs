//! In-process fakes shared by unit tests.
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::api::{ApiError, HeadlinesQuery, NewsSource, SearchQuery};
use crate::storage::{
    Article, ArticleStore, Database, PreferenceStore, StoreError, UserPreferences,
};

fn store_down() -> StoreError {
    StoreError::Other(sqlx::Error::PoolClosed)
}

#[derive(Default, Clone, Copy, PartialEq, Eq)]
enum Behavior {
    #[default]
    Succeed,
    Fail,
    Panic,
}

/// News source that replays canned articles and records every request.
#[derive(Default)]
pub(crate) struct FakeSource {
    articles: Mutex<Vec<Article>>,
    behavior: Behavior,
    headline_calls: Mutex<Vec<HeadlinesQuery>>,
    search_calls: AtomicUsize,
}

impl FakeSource {
    pub(crate) fn returning(articles: Vec<Article>) -> Self {
        Self {
            articles: Mutex::new(articles),
            ..Self::default()
        }
    }

    /// Every request fails with HTTP 503.
    pub(crate) fn failing() -> Self {
        Self {
            behavior: Behavior::Fail,
            ..Self::default()
        }
    }

    pub(crate) fn panicking() -> Self {
        Self {
            behavior: Behavior::Panic,
            ..Self::default()
        }
    }

    pub(crate) fn set_articles(&self, articles: Vec<Article>) {
        *self.articles.lock().unwrap() = articles;
    }

    pub(crate) fn headline_calls(&self) -> Vec<HeadlinesQuery> {
        self.headline_calls.lock().unwrap().clone()
    }

    pub(crate) fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    fn respond(&self) -> Result<Vec<Article>, ApiError> {
        match self.behavior {
            Behavior::Succeed => Ok(self.articles.lock().unwrap().clone()),
            Behavior::Fail => Err(ApiError::HttpStatus(503)),
            Behavior::Panic => panic!("fake source exploded"),
        }
    }
}

#[async_trait]
impl NewsSource for FakeSource {
    async fn top_headlines(&self, query: &HeadlinesQuery) -> Result<Vec<Article>, ApiError> {
        self.headline_calls.lock().unwrap().push(query.clone());
        self.respond()
    }

    async fn search(&self, _query: &SearchQuery) -> Result<Vec<Article>, ApiError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        self.respond()
    }
}

/// Preference store returning the same snapshot forever.
pub(crate) struct FixedPreferences(pub(crate) UserPreferences);

#[async_trait]
impl PreferenceStore for FixedPreferences {
    async fn user_preferences(&self) -> Result<UserPreferences, StoreError> {
        Ok(self.0.clone())
    }
}

/// Preference store whose backing database is gone.
pub(crate) struct FailingPreferences;

#[async_trait]
impl PreferenceStore for FailingPreferences {
    async fn user_preferences(&self) -> Result<UserPreferences, StoreError> {
        Err(store_down())
    }
}

/// Article store over a real database that fails while `failing` is set.
///
/// With `upserts_only`, reads and filter bookkeeping still reach the database.
pub(crate) struct FailingStore {
    inner: Database,
    upserts_only: bool,
    failing: AtomicBool,
}

impl FailingStore {
    /// Every call fails.
    pub(crate) fn broken(inner: Database) -> Self {
        Self {
            inner,
            upserts_only: false,
            failing: AtomicBool::new(true),
        }
    }

    /// Only `upsert_articles` fails.
    pub(crate) fn rejecting_upserts(inner: Database) -> Self {
        Self {
            inner,
            upserts_only: true,
            failing: AtomicBool::new(true),
        }
    }

    pub(crate) fn recover(&self) {
        self.failing.store(false, Ordering::SeqCst);
    }

    fn check(&self, is_upsert: bool) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) && (is_upsert || !self.upserts_only) {
            return Err(store_down());
        }
        Ok(())
    }
}

#[async_trait]
impl ArticleStore for FailingStore {
    async fn upsert_articles(&self, articles: &[Article]) -> Result<Vec<Article>, StoreError> {
        self.check(true)?;
        self.inner.upsert_articles(articles).await
    }

    async fn all_articles(&self) -> Result<Vec<Article>, StoreError> {
        self.check(false)?;
        self.inner.all_articles().await
    }

    async fn favorite_articles(&self) -> Result<Vec<Article>, StoreError> {
        self.check(false)?;
        self.inner.favorite_articles().await
    }

    async fn article_by_url(&self, url: &str) -> Result<Option<Article>, StoreError> {
        self.check(false)?;
        self.inner.article_by_url(url).await
    }

    async fn update_article(&self, article: &Article) -> Result<bool, StoreError> {
        self.check(false)?;
        self.inner.update_article(article).await
    }

    async fn headlines_filter(&self) -> Result<Option<String>, StoreError> {
        self.check(false)?;
        self.inner.headlines_filter().await
    }

    async fn set_headlines_filter(&self, filter: &str) -> Result<(), StoreError> {
        self.check(false)?;
        self.inner.set_headlines_filter(filter).await
    }
}
