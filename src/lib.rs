//! newsdesk: a news client that caches headlines locally, tracks favorites,
//! and builds recommendations from stored preferences.
//!
//! - [`api`]: remote news source (NewsAPI-compatible HTTP client)
//! - [`storage`]: SQLite cache of articles plus the preferences table
//! - [`preferences`]: recommendation preferences with config fallbacks
//! - [`repository`]: cache/network policy and the favorite toggle
//! - [`app`]: presentation state holder driving the repository off-thread

pub mod api;
pub mod app;
pub mod config;
pub mod preferences;
pub mod repository;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_support;
