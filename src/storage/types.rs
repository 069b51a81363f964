use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Store-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another instance of the application has locked the database
    #[error("Another instance of newsdesk appears to be running. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl StoreError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_message(&err.to_string()) {
            return StoreError::InstanceLocked;
        }
        StoreError::Other(err)
    }
}

/// SQLITE_BUSY (5), SQLITE_LOCKED (6) and SQLITE_CANTOPEN (14) all surface as
/// lock contention for a single-user client.
pub(crate) fn is_lock_message(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
        || message.contains("unable to open database file")
}

// ============================================================================
// Data Structures
// ============================================================================

/// A news article as cached locally.
///
/// `url` is the identity key. Every other field is refreshed from the remote
/// source on re-fetch, except `is_favorite`, which only the user changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Article {
    pub url: String,
    pub title: String,
    pub description: String,
    pub image_url: String,
    #[serde(default)]
    pub is_favorite: bool,
}

impl Article {
    /// Article with only the identity and title set; the rest default to empty.
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            description: String::new(),
            image_url: String::new(),
            is_favorite: false,
        }
    }
}

/// Snapshot of the preferences used to build the recommendation query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPreferences {
    pub preferred_category: Option<String>,
    pub preferred_keywords: Option<String>,
}
