//! Recommendation preferences: config.toml defaults with DB overrides.
//!
//! Config values serve as defaults; rows in the `user_preferences` table
//! override them. Writes always go to the DB, never to the config file. A
//! stored empty string means the user explicitly cleared the value.
use async_trait::async_trait;

use crate::config::Config;
use crate::storage::{Database, PreferenceStore, StoreError, UserPreferences};

const CATEGORY_KEY: &str = "recommend.category";
const KEYWORDS_KEY: &str = "recommend.keywords";

// ============================================================================
// PreferenceManager
// ============================================================================

/// Preference store backed by the database, with config fallbacks.
///
/// Reads go to the DB every time, so a `set_*` is visible to the next
/// recommendation request without reloading.
#[derive(Clone)]
pub struct PreferenceManager {
    db: Database,
    defaults: UserPreferences,
}

impl PreferenceManager {
    pub fn new(config: &Config, db: Database) -> Self {
        Self {
            db,
            defaults: UserPreferences {
                preferred_category: normalize(config.preferred_category.clone()),
                preferred_keywords: normalize(config.preferred_keywords.clone()),
            },
        }
    }

    /// Store the preferred category; `None` clears it (overriding any config default).
    pub async fn set_category(&self, category: Option<&str>) -> Result<(), StoreError> {
        self.db
            .set_preference(CATEGORY_KEY, category.map(str::trim).unwrap_or(""))
            .await
    }

    /// Store the preferred keywords; `None` clears them (overriding any config default).
    pub async fn set_keywords(&self, keywords: Option<&str>) -> Result<(), StoreError> {
        self.db
            .set_preference(KEYWORDS_KEY, keywords.map(str::trim).unwrap_or(""))
            .await
    }

    /// Drop stored overrides so the config defaults apply again.
    pub async fn reset(&self) -> Result<(), StoreError> {
        self.db.delete_preference(CATEGORY_KEY).await?;
        self.db.delete_preference(KEYWORDS_KEY).await?;
        Ok(())
    }

    async fn resolve(&self, key: &str, default: &Option<String>) -> Result<Option<String>, StoreError> {
        Ok(match self.db.get_preference(key).await? {
            Some(stored) => normalize(Some(stored)),
            None => default.clone(),
        })
    }
}

#[async_trait]
impl PreferenceStore for PreferenceManager {
    async fn user_preferences(&self) -> Result<UserPreferences, StoreError> {
        Ok(UserPreferences {
            preferred_category: self
                .resolve(CATEGORY_KEY, &self.defaults.preferred_category)
                .await?,
            preferred_keywords: self
                .resolve(KEYWORDS_KEY, &self.defaults.preferred_keywords)
                .await?,
        })
    }
}

fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ============================================================================
// Tests
// ============================================================================
