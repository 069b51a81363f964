//! Configuration file parser for ~/.config/newsdesk/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are accepted but logged as a warning, since they are usually
//! typos.
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::api::DEFAULT_COUNTRY;
use crate::repository::CachePolicy;

/// Environment variable that overrides `api_key` from the config file.
pub const API_KEY_ENV: &str = "NEWS_API_KEY";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Struct
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// The Debug impl masks `api_key`.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// News API key. `NEWS_API_KEY` takes precedence.
    pub api_key: Option<String>,

    /// Base URL of the news API (defaults to NewsAPI v2).
    pub base_url: Option<String>,

    /// Default country for headlines and recommendations.
    pub country: String,

    /// Per-request timeout for the news API, in seconds.
    pub request_timeout_secs: u64,

    /// When headlines may be answered from the local cache.
    pub headlines_cache: CachePolicy,

    /// Recommendation category used until one is stored in the database.
    pub preferred_category: Option<String>,

    /// Recommendation keywords used until some are stored in the database.
    pub preferred_keywords: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            country: DEFAULT_COUNTRY.to_string(),
            request_timeout_secs: 20,
            headlines_cache: CachePolicy::CacheFirst,
            preferred_category: None,
            preferred_keywords: None,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("country", &self.country)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("headlines_cache", &self.headlines_cache)
            .field("preferred_category", &self.preferred_category)
            .field("preferred_keywords", &self.preferred_keywords)
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 7] = [
        "api_key",
        "base_url",
        "country",
        "request_timeout_secs",
        "headlines_cache",
        "preferred_category",
        "preferred_keywords",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            country = %config.country,
            headlines_cache = ?config.headlines_cache,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// API key from `NEWS_API_KEY`, falling back to the config file.
    pub fn resolve_api_key(&self) -> Option<String> {
        Self::pick_api_key(std::env::var(API_KEY_ENV).ok(), self.api_key.clone())
    }

    fn pick_api_key(env: Option<String>, file: Option<String>) -> Option<String> {
        env.filter(|k| !k.trim().is_empty())
            .or(file.filter(|k| !k.trim().is_empty()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

// ============================================================================
// Tests
// ============================================================================
