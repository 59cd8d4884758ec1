//! Configuration file parser for ~/.config/gleaner/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde but logged as warnings since they are
//! usually typos.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

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
// Configuration
// ============================================================================

const KNOWN_KEYS: [&str; 7] = [
    "database_path",
    "fetch_deadline_secs",
    "max_concurrent_fetches",
    "max_feed_bytes",
    "user_agent",
    "favicon_service",
    "persist_history",
];

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite file. `None` means `gleaner.db` next to the config file.
    pub database_path: Option<PathBuf>,

    /// Deadline for one whole aggregation pass, in seconds. Capped at a day.
    pub fetch_deadline_secs: u64,

    /// How many feeds are fetched at once.
    pub max_concurrent_fetches: usize,

    /// Per-response body cap in bytes.
    pub max_feed_bytes: usize,

    pub user_agent: String,

    /// Favicon URL prefix used when a feed declares no image.
    pub favicon_service: String,

    /// Whether `aggregate` writes its result back into history.
    pub persist_history: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            fetch_deadline_secs: 60,
            max_concurrent_fetches: 8,
            max_feed_bytes: 10 * 1024 * 1024,
            user_agent: concat!("gleaner/", env!("CARGO_PKG_VERSION")).to_string(),
            favicon_service: "https://www.google.com/s2/favicons?sz=16&domain=".to_string(),
            persist_history: true,
        }
    }
}

impl Config {
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// A missing or blank file gives the defaults. Files over 1 MiB are
    /// refused with [`ConfigError::TooLarge`]; unknown keys only warn.
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
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            deadline_secs = config.fetch_deadline_secs,
            "Loaded configuration"
        );
        Ok(config)
    }
}

// ============================================================================
// Tests
// ============================================================================
