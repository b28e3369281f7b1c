//! Runtime configuration
//!
//! Every field has a default, so a config file only needs the keys it
//! changes.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::reorder::ReorderPolicy;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// What happens to the optimistic local state when a write fails
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteFailurePolicy {
    /// Leave the optimistic state in place and only report the failure
    KeepOptimistic,

    /// Restore the last known-good snapshot, then refetch canonical state
    #[default]
    Rollback,
}

/// How a push-triggered refetch is merged into local state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// The refetched snapshot replaces local state outright
    LastRefetchWins,

    /// Entities with a newer local write keep their local copy
    #[default]
    PendingWritesWin,
}

/// Connection settings for the hosted backend
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    /// Project URL, e.g. `https://abc.example.co`
    pub base_url: String,

    /// Public (anon) API key sent with every request
    pub api_key: String,

    /// How often the change watcher polls for remote edits
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    5_000
}

impl StoreConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("store.base_url is empty".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("store.poll_interval_ms must be positive".into()));
        }
        Ok(())
    }
}

/// Configuration for the menu builder and its store
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MenuboardConfig {
    /// Quiet period before a field edit is written
    pub coalesce_window_ms: u64,

    /// Which position writes a reorder emits
    pub reorder_policy: ReorderPolicy,

    pub on_write_failure: WriteFailurePolicy,

    /// Write pending field edits on shutdown instead of dropping them
    pub flush_on_teardown: bool,

    pub conflict_policy: ConflictPolicy,

    /// Capacity of the builder's event channel
    pub event_buffer: usize,

    pub store: Option<StoreConfig>,
}

impl Default for MenuboardConfig {
    fn default() -> Self {
        Self {
            coalesce_window_ms: 500,
            reorder_policy: ReorderPolicy::ChangedOnly,
            on_write_failure: WriteFailurePolicy::Rollback,
            flush_on_teardown: true,
            conflict_policy: ConflictPolicy::PendingWritesWin,
            event_buffer: 64,
            store: None,
        }
    }
}

impl MenuboardConfig {
    /// Load and validate a JSON config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.event_buffer == 0 {
            return Err(ConfigError::Invalid("event_buffer must be at least 1".into()));
        }
        if let Some(store) = &self.store {
            store.validate()?;
        }
        Ok(())
    }

    pub fn coalesce_window(&self) -> Duration {
        Duration::from_millis(self.coalesce_window_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = MenuboardConfig::default();
        assert_eq!(config.coalesce_window(), Duration::from_millis(500));
        assert_eq!(config.reorder_policy, ReorderPolicy::ChangedOnly);
        assert_eq!(config.on_write_failure, WriteFailurePolicy::Rollback);
        assert!(config.flush_on_teardown);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "coalesce_window_ms": 250,
                "reorder_policy": "full_rewrite",
                "on_write_failure": "keep_optimistic",
                "store": {{ "base_url": "https://menu.example.co", "api_key": "anon" }}
            }}"#
        )
        .unwrap();

        let config = MenuboardConfig::from_file(file.path()).unwrap();
        assert_eq!(config.coalesce_window_ms, 250);
        assert_eq!(config.reorder_policy, ReorderPolicy::FullRewrite);
        assert_eq!(config.on_write_failure, WriteFailurePolicy::KeepOptimistic);
        assert_eq!(config.conflict_policy, ConflictPolicy::PendingWritesWin);
        assert!(config.flush_on_teardown);

        let store = config.store.unwrap();
        assert_eq!(store.poll_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_from_file_rejects_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "event_buffer": 0 }}"#).unwrap();
        assert!(matches!(
            MenuboardConfig::from_file(file.path()),
            Err(ConfigError::Invalid(_))
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            MenuboardConfig::from_file(file.path()),
            Err(ConfigError::ParseError(_))
        ));

        assert!(matches!(
            MenuboardConfig::from_file("/nonexistent/menuboard.json"),
            Err(ConfigError::IoError(_))
        ));
    }

    #[test]
    fn test_store_config_rejects_zero_poll_interval() {
        let store = StoreConfig {
            base_url: "https://menu.example.co".into(),
            api_key: "anon".into(),
            poll_interval_ms: 0,
        };
        assert!(matches!(store.validate(), Err(ConfigError::Invalid(_))));

        let config = MenuboardConfig { store: Some(store), ..MenuboardConfig::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
