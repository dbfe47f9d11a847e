//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into core services as an
//! `Arc<SyncConfig>`. Core services never read process-wide environment variables themselves;
//! the `*_from_env_value` helpers below only parse values the binary has already read.

use crate::constants::{
    DEFAULT_ARCHIVE_TAG_SYSTEM, DEFAULT_HISTORY_CAPACITY, DEFAULT_INTER_ITEM_DELAY_MS,
    DEFAULT_MAX_BATCH_SIZE,
};
use crate::{SyncError, SyncResult};
use serde::Deserialize;
use std::time::Duration;

/// Core configuration resolved at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncConfig {
    max_batch_size: usize,
    inter_item_delay: Duration,
    history_capacity: usize,
    archive_tag_system: String,
}

impl SyncConfig {
    /// Create a new `SyncConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if `max_batch_size` or `history_capacity` is zero, or if
    /// `archive_tag_system` is blank.
    pub fn new(
        max_batch_size: usize,
        inter_item_delay: Duration,
        history_capacity: usize,
        archive_tag_system: String,
    ) -> SyncResult<Self> {
        if max_batch_size == 0 {
            return Err(SyncError::Config(
                "max_batch_size must be at least 1".into(),
            ));
        }
        if history_capacity == 0 {
            return Err(SyncError::Config(
                "history_capacity must be at least 1".into(),
            ));
        }
        let archive_tag_system = archive_tag_system.trim().to_string();
        if archive_tag_system.is_empty() {
            return Err(SyncError::Config(
                "archive_tag_system cannot be empty".into(),
            ));
        }

        Ok(Self {
            max_batch_size,
            inter_item_delay,
            history_capacity,
            archive_tag_system,
        })
    }

    /// Parse a YAML config file body. Keys that are absent keep their defaults.
    ///
    /// Recognised keys: `max_batch_size`, `inter_item_delay_ms`, `history_capacity`,
    /// `archive_tag_system`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::YamlDeserialization`] for malformed YAML or unknown keys, and
    /// [`SyncError::Config`] if the resulting values are invalid.
    pub fn from_yaml_str(yaml_text: &str) -> SyncResult<Self> {
        let file: ConfigFile = if yaml_text.trim().is_empty() {
            ConfigFile::default()
        } else {
            serde_yaml::from_str(yaml_text).map_err(SyncError::YamlDeserialization)?
        };
        let defaults = Self::default();

        Self::new(
            file.max_batch_size.unwrap_or(defaults.max_batch_size),
            file.inter_item_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.inter_item_delay),
            file.history_capacity.unwrap_or(defaults.history_capacity),
            file.archive_tag_system
                .unwrap_or(defaults.archive_tag_system),
        )
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    pub fn inter_item_delay(&self) -> Duration {
        self.inter_item_delay
    }

    pub fn history_capacity(&self) -> usize {
        self.history_capacity
    }

    pub fn archive_tag_system(&self) -> &str {
        &self.archive_tag_system
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            inter_item_delay: Duration::from_millis(DEFAULT_INTER_ITEM_DELAY_MS),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            archive_tag_system: DEFAULT_ARCHIVE_TAG_SYSTEM.to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    max_batch_size: Option<usize>,
    #[serde(default)]
    inter_item_delay_ms: Option<u64>,
    #[serde(default)]
    history_capacity: Option<usize>,
    #[serde(default)]
    archive_tag_system: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_number<T: std::str::FromStr>(name: &str, value: Option<String>) -> SyncResult<Option<T>> {
    non_blank(value)
        .map(|v| {
            v.parse::<T>()
                .map_err(|_| SyncError::Config(format!("{name} must be a whole number, got {v:?}")))
        })
        .transpose()
}

/// Parse the maximum batch size from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns `fallback`.
pub fn max_batch_size_from_env_value(value: Option<String>, fallback: usize) -> SyncResult<usize> {
    Ok(parse_number("max_batch_size", value)?.unwrap_or(fallback))
}

/// Parse the inter-item delay (milliseconds) from an optional string value.
pub fn inter_item_delay_from_env_value(
    value: Option<String>,
    fallback: Duration,
) -> SyncResult<Duration> {
    Ok(parse_number::<u64>("inter_item_delay_ms", value)?
        .map(Duration::from_millis)
        .unwrap_or(fallback))
}

/// Parse the history capacity from an optional string value.
pub fn history_capacity_from_env_value(
    value: Option<String>,
    fallback: usize,
) -> SyncResult<usize> {
    Ok(parse_number("history_capacity", value)?.unwrap_or(fallback))
}

/// Resolve the archive tag system from an optional string value.
pub fn archive_tag_system_from_env_value(value: Option<String>, fallback: &str) -> String {
    non_blank(value).unwrap_or_else(|| fallback.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = SyncConfig::default();
        assert_eq!(cfg.max_batch_size(), 100);
        assert_eq!(cfg.inter_item_delay(), Duration::from_millis(100));
        assert_eq!(cfg.history_capacity(), 50);
        assert_eq!(cfg.archive_tag_system(), "urn:clinsync:audit");
    }

    #[test]
    fn new_rejects_zero_limits_and_blank_system() {
        assert!(matches!(
            SyncConfig::new(0, Duration::ZERO, 5, "urn:x".into()),
            Err(SyncError::Config(_))
        ));
        assert!(matches!(
            SyncConfig::new(5, Duration::ZERO, 0, "urn:x".into()),
            Err(SyncError::Config(_))
        ));
        assert!(matches!(
            SyncConfig::new(5, Duration::ZERO, 5, "  ".into()),
            Err(SyncError::Config(_))
        ));
    }

    #[test]
    fn yaml_overrides_only_given_keys() {
        let cfg = SyncConfig::from_yaml_str("max_batch_size: 2\ninter_item_delay_ms: 0\n")
            .expect("parse config");
        assert_eq!(cfg.max_batch_size(), 2);
        assert_eq!(cfg.inter_item_delay(), Duration::ZERO);
        assert_eq!(cfg.history_capacity(), 50);

        assert_eq!(SyncConfig::from_yaml_str("").expect("empty"), SyncConfig::default());
    }

    #[test]
    fn yaml_rejects_unknown_keys() {
        assert!(matches!(
            SyncConfig::from_yaml_str("max_batch: 2"),
            Err(SyncError::YamlDeserialization(_))
        ));
    }

    #[test]
    fn env_values_fall_back_when_blank() {
        assert_eq!(max_batch_size_from_env_value(None, 7).expect("none"), 7);
        assert_eq!(max_batch_size_from_env_value(Some(" ".into()), 7).expect("blank"), 7);
        assert_eq!(max_batch_size_from_env_value(Some("12".into()), 7).expect("set"), 12);
        assert!(history_capacity_from_env_value(Some("lots".into()), 1).is_err());
        assert_eq!(
            inter_item_delay_from_env_value(Some("250".into()), Duration::ZERO).expect("delay"),
            Duration::from_millis(250)
        );
        assert_eq!(
            archive_tag_system_from_env_value(None, "urn:fallback"),
            "urn:fallback"
        );
    }
}
