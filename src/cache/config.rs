//! Response cache configuration.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_RESPONSE_TTL_SECONDS: u64 = 20;
const DEFAULT_MAX_ENTRIES: usize = 200;

/// Cache configuration from the `[cache]` settings section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the response cache for the global feed.
    pub enabled: bool,
    /// Seconds a stored response may be served before it is recomputed.
    pub response_ttl_seconds: u64,
    /// Maximum number of stored responses.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            response_ttl_seconds: DEFAULT_RESPONSE_TTL_SECONDS,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            response_ttl_seconds: settings.response_ttl_seconds,
            max_entries: settings.max_entries,
        }
    }
}

impl CacheConfig {
    pub fn response_ttl(&self) -> Duration {
        Duration::from_secs(self.response_ttl_seconds)
    }

    /// Returns the entry limit as NonZeroUsize, clamping to 1 if zero.
    pub fn max_entries_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_entries).unwrap_or(NonZeroUsize::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.response_ttl(), Duration::from_secs(20));
        assert_eq!(config.max_entries, 200);
    }

    #[test]
    fn zero_entry_limit_clamps_to_one() {
        let config = CacheConfig {
            max_entries: 0,
            ..Default::default()
        };
        assert_eq!(config.max_entries_non_zero().get(), 1);
    }

    #[test]
    fn deserialize_partial_section_keeps_defaults() {
        let config: CacheConfig =
            serde_json::from_str(r#"{"response_ttl_seconds": 5}"#).expect("valid json");
        assert!(config.enabled);
        assert_eq!(config.response_ttl_seconds, 5);
        assert_eq!(config.max_entries, 200);
    }
}
