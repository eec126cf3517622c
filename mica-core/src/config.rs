//! Cache configuration
//!
//! An explicit configuration object replaces the environment-variable
//! lookups of older deployments: the kill switch, the global default TTL,
//! and the per-tag TTL overrides are all plain fields passed at
//! construction. `from_env` remains available for processes that still
//! configure through the equivalent `MICA_TABLE_CACHE_*` keys.

use crate::error::{ConfigError, MicaResult};
use crate::tag::{is_real_table, sanitize_tag};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Global default TTL applied when no tag override matches: one day.
pub const DEFAULT_TTL_SECS: u64 = 86_400;

/// Kill switch, default TTL, and per-tag TTL overrides for the caching
/// proxy.
///
/// Override values are kept as raw strings: an override that does not parse
/// as a non-negative integer resolves to a TTL of 0 (immediate expiry),
/// never to the default. This keeps a misconfigured override visible as
/// "nothing gets cached for that table" instead of silently caching for a
/// day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Process-wide kill switch. When off, the read path never touches the
    /// cache; the write path still invalidates.
    pub enabled: bool,
    /// TTL in seconds for entries whose tags carry no override.
    pub default_ttl_secs: u64,
    /// Per-tag TTL overrides, keyed by tag name, raw string values.
    pub tag_ttl_overrides: HashMap<String, String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl_secs: DEFAULT_TTL_SECS,
            tag_ttl_overrides: HashMap::new(),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_default_ttl_secs(mut self, secs: u64) -> Self {
        self.default_ttl_secs = secs;
        self
    }

    /// Register a per-tag TTL override. The value is kept raw; resolution
    /// parses it on use.
    pub fn with_tag_ttl(mut self, tag: impl Into<String>, ttl: impl Into<String>) -> Self {
        self.tag_ttl_overrides.insert(tag.into(), ttl.into());
        self
    }

    /// Resolve the TTL for a tag set.
    ///
    /// Tags are checked in the order they were computed; the first tag with
    /// a configured override wins. An unparsable or negative override
    /// resolves to 0. With no override anywhere, the global default
    /// applies.
    pub fn ttl_for_tags(&self, tags: &[String]) -> u64 {
        for tag in tags {
            if let Some(raw) = self.tag_ttl_overrides.get(tag) {
                return raw.trim().parse::<u64>().unwrap_or(0);
            }
        }
        self.default_ttl_secs
    }

    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `MICA_TABLE_CACHE_SWITCH`: kill switch; `0`, `false`, `no`, `off`
    ///   (case-insensitive) disable caching (default: on)
    /// - `MICA_TABLE_CACHE_DURATION`: global default TTL in seconds
    ///   (default: 86400)
    /// - `MICA_TABLE_CACHE_DURATION_<tag>`: per-tag TTL override, one
    ///   variable per tag, value kept raw
    pub fn from_env() -> Self {
        let enabled = std::env::var("MICA_TABLE_CACHE_SWITCH")
            .map(|s| parse_switch(&s))
            .unwrap_or(true);

        let default_ttl_secs = std::env::var("MICA_TABLE_CACHE_DURATION")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(DEFAULT_TTL_SECS);

        let mut tag_ttl_overrides = HashMap::new();
        for (key, value) in std::env::vars() {
            if let Some(tag) = key.strip_prefix("MICA_TABLE_CACHE_DURATION_") {
                if !tag.is_empty() {
                    tag_ttl_overrides.insert(tag.to_string(), value);
                }
            }
        }

        Self {
            enabled,
            default_ttl_secs,
            tag_ttl_overrides,
        }
    }

    /// Validate the configuration.
    /// Returns Ok(()) if valid, Err(MicaError::Config) if invalid.
    ///
    /// Override keys must be usable as tags: non-empty, already sanitized,
    /// and not a temporary-table name.
    pub fn validate(&self) -> MicaResult<()> {
        for key in self.tag_ttl_overrides.keys() {
            if key.is_empty() || sanitize_tag(key) != *key || !is_real_table(key) {
                return Err(ConfigError::InvalidValue {
                    field: "tag_ttl_overrides".to_string(),
                    value: key.clone(),
                    reason: "override key must be a sanitized, non-temporary tag".to_string(),
                }
                .into());
            }
        }
        Ok(())
    }
}

fn parse_switch(raw: &str) -> bool {
    !matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

// =============================================================================
// TESTS
// =============================================================================
