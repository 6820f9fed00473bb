//! Configuration for the cache engine.
//!
//! # Example
//!
//! ```
//! use hybrid_cache::CacheConfig;
//!
//! // Minimal config (uses defaults)
//! let config = CacheConfig::default();
//! assert!(config.enabled);
//! assert_eq!(config.default_expiration_secs, 600);
//!
//! // Full config
//! let config = CacheConfig {
//!     redis_url: Some("redis://localhost:6379".into()),
//!     redis_prefix: Some("shop:".into()),
//!     default_expiration_secs: 1800,
//!     default_local_expiration_secs: 300,
//!     ..Default::default()
//! };
//! ```

use std::time::Duration;
use serde::Deserialize;

/// Configuration for the cache engine.
///
/// All fields have sensible defaults. Read once at startup by the embedding
/// application; there is no hot-reload. For production use you should
/// configure `redis_url` so invalidations are visible across instances.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Master toggle. When `false` every read calls the factory directly and
    /// every write/removal is a no-op; neither tier is touched.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Redis connection string (e.g., "redis://localhost:6379").
    /// `None` means local-tier-only operation.
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Optional key prefix for namespacing when sharing a Redis instance
    /// (e.g., "shop:" → "shop:product:1")
    #[serde(default)]
    pub redis_prefix: Option<String>,

    /// Remote-tier TTL in seconds applied when a call does not override it
    /// (default: 600)
    #[serde(default = "default_expiration_secs")]
    pub default_expiration_secs: u64,

    /// Local-tier TTL in seconds applied when a call does not override it
    /// (default: 300). An entry never outlives its remote TTL locally.
    #[serde(default = "default_local_expiration_secs")]
    pub default_local_expiration_secs: u64,

    /// Largest serialized payload accepted for caching, in bytes
    /// (default: 1 MB). Oversized values are still returned to the caller,
    /// just never written to either tier.
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,

    /// Longest cache key accepted (default: 512). Overlong keys bypass the
    /// cache the same way oversized payloads do.
    #[serde(default = "default_max_key_length")]
    pub max_key_length: usize,

    /// How often the local tier sweeps expired entries, in seconds
    /// (default: 60; 0 disables the sweeper and expiry happens on read only)
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_enabled() -> bool { true }
fn default_expiration_secs() -> u64 { 600 }
fn default_local_expiration_secs() -> u64 { 300 }
fn default_max_payload_bytes() -> usize { 1024 * 1024 } // 1 MB
fn default_max_key_length() -> usize { 512 }
fn default_sweep_interval_secs() -> u64 { 60 }

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            redis_url: None,
            redis_prefix: None,
            default_expiration_secs: default_expiration_secs(),
            default_local_expiration_secs: default_local_expiration_secs(),
            max_payload_bytes: default_max_payload_bytes(),
            max_key_length: default_max_key_length(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl CacheConfig {
    /// Default remote-tier TTL as a [`Duration`].
    #[must_use]
    pub fn default_expiration(&self) -> Duration {
        Duration::from_secs(self.default_expiration_secs)
    }

    /// Default local-tier TTL as a [`Duration`].
    #[must_use]
    pub fn default_local_expiration(&self) -> Duration {
        Duration::from_secs(self.default_local_expiration_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert!(config.redis_url.is_none());
        assert_eq!(config.default_expiration_secs, 600);
        assert_eq!(config.default_local_expiration_secs, 300);
        assert_eq!(config.max_payload_bytes, 1024 * 1024);
        assert_eq!(config.max_key_length, 512);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: CacheConfig = serde_json::from_str(
            r#"{"enabled": false, "redis_url": "redis://cache:6379"}"#,
        )
        .unwrap();
        assert!(!config.enabled);
        assert_eq!(config.redis_url.as_deref(), Some("redis://cache:6379"));
        // Unspecified fields fall back to defaults
        assert_eq!(config.max_key_length, 512);
    }

    #[test]
    fn test_duration_helpers() {
        let config = CacheConfig {
            default_expiration_secs: 10,
            default_local_expiration_secs: 5,
            ..Default::default()
        };
        assert_eq!(config.default_expiration(), Duration::from_secs(10));
        assert_eq!(config.default_local_expiration(), Duration::from_secs(5));
    }
}
