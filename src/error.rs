//! Caller-facing error taxonomy.
//!
//! [`CacheError`] is `Clone` on purpose: a single factory failure is
//! broadcast to every caller coalesced on the same in-flight computation, so
//! the error crosses a channel. Sources are stringified rather than boxed to
//! keep that cheap.

use thiserror::Error;

/// Errors surfaced by the cache engine.
///
/// Only [`CacheError::Factory`] ever reaches a `get_or_create` caller: a
/// cache-layer malfunction degrades to "no caching occurred", never to a
/// failed request. The limit variants are returned from explicit `set`
/// calls and logged (not propagated) on the read path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The caller-supplied factory failed. Propagated to the original
    /// caller and every coalesced waiter; never written to either tier.
    #[error("factory failed: {0}")]
    Factory(String),

    /// Serialized payload exceeds `max_payload_bytes`. The value is still
    /// returned to the caller; the cache write is skipped.
    #[error("payload for '{key}' is {size} bytes (limit {limit})")]
    PayloadTooLarge {
        key: String,
        size: usize,
        limit: usize,
    },

    /// Key exceeds `max_key_length`. The operation proceeds uncached.
    #[error("key of {length} chars exceeds limit {limit}")]
    KeyTooLong { length: usize, limit: usize },

    /// A value failed to (de)serialize. Treated as a miss on the read path.
    #[error("codec error: {0}")]
    Codec(String),
}

impl CacheError {
    /// Wrap a factory failure, stringifying the source.
    pub fn factory(err: impl std::fmt::Display) -> Self {
        Self::Factory(err.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(err.to_string())
    }
}
