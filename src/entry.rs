//! Cache entry envelope.
//!
//! The [`CacheEntry`] is the unit stored in both tiers. It wraps the cached
//! JSON payload with the timestamps that drive independent local and remote
//! expiration.

use std::sync::OnceLock;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Current time as epoch milliseconds.
pub(crate) fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Deadline `lifetime` after `start` in epoch millis. Saturates, so a huge
/// lifetime means "far future" rather than wrapping negative (which would
/// make the entry born expired).
fn saturating_deadline(start: i64, lifetime: Duration) -> i64 {
    let millis = i64::try_from(lifetime.as_millis()).unwrap_or(i64::MAX);
    start.saturating_add(millis)
}

/// A cached value plus the metadata both tiers need.
///
/// The invariant `local_expires_at <= expires_at` always holds: an entry may
/// be evicted from the local tier while still valid remotely, but never the
/// other way around. A remote hit after local expiry repopulates the local
/// tier with a fresh `local_expires_at`.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use hybrid_cache::CacheEntry;
/// use serde_json::json;
///
/// let entry = CacheEntry::new(
///     "product:1".into(),
///     json!({"id": 1, "name": "Widget"}),
///     Duration::from_secs(600),
///     Duration::from_secs(300),
/// );
///
/// assert_eq!(entry.key, "product:1");
/// assert!(entry.local_expires_at <= entry.expires_at);
/// assert!(entry.size_bytes() > 0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Caller-constructed cache key (e.g., "product:1"). Opaque to the
    /// engine; no normalization is performed.
    pub key: String,
    /// When the value was computed and stored (epoch millis)
    pub stored_at: i64,
    /// When the remote tier stops serving this entry (epoch millis)
    pub expires_at: i64,
    /// When the local tier stops serving this entry (epoch millis).
    /// Always `<=` `expires_at`.
    pub local_expires_at: i64,
    /// The cached payload
    pub content: Value,

    /// Cached serialized size in bytes (lazily computed, not serialized)
    #[serde(skip)]
    cached_size: OnceLock<usize>,
}

impl CacheEntry {
    /// Create an entry expiring `expiration` from now remotely and
    /// `local_expiration` from now locally. The local deadline is clamped to
    /// the remote one.
    pub fn new(
        key: String,
        content: Value,
        expiration: Duration,
        local_expiration: Duration,
    ) -> Self {
        let stored_at = now_millis();
        let expires_at = saturating_deadline(stored_at, expiration);
        let local_expires_at =
            saturating_deadline(stored_at, local_expiration).min(expires_at);
        Self {
            key,
            stored_at,
            expires_at,
            local_expires_at,
            content,
            cached_size: OnceLock::new(),
        }
    }

    /// Serialized size of the entry in bytes, computed once on first use.
    /// Used for the `max_payload_bytes` check and size metrics.
    pub fn size_bytes(&self) -> usize {
        *self.cached_size.get_or_init(|| {
            serde_json::to_vec(self).map(|v| v.len()).unwrap_or(0)
        })
    }

    /// Whether the remote deadline has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        now_millis() >= self.expires_at
    }

    /// Remaining remote lifetime, `None` once expired.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        let left = self.expires_at - now_millis();
        (left > 0).then(|| Duration::from_millis(left as u64))
    }

    /// Reset the local deadline for a repopulation after local-only expiry.
    ///
    /// The remote deadline is untouched; the new local deadline is
    /// `now + local_expiration`, clamped to the remote one. Returns the
    /// effective local TTL to hand to the local tier.
    pub fn refresh_local(&mut self, local_expiration: Duration) -> Duration {
        let now = now_millis();
        self.local_expires_at =
            saturating_deadline(now, local_expiration).min(self.expires_at);
        Duration::from_millis((self.local_expires_at - now).max(0) as u64)
    }

    /// Local TTL this entry carries relative to now.
    #[must_use]
    pub fn local_ttl(&self) -> Duration {
        Duration::from_millis((self.local_expires_at - now_millis()).max(0) as u64)
    }
}
