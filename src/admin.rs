//! Administrative invalidation surface.
//!
//! Thin verbs intended to back operator-facing DELETE endpoints. Unlike the
//! [`CacheEngine`](crate::CacheEngine) read/write path, these report an
//! explicit [`InvalidationOutcome`] instead of a `Result`: an operator wants
//! a payload either way, including when the remote tier is unreachable.
//!
//! Key purges count the entries they touched. Tag purges report
//! [`ENTRIES_UNKNOWN`]: the fan-out crosses tiers and instances, so a
//! per-entry count would be misleading rather than informative.

use serde::Serialize;
use tracing::warn;

use crate::coordinator::CacheEngine;

/// Sentinel for operations whose affected-entry count is not tracked.
pub const ENTRIES_UNKNOWN: i64 = -1;

/// Result payload for an administrative invalidation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidationOutcome {
    pub is_success: bool,
    pub entries_affected: i64,
    pub message: String,
}

impl InvalidationOutcome {
    fn success(entries_affected: i64, message: impl Into<String>) -> Self {
        Self {
            is_success: true,
            entries_affected,
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            is_success: false,
            entries_affected: 0,
            message: message.into(),
        }
    }
}

impl CacheEngine {
    /// Purge a single key from both tiers.
    ///
    /// Always succeeds; purging an absent key reports zero entries.
    pub async fn purge_key(&self, key: &str) -> InvalidationOutcome {
        let affected = self.remove(key).await;
        InvalidationOutcome::success(
            affected as i64,
            format!("cache key '{key}' invalidated"),
        )
    }

    /// Purge a batch of keys from both tiers.
    pub async fn purge_keys(&self, keys: &[String]) -> InvalidationOutcome {
        if keys.is_empty() {
            return InvalidationOutcome::failure("no cache keys provided");
        }
        let affected = self.remove_many(keys).await;
        InvalidationOutcome::success(
            affected as i64,
            format!("{} cache key(s) invalidated", keys.len()),
        )
    }

    /// Purge every key associated with `tag`.
    ///
    /// Reports [`ENTRIES_UNKNOWN`] on success; a remote-tier failure while
    /// resolving the tag turns into `is_success: false`.
    pub async fn purge_tag(&self, tag: &str) -> InvalidationOutcome {
        match self.remove_by_tag(tag).await {
            Ok(()) => InvalidationOutcome::success(
                ENTRIES_UNKNOWN,
                format!("cache tag '{tag}' invalidated"),
            ),
            Err(e) => {
                warn!(tag = %tag, error = %e, "tag purge failed");
                InvalidationOutcome::failure(format!("failed to invalidate tag '{tag}': {e}"))
            }
        }
    }

    /// Purge every key associated with any of the given tags.
    pub async fn purge_tags(&self, tags: &[String]) -> InvalidationOutcome {
        if tags.is_empty() {
            return InvalidationOutcome::failure("no cache tags provided");
        }
        match self.remove_by_tags(tags).await {
            Ok(()) => InvalidationOutcome::success(
                ENTRIES_UNKNOWN,
                format!("{} cache tag(s) invalidated", tags.len()),
            ),
            Err(e) => {
                warn!(error = %e, "tag purge failed");
                InvalidationOutcome::failure(format!("failed to invalidate tags: {e}"))
            }
        }
    }
}
