//! Cache engine coordinator.
//!
//! The [`CacheEngine`] is the orchestrating façade that ties together all
//! components:
//! - local in-memory tier with lazy TTL expiry and a periodic sweeper
//! - remote Redis tier with server-side TTL, behind retry and a circuit
//!   breaker
//! - tag index for group invalidation
//! - flight guard collapsing concurrent misses into one factory run
//!
//! # Read path
//!
//! ```text
//! get_or_create(key, factory)
//!   ├─ disabled?        → factory, no tier touched
//!   ├─ local hit        → return
//!   └─ miss             → FlightGuard (one flight per key)
//!        ├─ remote hit  → repopulate local, return
//!        └─ miss        → factory → write remote + local → broadcast
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use hybrid_cache::{CacheEngine, CacheConfig};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let config = CacheConfig {
//!     redis_url: Some("redis://localhost:6379".into()),
//!     ..Default::default()
//! };
//! let mut engine = CacheEngine::new(config);
//! engine.start().await.expect("start failed");
//!
//! let product = engine
//!     .get_or_create("product:1", || async {
//!         Ok::<_, String>(json!({"id": 1, "name": "Widget"}))
//!     })
//!     .await
//!     .unwrap();
//! # let _: serde_json::Value = product;
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::entry::CacheEntry;
use crate::error::CacheError;
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitConfig, CircuitError};
use crate::stampede::{FlightFuture, FlightGuard};
use crate::storage::memory::InMemoryStore;
use crate::storage::redis::RedisStore;
use crate::storage::traits::{CacheStore, StoreError};
use crate::tags::TagIndex;

/// Per-call overrides for entry lifetimes.
///
/// Unset fields fall back to [`CacheConfig`] defaults. The local lifetime
/// is always clamped so an entry never outlives its remote TTL locally.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// Remote-tier TTL override
    pub expiration: Option<Duration>,
    /// Local-tier TTL override
    pub local_expiration: Option<Duration>,
}

impl WriteOptions {
    #[must_use]
    pub fn with_expiration(mut self, expiration: Duration) -> Self {
        self.expiration = Some(expiration);
        self
    }

    #[must_use]
    pub fn with_local_expiration(mut self, local_expiration: Duration) -> Self {
        self.local_expiration = Some(local_expiration);
        self
    }
}

/// The cache engine - owns both tiers, the tag index and the flight guard.
///
/// Constructed once by the application's composition root and injected into
/// consumers; all mutable state lives inside the engine's owned fields.
pub struct CacheEngine {
    config: CacheConfig,

    /// Local in-process tier (owned by the engine)
    local: Arc<InMemoryStore>,

    /// Remote Redis tier - optional, attached by [`CacheEngine::start`]
    remote: Option<Arc<RedisStore>>,

    /// Tag → keys reverse index (remote-authoritative once started)
    tags: Arc<TagIndex>,

    /// In-flight computation registry
    flights: FlightGuard,

    /// Circuit breaker guarding every remote-tier call
    remote_circuit: Arc<CircuitBreaker>,

    /// Periodic local-tier sweeper
    sweeper: Option<JoinHandle<()>>,
}

impl CacheEngine {
    /// Create an engine from config. Until [`CacheEngine::start`] is called
    /// the engine runs local-tier-only with no sweeper, which is also the
    /// supported mode when no `redis_url` is configured.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            local: Arc::new(InMemoryStore::new()),
            remote: None,
            tags: Arc::new(TagIndex::new(None)),
            flights: FlightGuard::new(),
            remote_circuit: Arc::new(CircuitBreaker::new(
                "remote_tier",
                CircuitConfig::remote_tier(),
            )),
            sweeper: None,
        }
    }

    /// Connect the remote tier (if configured) and spawn the local sweeper.
    pub async fn start(&mut self) -> Result<(), StoreError> {
        if !self.config.enabled {
            info!("cache disabled by configuration; all reads go to the factory");
            return Ok(());
        }

        if let Some(ref url) = self.config.redis_url {
            let store =
                RedisStore::with_prefix(url, self.config.redis_prefix.as_deref()).await?;
            let store = Arc::new(store);
            self.tags = Arc::new(TagIndex::new(Some(Arc::clone(&store))));
            self.remote = Some(store);
            info!(prefix = ?self.config.redis_prefix, "remote tier connected");
        } else {
            info!("no redis_url configured; running local-tier-only");
        }

        if self.config.sweep_interval_secs > 0 {
            let local = Arc::clone(&self.local);
            let interval = Duration::from_secs(self.config.sweep_interval_secs);
            self.sweeper = Some(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    let removed = local.sweep();
                    if removed > 0 {
                        debug!(removed, "swept expired local entries");
                    }
                    crate::metrics::record_sweep(removed);
                    crate::metrics::set_local_entries(local.len());
                }
            }));
        }

        Ok(())
    }

    /// Stop the background sweeper. Tier contents are left as-is.
    pub fn shutdown(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }

    /// Whether a remote tier is attached.
    #[must_use]
    pub fn remote_configured(&self) -> bool {
        self.remote.is_some()
    }

    /// Current local-tier entry count and in-flight computation count.
    #[must_use]
    pub fn local_stats(&self) -> (usize, usize) {
        (self.local.len(), self.flights.in_flight())
    }

    /// Get the cached value for `key`, or compute it via `factory`.
    ///
    /// Uses the configured default lifetimes; see
    /// [`CacheEngine::get_or_create_with`] for per-call overrides.
    pub async fn get_or_create<T, F, Fut, E>(
        &self,
        key: &str,
        factory: F,
    ) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: std::fmt::Display,
    {
        self.get_or_create_with(key, WriteOptions::default(), factory)
            .await
    }

    /// Get the cached value for `key`, or compute it via `factory`, with
    /// per-call lifetime overrides.
    ///
    /// Concurrent calls for the same missing key run the factory exactly
    /// once; every caller receives the shared result, success or failure.
    /// A factory failure propagates to all of them and is never cached. A
    /// remote-tier failure is logged and degrades to a miss; the worst
    /// outcome of any internal fault is "no caching occurred".
    #[tracing::instrument(skip(self, options, factory), fields(tier))]
    pub async fn get_or_create_with<T, F, Fut, E>(
        &self,
        key: &str,
        options: WriteOptions,
        factory: F,
    ) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: std::fmt::Display,
    {
        // Hard branch, not a fallback: a disabled cache touches no tier at all
        if !self.config.enabled {
            tracing::Span::current().record("tier", "bypass");
            return match factory().await {
                Ok(value) => Ok(value),
                Err(e) => Err(CacheError::factory(e)),
            };
        }

        if key.len() > self.config.max_key_length {
            warn!(
                key_length = key.len(),
                limit = self.config.max_key_length,
                "key exceeds limit; serving uncached"
            );
            crate::metrics::record_rejected_write("key_too_long");
            return match factory().await {
                Ok(value) => Ok(value),
                Err(e) => Err(CacheError::factory(e)),
            };
        }

        // Timer covers the probe only; flight/factory time is not local latency
        let local_probe = {
            let _timer = crate::time_operation!("local", "get");
            self.local.get(key).await
        };
        if let Ok(Some(entry)) = local_probe {
            match serde_json::from_value::<T>(entry.content.clone()) {
                Ok(value) => {
                    tracing::Span::current().record("tier", "local");
                    debug!(key = %key, "local tier hit");
                    crate::metrics::record_hit("local");
                    return Ok(value);
                }
                Err(e) => {
                    // Cached shape no longer matches T; treat as a miss
                    warn!(key = %key, error = %e, "cached entry undecodable, evicting");
                    let _ = self.local.remove(key).await;
                }
            }
        }

        tracing::Span::current().record("tier", "flight");
        let expiration = options
            .expiration
            .unwrap_or_else(|| self.config.default_expiration());
        let local_expiration = options
            .local_expiration
            .unwrap_or_else(|| self.config.default_local_expiration());

        let local = Arc::clone(&self.local);
        let remote = self.remote.clone();
        let circuit = Arc::clone(&self.remote_circuit);
        let max_payload = self.config.max_payload_bytes;
        let owned_key = key.to_string();

        let compute = move || -> FlightFuture {
            Box::pin(async move {
                // Remote probe first: another instance may have computed this
                if let Some(ref remote) = remote {
                    match circuit.call(|| remote.get(&owned_key)).await {
                        Ok(Some(mut entry)) if !entry.is_expired() => {
                            debug!(key = %owned_key, "remote tier hit, repopulating local");
                            crate::metrics::record_hit("remote");
                            // Remote deadline stays; only the local one is fresh
                            let local_ttl = entry.refresh_local(local_expiration);
                            let _ = local.set(&entry, local_ttl).await;
                            return Ok(Arc::new(entry));
                        }
                        Ok(_) => {}
                        Err(CircuitError::Rejected) => {
                            crate::metrics::record_remote_error("get");
                        }
                        Err(CircuitError::Inner(e)) => {
                            warn!(key = %owned_key, error = %e, "remote get failed, treating as miss");
                            crate::metrics::record_remote_error("get");
                        }
                    }
                }

                crate::metrics::record_miss();
                let value = match factory().await {
                    Ok(value) => value,
                    Err(e) => {
                        crate::metrics::record_factory_run("error");
                        return Err(CacheError::factory(e));
                    }
                };
                crate::metrics::record_factory_run("success");

                let content = serde_json::to_value(&value)?;
                drop(value);
                let entry =
                    CacheEntry::new(owned_key.clone(), content, expiration, local_expiration);

                let size = entry.size_bytes();
                crate::metrics::record_payload_bytes(size);
                if size > max_payload {
                    warn!(
                        key = %owned_key,
                        size,
                        limit = max_payload,
                        "payload exceeds limit; returning uncached"
                    );
                    crate::metrics::record_rejected_write("payload_too_large");
                    return Ok(Arc::new(entry));
                }

                if let Some(ref remote) = remote {
                    if let Err(e) = circuit.call(|| remote.set(&entry, expiration)).await {
                        warn!(key = %owned_key, error = %e, "remote set dropped");
                        crate::metrics::record_remote_error("set");
                    }
                }
                let _ = local.set(&entry, entry.local_ttl()).await;

                Ok(Arc::new(entry))
            })
        };

        let entry = self.flights.execute(key, compute).await?;
        serde_json::from_value(entry.content.clone()).map_err(CacheError::from)
    }

    /// Unconditionally cache `value` under `key` and register it with the
    /// given tags. A complete no-op when the cache is disabled.
    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        tags: &[String],
    ) -> Result<(), CacheError> {
        self.set_with(key, value, WriteOptions::default(), tags).await
    }

    /// [`CacheEngine::set`] with per-call lifetime overrides.
    #[tracing::instrument(skip(self, value, options))]
    pub async fn set_with<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        options: WriteOptions,
        tags: &[String],
    ) -> Result<(), CacheError> {
        if !self.config.enabled {
            return Ok(());
        }

        if key.len() > self.config.max_key_length {
            crate::metrics::record_rejected_write("key_too_long");
            return Err(CacheError::KeyTooLong {
                length: key.len(),
                limit: self.config.max_key_length,
            });
        }

        let expiration = options
            .expiration
            .unwrap_or_else(|| self.config.default_expiration());
        let local_expiration = options
            .local_expiration
            .unwrap_or_else(|| self.config.default_local_expiration());

        let content = serde_json::to_value(value)?;
        let entry = CacheEntry::new(key.to_string(), content, expiration, local_expiration);

        let size = entry.size_bytes();
        crate::metrics::record_payload_bytes(size);
        if size > self.config.max_payload_bytes {
            crate::metrics::record_rejected_write("payload_too_large");
            return Err(CacheError::PayloadTooLarge {
                key: key.to_string(),
                size,
                limit: self.config.max_payload_bytes,
            });
        }

        if let Some(ref remote) = self.remote {
            if let Err(e) = self
                .remote_circuit
                .call(|| remote.set(&entry, expiration))
                .await
            {
                warn!(key = %key, error = %e, "remote set dropped");
                crate::metrics::record_remote_error("set");
            }
        }
        self.local
            .set(&entry, entry.local_ttl())
            .await
            .map_err(|e| CacheError::Codec(e.to_string()))?;

        for tag in tags {
            if let Err(e) = self.tags.associate(tag, key, expiration).await {
                warn!(tag = %tag, key = %key, error = %e, "tag association dropped");
            }
        }

        crate::metrics::record_operation("local", "set", "success");
        Ok(())
    }

    /// Remove `key` from both tiers. Idempotent: an absent key is not an
    /// error. Returns how many entries were affected (0 or 1).
    pub async fn remove(&self, key: &str) -> usize {
        self.remove_many(std::slice::from_ref(&key.to_string())).await
    }

    /// Remove a batch of keys from both tiers, returning how many existed
    /// in at least one tier.
    #[tracing::instrument(skip(self))]
    pub async fn remove_many(&self, keys: &[String]) -> usize {
        if !self.config.enabled || keys.is_empty() {
            return 0;
        }

        let local_removed = self.local.remove_all(keys).await.unwrap_or(0);

        let mut remote_removed = 0;
        if let Some(ref remote) = self.remote {
            match self.remote_circuit.call(|| remote.remove_all(keys)).await {
                Ok(count) => remote_removed = count,
                Err(e) => {
                    warn!(error = %e, "remote removal dropped");
                    crate::metrics::record_remote_error("remove");
                }
            }
        }

        // Keys leave every tag set they were in, so nothing dangles
        if let Err(e) = self.tags.dissociate_keys(keys).await {
            warn!(error = %e, "tag dissociation dropped");
        }

        let affected = local_removed.max(remote_removed) as usize;
        crate::metrics::record_invalidation("remove", affected);
        debug!(affected, "removal completed");
        affected
    }

    /// Remove every key currently associated with `tag`, then the tag
    /// itself. Success with zero matches is not an error.
    pub async fn remove_by_tag(&self, tag: &str) -> Result<(), StoreError> {
        self.remove_by_tags(std::slice::from_ref(&tag.to_string())).await
    }

    /// [`CacheEngine::remove_by_tag`] over the union of several tags.
    #[tracing::instrument(skip(self))]
    pub async fn remove_by_tags(&self, tags: &[String]) -> Result<(), StoreError> {
        if !self.config.enabled || tags.is_empty() {
            return Ok(());
        }

        let keys = self.tags.keys_for_tags(tags).await?;
        debug!(tags = tags.len(), keys = keys.len(), "tag fan-out resolved");

        if !keys.is_empty() {
            let local_removed = self.local.remove_all(&keys).await.unwrap_or(0);

            if let Some(ref remote) = self.remote {
                match self.remote_circuit.call(|| remote.remove_all(&keys)).await {
                    Ok(_) => {}
                    Err(CircuitError::Rejected) => {
                        return Err(StoreError::Backend("remote tier unavailable".into()))
                    }
                    Err(CircuitError::Inner(e)) => return Err(e),
                }
            }

            self.tags.dissociate_keys(&keys).await?;
            crate::metrics::record_invalidation("purge_tag", local_removed as usize);
        }

        for tag in tags {
            self.tags.remove_tag(tag).await?;
        }
        Ok(())
    }
}

impl Drop for CacheEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
