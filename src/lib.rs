//! # Hybrid Cache
//!
//! A hybrid two-tier cache coordination layer for read-heavy services.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       CacheEngine                           │
//! │  • get_or_create() / set() / remove() / remove_by_tag()    │
//! │  • Disabled mode bypasses every tier                       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Local Tier: In-Memory                       │
//! │  • DashMap for concurrent access                           │
//! │  • Lazy TTL expiry plus periodic sweeper                   │
//! │  • Local lifetime never exceeds the remote lifetime        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!              (miss → FlightGuard, one factory per key)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Remote Tier: Redis                          │
//! │  • Server-side TTL via SET EX                              │
//! │  • Tag sets for group invalidation                         │
//! │  • Retry + circuit breaker; failures degrade to a miss     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                     (miss → user factory)
//!                              ▼
//!                    Origin (database, upstream API)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hybrid_cache::{CacheEngine, CacheConfig};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = CacheConfig {
//!         redis_url: Some("redis://localhost:6379".into()),
//!         redis_prefix: Some("shop:".into()),
//!         ..Default::default()
//!     };
//!
//!     let mut engine = CacheEngine::new(config);
//!     engine.start().await.expect("failed to start");
//!
//!     // Read-through: the factory runs only on a miss, once per key
//!     // no matter how many callers arrive concurrently.
//!     let product: serde_json::Value = engine
//!         .get_or_create("product:42", || async {
//!             Ok::<_, String>(json!({"id": 42, "name": "Widget"}))
//!         })
//!         .await
//!         .expect("factory failed");
//!     println!("{product}");
//!
//!     // Group invalidation by tag
//!     engine.set("product:42", &product, &["products".into()]).await.ok();
//!     engine.remove_by_tag("products").await.ok();
//!
//!     engine.shutdown();
//! }
//! ```
//!
//! ## Features
//!
//! - **Two Tiers**: in-process map for speed, Redis for cross-instance reuse
//! - **Stampede Protection**: concurrent misses collapse into one factory run
//! - **Tag Invalidation**: purge whole groups of keys in one call
//! - **Availability First**: remote-tier failures degrade to a miss, never an error
//! - **Circuit Breaker**: fail fast while the remote tier is down
//! - **Admin Surface**: purge verbs with structured outcome payloads
//!
//! ## Configuration
//!
//! See [`CacheConfig`] for all configuration options.
//!
//! ## Modules
//!
//! - [`coordinator`]: The main [`CacheEngine`] orchestrating all components
//! - [`storage`]: Cache tiers (memory, Redis)
//! - [`stampede`]: In-flight computation registry
//! - [`tags`]: Tag → keys reverse index
//! - [`admin`]: Operator-facing invalidation verbs
//! - [`resilience`]: Circuit breaker and retry logic

pub mod admin;
pub mod config;
pub mod coordinator;
pub mod entry;
pub mod error;
pub mod metrics;
pub mod resilience;
pub mod stampede;
pub mod storage;
pub mod tags;

pub use admin::{InvalidationOutcome, ENTRIES_UNKNOWN};
pub use config::CacheConfig;
pub use coordinator::{CacheEngine, WriteOptions};
pub use entry::CacheEntry;
pub use error::CacheError;
pub use metrics::LatencyTimer;
pub use resilience::circuit_breaker::{CircuitBreaker, CircuitConfig, CircuitError};
pub use resilience::retry::RetryConfig;
pub use stampede::FlightGuard;
pub use storage::traits::{CacheStore, StoreError};
pub use tags::TagIndex;
