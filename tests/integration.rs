//! Integration Tests for Hybrid Cache
//!
//! This module contains all integration tests that require a real Redis.
//! Tests use testcontainers for portability - no external docker-compose required.
//!
//! # Running Tests
//! ```bash
//! # Run all integration tests (requires Docker)
//! cargo test --test integration -- --ignored
//!
//! # Run only happy-path tests
//! cargo test --test integration happy -- --ignored
//!
//! # Run only failure scenario tests
//! cargo test --test integration failure -- --ignored
//! ```
//!
//! # Test Organization
//! - `happy_*` - Normal operation: tier cascade, promotion, tag fan-out
//! - `failure_*` - Failure scenarios: Redis death mid-flight, degraded reads

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use serde_json::{json, Value};

use hybrid_cache::{CacheConfig, CacheEngine, WriteOptions, ENTRIES_UNKNOWN};

use testcontainers::{clients::Cli, Container, GenericImage, core::WaitFor};

// =============================================================================
// Container Helpers
// =============================================================================

/// Create a Redis container with health check
fn redis_container(docker: &Cli) -> Container<'_, GenericImage> {
    let image = GenericImage::new("redis", "7-alpine")
        .with_exposed_port(6379)
        .with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"));
    docker.run(image)
}

/// Each test gets its own key namespace so containers can be shared
fn test_config(redis_port: u16, prefix: &str) -> CacheConfig {
    CacheConfig {
        redis_url: Some(format!("redis://127.0.0.1:{}", redis_port)),
        redis_prefix: Some(format!("{}_{}:", prefix, uuid::Uuid::new_v4())),
        ..Default::default()
    }
}

async fn started_engine(redis_port: u16, prefix: &str) -> CacheEngine {
    let mut engine = CacheEngine::new(test_config(redis_port, prefix));
    engine.start().await.expect("failed to start engine");
    engine
}

// =============================================================================
// Happy Path Tests - Normal Operation
// =============================================================================

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_read_through_and_local_hit() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let engine = started_engine(redis.get_host_port_ipv4(6379), "readthrough").await;

    let calls = Arc::new(AtomicUsize::new(0));
    for _ in 0..5 {
        let calls = Arc::clone(&calls);
        let product: Value = engine
            .get_or_create("product:1", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(json!({"id": 1, "name": "Widget"}))
            })
            .await
            .expect("get_or_create failed");
        assert_eq!(product["name"], "Widget");
    }

    // First call populated both tiers; the rest were local hits
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(engine.local_stats().0, 1);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_remote_promotion_after_local_expiry() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let engine = started_engine(redis.get_host_port_ipv4(6379), "promotion").await;

    let calls = Arc::new(AtomicUsize::new(0));
    let options = WriteOptions::default()
        .with_expiration(Duration::from_secs(60))
        .with_local_expiration(Duration::from_millis(50));

    for _ in 0..2 {
        let calls = Arc::clone(&calls);
        let value: Value = engine
            .get_or_create_with("product:1", options, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(json!({"id": 1}))
            })
            .await
            .expect("get_or_create failed");
        assert_eq!(value["id"], 1);
        tokio::time::sleep(Duration::from_millis(80)).await;
    }

    // The second read missed locally but was served from Redis: no second
    // factory run, and the entry is back in the local tier.
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(engine.local_stats().0, 1);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_cross_instance_sharing() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let port = redis.get_host_port_ipv4(6379);

    let config = test_config(port, "shared");
    let mut writer = CacheEngine::new(config.clone());
    writer.start().await.expect("failed to start writer");
    let mut reader = CacheEngine::new(config);
    reader.start().await.expect("failed to start reader");

    writer
        .set("customer:7", &json!({"id": 7, "name": "Ada"}), &[])
        .await
        .expect("set failed");

    // The reader instance has an empty local tier but shares Redis
    let value: Value = reader
        .get_or_create("customer:7", || async {
            Err::<Value, _>("factory must not run".to_string())
        })
        .await
        .expect("get_or_create failed");
    assert_eq!(value["name"], "Ada");
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_tag_fanout_across_instances() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let port = redis.get_host_port_ipv4(6379);

    let config = test_config(port, "tags");
    let mut writer = CacheEngine::new(config.clone());
    writer.start().await.expect("failed to start writer");
    let mut admin = CacheEngine::new(config);
    admin.start().await.expect("failed to start admin");

    let tags = vec!["products".to_string()];
    writer.set("product:1", &json!({"id": 1}), &tags).await.unwrap();
    writer.set("product:2", &json!({"id": 2}), &tags).await.unwrap();
    writer.set("customer:1", &json!({"id": 9}), &[]).await.unwrap();

    // Purge through a different instance: the tag index lives in Redis
    let outcome = admin.purge_tag("products").await;
    assert!(outcome.is_success);
    assert_eq!(outcome.entries_affected, ENTRIES_UNKNOWN);

    // Tagged keys are gone from Redis; the untagged one survives
    let calls = Arc::new(AtomicUsize::new(0));
    for key in ["product:1", "product:2"] {
        let calls = Arc::clone(&calls);
        let _: Value = admin
            .get_or_create(key, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(json!({"recomputed": true}))
            })
            .await
            .unwrap();
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let untouched: Value = admin
        .get_or_create("customer:1", || async {
            Err::<Value, _>("must be cached".to_string())
        })
        .await
        .unwrap();
    assert_eq!(untouched["id"], 9);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_tag_sets_expire_with_their_members() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let port = redis.get_host_port_ipv4(6379);

    let config = test_config(port, "tagttl");
    let prefix = config.redis_prefix.clone().unwrap_or_default();
    let mut engine = CacheEngine::new(config);
    engine.start().await.expect("failed to start engine");

    engine
        .set_with(
            "product:1",
            &json!({"id": 1}),
            WriteOptions::default().with_expiration(Duration::from_secs(90)),
            &["products".into()],
        )
        .await
        .unwrap();

    let client = redis::Client::open(format!("redis://127.0.0.1:{}", port)).unwrap();
    let mut conn = client.get_multiplexed_async_connection().await.unwrap();
    let tag_set = format!("{}tag:products", prefix);

    // Associations must not outlive their entries indefinitely
    let ttl: i64 = redis::cmd("TTL").arg(&tag_set).query_async(&mut conn).await.unwrap();
    assert!(ttl > 0 && ttl <= 90, "tag set should carry its member's TTL, got {}", ttl);

    // A longer-lived member extends the set, never shortens it
    engine
        .set_with(
            "product:2",
            &json!({"id": 2}),
            WriteOptions::default().with_expiration(Duration::from_secs(600)),
            &["products".into()],
        )
        .await
        .unwrap();
    let ttl: i64 = redis::cmd("TTL").arg(&tag_set).query_async(&mut conn).await.unwrap();
    assert!(ttl > 90, "tag set TTL should extend for a longer-lived member, got {}", ttl);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_purge_key_removes_both_tiers() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let engine = started_engine(redis.get_host_port_ipv4(6379), "purge").await;

    engine.set("product:1", &json!({"id": 1}), &[]).await.unwrap();
    let outcome = engine.purge_key("product:1").await;
    assert!(outcome.is_success);
    assert_eq!(outcome.entries_affected, 1);

    // Gone from Redis too, so the factory has to run
    let calls = Arc::new(AtomicUsize::new(0));
    {
        let calls = Arc::clone(&calls);
        let _: Value = engine
            .get_or_create("product:1", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(json!({"id": 1}))
            })
            .await
            .unwrap();
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_remote_ttl_expires_server_side() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let engine = started_engine(redis.get_host_port_ipv4(6379), "ttl").await;

    let options = WriteOptions::default()
        .with_expiration(Duration::from_secs(1))
        .with_local_expiration(Duration::from_millis(100));
    engine
        .set_with("ephemeral", &json!({"v": 1}), options, &[])
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(1500)).await;

    // Both tiers have expired; only the factory can answer now
    let calls = Arc::new(AtomicUsize::new(0));
    {
        let calls = Arc::clone(&calls);
        let _: Value = engine
            .get_or_create("ephemeral", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(json!({"v": 2}))
            })
            .await
            .unwrap();
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// =============================================================================
// Failure Scenario Tests
// =============================================================================

#[tokio::test]
#[ignore] // Requires Docker
async fn failure_redis_death_degrades_to_factory() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let port = redis.get_host_port_ipv4(6379);
    let engine = started_engine(port, "death").await;

    engine.set("product:1", &json!({"id": 1}), &[]).await.unwrap();

    // Kill Redis out from under the engine
    drop(redis);
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Local tier still answers for the cached key
    let value: Value = engine
        .get_or_create("product:1", || async {
            Err::<Value, _>("must be served locally".to_string())
        })
        .await
        .expect("local tier should still serve");
    assert_eq!(value["id"], 1);

    // A cold key degrades to a factory run instead of an error
    let value: Value = engine
        .get_or_create("product:2", || async {
            Ok::<_, String>(json!({"id": 2, "uncached": true}))
        })
        .await
        .expect("read must degrade, not fail");
    assert_eq!(value["id"], 2);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn failure_redis_death_makes_tag_purge_report_failure() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let port = redis.get_host_port_ipv4(6379);
    let engine = started_engine(port, "tagdeath").await;

    engine
        .set("product:1", &json!({"id": 1}), &["products".into()])
        .await
        .unwrap();

    drop(redis);
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Tag resolution needs Redis, so the admin outcome reports the failure
    let outcome = engine.purge_tag("products").await;
    assert!(!outcome.is_success);

    // Key purges still succeed: the local tier is cleaned and the remote
    // removal is best-effort
    let outcome = engine.purge_key("product:1").await;
    assert!(outcome.is_success);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn failure_writes_dropped_while_redis_down() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let port = redis.get_host_port_ipv4(6379);
    let engine = started_engine(port, "dropwrites").await;

    drop(redis);
    tokio::time::sleep(Duration::from_millis(200)).await;

    // set() succeeds: the remote write is dropped, the local one lands
    engine.set("product:1", &json!({"id": 1}), &[]).await.unwrap();
    assert_eq!(engine.local_stats().0, 1);

    let value: Value = engine
        .get_or_create("product:1", || async {
            Err::<Value, _>("must be served locally".to_string())
        })
        .await
        .unwrap();
    assert_eq!(value["id"], 1);
}
