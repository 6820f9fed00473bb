// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic hybrid-cache usage example.
//!
//! Demonstrates:
//! 1. Connecting to Redis (remote tier)
//! 2. Read-through caching with get_or_create
//! 3. Stampede protection (10 concurrent callers, 1 factory run)
//! 4. Tag-based group invalidation
//! 5. Admin purge verbs
//! 6. Displaying metrics (OTEL-compatible)
//!
//! # Prerequisites
//!
//! A local Redis:
//! ```bash
//! docker run --rm -p 6379:6379 redis:7-alpine
//! ```
//!
//! # Run
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use hybrid_cache::{CacheConfig, CacheEngine, WriteOptions};
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install metrics recorder (captures all metrics for OTEL export)
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    // Simple logging (no filter for simplicity)
    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║           hybrid-cache: Basic Usage Example                   ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Configure and start the engine
    // ─────────────────────────────────────────────────────────────────────────
    println!("📦 Configuring hybrid-cache...");

    let config = CacheConfig {
        // Connect to a local Redis
        redis_url: Some("redis://localhost:6379".into()),
        // Namespace prefix for Redis keys (plays nice with other data)
        redis_prefix: Some("shop:".into()),
        // Short lifetimes so the demo shows expiry behaviour
        default_expiration_secs: 120,
        default_local_expiration_secs: 30,
        ..Default::default()
    };

    let mut engine = CacheEngine::new(config);

    println!("\n🚀 Starting engine (connecting to Redis)...");
    engine.start().await?;
    println!("   ✅ Engine ready! Remote tier: {}", engine.remote_configured());
    let engine = Arc::new(engine);

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Read-through caching (with timing)
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📖 Read-through with get_or_create...");
    println!("   ⏱️  First call runs the factory, the rest hit the local tier");

    for attempt in 1..=3 {
        let start = Instant::now();
        let product: Value = engine
            .get_or_create("product:42", || async {
                // Stand-in for a database query
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<_, String>(json!({"id": 42, "name": "Widget", "price_pence": 1299}))
            })
            .await?;
        println!(
            "   └─ attempt {}: {} ({:?})",
            attempt,
            product["name"],
            start.elapsed()
        );
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Stampede protection
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🛡️  Stampede protection: 10 concurrent misses, one factory run...");

    let factory_runs = Arc::new(AtomicUsize::new(0));
    let mut handles = vec![];
    for _ in 0..10 {
        let engine = Arc::clone(&engine);
        let factory_runs = Arc::clone(&factory_runs);
        handles.push(tokio::spawn(async move {
            engine
                .get_or_create::<Value, _, _, String>("catalogue:homepage", move || async move {
                    factory_runs.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok(json!({"banner": "Summer sale", "products": [42, 43, 44]}))
                })
                .await
        }));
    }
    for handle in handles {
        handle.await??;
    }
    println!(
        "   └─ factory ran {} time(s) for 10 callers",
        factory_runs.load(Ordering::SeqCst)
    );

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Tags and group invalidation
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🏷️  Tagging entries and purging by tag...");

    let product_tags = vec!["products".to_string()];
    let options = WriteOptions::default().with_expiration(Duration::from_secs(300));
    for id in [1, 2, 3] {
        engine
            .set_with(
                &format!("product:{id}"),
                &json!({"id": id, "name": format!("Product {id}")}),
                options,
                &product_tags,
            )
            .await?;
        println!("   └─ cached product:{id} [tag: products]");
    }

    let outcome = engine.purge_tag("products").await;
    println!(
        "   └─ purge_tag('products') → success: {}, entries: {}, message: {:?}",
        outcome.is_success, outcome.entries_affected, outcome.message
    );

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Admin purge verbs
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🧹 Admin purges...");

    engine.set("customer:7", &json!({"id": 7, "name": "Ada"}), &[]).await?;
    let outcome = engine.purge_key("customer:7").await;
    println!(
        "   └─ purge_key('customer:7') → success: {}, entries: {}",
        outcome.is_success, outcome.entries_affected
    );
    let outcome = engine.purge_key("customer:7").await;
    println!(
        "   └─ purge_key again (idempotent) → success: {}, entries: {}",
        outcome.is_success, outcome.entries_affected
    );

    let (local_entries, in_flight) = engine.local_stats();
    println!("\n📊 Local tier: {} entries, {} in-flight computations", local_entries, in_flight);

    // ─────────────────────────────────────────────────────────────────────────
    // 6. Dump raw metrics (OTEL-compatible)
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📈 Raw Metrics (OTEL export format):");
    dump_metrics(&snapshotter);

    println!("\n💡 Data remains in Redis - inspect with:");
    println!("   └─ redis-cli GET 'shop:product:42'");
    println!("   └─ redis-cli SMEMBERS 'shop:tag:products'");

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║                    Example complete!                          ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    Ok(())
}

/// Dump all captured metrics in OTEL-compatible format
fn dump_metrics(snapshotter: &Snapshotter) {
    let snapshot = snapshotter.snapshot();

    let mut counters: Vec<_> = vec![];
    let mut gauges: Vec<_> = vec![];
    let mut histograms: Vec<_> = vec![];

    for (composite_key, _, _, value) in snapshot.into_vec() {
        let (_kind, key) = composite_key.into_parts();
        let name = key.name();
        let labels: Vec<_> = key
            .labels()
            .map(|l| format!("{}={}", l.key(), l.value()))
            .collect();
        let label_str = if labels.is_empty() {
            String::new()
        } else {
            format!("{{{}}}", labels.join(","))
        };

        match value {
            DebugValue::Counter(v) => counters.push((name.to_string(), label_str, v)),
            DebugValue::Gauge(v) => gauges.push((name.to_string(), label_str, v.into_inner())),
            DebugValue::Histogram(samples) => {
                let count = samples.len();
                let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                let avg = if count > 0 { sum / count as f64 } else { 0.0 };
                histograms.push((name.to_string(), label_str, count, avg));
            }
        }
    }

    counters.sort_by(|a, b| a.0.cmp(&b.0));
    gauges.sort_by(|a, b| a.0.cmp(&b.0));
    histograms.sort_by(|a, b| a.0.cmp(&b.0));

    if !counters.is_empty() {
        println!("   ┌─ Counters (cumulative)");
        for (name, labels, value) in &counters {
            println!("   │  └─ {}{} = {}", name, labels, value);
        }
    }
    if !gauges.is_empty() {
        println!("   ├─ Gauges (current value)");
        for (name, labels, value) in &gauges {
            println!("   │  └─ {}{} = {:.2}", name, labels, value);
        }
    }
    if !histograms.is_empty() {
        println!("   └─ Histograms (count / avg)");
        for (name, labels, count, avg) in &histograms {
            println!("      └─ {}{} = {} samples, avg {:.6}", name, labels, count, avg);
        }
    }
}
