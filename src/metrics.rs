// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for hybrid-cache.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The embedding application is responsible for choosing the exporter
//! (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `hybrid_cache_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//! - `_bytes` suffix for size histograms
//!
//! # Labels
//! - `tier`: local, remote, factory
//! - `operation`: get, set, remove, purge_tag
//! - `status`: hit, miss, success, error, rejected

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record a cache operation outcome
pub fn record_operation(tier: &str, operation: &str, status: &str) {
    counter!(
        "hybrid_cache_operations_total",
        "tier" => tier.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a hit on a tier
pub fn record_hit(tier: &str) {
    counter!(
        "hybrid_cache_hits_total",
        "tier" => tier.to_string()
    )
    .increment(1);
}

/// Record a full miss (neither tier had the key)
pub fn record_miss() {
    counter!("hybrid_cache_misses_total").increment(1);
}

/// Record a factory execution (one per miss episode)
pub fn record_factory_run(status: &str) {
    counter!(
        "hybrid_cache_factory_runs_total",
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a caller that attached to an existing in-flight computation
/// instead of running the factory itself
pub fn record_coalesced_waiter() {
    counter!("hybrid_cache_coalesced_waiters_total").increment(1);
}

/// Record operation latency
pub fn record_latency(tier: &str, operation: &str, duration: Duration) {
    histogram!(
        "hybrid_cache_operation_seconds",
        "tier" => tier.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a cache write skipped because of a config limit
/// (`payload_too_large` or `key_too_long`)
pub fn record_rejected_write(reason: &str) {
    counter!(
        "hybrid_cache_rejected_writes_total",
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Record a remote-tier error that was degraded to a miss or dropped write
pub fn record_remote_error(operation: &str) {
    counter!(
        "hybrid_cache_remote_errors_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Set current local-tier entry count
pub fn set_local_entries(count: usize) {
    gauge!("hybrid_cache_local_entries").set(count as f64);
}

/// Record a local-tier sweep
pub fn record_sweep(removed: usize) {
    counter!("hybrid_cache_swept_entries_total").increment(removed as u64);
}

/// Record entry payload size
pub fn record_payload_bytes(bytes: usize) {
    histogram!("hybrid_cache_payload_bytes").record(bytes as f64);
}

/// Record keys removed by an invalidation (explicit or tag fan-out)
pub fn record_invalidation(operation: &str, keys: usize) {
    counter!(
        "hybrid_cache_invalidated_keys_total",
        "operation" => operation.to_string()
    )
    .increment(keys as u64);
}

/// Record circuit breaker call
pub fn record_circuit_breaker_call(circuit: &str, outcome: &str) {
    counter!(
        "hybrid_cache_circuit_breaker_calls_total",
        "circuit" => circuit.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// RAII timer that records operation latency when dropped
pub struct LatencyTimer {
    tier: &'static str,
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(tier: &'static str, operation: &'static str) -> Self {
        Self {
            tier,
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.tier, self.operation, self.start.elapsed());
    }
}

/// Convenience macro for timing operations
#[macro_export]
macro_rules! time_operation {
    ($tier:expr, $op:expr) => {
        $crate::metrics::LatencyTimer::new($tier, $op)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    // These tests verify the API compiles and doesn't panic.
    // In production, you'd use metrics-util's Recorder for assertions.

    #[test]
    fn test_record_operation() {
        record_operation("local", "get", "hit");
        record_operation("remote", "set", "error");
        record_operation("factory", "get", "success");
    }

    #[test]
    fn test_record_latency() {
        record_latency("local", "get", Duration::from_micros(100));
        record_latency("remote", "set", Duration::from_millis(5));
    }

    #[test]
    fn test_counters_and_gauges() {
        record_hit("local");
        record_miss();
        record_factory_run("success");
        record_coalesced_waiter();
        record_rejected_write("payload_too_large");
        record_remote_error("get");
        record_invalidation("purge_tag", 3);
        set_local_entries(42);
        record_sweep(7);
        record_payload_bytes(2048);
    }

    #[test]
    fn test_latency_timer_drops_cleanly() {
        let timer = LatencyTimer::new("local", "get");
        drop(timer);

        let _timer = time_operation!("remote", "set");
    }
}
