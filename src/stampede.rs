//! Stampede protection: at most one in-flight computation per key.
//!
//! When many callers miss the cache for the same key at once, exactly one
//! of them (the leader) runs the expensive computation; everyone else
//! attaches to the flight and receives the same shared result, success or
//! failure. The computation runs inside a spawned task, so a leader whose
//! own request is cancelled never takes the flight down with it — the
//! group's result still lands.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;

use crate::entry::CacheEntry;
use crate::error::CacheError;

/// The shared outcome of one flight.
pub type FlightResult = Result<Arc<CacheEntry>, CacheError>;

/// Boxed computation future handed to [`FlightGuard::execute`].
pub type FlightFuture = Pin<Box<dyn Future<Output = FlightResult> + Send>>;

type FlightSlot = Option<FlightResult>;

/// One in-flight computation: the broadcast channel plus a waiter count
/// (metrics only).
struct Flight {
    rx: watch::Receiver<FlightSlot>,
    waiters: Arc<AtomicUsize>,
}

/// Registry of in-flight computations, keyed by cache key.
///
/// Cheap to clone; clones share the registry.
#[derive(Clone, Default)]
pub struct FlightGuard {
    flights: Arc<Mutex<HashMap<String, Flight>>>,
}

impl FlightGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of computations currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.flights.lock().len()
    }

    /// Run `compute` for `key`, collapsing concurrent calls.
    ///
    /// The first caller for a key becomes the leader: its `compute` future
    /// runs in a spawned task and its result is broadcast. Later callers
    /// become followers and only await the broadcast. The registry entry is
    /// removed the moment the result is published, so a miss arriving after
    /// that starts a fresh flight.
    ///
    /// Dropping the returned future detaches the caller from the flight but
    /// never aborts the computation; the result is still produced (and
    /// cached by the compute closure) for whoever remains.
    pub async fn execute<F>(&self, key: &str, compute: F) -> FlightResult
    where
        F: FnOnce() -> FlightFuture,
    {
        let mut rx = {
            let mut flights = self.flights.lock();
            if let Some(flight) = flights.get(key) {
                flight.waiters.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_coalesced_waiter();
                debug!(key = %key, "joining in-flight computation");
                flight.rx.clone()
            } else {
                let (tx, rx) = watch::channel(None);
                let waiters = Arc::new(AtomicUsize::new(1));
                flights.insert(
                    key.to_string(),
                    Flight {
                        rx: rx.clone(),
                        waiters: Arc::clone(&waiters),
                    },
                );
                drop(flights);

                debug!(key = %key, "leading new computation");
                let fut = compute();
                let flights = Arc::clone(&self.flights);
                let key = key.to_string();
                tokio::spawn(async move {
                    let result = fut.await;
                    // Unregister before broadcasting: attached waiters hold
                    // receiver clones and still see the value; anyone
                    // arriving later starts a fresh flight.
                    flights.lock().remove(&key);
                    let _ = tx.send(Some(result));
                });

                rx
            }
        };

        let slot = rx
            .wait_for(|slot| slot.is_some())
            .await
            .map_err(|_| CacheError::Factory("computation abandoned".into()))?;
        match slot.as_ref() {
            Some(result) => result.clone(),
            None => Err(CacheError::Factory("computation abandoned".into())),
        }
    }
}
