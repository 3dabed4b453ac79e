//! Single-flight coordination for cache misses.
//!
//! The first request to miss on a key becomes the leader and fetches
//! upstream. Requests that miss on the same key while the leader is working
//! become followers: they wait for the leader to finish and then look the key
//! up again, so one upstream fetch populates the entry for all of them.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::watch;

use super::key::CacheKey;

/// Registry of in-flight fetches, keyed by cache key.
#[derive(Debug, Clone, Default)]
pub struct Flights {
    inner: Arc<DashMap<CacheKey, watch::Receiver<()>>>,
}

/// Role assigned by [`Flights::join`].
#[derive(Debug)]
pub enum Flight {
    /// No fetch was in flight; the holder must fetch and then drop the guard.
    Leader(FlightGuard),
    /// Another request is fetching this key.
    Follower(FlightWaiter),
}

impl Flights {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in `key`.
    pub fn join(&self, key: &CacheKey) -> Flight {
        match self.inner.entry(key.clone()) {
            Entry::Occupied(entry) => Flight::Follower(FlightWaiter {
                rx: entry.get().clone(),
            }),
            Entry::Vacant(entry) => {
                let (tx, rx) = watch::channel(());
                entry.insert(rx);
                Flight::Leader(FlightGuard {
                    key: key.clone(),
                    flights: Arc::clone(&self.inner),
                    _done: tx,
                })
            }
        }
    }

    /// Number of keys currently being fetched.
    pub fn in_flight(&self) -> usize {
        self.inner.len()
    }
}

/// Held by the leader for the duration of its fetch.
///
/// Dropping it clears the in-flight marker and wakes every follower.
#[derive(Debug)]
pub struct FlightGuard {
    key: CacheKey,
    flights: Arc<DashMap<CacheKey, watch::Receiver<()>>>,
    _done: watch::Sender<()>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        // Marker goes first so woken followers cannot rejoin a finished flight.
        self.flights.remove(&self.key);
    }
}

/// Held by a follower until the leader finishes.
#[derive(Debug)]
pub struct FlightWaiter {
    rx: watch::Receiver<()>,
}

impl FlightWaiter {
    /// Resolve once the leader's guard is dropped.
    pub async fn wait(mut self) {
        // Nothing is ever sent; the channel closing is the signal.
        while self.rx.changed().await.is_ok() {}
    }
}
