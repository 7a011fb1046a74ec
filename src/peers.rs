//! Peer discovery directory
//!
//! Tracks every node heard on the discovery port and when it was last heard.
//! A peer's identity is its observed endpoint (address + port); there is no
//! other identifier. This is the only state shared across threads, guarded by
//! a single mutex; senders copy a snapshot under the lock instead of holding
//! it across network I/O.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Live-peer set with liveness tracking
#[derive(Debug, Default)]
pub struct PeerDirectory {
    records: Mutex<HashMap<SocketAddr, Instant>>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh a peer record. Idempotent: repeated beacons from the
    /// same endpoint only move its last-seen time forward.
    ///
    /// Returns true when the endpoint was not known before.
    pub fn record_hello(&self, endpoint: SocketAddr) -> bool {
        self.record_hello_at(endpoint, Instant::now())
    }

    /// `record_hello` with an explicit clock, for deterministic tests
    pub fn record_hello_at(&self, endpoint: SocketAddr, now: Instant) -> bool {
        self.records.lock().insert(endpoint, now).is_none()
    }

    /// Point-in-time copy of all live endpoints for the sender path
    pub fn snapshot(&self) -> Vec<SocketAddr> {
        self.records.lock().keys().copied().collect()
    }

    /// Drop every peer whose last beacon is older than the liveness timeout
    pub fn prune_expired(&self, now: Instant, timeout: Duration) {
        self.records
            .lock()
            .retain(|_, last_seen| now.saturating_duration_since(*last_seen) <= timeout);
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}
