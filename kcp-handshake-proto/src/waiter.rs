//! Bounded store of connection attempts that have a conv but no session yet

use std::{
    collections::VecDeque,
    net::SocketAddr,
    time::{Duration, Instant},
};

use tracing::trace;

/// A connection attempt that has been assigned a conv but is not yet an established session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Waiter {
    /// The conv reserved for this attempt
    pub conv: u64,
    /// Where the connect came from
    pub remote: SocketAddr,
    /// When the conv was reserved
    pub created: Instant,
}

/// Insertion-ordered cache of [`Waiter`]s holding at most `capacity` entries
///
/// Admitting a waiter into a full cache evicts the oldest one. Lookups are linear, which is fine
/// for the small bounds this is used with.
#[derive(Debug)]
pub struct WaiterCache {
    capacity: usize,
    // invariant: `entries.len() <= capacity`, oldest at the front
    entries: VecDeque<Waiter>,
}

impl WaiterCache {
    /// Construct an empty cache
    ///
    /// A cache with zero capacity admits nothing.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Find the waiter for `remote`, if any
    pub fn find_by_address(&self, remote: SocketAddr) -> Option<&Waiter> {
        self.entries.iter().find(|w| w.remote == remote)
    }

    /// Find the waiter holding `conv`, if any
    pub fn find_by_conv(&self, conv: u64) -> Option<&Waiter> {
        self.entries.iter().find(|w| w.conv == conv)
    }

    /// Admit `waiter`, evicting the oldest entry if the cache is full
    ///
    /// Returns whether `waiter` was admitted, which is only ever not the case at zero capacity.
    pub fn insert(&mut self, waiter: Waiter) -> bool {
        if self.capacity == 0 {
            trace!(conv = waiter.conv, remote = %waiter.remote, "no room for waiter");
            return false;
        }
        if self.entries.len() >= self.capacity {
            if let Some(evicted) = self.entries.pop_front() {
                trace!(conv = evicted.conv, remote = %evicted.remote, "evicting waiter");
            }
        }
        self.entries.push_back(waiter);
        true
    }

    /// Remove every waiter holding `conv`, returning the first one removed
    pub fn remove_by_conv(&mut self, conv: u64) -> Option<Waiter> {
        let first = self.find_by_conv(conv).copied();
        self.entries.retain(|w| w.conv != conv);
        first
    }

    /// Remove waiters created more than `timeout` before `now`, returning how many were removed
    pub fn expire(&mut self, now: Instant, timeout: Duration) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|w| now.saturating_duration_since(w.created) < timeout);
        before - self.entries.len()
    }

    /// Number of waiters currently held
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no waiters are held
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of waiters held at once
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
