//! Round-robin address selection.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;

/// Round-robin selector.
/// Keeps one rotating counter per backend identity.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counters: DashMap<String, AtomicUsize>,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick the next address for `backend`.
    pub fn next(&self, backend: &str, addrs: &[SocketAddr]) -> Option<SocketAddr> {
        match addrs.len() {
            0 => None,
            1 => Some(addrs[0]),
            len => {
                let start = match self.counters.get(backend) {
                    Some(counter) => counter.fetch_add(1, Ordering::Relaxed),
                    None => self
                        .counters
                        .entry(backend.to_string())
                        .or_default()
                        .fetch_add(1, Ordering::Relaxed),
                };
                Some(addrs[start % len])
            }
        }
    }
}
