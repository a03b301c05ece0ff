//! Identifier types for the dependency graph.
//!
//! Ids are handed out from global monotonic counters, so they double as a
//! creation order: a watcher created before another always has the smaller
//! id. The scheduler relies on this to run parents before children.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatcherId(u64);

impl WatcherId {
    /// Generate the next watcher id.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw id value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for WatcherId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WatcherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "watcher#{}", self.0)
    }
}

/// Unique identifier for a change notifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DepId(u64);

impl DepId {
    /// Generate the next dep id.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw id value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for DepId {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watcher_ids_follow_creation_order() {
        let first = WatcherId::new();
        let second = WatcherId::new();
        let third = WatcherId::new();

        assert!(first < second);
        assert!(second < third);
    }

    #[test]
    fn dep_ids_are_unique() {
        let a = DepId::new();
        let b = DepId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn watcher_id_display() {
        let id = WatcherId::new();
        assert_eq!(id.to_string(), format!("watcher#{}", id.raw()));
    }
}
