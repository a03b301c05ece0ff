//! Change Notifier
//!
//! A [`Dep`] is the broadcast list attached to one observed field (or to one
//! observed collection, for notifications that are not tied to a single
//! field). Watchers subscribe while they run and are notified on writes.
//!
//! A dep stores watcher ids, never watcher handles, so it does not keep any
//! watcher alive. Notification resolves ids through the [`Runtime`]
//! registry and silently skips watchers that are gone.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexSet;

use super::runtime::Runtime;
use super::{DepId, WatcherId};
use crate::config;

/// Per-field broadcast list of interested watchers.
///
/// Cloning a `Dep` yields another handle to the same subscriber list.
#[derive(Clone)]
pub struct Dep {
    inner: Rc<DepInner>,
}

struct DepInner {
    id: DepId,
    subscribers: RefCell<IndexSet<WatcherId>>,
}

impl Dep {
    /// Create a dep with no subscribers.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(DepInner {
                id: DepId::new(),
                subscribers: RefCell::new(IndexSet::new()),
            }),
        }
    }

    /// Get the dep's unique id.
    pub fn id(&self) -> DepId {
        self.inner.id
    }

    /// Add a subscriber. Adding an existing subscriber is a no-op.
    pub fn add_sub(&self, watcher: WatcherId) {
        if self.inner.subscribers.borrow_mut().insert(watcher) {
            tracing::trace!(dep = self.inner.id.raw(), %watcher, "subscribed");
        }
    }

    /// Remove a subscriber.
    pub fn remove_sub(&self, watcher: WatcherId) {
        if self.inner.subscribers.borrow_mut().shift_remove(&watcher) {
            tracing::trace!(dep = self.inner.id.raw(), %watcher, "unsubscribed");
        }
    }

    /// Subscribe the currently running watcher, if there is one.
    ///
    /// Goes through the watcher so that the dependency is recorded on both
    /// sides and deduplicated within one run.
    pub fn depend(&self) {
        if let Some(watcher) = Runtime::current_watcher() {
            watcher.add_dep(self);
        }
    }

    /// Notify every subscriber that the value changed.
    ///
    /// Walks a snapshot, so subscribers may subscribe, unsubscribe or tear
    /// down while the walk is in progress.
    pub fn notify(&self) {
        let mut snapshot: Vec<WatcherId> =
            self.inner.subscribers.borrow().iter().copied().collect();
        if !config::with(|c| c.async_flush) {
            // Without the scheduler, keep creation order by hand.
            snapshot.sort_unstable();
        }
        for id in snapshot {
            if let Some(watcher) = Runtime::lookup(id) {
                watcher.update();
            }
        }
    }

    /// Number of current subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.borrow().len()
    }

    /// Whether the given watcher is subscribed.
    pub fn has_subscriber(&self, watcher: WatcherId) -> bool {
        self.inner.subscribers.borrow().contains(&watcher)
    }

    /// Snapshot of the subscriber ids, in subscription order.
    pub fn subscribers(&self) -> Vec<WatcherId> {
        self.inner.subscribers.borrow().iter().copied().collect()
    }

    /// Whether two handles refer to the same dep.
    pub fn ptr_eq(&self, other: &Dep) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dep")
            .field("id", &self.inner.id.raw())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
