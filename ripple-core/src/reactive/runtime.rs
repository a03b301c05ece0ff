//! Reactive Runtime
//!
//! The runtime is the registry that lets a change notifier reach the
//! watchers subscribed to it without owning them.
//!
//! # How It Works
//!
//! 1. When a watcher is created, it registers a weak handle under its id.
//!
//! 2. Notifiers store only watcher ids. To deliver a notification they look
//!    the id up here and upgrade the weak handle.
//!
//! 3. When the last strong handle to a watcher is dropped, the watcher
//!    unregisters itself; stale ids held by notifiers or the scheduler queue
//!    simply fail to resolve and are skipped.
//!
//! # Thread Safety
//!
//! Everything here is thread-local. Values are `Rc`-based and never cross
//! threads, so no locking is involved.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use super::context;
use super::watcher::{Watcher, WatcherInner};
use super::WatcherId;

thread_local! {
    static REGISTRY: RefCell<HashMap<WatcherId, Weak<WatcherInner>>> = RefCell::new(HashMap::new());
}

/// Entry points to the per-thread watcher registry.
pub struct Runtime;

impl Runtime {
    /// Register a watcher so notifiers can resolve its id.
    pub(crate) fn register(id: WatcherId, watcher: &Rc<WatcherInner>) {
        REGISTRY.with(|registry| {
            registry.borrow_mut().insert(id, Rc::downgrade(watcher));
        });
        tracing::trace!(%id, "watcher registered");
    }

    /// Remove a watcher from the registry.
    pub(crate) fn unregister(id: WatcherId) {
        // May run from a destructor after the registry is gone.
        let _ = REGISTRY.try_with(|registry| {
            registry.borrow_mut().remove(&id);
        });
    }

    /// Resolve a watcher id to a live handle.
    pub fn lookup(id: WatcherId) -> Option<Watcher> {
        REGISTRY
            .with(|registry| registry.borrow().get(&id).and_then(Weak::upgrade))
            .map(Watcher::from_inner)
    }

    /// The watcher currently collecting dependencies, if any.
    pub fn current_watcher() -> Option<Watcher> {
        context::current_target().and_then(Self::lookup)
    }

    /// Whether a watcher is collecting dependencies right now.
    pub fn is_tracking() -> bool {
        context::current_target().is_some()
    }

    /// Number of live watchers on this thread.
    pub fn watcher_count() -> usize {
        REGISTRY.with(|registry| {
            registry
                .borrow()
                .values()
                .filter(|weak| weak.strong_count() > 0)
                .count()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Value, WatchSource, WatcherOptions};

    fn constant() -> Watcher {
        Watcher::new(
            None,
            WatchSource::getter(|| Ok(Value::from(1))),
            None,
            WatcherOptions::default(),
        )
    }

    #[test]
    fn runtime_registers_and_unregisters() {
        let watcher = constant();
        let id = watcher.id();

        assert!(Runtime::lookup(id).is_some());

        drop(watcher);

        assert!(Runtime::lookup(id).is_none());
    }

    #[test]
    fn lookup_returns_same_watcher() {
        let watcher = constant();
        let found = Runtime::lookup(watcher.id()).expect("registered");
        assert!(found.ptr_eq(&watcher));
    }

    #[test]
    fn current_watcher_follows_context() {
        let watcher = constant();
        assert!(Runtime::current_watcher().is_none());

        let _ctx = context::ReactiveContext::enter(watcher.id());
        assert!(Runtime::is_tracking());
        assert_eq!(Runtime::current_watcher().map(|w| w.id()), Some(watcher.id()));
    }

    #[test]
    fn watcher_count_tracks_live_watchers() {
        let before = Runtime::watcher_count();
        let a = constant();
        let b = constant();
        assert_eq!(Runtime::watcher_count(), before + 2);
        drop(a);
        drop(b);
        assert_eq!(Runtime::watcher_count(), before);
    }
}
