//! Reactive Context
//!
//! The reactive context tracks which watcher is currently running so that a
//! field read can attribute itself to the right subscriber.
//!
//! # Implementation
//!
//! We use a thread-local stack of frames. Running a watcher pushes a frame
//! holding its id; running a lifecycle hook (or anything else whose reads
//! must not become dependencies) pushes an empty frame. Frames are popped by
//! a guard, so the stack stays balanced even if the computation panics.
//!
//! Nested frames support re-entrant computations, e.g. a render reading a
//! computed value that has to evaluate first.

use std::cell::RefCell;

use super::WatcherId;

thread_local! {
    static TARGET_STACK: RefCell<Vec<Option<WatcherId>>> = RefCell::new(Vec::new());
}

/// Guard that pops its frame when dropped.
#[derive(Debug)]
pub struct ReactiveContext {
    frame: Option<WatcherId>,
}

impl ReactiveContext {
    /// Enter a tracking frame for the given watcher.
    ///
    /// While the guard lives, tracked reads subscribe `watcher`.
    pub fn enter(watcher: WatcherId) -> Self {
        push_target(Some(watcher));
        Self {
            frame: Some(watcher),
        }
    }

    /// Enter a frame in which reads are not tracked.
    pub fn untracked() -> Self {
        push_target(None);
        Self { frame: None }
    }

    /// Whether a watcher is collecting dependencies right now.
    pub fn is_tracking() -> bool {
        current_target().is_some()
    }

    /// Number of frames on the stack, including untracked ones.
    pub fn depth() -> usize {
        TARGET_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        // The stack is gone during thread teardown.
        let _ = TARGET_STACK.try_with(|stack| {
            let popped = stack.borrow_mut().pop();
            debug_assert_eq!(
                popped,
                Some(self.frame),
                "ReactiveContext mismatch: expected {:?}, got {:?}",
                self.frame,
                popped
            );
        });
    }
}

/// Push a raw frame. Must be balanced by [`pop_target`].
pub fn push_target(target: Option<WatcherId>) {
    TARGET_STACK.with(|stack| stack.borrow_mut().push(target));
}

/// Pop the top frame, returning it. `None` means the stack was empty.
pub fn pop_target() -> Option<Option<WatcherId>> {
    TARGET_STACK.with(|stack| stack.borrow_mut().pop())
}

/// The watcher of the top frame, if the top frame is a tracking one.
pub fn current_target() -> Option<WatcherId> {
    TARGET_STACK.with(|stack| stack.borrow().last().copied().flatten())
}

/// Run `f` with tracking suspended.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::untracked();
    f()
}
