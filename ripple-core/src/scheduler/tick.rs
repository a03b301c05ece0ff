//! Deferred Tick
//!
//! Callbacks registered with [`next_tick`] run together, in registration
//! order, the next time the tick drains. The first registration after a
//! drain asks the installed [`Deferrer`] to schedule one.
//!
//! # Deferrers
//!
//! - [`ManualDeferrer`] (the default) schedules nothing; the host calls
//!   [`run_pending`] at a point of its choosing, e.g. once per event loop
//!   turn.
//! - `TokioDeferrer` (feature `tokio`) drains on a `spawn_local` task, so
//!   the tick runs once the current synchronous code yields. It must be used
//!   from inside a `tokio::task::LocalSet`.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::error::{handle_error, Phase, ReactiveError, UserResult};

/// Schedules a drain of the tick queue.
pub trait Deferrer {
    /// Arrange for `drain` to be called once, after the current
    /// synchronous work.
    fn defer(&self, drain: fn());
}

/// Leaves draining to the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualDeferrer;

impl Deferrer for ManualDeferrer {
    fn defer(&self, _drain: fn()) {
        tracing::trace!("tick pending");
    }
}

/// Drains on a local tokio task.
#[cfg(feature = "tokio")]
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioDeferrer;

#[cfg(feature = "tokio")]
impl Deferrer for TokioDeferrer {
    fn defer(&self, drain: fn()) {
        tokio::task::spawn_local(async move { drain() });
    }
}

type TickCallback = Box<dyn FnOnce()>;

thread_local! {
    static CALLBACKS: RefCell<Vec<TickCallback>> = RefCell::new(Vec::new());
    static PENDING: Cell<bool> = Cell::new(false);
    static DEFERRER: RefCell<Rc<dyn Deferrer>> = RefCell::new(Rc::new(ManualDeferrer));
}

/// Install the deferrer for this thread.
pub fn set_deferrer(deferrer: impl Deferrer + 'static) {
    DEFERRER.with(|slot| *slot.borrow_mut() = Rc::new(deferrer));
}

/// Run `callback` when the tick drains.
pub fn next_tick(callback: impl FnOnce() + 'static) {
    CALLBACKS.with(|callbacks| callbacks.borrow_mut().push(Box::new(callback)));
    if !PENDING.with(|pending| pending.replace(true)) {
        let deferrer = DEFERRER.with(|slot| slot.borrow().clone());
        deferrer.defer(drain);
    }
}

/// Like [`next_tick`], reporting a failure through the error handler.
pub fn try_next_tick(callback: impl FnOnce() -> UserResult<()> + 'static) {
    next_tick(move || {
        if let Err(source) = callback() {
            handle_error(&ReactiveError::user(Phase::NextTick, "nextTick", source));
        }
    });
}

/// Resolves after the next tick has drained.
#[cfg(feature = "tokio")]
pub async fn tick() {
    let (tx, rx) = tokio::sync::oneshot::channel();
    next_tick(move || {
        let _ = tx.send(());
    });
    let _ = rx.await;
}

fn drain() {
    run_pending();
}

/// Run every callback registered so far, returning how many ran.
///
/// Callbacks registered while draining wait for the following tick.
pub fn run_pending() -> usize {
    PENDING.with(|pending| pending.set(false));
    let callbacks = CALLBACKS.with(|callbacks| std::mem::take(&mut *callbacks.borrow_mut()));
    let count = callbacks.len();
    for callback in callbacks {
        callback();
    }
    count
}

/// Whether a drain has been requested and not yet run.
pub fn has_pending() -> bool {
    PENDING.with(Cell::get)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct CountingDeferrer(Rc<Cell<usize>>);

    impl Deferrer for CountingDeferrer {
        fn defer(&self, _drain: fn()) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn callbacks_run_in_registration_order() {
        let order = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            next_tick(move || order.borrow_mut().push(i));
        }
        assert!(has_pending());
        assert!(order.borrow().is_empty());

        assert_eq!(run_pending(), 3);
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
        assert!(!has_pending());
    }

    #[test]
    fn one_defer_per_tick() {
        let deferrer = CountingDeferrer::default();
        set_deferrer(deferrer.clone());

        next_tick(|| {});
        next_tick(|| {});
        assert_eq!(deferrer.0.get(), 1);

        run_pending();
        next_tick(|| {});
        assert_eq!(deferrer.0.get(), 2);
    }

    #[test]
    fn callbacks_registered_while_draining_wait() {
        let ran = Rc::new(Cell::new(0));
        let outer = ran.clone();
        next_tick(move || {
            outer.set(outer.get() + 1);
            let inner = outer.clone();
            next_tick(move || inner.set(inner.get() + 10));
        });

        assert_eq!(run_pending(), 1);
        assert_eq!(ran.get(), 1);
        assert_eq!(run_pending(), 1);
        assert_eq!(ran.get(), 11);
    }

    #[test]
    fn failing_callback_is_reported() {
        let reported = Rc::new(Cell::new(0));
        let counter = reported.clone();
        crate::config::set_error_handler(move |_| counter.set(counter.get() + 1));

        try_next_tick(|| Err("nope".into()));
        run_pending();
        assert_eq!(reported.get(), 1);
    }

    #[cfg(feature = "tokio")]
    #[tokio::test(flavor = "current_thread")]
    async fn tokio_deferrer_drains_on_local_task() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                set_deferrer(TokioDeferrer);
                let ran = Rc::new(Cell::new(false));
                let flag = ran.clone();
                next_tick(move || flag.set(true));
                assert!(!ran.get());

                tick().await;
                assert!(ran.get());
            })
            .await;
    }
}
