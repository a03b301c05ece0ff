//! Watcher Queue
//!
//! Writes do not run watchers directly. A notified watcher is pushed onto
//! the queue (at most once) and the whole queue is flushed on the next tick,
//! so any number of writes in one synchronous block cause one run per
//! affected watcher.
//!
//! # Flush Order
//!
//! The queue is sorted by watcher id before flushing. Ids follow creation
//! order, which gives three guarantees:
//!
//! 1. Parents update before children (parents are created first).
//! 2. User watchers run before the render watcher of the same owner (they
//!    are created during setup, before mounting).
//! 3. If an owner is destroyed while its parent's watcher runs, its own
//!    watchers are already torn down and are skipped.
//!
//! Watchers queued while the flush is in progress are inserted at their
//! sorted position after the current one, so they still run in this pass.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use crate::config;
use crate::error::{handle_error, ReactiveError};
use crate::reactive::{Hook, Owner, Runtime, Watcher, WatcherId};

use super::tick;

#[derive(Default)]
struct SchedulerState {
    queue: Vec<WatcherId>,
    has: HashSet<WatcherId>,
    circular: HashMap<WatcherId, usize>,
    activated: Vec<Owner>,
    waiting: bool,
    flushing: bool,
    index: usize,
}

thread_local! {
    static STATE: RefCell<SchedulerState> = RefCell::new(SchedulerState::default());
}

/// Queue a watcher for the next flush. Duplicate ids are ignored until the
/// watcher has run.
pub fn queue_watcher(watcher: &Watcher) {
    let id = watcher.id();
    let schedule = STATE.with(|state| {
        let mut state = state.borrow_mut();
        if !state.has.insert(id) {
            return false;
        }
        if state.flushing {
            let mut position = state.queue.len();
            while position > state.index + 1 && state.queue[position - 1] > id {
                position -= 1;
            }
            state.queue.insert(position, id);
        } else {
            state.queue.push(id);
        }
        tracing::trace!(%id, flushing = state.flushing, "watcher queued");
        !std::mem::replace(&mut state.waiting, true)
    });
    if schedule {
        schedule_flush();
    }
}

/// Queue an owner whose `Activated` hooks should run after the next flush.
pub fn queue_activated(owner: &Owner) {
    let schedule = STATE.with(|state| {
        let mut state = state.borrow_mut();
        state.activated.push(owner.clone());
        !std::mem::replace(&mut state.waiting, true)
    });
    if schedule {
        schedule_flush();
    }
}

fn schedule_flush() {
    if config::with(|c| c.async_flush) {
        tick::next_tick(|| {
            // Already reported through the error handler.
            let _ = flush();
        });
    } else {
        let _ = flush_scheduler_queue();
    }
}

/// Flush now if a flush is pending and none is running.
pub fn flush() -> Result<(), ReactiveError> {
    let idle = STATE.with(|state| {
        let state = state.borrow();
        state.flushing || !state.waiting
    });
    if idle {
        return Ok(());
    }
    flush_scheduler_queue()
}

/// Resets the scheduler when the flush ends, including by unwinding.
struct FlushGuard {
    armed: bool,
}

impl Drop for FlushGuard {
    fn drop(&mut self) {
        if self.armed {
            reset_state();
        }
    }
}

fn reset_state() {
    let _ = STATE.try_with(|state| {
        let mut state = state.borrow_mut();
        state.queue.clear();
        state.has.clear();
        state.circular.clear();
        state.activated.clear();
        state.waiting = false;
        state.flushing = false;
        state.index = 0;
    });
}

/// Run every queued watcher in id order, then the post-flush hooks.
///
/// Returns [`ReactiveError::CircularUpdate`] (after reporting it) when a
/// watcher re-queued itself more than `max_update_count` times; the rest of
/// the pass is abandoned.
pub(crate) fn flush_scheduler_queue() -> Result<(), ReactiveError> {
    let mut guard = FlushGuard { armed: true };
    let pending = STATE.with(|state| {
        let mut state = state.borrow_mut();
        state.flushing = true;
        state.queue.sort_unstable();
        state.queue.len()
    });
    tracing::debug!(pending, "flush start");

    let max_update_count = config::with(|c| c.max_update_count);
    let mut result = Ok(());

    loop {
        let next = STATE.with(|state| {
            let state = state.borrow();
            state.queue.get(state.index).copied()
        });
        let Some(id) = next else {
            break;
        };

        match Runtime::lookup(id) {
            Some(watcher) if !watcher.is_active() => {
                tracing::trace!(%id, "skipping torn down watcher");
                STATE.with(|state| state.borrow_mut().has.remove(&id));
            }
            Some(watcher) => {
                watcher.call_before();
                STATE.with(|state| state.borrow_mut().has.remove(&id));
                watcher.run();

                let looping = STATE.with(|state| {
                    let mut state = state.borrow_mut();
                    if !state.has.contains(&id) {
                        return None;
                    }
                    let count = state.circular.entry(id).or_insert(0);
                    *count += 1;
                    (*count > max_update_count).then_some(*count)
                });
                if let Some(count) = looping {
                    let err = ReactiveError::CircularUpdate {
                        watcher: id,
                        expression: watcher.expression().to_string(),
                        count,
                    };
                    handle_error(&err);
                    result = Err(err);
                    break;
                }
            }
            None => {
                tracing::trace!(%id, "skipping dropped watcher");
                STATE.with(|state| state.borrow_mut().has.remove(&id));
            }
        }

        STATE.with(|state| state.borrow_mut().index += 1);
    }

    let (activated, ran) = STATE.with(|state| {
        let mut state = state.borrow_mut();
        (std::mem::take(&mut state.activated), state.queue.clone())
    });
    // Hooks below may queue again; that belongs to the next flush.
    reset_state();
    guard.armed = false;
    tracing::debug!(ran = ran.len(), "flush end");

    for owner in activated {
        owner.run_queued_activation();
    }
    call_updated_hooks(&ran);

    result
}

fn call_updated_hooks(ran: &[WatcherId]) {
    for id in ran.iter().rev() {
        let Some(watcher) = Runtime::lookup(*id) else {
            continue;
        };
        if !watcher.is_render_watcher() {
            continue;
        }
        let Some(owner) = watcher.owner() else {
            continue;
        };
        if owner.render_watcher_id() == Some(*id) && owner.is_mounted() && !owner.is_destroyed() {
            owner.call_hook(Hook::Updated);
        }
    }
}

/// Number of watchers waiting in the queue.
pub fn pending_count() -> usize {
    STATE.with(|state| {
        let state = state.borrow();
        state.queue.len().saturating_sub(state.index)
    })
}

pub fn is_flushing() -> bool {
    STATE.with(|state| state.borrow().flushing)
}

/// Whether a flush has been scheduled and not yet run.
pub fn is_waiting() -> bool {
    STATE.with(|state| state.borrow().waiting)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
