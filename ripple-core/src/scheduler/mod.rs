//! Update Scheduling
//!
//! This module decides when queued watchers run.
//!
//! # Overview
//!
//! - [`queue`] holds the pending watchers, deduplicated and flushed in id
//!   order, and runs the post-flush `Activated`/`Updated` hooks.
//! - [`tick`] is the deferred callback queue the flush is scheduled on.
//!   How a tick is driven is up to the installed [`Deferrer`].
//!
//! With `Config::async_flush` turned off, queueing flushes synchronously
//! instead of waiting for a tick.

pub mod queue;
pub mod tick;

pub use queue::{flush, is_flushing, is_waiting, pending_count, queue_activated, queue_watcher};
#[cfg(feature = "tokio")]
pub use tick::{tick, TokioDeferrer};
pub use tick::{
    has_pending, next_tick, run_pending, set_deferrer, try_next_tick, Deferrer, ManualDeferrer,
};
