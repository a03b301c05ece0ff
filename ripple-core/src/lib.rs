//! Ripple Core
//!
//! This crate provides a fine-grained reactive dependency-tracking runtime.
//! It implements:
//!
//! - Observable records and lists with per-field change notifiers
//! - Watchers that record what they read and re-run when it changes
//! - A batching scheduler that flushes watchers in creation order
//! - Component owners with computed values, watches and lifecycle hooks
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: values, observers, deps, watchers and owners
//! - `scheduler`: the watcher queue and the deferred tick it flushes on
//! - `config`: per-thread settings and diagnostic handlers
//! - `error`: the error type and the reporting entry points
//!
//! # Example
//!
//! ```rust
//! use ripple_core::{flush, Owner, Record, Value, WatchOptions};
//!
//! let data: Record = [("a", 1)].into_iter().collect();
//! let owner = Owner::new("counter", data);
//!
//! let state = owner.data().clone();
//! let doubled = owner.computed("doubled", move || {
//!     Ok(Value::from(state.get("a").as_number().unwrap_or_default() * 2.0))
//! });
//!
//! owner.watch("doubled", |new, old| {
//!     println!("doubled: {old:?} -> {new:?}");
//!     Ok(())
//! }, WatchOptions::default());
//!
//! owner.data().set("a", 5);
//! flush().unwrap();
//! assert_eq!(doubled.get(), Value::from(10));
//! ```

pub mod config;
pub mod error;
pub mod reactive;
pub mod scheduler;

pub use config::Config;
pub use error::{ReactiveError, UserError, UserResult};
pub use reactive::{
    define_reactive, delete, observe, set, toggle_observing, Computed, Dep, Hook, Key, List,
    ObservingGuard, Owner, Record, Unwatch, Value, WatchOptions, WatchSource, Watcher,
    WatcherOptions,
};
pub use scheduler::{flush, next_tick};
