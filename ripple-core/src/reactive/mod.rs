//! Reactive Core
//!
//! This module implements dependency tracking: observable records and
//! lists, the change notifiers attached to their fields, and the watchers
//! that re-run when those fields change.
//!
//! # Concepts
//!
//! ## Observed values
//!
//! [`observe`] turns a [`Record`] or [`List`] (and everything nested in it)
//! into observable state. Every record field gets its own [`Dep`]; every
//! observed collection also carries an [`Observer`] whose dep is notified
//! for shape changes (keys added or removed, list mutations).
//!
//! ## Watchers
//!
//! A [`Watcher`] runs a getter inside a tracking frame. Every reactive read
//! made by the getter subscribes the watcher to the field's dep. When the
//! field is written, the dep notifies the watcher, which is then queued on
//! the scheduler (or re-run at once, or marked dirty, depending on its
//! kind).
//!
//! ## Owners
//!
//! An [`Owner`] groups the data, props, watchers, [`Computed`] values and
//! lifecycle hooks of one component instance.
//!
//! # Implementation Notes
//!
//! Everything is single-threaded and `Rc`-based. The current computation is
//! a thread-local stack (see [`context`]); deps refer to watchers by
//! [`WatcherId`] and resolve them through the [`Runtime`] registry, so the
//! graph never forms reference cycles between data and computations.

pub mod context;
mod dep;
mod id;
mod list;
mod observer;
mod owner;
mod record;
mod runtime;
mod traverse;
mod value;
mod watcher;

pub use context::{untracked, ReactiveContext};
pub use dep::Dep;
pub use id::{DepId, WatcherId};
pub use list::List;
pub use observer::{
    define_reactive, delete, is_observing, observe, set, toggle_observing, Key, Observer,
    ObservingGuard,
};
pub use owner::{Computed, Hook, HookHandler, Owner, Unwatch, WatchOptions};
pub use record::{CustomSetter, Record};
pub use runtime::Runtime;
pub use traverse::traverse;
pub use value::Value;
pub use watcher::{BeforeHook, Callback, Getter, WatchSource, Watcher, WatcherOptions};
