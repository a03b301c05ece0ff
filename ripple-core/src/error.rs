//! Error Handling
//!
//! User-supplied code (tracked getters, watch callbacks, lifecycle hooks,
//! data factories) must never abort a notify walk or a scheduler flush.
//! Every failure is wrapped in a [`ReactiveError`] at the point where the
//! closure was invoked and handed to [`handle_error`], which forwards it to
//! the configured error handler or logs it.
//!
//! Misuse that is not a correctness violation (observing a frozen value,
//! adding keys to root data, mutating a prop) is reported through [`warn`]
//! instead and degrades to a no-op.

use std::fmt;

use thiserror::Error;

use crate::config;
use crate::reactive::{Hook, WatcherId};

/// Error type returned by user closures.
///
/// Anything implementing [`std::error::Error`] converts into it with `?`,
/// and so do string literals via `.into()`.
pub type UserError = Box<dyn std::error::Error + 'static>;

/// Result type returned by user closures.
pub type UserResult<T> = Result<T, UserError>;

/// Where a user error was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// The tracked getter of a watcher.
    Getter,
    /// A watch callback invoked after a re-run.
    Callback,
    /// A watch callback invoked at registration (`immediate`).
    ImmediateCallback,
    /// A lifecycle hook handler.
    Hook(Hook),
    /// An owner's data factory.
    DataFactory,
    /// A callback queued with `try_next_tick`.
    NextTick,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Getter => f.write_str("getter"),
            Phase::Callback => f.write_str("callback"),
            Phase::ImmediateCallback => f.write_str("immediate callback"),
            Phase::Hook(hook) => write!(f, "{hook} hook"),
            Phase::DataFactory => f.write_str("data()"),
            Phase::NextTick => f.write_str("nextTick"),
        }
    }
}

/// Errors produced by the reactive runtime.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// A user closure failed. The surrounding walk or flush carried on.
    #[error("error in {phase} of \"{expression}\": {source}")]
    User {
        phase: Phase,
        expression: String,
        #[source]
        source: UserError,
    },

    /// A watcher kept re-queueing itself within one flush.
    #[error(
        "you may have an infinite update loop in watcher \"{expression}\" ({watcher}): \
         re-queued {count} times in one flush"
    )]
    CircularUpdate {
        watcher: WatcherId,
        expression: String,
        count: usize,
    },

    /// A configuration document could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl ReactiveError {
    /// Shorthand for wrapping a user failure.
    pub fn user(phase: Phase, expression: impl Into<String>, source: UserError) -> Self {
        Self::User {
            phase,
            expression: expression.into(),
            source,
        }
    }

    /// Whether this is the flush circuit breaker.
    pub fn is_circular_update(&self) -> bool {
        matches!(self, ReactiveError::CircularUpdate { .. })
    }
}

/// Report an error through the configured handler.
///
/// Without a handler the error is logged at `error` level.
pub fn handle_error(err: &ReactiveError) {
    match config::error_handler() {
        Some(handler) => handler(err),
        None => tracing::error!(error = %err, "unhandled reactive error"),
    }
}

/// Emit a diagnostic warning unless `silent` is configured.
pub fn warn(message: impl AsRef<str>) {
    if config::with(|c| c.silent) {
        return;
    }
    let message = message.as_ref();
    match config::warn_handler() {
        Some(handler) => handler(message),
        None => tracing::warn!("{message}"),
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn user_error_display_names_phase() {
        let err = ReactiveError::user(Phase::Callback, "a.b", "boom".into());
        assert_eq!(err.to_string(), "error in callback of \"a.b\": boom");
        assert!(!err.is_circular_update());
    }

    #[test]
    fn hook_phase_display() {
        assert_eq!(Phase::Hook(Hook::BeforeUpdate).to_string(), "beforeUpdate hook");
    }

    #[test]
    fn handle_error_uses_handler() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        config::set_error_handler(move |err| sink.borrow_mut().push(err.to_string()));

        handle_error(&ReactiveError::user(Phase::Getter, "x", "bad".into()));

        assert_eq!(seen.borrow().as_slice(), ["error in getter of \"x\": bad"]);
        config::clear_error_handler();
    }

    #[test]
    fn warn_respects_silent() {
        let seen = Rc::new(RefCell::new(0));
        let sink = seen.clone();
        config::set_warn_handler(move |_| *sink.borrow_mut() += 1);

        warn("first");
        config::update(|c| c.silent = true);
        warn("second");

        assert_eq!(*seen.borrow(), 1);
        config::update(|c| c.silent = false);
        config::clear_warn_handler();
    }
}
