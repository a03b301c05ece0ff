//! Runtime Configuration
//!
//! Configuration is per thread, like the rest of the runtime state. A
//! [`Config`] can be built in code or parsed from JSON; the error and warn
//! handlers are installed separately since they are closures.
//!
//! ```rust,ignore
//! let config = Config::from_json_str(r#"{ "asyncFlush": false, "maxUpdateCount": 50 }"#)?;
//! ripple_core::config::install(config);
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::ReactiveError;

/// Default number of times a watcher may re-queue itself in one flush.
pub const DEFAULT_MAX_UPDATE_COUNT: usize = 100;

/// Callback receiving reported errors.
pub type ErrorHandler = Rc<dyn Fn(&ReactiveError)>;

/// Callback receiving diagnostic warnings.
pub type WarnHandler = Rc<dyn Fn(&str)>;

/// Tunable runtime behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Suppress warnings.
    pub silent: bool,

    /// Defer flushes to the next tick. When false, the first queued
    /// watcher flushes the queue synchronously.
    pub async_flush: bool,

    /// Re-queue threshold that trips the circular update breaker.
    pub max_update_count: usize,

    /// Warn when `observe` is asked to wrap a frozen value.
    pub warn_on_frozen: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            silent: false,
            async_flush: true,
            max_update_count: DEFAULT_MAX_UPDATE_COUNT,
            warn_on_frozen: false,
        }
    }
}

impl Config {
    /// Parse a configuration document. Missing keys take their defaults.
    pub fn from_json_str(source: &str) -> Result<Self, ReactiveError> {
        Ok(serde_json::from_str(source)?)
    }
}

#[derive(Default)]
struct Handlers {
    error: Option<ErrorHandler>,
    warn: Option<WarnHandler>,
}

thread_local! {
    static CONFIG: RefCell<Config> = RefCell::new(Config::default());
    static HANDLERS: RefCell<Handlers> = RefCell::new(Handlers::default());
}

/// Replace the current thread's configuration.
pub fn install(config: Config) {
    tracing::debug!(?config, "installing reactive config");
    CONFIG.with(|c| *c.borrow_mut() = config);
}

/// Read the current configuration.
pub fn with<R>(f: impl FnOnce(&Config) -> R) -> R {
    CONFIG.with(|c| f(&c.borrow()))
}

/// Modify the current configuration in place.
pub fn update(f: impl FnOnce(&mut Config)) {
    CONFIG.with(|c| f(&mut c.borrow_mut()));
}

/// Snapshot of the current configuration.
pub fn current() -> Config {
    with(Config::clone)
}

pub fn set_error_handler<F>(handler: F)
where
    F: Fn(&ReactiveError) + 'static,
{
    HANDLERS.with(|h| h.borrow_mut().error = Some(Rc::new(handler)));
}

pub fn clear_error_handler() {
    HANDLERS.with(|h| h.borrow_mut().error = None);
}

pub fn set_warn_handler<F>(handler: F)
where
    F: Fn(&str) + 'static,
{
    HANDLERS.with(|h| h.borrow_mut().warn = Some(Rc::new(handler)));
}

pub fn clear_warn_handler() {
    HANDLERS.with(|h| h.borrow_mut().warn = None);
}

// Handlers are cloned out so they can report re-entrantly.
pub(crate) fn error_handler() -> Option<ErrorHandler> {
    HANDLERS.with(|h| h.borrow().error.clone())
}

pub(crate) fn warn_handler() -> Option<WarnHandler> {
    HANDLERS.with(|h| h.borrow().warn.clone())
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
