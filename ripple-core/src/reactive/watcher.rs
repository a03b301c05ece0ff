//! Watcher Implementation
//!
//! A watcher is the unit of computation in the dependency graph. It runs a
//! getter inside a tracking frame, remembers every [`Dep`] the getter read,
//! and re-runs when one of them notifies.
//!
//! # Lifecycle
//!
//! 1. On creation the watcher registers itself with the [`Runtime`] and,
//!    unless it is lazy, runs its getter once to collect dependencies.
//!
//! 2. A notification calls [`Watcher::update`]. Lazy watchers only mark
//!    themselves dirty, sync watchers re-run on the spot, and everything else
//!    is handed to the scheduler.
//!
//! 3. Every run collects a fresh dependency generation. Deps that were read
//!    last time but not this time are unsubscribed, so conditional reads
//!    never leave stale edges behind.
//!
//! 4. [`Watcher::teardown`] (or dropping the last handle) unsubscribes from
//!    everything.
//!
//! # Kinds
//!
//! - Render watchers drive an [`Owner`]'s render function.
//! - User watchers back [`Owner::watch`] and report errors under their
//!   expression.
//! - Lazy watchers back [`Computed`](super::Computed) values.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use super::context::ReactiveContext;
use super::dep::Dep;
use super::owner::{Owner, OwnerInner};
use super::runtime::Runtime;
use super::traverse::traverse;
use super::value::Value;
use super::{DepId, WatcherId};
use crate::error::{handle_error, warn, Phase, ReactiveError, UserResult};
use crate::scheduler;

/// Tracked computation producing a value.
pub type Getter = Rc<dyn Fn() -> UserResult<Value>>;

/// Change callback, invoked as `(new, old)`.
pub type Callback = Rc<dyn Fn(&Value, &Value) -> UserResult<()>>;

/// Hook run by the scheduler right before a queued watcher runs.
pub type BeforeHook = Rc<dyn Fn()>;

type DepList = SmallVec<[Dep; 4]>;

/// What a watcher evaluates.
#[derive(Clone)]
pub enum WatchSource {
    /// An arbitrary tracked closure.
    Getter(Getter),
    /// A dot-delimited path resolved against the owner, e.g. `"user.name"`
    /// or `"items.0"`.
    Path(String),
}

impl WatchSource {
    pub fn getter<F>(f: F) -> Self
    where
        F: Fn() -> UserResult<Value> + 'static,
    {
        WatchSource::Getter(Rc::new(f))
    }

    pub fn path(path: impl Into<String>) -> Self {
        WatchSource::Path(path.into())
    }
}

impl From<&str> for WatchSource {
    fn from(path: &str) -> Self {
        WatchSource::path(path)
    }
}

impl From<String> for WatchSource {
    fn from(path: String) -> Self {
        WatchSource::Path(path)
    }
}

impl fmt::Debug for WatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchSource::Getter(_) => f.write_str("Getter(..)"),
            WatchSource::Path(path) => f.debug_tuple("Path").field(path).finish(),
        }
    }
}

/// Construction flags for a [`Watcher`].
#[derive(Clone, Default)]
pub struct WatcherOptions {
    /// Do not run at construction; `update` only marks the watcher dirty.
    pub lazy: bool,
    /// Re-run inside `update` instead of queueing.
    pub sync: bool,
    /// Traverse the result so nested writes also trigger.
    pub deep: bool,
    /// Created by user code (`Owner::watch`).
    pub user: bool,
    /// Called by the scheduler right before the watcher runs.
    pub before: Option<BeforeHook>,
    /// Diagnostic name used in error reports.
    pub label: Option<String>,
}

impl WatcherOptions {
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    pub fn sync(mut self) -> Self {
        self.sync = true;
        self
    }

    pub fn deep(mut self) -> Self {
        self.deep = true;
        self
    }

    pub fn user(mut self) -> Self {
        self.user = true;
        self
    }

    pub fn before(mut self, hook: impl Fn() + 'static) -> Self {
        self.before = Some(Rc::new(hook));
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

impl fmt::Debug for WatcherOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatcherOptions")
            .field("lazy", &self.lazy)
            .field("sync", &self.sync)
            .field("deep", &self.deep)
            .field("user", &self.user)
            .field("before", &self.before.is_some())
            .field("label", &self.label)
            .finish()
    }
}

/// A tracked computation. Cloning yields another handle to the same watcher.
#[derive(Clone)]
pub struct Watcher {
    inner: Rc<WatcherInner>,
}

pub(crate) struct WatcherInner {
    id: WatcherId,
    owner: Option<Weak<OwnerInner>>,
    expression: String,
    getter: Getter,
    callback: Option<Callback>,
    before: Option<BeforeHook>,

    lazy: bool,
    sync: bool,
    deep: bool,
    user: bool,
    is_render: bool,

    dirty: Cell<bool>,
    active: Cell<bool>,
    value: RefCell<Value>,

    deps: RefCell<DepList>,
    new_deps: RefCell<DepList>,
    dep_ids: RefCell<HashSet<DepId>>,
    new_dep_ids: RefCell<HashSet<DepId>>,
}

impl Watcher {
    /// Create a watcher and, unless it is lazy, run it once.
    pub fn new(
        owner: Option<&Owner>,
        source: WatchSource,
        callback: Option<Callback>,
        options: WatcherOptions,
    ) -> Self {
        Self::build(owner, source, callback, options, false)
    }

    /// Create the render watcher of `owner`.
    pub(crate) fn new_render(owner: &Owner, render: Getter, before: BeforeHook) -> Self {
        let options = WatcherOptions {
            before: Some(before),
            label: Some(format!("render of <{}>", owner.name())),
            ..WatcherOptions::default()
        };
        Self::build(Some(owner), WatchSource::Getter(render), None, options, true)
    }

    fn build(
        owner: Option<&Owner>,
        source: WatchSource,
        callback: Option<Callback>,
        options: WatcherOptions,
        is_render: bool,
    ) -> Self {
        let (getter, expression) = match source {
            WatchSource::Getter(getter) => {
                let expression = options.label.clone().unwrap_or_else(|| "<getter>".to_string());
                (getter, expression)
            }
            WatchSource::Path(path) => {
                let getter = path_getter(owner, &path);
                (getter, options.label.clone().unwrap_or(path))
            }
        };

        let id = WatcherId::new();
        let inner = Rc::new(WatcherInner {
            id,
            owner: owner.map(Owner::downgrade),
            expression,
            getter,
            callback,
            before: options.before,
            lazy: options.lazy,
            sync: options.sync,
            deep: options.deep,
            user: options.user,
            is_render,
            dirty: Cell::new(options.lazy),
            active: Cell::new(true),
            value: RefCell::new(Value::Undefined),
            deps: RefCell::new(SmallVec::new()),
            new_deps: RefCell::new(SmallVec::new()),
            dep_ids: RefCell::new(HashSet::new()),
            new_dep_ids: RefCell::new(HashSet::new()),
        });
        Runtime::register(id, &inner);
        let watcher = Self { inner };

        if let Some(owner) = owner {
            if is_render {
                owner.set_render_watcher(&watcher);
            }
            owner.push_watcher(watcher.clone());
        }

        if !watcher.inner.lazy {
            let value = watcher.get();
            *watcher.inner.value.borrow_mut() = value;
        }
        watcher
    }

    pub(crate) fn from_inner(inner: Rc<WatcherInner>) -> Self {
        Self { inner }
    }

    /// Run the getter in a tracking frame and collect dependencies.
    ///
    /// A failing getter is reported and yields `Undefined`.
    pub fn get(&self) -> Value {
        let value = {
            let _ctx = ReactiveContext::enter(self.inner.id);
            let value = match (self.inner.getter)() {
                Ok(value) => value,
                Err(source) => {
                    handle_error(&ReactiveError::user(Phase::Getter, self.expression(), source));
                    Value::Undefined
                }
            };
            if self.inner.deep {
                traverse(&value);
            }
            value
        };
        self.cleanup_deps();
        value
    }

    /// Record a dependency for the current run.
    pub fn add_dep(&self, dep: &Dep) {
        let inner = &self.inner;
        if !inner.active.get() {
            return;
        }
        let id = dep.id();
        if !inner.new_dep_ids.borrow_mut().insert(id) {
            return;
        }
        inner.new_deps.borrow_mut().push(dep.clone());
        if !inner.dep_ids.borrow().contains(&id) {
            dep.add_sub(inner.id);
        }
    }

    /// Drop the deps not read by the last run and promote the new generation.
    fn cleanup_deps(&self) {
        let inner = &self.inner;
        if !inner.active.get() {
            // Torn down from inside its own getter.
            self.unsubscribe_all();
            return;
        }
        {
            let new_ids = inner.new_dep_ids.borrow();
            for dep in inner.deps.borrow().iter() {
                if !new_ids.contains(&dep.id()) {
                    dep.remove_sub(inner.id);
                }
            }
        }
        inner.dep_ids.swap(&inner.new_dep_ids);
        inner.new_dep_ids.borrow_mut().clear();
        inner.deps.swap(&inner.new_deps);
        inner.new_deps.borrow_mut().clear();
    }

    /// React to a dependency change.
    pub fn update(&self) {
        if self.inner.lazy {
            self.inner.dirty.set(true);
        } else if self.inner.sync {
            self.run();
        } else {
            scheduler::queue_watcher(self);
        }
    }

    /// Re-run and invoke the callback if the value changed.
    ///
    /// Structured values and deep watchers always fire, since the same
    /// record may have been mutated in place. User watchers fire on every
    /// dependency change.
    pub fn run(&self) {
        if !self.inner.active.get() {
            return;
        }
        let value = self.get();
        let old = self.inner.value.borrow().clone();
        if value != old || value.is_structured() || self.inner.deep || self.inner.user {
            *self.inner.value.borrow_mut() = value.clone();
            if let Some(callback) = &self.inner.callback {
                if let Err(source) = callback(&value, &old) {
                    handle_error(&ReactiveError::user(Phase::Callback, self.expression(), source));
                }
            }
        }
    }

    /// Compute the value of a lazy watcher and clear `dirty`.
    pub fn evaluate(&self) {
        let value = self.get();
        *self.inner.value.borrow_mut() = value;
        self.inner.dirty.set(false);
    }

    /// Make the running watcher depend on everything this watcher depends on.
    pub fn depend(&self) {
        let deps: DepList = self.inner.deps.borrow().clone();
        for dep in deps {
            dep.depend();
        }
    }

    /// Detach from every dep and stop reacting. Idempotent.
    pub fn teardown(&self) {
        if !self.inner.active.get() {
            return;
        }
        if let Some(owner) = self.owner() {
            if !owner.is_being_destroyed() {
                owner.remove_watcher(self.inner.id);
            }
        }
        self.unsubscribe_all();
        self.inner.active.set(false);
        tracing::trace!(id = %self.inner.id, "watcher torn down");
    }

    fn unsubscribe_all(&self) {
        let inner = &self.inner;
        let deps = std::mem::take(&mut *inner.deps.borrow_mut());
        let new_deps = std::mem::take(&mut *inner.new_deps.borrow_mut());
        for dep in deps.iter().chain(new_deps.iter()) {
            dep.remove_sub(inner.id);
        }
        inner.dep_ids.borrow_mut().clear();
        inner.new_dep_ids.borrow_mut().clear();
    }

    pub(crate) fn call_before(&self) {
        if let Some(before) = &self.inner.before {
            before();
        }
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn id(&self) -> WatcherId {
        self.inner.id
    }

    /// The cached value from the last run.
    pub fn value(&self) -> Value {
        self.inner.value.borrow().clone()
    }

    pub fn dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    pub fn is_lazy(&self) -> bool {
        self.inner.lazy
    }

    pub fn is_sync(&self) -> bool {
        self.inner.sync
    }

    pub fn is_deep(&self) -> bool {
        self.inner.deep
    }

    pub fn is_user(&self) -> bool {
        self.inner.user
    }

    pub fn is_render_watcher(&self) -> bool {
        self.inner.is_render
    }

    /// Diagnostic label: the path, the configured label, or `<getter>`.
    pub fn expression(&self) -> &str {
        &self.inner.expression
    }

    pub fn owner(&self) -> Option<Owner> {
        self.inner.owner.as_ref().and_then(Owner::from_weak)
    }

    /// Number of deps held from the last run.
    pub fn dep_count(&self) -> usize {
        self.inner.deps.borrow().len()
    }

    /// Ids of the deps held from the last run.
    pub fn dep_ids(&self) -> Vec<DepId> {
        self.inner.deps.borrow().iter().map(Dep::id).collect()
    }

    pub fn depends_on(&self, dep: &Dep) -> bool {
        self.inner.dep_ids.borrow().contains(&dep.id())
    }

    pub fn ptr_eq(&self, other: &Watcher) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.inner.id)
            .field("expression", &self.inner.expression)
            .field("active", &self.inner.active.get())
            .field("dirty", &self.inner.dirty.get())
            .field("dep_count", &self.dep_count())
            .finish()
    }
}

impl Drop for WatcherInner {
    fn drop(&mut self) {
        for dep in self.deps.get_mut().iter().chain(self.new_deps.get_mut().iter()) {
            dep.remove_sub(self.id);
        }
        Runtime::unregister(self.id);
    }
}

// ----------------------------------------------------------------------------
// Path getters
// ----------------------------------------------------------------------------

fn parse_path(path: &str) -> Option<Vec<String>> {
    let valid = path
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '$' || c == '.');
    valid.then(|| path.split('.').map(str::to_string).collect())
}

fn path_getter(owner: Option<&Owner>, path: &str) -> Getter {
    let Some(segments) = parse_path(path) else {
        warn(format!(
            "Failed watching path: \"{path}\". Watchers only accept simple dot-delimited paths; \
             use a getter for anything else."
        ));
        return Rc::new(|| Ok(Value::Undefined));
    };
    let owner = owner.map(Owner::downgrade);

    Rc::new(move || {
        let Some(owner) = owner.as_ref().and_then(Owner::from_weak) else {
            return Ok(Value::Undefined);
        };
        let mut segments = segments.iter();
        let mut current = match segments.next() {
            Some(first) => owner.lookup(first),
            None => return Ok(Value::Undefined),
        };
        for segment in segments {
            current = match &current {
                Value::Record(record) => record.get(segment),
                Value::List(list) if segment == "length" => Value::from(list.len()),
                Value::List(list) => match segment.parse::<usize>() {
                    Ok(index) => list.get(index),
                    Err(_) => Value::Undefined,
                },
                _ => return Ok(Value::Undefined),
            };
        }
        Ok(current)
    })
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;
    use crate::reactive::{observe, Record};

    fn observed(pairs: &[(&str, Value)]) -> Record {
        let record: Record = pairs.iter().map(|(k, v)| (*k, v.clone())).collect();
        observe(&Value::from(record.clone()), false);
        record
    }

    #[test]
    fn collects_exactly_the_fields_read() {
        let record = observed(&[
            ("flag", Value::from(true)),
            ("a", Value::from(1)),
            ("b", Value::from(2)),
        ]);
        let source = record.clone();
        let watcher = Watcher::new(
            None,
            WatchSource::getter(move || {
                if source.get("flag").as_bool() == Some(true) {
                    Ok(source.get("a"))
                } else {
                    Ok(source.get("b"))
                }
            }),
            None,
            WatcherOptions::default().sync(),
        );

        let dep = |key: &str| record.field_dep(key).expect("reactive");
        assert!(watcher.depends_on(&dep("flag")));
        assert!(watcher.depends_on(&dep("a")));
        assert!(!watcher.depends_on(&dep("b")));

        record.set("flag", false);

        assert!(watcher.depends_on(&dep("b")));
        assert!(!watcher.depends_on(&dep("a")));
        assert!(!dep("a").has_subscriber(watcher.id()));
        assert_eq!(watcher.dep_count(), 2);
    }

    #[test]
    fn repeated_reads_subscribe_once() {
        let record = observed(&[("a", Value::from(1))]);
        let source = record.clone();
        let watcher = Watcher::new(
            None,
            WatchSource::getter(move || {
                source.get("a");
                source.get("a");
                Ok(source.get("a"))
            }),
            None,
            WatcherOptions::default(),
        );
        assert_eq!(watcher.dep_count(), 1);
        assert_eq!(record.field_dep("a").expect("reactive").subscriber_count(), 1);
    }

    #[test]
    fn callback_receives_new_and_old() {
        let record = observed(&[("a", Value::from(1))]);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        let source = record.clone();
        let _watcher = Watcher::new(
            None,
            WatchSource::getter(move || Ok(source.get("a"))),
            Some(Rc::new(move |new: &Value, old: &Value| {
                log.borrow_mut().push((new.clone(), old.clone()));
                Ok(())
            })),
            WatcherOptions::default().sync(),
        );

        record.set("a", 2);
        assert_eq!(*seen.borrow(), vec![(Value::from(2), Value::from(1))]);
    }

    #[test]
    fn unchanged_primitive_result_skips_callback() {
        let record = observed(&[("a", Value::from(1))]);
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let source = record.clone();
        let _watcher = Watcher::new(
            None,
            WatchSource::getter(move || Ok(Value::from(source.get("a").as_number() > Some(0.0)))),
            Some(Rc::new(move |_: &Value, _: &Value| {
                counter.set(counter.get() + 1);
                Ok(())
            })),
            WatcherOptions::default().sync(),
        );

        record.set("a", 2);
        assert_eq!(calls.get(), 0);
        record.set("a", -1);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn user_watcher_fires_on_unchanged_result() {
        let record = observed(&[("a", Value::from(1))]);
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let source = record.clone();
        let _watcher = Watcher::new(
            None,
            WatchSource::getter(move || Ok(Value::from(source.get("a").as_number() > Some(0.0)))),
            Some(Rc::new(move |_: &Value, _: &Value| {
                counter.set(counter.get() + 1);
                Ok(())
            })),
            WatcherOptions::default().sync().user(),
        );

        record.set("a", 2);
        assert_eq!(calls.get(), 1);
        record.set("a", 3);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn nan_result_fires_every_time() {
        let record = observed(&[("a", Value::from(1))]);
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let source = record.clone();
        let _watcher = Watcher::new(
            None,
            WatchSource::getter(move || {
                source.get("a");
                Ok(Value::Number(f64::NAN))
            }),
            Some(Rc::new(move |_: &Value, _: &Value| {
                counter.set(counter.get() + 1);
                Ok(())
            })),
            WatcherOptions::default().sync(),
        );

        record.set("a", 2);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn lazy_watcher_defers_until_evaluated() {
        let record = observed(&[("a", Value::from(1))]);
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let source = record.clone();
        let watcher = Watcher::new(
            None,
            WatchSource::getter(move || {
                counter.set(counter.get() + 1);
                Ok(source.get("a"))
            }),
            None,
            WatcherOptions::default().lazy(),
        );

        assert_eq!(runs.get(), 0);
        assert!(watcher.dirty());

        watcher.evaluate();
        assert_eq!(runs.get(), 1);
        assert_eq!(watcher.value(), Value::from(1));

        record.set("a", 2);
        assert!(watcher.dirty());
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn deep_watcher_sees_nested_writes() {
        let inner: Record = [("x", 1)].into_iter().collect();
        let record = observed(&[("inner", Value::from(inner.clone()))]);
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let source = record.clone();
        let _watcher = Watcher::new(
            None,
            WatchSource::getter(move || Ok(source.get("inner"))),
            Some(Rc::new(move |_: &Value, _: &Value| {
                counter.set(counter.get() + 1);
                Ok(())
            })),
            WatcherOptions::default().sync().deep(),
        );

        inner.set("x", 2);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn getter_error_is_reported_and_yields_undefined() {
        let reported = Rc::new(RefCell::new(Vec::new()));
        let log = reported.clone();
        config::set_error_handler(move |err| log.borrow_mut().push(err.to_string()));

        let watcher = Watcher::new(
            None,
            WatchSource::getter(|| Err("boom".into())),
            None,
            WatcherOptions::default().label("exploding"),
        );

        assert_eq!(watcher.value(), Value::Undefined);
        let reported = reported.borrow();
        assert_eq!(reported.len(), 1);
        assert!(reported[0].contains("exploding"));
        assert!(reported[0].contains("boom"));
    }

    #[test]
    fn teardown_unsubscribes_and_is_idempotent() {
        let record = observed(&[("a", Value::from(1))]);
        let source = record.clone();
        let watcher = Watcher::new(
            None,
            WatchSource::getter(move || Ok(source.get("a"))),
            None,
            WatcherOptions::default(),
        );
        let dep = record.field_dep("a").expect("reactive");
        assert!(dep.has_subscriber(watcher.id()));

        watcher.teardown();
        watcher.teardown();

        assert!(!watcher.is_active());
        assert_eq!(dep.subscriber_count(), 0);
        assert_eq!(watcher.dep_count(), 0);
    }

    #[test]
    fn dropping_last_handle_unsubscribes() {
        let record = observed(&[("a", Value::from(1))]);
        let source = record.clone();
        let watcher = Watcher::new(
            None,
            WatchSource::getter(move || Ok(source.get("a"))),
            None,
            WatcherOptions::default(),
        );
        let id = watcher.id();
        drop(watcher);

        assert!(!record.field_dep("a").expect("reactive").has_subscriber(id));
        assert!(Runtime::lookup(id).is_none());
    }

    #[test]
    fn depend_forwards_deps_to_running_watcher() {
        let record = observed(&[("a", Value::from(1))]);
        let source = record.clone();
        let lazy = Watcher::new(
            None,
            WatchSource::getter(move || Ok(source.get("a"))),
            None,
            WatcherOptions::default().lazy(),
        );
        lazy.evaluate();

        let forwarded = lazy.clone();
        let outer = Watcher::new(
            None,
            WatchSource::getter(move || {
                forwarded.depend();
                Ok(forwarded.value())
            }),
            None,
            WatcherOptions::default(),
        );

        assert!(outer.depends_on(&record.field_dep("a").expect("reactive")));
    }

    #[test]
    fn path_syntax_is_validated() {
        assert_eq!(
            parse_path("user.items.0"),
            Some(vec!["user".to_string(), "items".to_string(), "0".to_string()])
        );
        assert_eq!(parse_path("$refs.x_1"), Some(vec!["$refs".to_string(), "x_1".to_string()]));
        assert!(parse_path("a[0]").is_none());
        assert!(parse_path("a + b").is_none());
    }

    #[test]
    fn invalid_path_warns_and_yields_undefined() {
        let warnings = Rc::new(RefCell::new(Vec::new()));
        let log = warnings.clone();
        config::set_warn_handler(move |msg| log.borrow_mut().push(msg.to_string()));

        let watcher = Watcher::new(None, WatchSource::path("a()"), None, WatcherOptions::default());

        assert_eq!(watcher.value(), Value::Undefined);
        assert!(warnings.borrow()[0].starts_with("Failed watching path"));
    }
}
