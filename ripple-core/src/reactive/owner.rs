//! Owners
//!
//! An [`Owner`] is the component instance the reactive core serves. It owns
//! the root data record, the props record, every watcher created on its
//! behalf, its computed values and its lifecycle hooks.
//!
//! # Lifecycle
//!
//! ```text
//! new ─► init_props ─► computed / watch ─► mount ─► (updates) ─► destroy
//!                                           │
//!                                    BeforeMount, Mounted
//! ```
//!
//! Updates happen through the render watcher: the scheduler calls
//! `BeforeUpdate` right before it re-runs and `Updated` after the flush.
//! `destroy` tears down every watcher, so nothing the owner created keeps
//! reacting afterwards.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use super::context::{untracked, ReactiveContext};
use super::observer::{define_reactive, observe, ObservingGuard};
use super::record::{CustomSetter, Record};
use super::value::Value;
use super::watcher::{BeforeHook, Callback, Getter, WatchSource, Watcher, WatcherOptions};
use super::WatcherId;
use crate::error::{handle_error, warn, Phase, ReactiveError, UserResult};
use crate::scheduler;

/// Lifecycle hooks that touch the reactive contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    BeforeMount,
    Mounted,
    BeforeUpdate,
    Updated,
    Activated,
    Deactivated,
    BeforeDestroy,
    Destroyed,
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Hook::BeforeMount => "beforeMount",
            Hook::Mounted => "mounted",
            Hook::BeforeUpdate => "beforeUpdate",
            Hook::Updated => "updated",
            Hook::Activated => "activated",
            Hook::Deactivated => "deactivated",
            Hook::BeforeDestroy => "beforeDestroy",
            Hook::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

/// A lifecycle hook handler.
pub type HookHandler = Rc<dyn Fn(&Owner) -> UserResult<()>>;

/// Handle to a component instance. Cloning yields another handle.
#[derive(Clone)]
pub struct Owner {
    inner: Rc<OwnerInner>,
}

pub(crate) struct OwnerInner {
    name: String,
    parent: Option<Weak<OwnerInner>>,
    children: RefCell<Vec<Weak<OwnerInner>>>,
    data: Record,
    props: Record,

    watchers: RefCell<Vec<Watcher>>,
    render_watcher: RefCell<Option<Watcher>>,
    computed: RefCell<IndexMap<String, Computed>>,
    hooks: RefCell<HashMap<Hook, Vec<HookHandler>>>,

    mounted: Cell<bool>,
    /// `None` until the owner is first activated or deactivated.
    inactive: Cell<Option<bool>>,
    direct_inactive: Cell<bool>,
    being_destroyed: Cell<bool>,
    destroyed: Cell<bool>,
    updating_props: Cell<bool>,
}

impl Owner {
    /// Create a root owner. `data` is observed as root data.
    pub fn new(name: impl Into<String>, data: Record) -> Self {
        Self::build(name.into(), None, data)
    }

    /// Create a child of `parent`.
    pub fn child(parent: &Owner, name: impl Into<String>, data: Record) -> Self {
        let child = Self::build(name.into(), Some(parent), data);
        parent
            .inner
            .children
            .borrow_mut()
            .push(Rc::downgrade(&child.inner));
        child
    }

    /// Create a root owner whose data comes from a factory.
    ///
    /// The factory runs untracked. If it fails, the error is reported and
    /// the owner starts with empty data.
    pub fn from_data_fn<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: FnOnce() -> UserResult<Record>,
    {
        let name = name.into();
        let data = untracked(factory).unwrap_or_else(|source| {
            handle_error(&ReactiveError::user(Phase::DataFactory, name.clone(), source));
            Record::new()
        });
        Self::build(name, None, data)
    }

    fn build(name: String, parent: Option<&Owner>, data: Record) -> Self {
        observe(&Value::from(data.clone()), true);
        tracing::debug!(owner = %name, "owner created");
        Self {
            inner: Rc::new(OwnerInner {
                name,
                parent: parent.map(Owner::downgrade),
                children: RefCell::new(Vec::new()),
                data,
                props: Record::new(),
                watchers: RefCell::new(Vec::new()),
                render_watcher: RefCell::new(None),
                computed: RefCell::new(IndexMap::new()),
                hooks: RefCell::new(HashMap::new()),
                mounted: Cell::new(false),
                inactive: Cell::new(None),
                direct_inactive: Cell::new(false),
                being_destroyed: Cell::new(false),
                destroyed: Cell::new(false),
                updating_props: Cell::new(false),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<OwnerInner> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn from_weak(weak: &Weak<OwnerInner>) -> Option<Owner> {
        weak.upgrade().map(|inner| Owner { inner })
    }

    // ------------------------------------------------------------------------
    // Props
    // ------------------------------------------------------------------------

    /// Define the initial props as reactive fields.
    ///
    /// On a child owner, prop values are not deep-observed (the parent owns
    /// them) and writing a prop directly warns.
    pub fn init_props<K, V, I>(&self, props: I)
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let is_root = self.is_root();
        let _paused = (!is_root).then(ObservingGuard::pause);
        for (key, value) in props {
            let key = key.into();
            let setter = (!is_root).then(|| self.prop_mutation_warning(&key));
            define_reactive(&self.inner.props, key, value.into(), setter, false);
        }
    }

    fn prop_mutation_warning(&self, key: &str) -> CustomSetter {
        let owner = self.downgrade();
        let key = key.to_string();
        Rc::new(move || {
            let Some(owner) = Owner::from_weak(&owner) else {
                return;
            };
            if !owner.inner.updating_props.get() {
                warn(format!(
                    "Avoid mutating a prop directly since the value will be overwritten \
                     whenever the parent re-renders. Prop being mutated: \"{key}\" in <{}>",
                    owner.name()
                ));
            }
        })
    }

    /// Parent-driven prop update.
    pub fn update_props<K, V, I>(&self, props: I)
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.inner.updating_props.set(true);
        {
            let _paused = ObservingGuard::pause();
            for (key, value) in props {
                self.inner.props.set(key, value);
            }
        }
        self.inner.updating_props.set(false);
    }

    // ------------------------------------------------------------------------
    // Computed values and watchers
    // ------------------------------------------------------------------------

    /// Define a cached value derived from reactive state.
    ///
    /// A name that clashes with data or a prop warns and is not reachable
    /// through [`Owner::lookup`].
    pub fn computed<F>(&self, name: impl Into<String>, getter: F) -> Computed
    where
        F: Fn() -> UserResult<Value> + 'static,
    {
        let name = name.into();
        let clash = if self.inner.data.has_own(&name) {
            Some("data")
        } else if self.inner.props.has_own(&name) {
            Some("a prop")
        } else {
            None
        };

        let computed = Computed::build(Some(self), Some(&name), Rc::new(getter));
        match clash {
            Some(place) => warn(format!(
                "The computed property \"{name}\" is already defined as {place} in <{}>.",
                self.name()
            )),
            None => {
                self.inner.computed.borrow_mut().insert(name, computed.clone());
            }
        }
        computed
    }

    /// Watch a path or getter and call `callback(new, old)` on change.
    pub fn watch<F>(
        &self,
        source: impl Into<WatchSource>,
        callback: F,
        options: WatchOptions,
    ) -> Unwatch
    where
        F: Fn(&Value, &Value) -> UserResult<()> + 'static,
    {
        let callback: Callback = Rc::new(callback);
        let mut watcher_options = WatcherOptions::default().user();
        watcher_options.deep = options.deep;
        watcher_options.sync = options.sync;

        let watcher = Watcher::new(
            Some(self),
            source.into(),
            Some(callback.clone()),
            watcher_options,
        );

        if options.immediate {
            let value = watcher.value();
            if let Err(source) = untracked(|| callback(&value, &Value::Undefined)) {
                handle_error(&ReactiveError::user(
                    Phase::ImmediateCallback,
                    watcher.expression(),
                    source,
                ));
            }
        }
        Unwatch { watcher }
    }

    /// Resolve a top-level name: data first, then props, then computed.
    pub fn lookup(&self, key: &str) -> Value {
        if self.inner.data.has_own(key) {
            return self.inner.data.get(key);
        }
        if self.inner.props.has_own(key) {
            return self.inner.props.get(key);
        }
        let computed = self.inner.computed.borrow().get(key).cloned();
        computed.map_or(Value::Undefined, |computed| computed.get())
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Register a hook handler.
    pub fn on<F>(&self, hook: Hook, handler: F)
    where
        F: Fn(&Owner) -> UserResult<()> + 'static,
    {
        self.inner
            .hooks
            .borrow_mut()
            .entry(hook)
            .or_default()
            .push(Rc::new(handler));
    }

    /// Run every handler of `hook`, untracked. A failing handler is reported
    /// and the remaining handlers still run.
    pub fn call_hook(&self, hook: Hook) {
        let handlers = self.inner.hooks.borrow().get(&hook).cloned().unwrap_or_default();
        if handlers.is_empty() {
            return;
        }
        let _ctx = ReactiveContext::untracked();
        for handler in handlers {
            if let Err(source) = handler(self) {
                handle_error(&ReactiveError::user(Phase::Hook(hook), self.name(), source));
            }
        }
    }

    /// Create the render watcher and mark the owner mounted.
    pub fn mount<F>(&self, render: F) -> Watcher
    where
        F: Fn() -> UserResult<Value> + 'static,
    {
        self.call_hook(Hook::BeforeMount);

        let owner = self.downgrade();
        let before: BeforeHook = Rc::new(move || {
            if let Some(owner) = Owner::from_weak(&owner) {
                if owner.is_mounted() && !owner.is_destroyed() {
                    owner.call_hook(Hook::BeforeUpdate);
                }
            }
        });
        let watcher = Watcher::new_render(self, Rc::new(render), before);

        self.inner.mounted.set(true);
        self.call_hook(Hook::Mounted);
        watcher
    }

    /// Queue the render watcher even though nothing it read changed.
    pub fn force_update(&self) {
        if let Some(watcher) = self.render_watcher() {
            watcher.update();
        }
    }

    /// Bring a cached owner back. When mounted, the `Activated` hooks run
    /// after the next flush; otherwise right away.
    pub fn activate(&self) {
        if self.is_mounted() {
            self.inner.inactive.set(Some(false));
            scheduler::queue_activated(self);
        } else {
            self.activate_tree(true);
        }
    }

    pub(crate) fn run_queued_activation(&self) {
        self.inner.inactive.set(Some(true));
        self.activate_tree(true);
    }

    fn activate_tree(&self, direct: bool) {
        if direct {
            self.inner.direct_inactive.set(false);
            if self.in_inactive_tree() {
                return;
            }
        } else if self.inner.direct_inactive.get() {
            return;
        }
        if self.inner.inactive.get() != Some(false) {
            self.inner.inactive.set(Some(false));
            for child in self.children() {
                child.activate_tree(false);
            }
            self.call_hook(Hook::Activated);
        }
    }

    /// Put the owner (and its subtree) into the cache.
    pub fn deactivate(&self) {
        self.deactivate_tree(true);
    }

    fn deactivate_tree(&self, direct: bool) {
        if direct {
            self.inner.direct_inactive.set(true);
            if self.in_inactive_tree() {
                return;
            }
        }
        if self.inner.inactive.get() != Some(true) {
            self.inner.inactive.set(Some(true));
            for child in self.children() {
                child.deactivate_tree(false);
            }
            self.call_hook(Hook::Deactivated);
        }
    }

    fn in_inactive_tree(&self) -> bool {
        let mut current = self.parent();
        while let Some(owner) = current {
            if owner.inner.inactive.get() == Some(true) {
                return true;
            }
            current = owner.parent();
        }
        false
    }

    /// Tear everything down. Idempotent.
    pub fn destroy(&self) {
        if self.inner.being_destroyed.get() {
            return;
        }
        self.call_hook(Hook::BeforeDestroy);
        self.inner.being_destroyed.set(true);

        if let Some(parent) = self.parent() {
            if !parent.is_being_destroyed() {
                parent.remove_child(self);
            }
        }

        let render = self.inner.render_watcher.borrow().clone();
        if let Some(render) = render {
            render.teardown();
        }
        let watchers = std::mem::take(&mut *self.inner.watchers.borrow_mut());
        for watcher in &watchers {
            watcher.teardown();
        }
        self.inner.computed.borrow_mut().clear();

        if let Some(observer) = self.inner.data.observer() {
            observer.release_root();
        }
        self.inner.destroyed.set(true);
        self.call_hook(Hook::Destroyed);
        tracing::debug!(owner = %self.inner.name, watchers = watchers.len(), "owner destroyed");
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The root data record.
    pub fn data(&self) -> &Record {
        &self.inner.data
    }

    pub fn props(&self) -> &Record {
        &self.inner.props
    }

    pub fn parent(&self) -> Option<Owner> {
        self.inner.parent.as_ref().and_then(Owner::from_weak)
    }

    pub fn children(&self) -> Vec<Owner> {
        self.inner
            .children
            .borrow()
            .iter()
            .filter_map(Owner::from_weak)
            .collect()
    }

    pub fn is_root(&self) -> bool {
        self.inner.parent.is_none()
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.mounted.get()
    }

    pub fn is_inactive(&self) -> bool {
        self.inner.inactive.get() == Some(true)
    }

    pub fn is_being_destroyed(&self) -> bool {
        self.inner.being_destroyed.get()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.get()
    }

    pub fn render_watcher(&self) -> Option<Watcher> {
        self.inner.render_watcher.borrow().clone()
    }

    /// Every live watcher created for this owner, render watcher included.
    pub fn watchers(&self) -> Vec<Watcher> {
        self.inner.watchers.borrow().clone()
    }

    pub fn ptr_eq(&self, other: &Owner) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn render_watcher_id(&self) -> Option<WatcherId> {
        self.inner.render_watcher.borrow().as_ref().map(Watcher::id)
    }

    pub(crate) fn set_render_watcher(&self, watcher: &Watcher) {
        *self.inner.render_watcher.borrow_mut() = Some(watcher.clone());
    }

    pub(crate) fn push_watcher(&self, watcher: Watcher) {
        self.inner.watchers.borrow_mut().push(watcher);
    }

    pub(crate) fn remove_watcher(&self, id: WatcherId) {
        let removed = {
            let mut watchers = self.inner.watchers.borrow_mut();
            watchers
                .iter()
                .position(|w| w.id() == id)
                .map(|index| watchers.remove(index))
        };
        drop(removed);
    }

    fn remove_child(&self, child: &Owner) {
        let target = Rc::as_ptr(&child.inner);
        self.inner
            .children
            .borrow_mut()
            .retain(|weak| !std::ptr::eq(weak.as_ptr(), target));
    }
}

impl fmt::Debug for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Owner")
            .field("name", &self.inner.name)
            .field("mounted", &self.is_mounted())
            .field("destroyed", &self.is_destroyed())
            .field("watchers", &self.inner.watchers.borrow().len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Computed
// ----------------------------------------------------------------------------

/// A cached derived value backed by a lazy watcher.
///
/// The getter runs on the first [`get`](Computed::get) and again only after
/// one of its dependencies changed. Reading a computed value inside another
/// computation makes that computation depend on the computed's own deps.
#[derive(Clone)]
pub struct Computed {
    watcher: Watcher,
}

impl Computed {
    /// A computed value that belongs to no owner.
    pub fn new<F>(getter: F) -> Self
    where
        F: Fn() -> UserResult<Value> + 'static,
    {
        Self::build(None, None, Rc::new(getter))
    }

    fn build(owner: Option<&Owner>, name: Option<&str>, getter: Getter) -> Self {
        let mut options = WatcherOptions::default().lazy();
        if let Some(name) = name {
            options = options.label(name);
        }
        Self {
            watcher: Watcher::new(owner, WatchSource::Getter(getter), None, options),
        }
    }

    pub fn get(&self) -> Value {
        if self.watcher.dirty() {
            self.watcher.evaluate();
        }
        if ReactiveContext::is_tracking() {
            self.watcher.depend();
        }
        self.watcher.value()
    }

    pub fn is_dirty(&self) -> bool {
        self.watcher.dirty()
    }

    pub fn watcher(&self) -> &Watcher {
        &self.watcher
    }
}

impl fmt::Debug for Computed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("expression", &self.watcher.expression())
            .field("dirty", &self.watcher.dirty())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Watch
// ----------------------------------------------------------------------------

/// Options for [`Owner::watch`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WatchOptions {
    pub deep: bool,
    /// Call the callback once right away with `(value, Undefined)`.
    pub immediate: bool,
    pub sync: bool,
}

/// Handle returned by [`Owner::watch`].
#[derive(Debug, Clone)]
pub struct Unwatch {
    watcher: Watcher,
}

impl Unwatch {
    /// Stop watching.
    pub fn unwatch(&self) {
        self.watcher.teardown();
    }

    pub fn watcher(&self) -> &Watcher {
        &self.watcher
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
