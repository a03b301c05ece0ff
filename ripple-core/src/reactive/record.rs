//! Observable Records
//!
//! A [`Record`] is an insertion-ordered map of named fields. Before it is
//! observed it behaves like a plain map. Once observed, every field carries
//! its own [`Dep`] and the explicit accessors do the interception:
//!
//! - [`Record::get`] subscribes the running watcher to the field (and to
//!   the nested value's own observer, so that reassigning a nested object
//!   is tracked too).
//! - [`Record::set`] stores the value, observes it, and notifies the field.
//!
//! A key assigned with `set` that did not exist before stays a plain field
//! and is invisible to the dependency graph; use [`crate::reactive::set`] to
//! add a reactive field to an observed record.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::context::ReactiveContext;
use super::dep::Dep;
use super::observer::{depend_child, observe, Observer};
use super::value::Value;
use crate::error::warn;

/// Hook run before a reactive field is written. Used for misuse warnings.
pub type CustomSetter = Rc<dyn Fn()>;

/// Shared handle to a record of fields.
#[derive(Clone)]
pub struct Record {
    inner: Rc<RecordInner>,
}

struct RecordInner {
    fields: RefCell<IndexMap<String, Field>>,
    observer: RefCell<Option<Rc<Observer>>>,
    frozen: Cell<bool>,
}

/// One stored field.
pub(crate) struct Field {
    value: Value,
    reactive: Option<ReactiveSlot>,
}

struct ReactiveSlot {
    dep: Dep,
    shallow: bool,
    custom_setter: Option<CustomSetter>,
}

impl Field {
    fn plain(value: Value) -> Self {
        Self {
            value,
            reactive: None,
        }
    }

    pub(crate) fn reactive(
        value: Value,
        dep: Dep,
        shallow: bool,
        custom_setter: Option<CustomSetter>,
    ) -> Self {
        Self {
            value,
            reactive: Some(ReactiveSlot {
                dep,
                shallow,
                custom_setter,
            }),
        }
    }

    pub(crate) fn dep(&self) -> Option<&Dep> {
        self.reactive.as_ref().map(|slot| &slot.dep)
    }
}

impl Record {
    /// Create an empty, unobserved record.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RecordInner {
                fields: RefCell::new(IndexMap::new()),
                observer: RefCell::new(None),
                frozen: Cell::new(false),
            }),
        }
    }

    /// Read a field, subscribing the running watcher when it is reactive.
    ///
    /// Missing fields read as [`Value::Undefined`].
    pub fn get(&self, key: &str) -> Value {
        let (value, tracking) = {
            let fields = self.inner.fields.borrow();
            match fields.get(key) {
                None => return Value::Undefined,
                Some(field) => (
                    field.value.clone(),
                    field.reactive.as_ref().map(|slot| (slot.dep.clone(), slot.shallow)),
                ),
            }
        };

        if let Some((dep, shallow)) = tracking {
            if ReactiveContext::is_tracking() {
                dep.depend();
                if !shallow {
                    depend_child(&value);
                }
            }
        }
        value
    }

    /// Read a field without subscribing anyone.
    pub fn get_untracked(&self, key: &str) -> Value {
        self.inner
            .fields
            .borrow()
            .get(key)
            .map(|field| field.value.clone())
            .unwrap_or_default()
    }

    /// Assign a field.
    ///
    /// Reactive fields short-circuit when the new value is the same value
    /// as the current one (`NaN` included); otherwise they store, observe
    /// and notify. Unknown keys are stored as plain fields.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();

        if self.is_frozen() {
            warn(format!("Cannot assign \"{key}\" on a frozen record."));
            return;
        }

        let slot = {
            let mut fields = self.inner.fields.borrow_mut();
            match fields.get_mut(&key) {
                None => {
                    fields.insert(key, Field::plain(value));
                    return;
                }
                Some(field) => match &field.reactive {
                    None => {
                        field.value = value;
                        return;
                    }
                    Some(slot) => {
                        if field.value.same_value(&value) {
                            return;
                        }
                        (slot.dep.clone(), slot.shallow, slot.custom_setter.clone())
                    }
                },
            }
        };
        let (dep, shallow, custom_setter) = slot;

        if let Some(custom_setter) = custom_setter {
            custom_setter();
        }

        if let Some(field) = self.inner.fields.borrow_mut().get_mut(&key) {
            field.value = value.clone();
        }
        if !shallow {
            observe(&value, false);
        }
        dep.notify();
    }

    /// Whether the record has the key. Depends on the record's key set.
    pub fn contains_key(&self, key: &str) -> bool {
        self.depend_keys();
        self.has_own(key)
    }

    /// Field names in insertion order. Depends on the record's key set.
    pub fn keys(&self) -> Vec<String> {
        self.depend_keys();
        self.inner.fields.borrow().keys().cloned().collect()
    }

    /// Number of fields. Depends on the record's key set.
    pub fn len(&self) -> usize {
        self.depend_keys();
        self.inner.fields.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make the record non-extensible; `observe` will leave it alone.
    pub fn freeze(&self) -> Self {
        self.inner.frozen.set(true);
        self.clone()
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.frozen.get()
    }

    /// The record's observer, once observed.
    pub fn observer(&self) -> Option<Rc<Observer>> {
        self.inner.observer.borrow().clone()
    }

    /// Whether the field is wired into the dependency graph.
    pub fn is_reactive(&self, key: &str) -> bool {
        self.inner
            .fields
            .borrow()
            .get(key)
            .map_or(false, |field| field.reactive.is_some())
    }

    /// The dep of a reactive field.
    pub fn field_dep(&self, key: &str) -> Option<Dep> {
        self.inner.fields.borrow().get(key).and_then(|field| field.dep().cloned())
    }

    /// Whether two handles refer to the same record.
    pub fn ptr_eq(&self, other: &Record) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn ptr_key(&self) -> usize {
        Rc::as_ptr(&self.inner) as usize
    }

    /// Untracked key check.
    pub(crate) fn has_own(&self, key: &str) -> bool {
        self.inner.fields.borrow().contains_key(key)
    }

    pub(crate) fn install_observer(&self, observer: Rc<Observer>) {
        *self.inner.observer.borrow_mut() = Some(observer);
    }

    /// Replace (or add) a field, keeping its position if it existed.
    pub(crate) fn define_field(&self, key: String, field: Field) {
        self.inner.fields.borrow_mut().insert(key, field);
    }

    pub(crate) fn remove_field(&self, key: &str) -> Option<Field> {
        self.inner.fields.borrow_mut().shift_remove(key)
    }

    /// Untracked snapshot of every field.
    pub(crate) fn raw_entries(&self) -> Vec<(String, Value)> {
        self.inner
            .fields
            .borrow()
            .iter()
            .map(|(k, field)| (k.clone(), field.value.clone()))
            .collect()
    }

    fn depend_keys(&self) {
        if !ReactiveContext::is_tracking() {
            return;
        }
        if let Some(observer) = self.observer() {
            observer.dep().depend();
        }
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> FromIterator<(K, V)> for Record
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let record = Record::new();
        {
            let mut fields = record.inner.fields.borrow_mut();
            for (key, value) in iter {
                fields.insert(key.into(), Field::plain(value.into()));
            }
        }
        record
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<String> = self.inner.fields.borrow().keys().cloned().collect();
        f.debug_struct("Record")
            .field("keys", &keys)
            .field("observed", &self.observer().is_some())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
