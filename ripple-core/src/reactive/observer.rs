//! Observer
//!
//! The observer is what turns a plain [`Record`] or [`List`] into
//! observable state. It is attached to the collection at most once and
//! owns the collection-level [`Dep`], used for notifications that are not
//! about a single field: keys added or removed, list mutations, and nested
//! reassignment tracking.
//!
//! # Entry points
//!
//! - [`observe`] wraps a value (idempotent).
//! - [`define_reactive`] wires a single field.
//! - [`set`] / [`delete`] add and remove fields on already observed values.
//! - [`toggle_observing`] / [`ObservingGuard`] suspend auto-wrapping.

use std::cell::Cell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use super::dep::Dep;
use super::list::List;
use super::record::{CustomSetter, Field, Record};
use super::value::Value;
use crate::config;
use crate::error::warn;

/// Collection-level state attached to an observed value.
pub struct Observer {
    dep: Dep,
    vm_count: Cell<usize>,
}

impl Observer {
    fn new() -> Self {
        Self {
            dep: Dep::new(),
            vm_count: Cell::new(0),
        }
    }

    /// The collection-level dep.
    pub fn dep(&self) -> &Dep {
        &self.dep
    }

    /// How many owners use this value as their root data.
    pub fn vm_count(&self) -> usize {
        self.vm_count.get()
    }

    pub(crate) fn release_root(&self) {
        self.vm_count.set(self.vm_count.get().saturating_sub(1));
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("dep", &self.dep)
            .field("vm_count", &self.vm_count.get())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Observing toggle
// ----------------------------------------------------------------------------

thread_local! {
    static SHOULD_OBSERVE: Cell<bool> = Cell::new(true);
}

/// Enable or disable wrapping of newly seen values.
///
/// Already observed values are unaffected: `observe` still returns their
/// observer, and their fields stay reactive.
pub fn toggle_observing(enabled: bool) {
    SHOULD_OBSERVE.with(|flag| flag.set(enabled));
}

pub fn is_observing() -> bool {
    SHOULD_OBSERVE.with(Cell::get)
}

/// Scoped suspension of auto-wrapping. Restores the previous state on drop.
#[derive(Debug)]
pub struct ObservingGuard {
    previous: bool,
}

impl ObservingGuard {
    pub fn pause() -> Self {
        let previous = is_observing();
        toggle_observing(false);
        Self { previous }
    }
}

impl Drop for ObservingGuard {
    fn drop(&mut self) {
        let _ = SHOULD_OBSERVE.try_with(|flag| flag.set(self.previous));
    }
}

// ----------------------------------------------------------------------------
// Observation
// ----------------------------------------------------------------------------

/// Make a value observable, returning its observer.
///
/// Primitives, frozen collections, and (while observing is paused) values
/// that are not observed yet return `None`. Observing an observed value
/// returns its existing observer. With `as_root_data`, the observer's root
/// counter is bumped.
pub fn observe(value: &Value, as_root_data: bool) -> Option<Rc<Observer>> {
    let observer = match value {
        Value::Record(record) => observe_record(record),
        Value::List(list) => observe_list(list),
        _ => None,
    }?;
    if as_root_data {
        observer.vm_count.set(observer.vm_count.get() + 1);
    }
    Some(observer)
}

fn observe_record(record: &Record) -> Option<Rc<Observer>> {
    if let Some(existing) = record.observer() {
        return Some(existing);
    }
    if !can_observe(record.is_frozen()) {
        return None;
    }

    // Attach before walking so self-references find the observer.
    let observer = Rc::new(Observer::new());
    record.install_observer(observer.clone());
    for (key, value) in record.raw_entries() {
        define_reactive(record, key, value, None, false);
    }
    tracing::debug!(dep = observer.dep.id().raw(), "observed record");
    Some(observer)
}

fn observe_list(list: &List) -> Option<Rc<Observer>> {
    if let Some(existing) = list.observer() {
        return Some(existing);
    }
    if !can_observe(list.is_frozen()) {
        return None;
    }

    let observer = Rc::new(Observer::new());
    list.install_observer(observer.clone());
    for item in list.raw_items() {
        observe(&item, false);
    }
    tracing::debug!(dep = observer.dep.id().raw(), "observed list");
    Some(observer)
}

fn can_observe(frozen: bool) -> bool {
    if !is_observing() {
        return false;
    }
    if frozen {
        if config::with(|c| c.warn_on_frozen) {
            warn("Cannot observe a frozen value; it will not be reactive.");
        }
        tracing::debug!("skipping frozen value");
        return false;
    }
    true
}

/// Wire one field of `target` into the dependency graph.
///
/// Replaces any existing field of the same name, keeping its position.
/// Unless `shallow`, the value itself is observed and reads of the field
/// also depend on the value's own observer.
pub fn define_reactive(
    target: &Record,
    key: impl Into<String>,
    value: Value,
    custom_setter: Option<CustomSetter>,
    shallow: bool,
) {
    let key = key.into();
    if target.is_frozen() {
        warn(format!("Cannot define reactive field \"{key}\" on a frozen record."));
        return;
    }
    if !shallow {
        observe(&value, false);
    }
    target.define_field(key, Field::reactive(value, Dep::new(), shallow, custom_setter));
}

/// Subscribe the running watcher to a value's own observer, and for lists
/// to every nested element observer.
pub(crate) fn depend_child(value: &Value) {
    let Some(observer) = value.observer() else {
        return;
    };
    observer.dep.depend();
    if let Value::List(list) = value {
        depend_array(list, &mut HashSet::new());
    }
}

fn depend_array(list: &List, seen: &mut HashSet<usize>) {
    if !seen.insert(list.ptr_key()) {
        return;
    }
    for item in list.raw_items() {
        if let Some(observer) = item.observer() {
            observer.dep.depend();
        }
        if let Value::List(nested) = &item {
            depend_array(nested, seen);
        }
    }
}

// ----------------------------------------------------------------------------
// Explicit mutation helpers
// ----------------------------------------------------------------------------

/// Key for [`set`] and [`delete`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Field(String),
    Index(usize),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Field(name) => f.write_str(name),
            Key::Index(index) => write!(f, "{index}"),
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Field(name.to_string())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Field(name)
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

/// Set a field or element so that it participates in reactivity.
///
/// On an observed record a new key becomes a reactive field and the record
/// notifies; an existing key is simply assigned. On a list an index write
/// goes through [`List::set_index`]. Returns the value written.
pub fn set(target: &Value, key: impl Into<Key>, value: impl Into<Value>) -> Value {
    let key = key.into();
    let value = value.into();

    match (target, key) {
        (Value::List(list), Key::Index(index)) => {
            list.set_index(index, value.clone());
        }
        (Value::Record(record), key) => set_field(record, key.to_string(), value.clone()),
        (Value::List(_), Key::Field(name)) => {
            warn(format!("Cannot set non-index key \"{name}\" on a list."));
        }
        (other, key) => {
            warn(format!(
                "Cannot set reactive property \"{key}\" on a {} value.",
                other.type_name()
            ));
        }
    }
    value
}

fn set_field(record: &Record, key: String, value: Value) {
    if record.has_own(&key) {
        record.set(key, value);
        return;
    }
    if record.is_frozen() {
        warn(format!("Cannot add property \"{key}\" to a frozen record."));
        return;
    }
    let Some(observer) = record.observer() else {
        record.set(key, value);
        return;
    };
    if observer.vm_count() > 0 {
        warn(format!(
            "Avoid adding reactive property \"{key}\" to root data at runtime; declare it upfront."
        ));
        return;
    }
    define_reactive(record, key, value, None, false);
    observer.dep.notify();
}

/// Delete a field or element and notify dependents.
///
/// The field is removed first; then its own dep and the record's dep are
/// notified, so anything that read the field or enumerated the record
/// re-runs against the new shape.
pub fn delete(target: &Value, key: impl Into<Key>) {
    match (target, key.into()) {
        (Value::List(list), Key::Index(index)) => {
            list.splice(index, 1, Vec::new());
        }
        (Value::Record(record), key) => delete_field(record, &key.to_string()),
        (other, key) => {
            warn(format!(
                "Cannot delete reactive property \"{key}\" on a {} value.",
                other.type_name()
            ));
        }
    }
}

fn delete_field(record: &Record, key: &str) {
    let observer = record.observer();
    if observer.as_ref().map_or(false, |ob| ob.vm_count() > 0) {
        warn(format!(
            "Avoid deleting property \"{key}\" from root data; set it to null instead."
        ));
        return;
    }
    if record.is_frozen() {
        warn(format!("Cannot delete \"{key}\" from a frozen record."));
        return;
    }
    let Some(removed) = record.remove_field(key) else {
        return;
    };
    if let Some(dep) = removed.dep() {
        dep.notify();
    }
    if let Some(observer) = observer {
        observer.dep.notify();
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{WatchSource, Watcher, WatcherOptions};

    fn record_of(pairs: &[(&str, i32)]) -> Record {
        pairs.iter().map(|(k, v)| (*k, *v)).collect()
    }

    fn sync_counter(f: impl Fn() -> Value + 'static) -> (Watcher, Rc<Cell<usize>>) {
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let watcher = Watcher::new(
            None,
            WatchSource::getter(move || {
                counter.set(counter.get() + 1);
                Ok(f())
            }),
            None,
            WatcherOptions::default().sync(),
        );
        (watcher, runs)
    }

    #[test]
    fn primitives_are_not_observable() {
        assert!(observe(&Value::from(1), false).is_none());
        assert!(observe(&Value::from("s"), false).is_none());
        assert!(observe(&Value::Null, false).is_none());
    }

    #[test]
    fn observe_is_idempotent() {
        let value = Value::from(record_of(&[("a", 1)]));
        let first = observe(&value, false).expect("observable");
        let dep_before = value.as_record().and_then(|r| r.field_dep("a")).expect("reactive");

        let second = observe(&value, false).expect("observable");

        assert!(Rc::ptr_eq(&first, &second));
        let dep_after = value.as_record().and_then(|r| r.field_dep("a")).expect("reactive");
        assert!(dep_before.ptr_eq(&dep_after));
    }

    #[test]
    fn frozen_values_are_skipped() {
        let record = record_of(&[("a", 1)]).freeze();
        assert!(observe(&Value::from(record.clone()), false).is_none());
        assert!(!record.is_reactive("a"));
    }

    #[test]
    fn root_data_counts_owners() {
        let value = Value::from(record_of(&[("a", 1)]));
        observe(&value, true);
        let observer = observe(&value, true).expect("observable");
        assert_eq!(observer.vm_count(), 2);
        observer.release_root();
        assert_eq!(observer.vm_count(), 1);
    }

    #[test]
    fn self_referencing_record_observes_once() {
        let record = record_of(&[("n", 1)]);
        record.set("me", record.clone());

        let observer = observe(&Value::from(record.clone()), false).expect("observable");
        assert!(record.is_reactive("me"));
        assert!(Rc::ptr_eq(&observer, &record.observer().expect("observed")));
    }

    #[test]
    fn paused_observing_leaves_new_values_plain() {
        let record = record_of(&[("a", 1)]);
        {
            let _guard = ObservingGuard::pause();
            assert!(!is_observing());
            assert!(observe(&Value::from(record.clone()), false).is_none());
        }
        assert!(is_observing());
        assert!(observe(&Value::from(record), false).is_some());
    }

    #[test]
    fn paused_observing_still_returns_existing_observer() {
        let value = Value::from(record_of(&[("a", 1)]));
        observe(&value, false);
        toggle_observing(false);
        assert!(observe(&value, false).is_some());
        toggle_observing(true);
    }

    #[test]
    fn set_adds_reactive_field_and_notifies() {
        let record = record_of(&[("a", 1)]);
        let value = Value::from(record.clone());
        observe(&value, false);

        let source = record.clone();
        let (_watcher, runs) = sync_counter(move || Value::from(source.keys().len()));

        set(&value, "b", 2);
        assert_eq!(runs.get(), 2);
        assert!(record.is_reactive("b"));

        // Existing key: plain assignment through the field dep.
        set(&value, "b", 3);
        assert_eq!(runs.get(), 2);
        assert_eq!(record.get("b"), Value::from(3));
    }

    #[test]
    fn plain_assignment_of_new_key_is_invisible() {
        let record = record_of(&[("a", 1)]);
        observe(&Value::from(record.clone()), false);

        let source = record.clone();
        let (_watcher, runs) = sync_counter(move || source.get("late"));

        record.set("late", 1);
        assert_eq!(runs.get(), 1);
        assert!(!record.is_reactive("late"));
    }

    #[test]
    fn set_on_unobserved_record_is_plain() {
        let record = record_of(&[]);
        set(&Value::from(record.clone()), "a", 1);
        assert_eq!(record.get("a"), Value::from(1));
        assert!(!record.is_reactive("a"));
    }

    #[test]
    fn set_refuses_root_data() {
        let value = Value::from(record_of(&[("a", 1)]));
        observe(&value, true);
        set(&value, "b", 2);
        assert!(!value.as_record().map_or(false, |r| r.has_own("b")));
    }

    #[test]
    fn set_on_frozen_record_does_not_notify() {
        let record = record_of(&[("a", 1)]);
        observe(&Value::from(record.clone()), false);
        record.freeze();

        let enumerator = record.clone();
        let (_watcher, runs) = sync_counter(move || Value::from(enumerator.len()));

        set(&Value::from(record.clone()), "b", 2);
        assert_eq!(runs.get(), 1);
        assert!(!record.has_own("b"));
    }

    #[test]
    fn set_on_primitive_returns_value() {
        let written = set(&Value::from(3), "a", 4);
        assert_eq!(written, Value::from(4));
    }

    #[test]
    fn set_list_index_notifies() {
        let list: List = vec![1, 2].into_iter().collect();
        let value = Value::from(list.clone());
        observe(&value, false);

        let source = list.clone();
        let (_watcher, runs) = sync_counter(move || source.get(0));

        set(&value, 0usize, 10);
        assert_eq!(runs.get(), 2);
        assert_eq!(list.get(0), Value::from(10));
    }

    #[test]
    fn delete_notifies_field_and_record() {
        let record = record_of(&[("a", 1), ("b", 2)]);
        let value = Value::from(record.clone());
        observe(&value, false);

        let reader = record.clone();
        let (_field_watcher, field_runs) = sync_counter(move || reader.get("a"));
        let enumerator = record.clone();
        let (_keys_watcher, keys_runs) = sync_counter(move || Value::from(enumerator.len()));

        delete(&value, "a");

        assert_eq!(field_runs.get(), 2);
        assert_eq!(keys_runs.get(), 2);
        assert_eq!(record.get("a"), Value::Undefined);

        // Deleting a missing key does nothing.
        delete(&value, "a");
        assert_eq!(keys_runs.get(), 2);
    }

    #[test]
    fn delete_list_index_splices() {
        let list: List = vec![1, 2, 3].into_iter().collect();
        let value = Value::from(list.clone());
        delete(&value, 1usize);
        assert_eq!(list.to_vec(), vec![Value::from(1), Value::from(3)]);
    }

    #[test]
    fn shallow_field_skips_child_observation() {
        let record = Record::new();
        let child = record_of(&[("x", 1)]);
        define_reactive(&record, "child", Value::from(child.clone()), None, true);
        assert!(child.observer().is_none());
        assert!(record.is_reactive("child"));
    }

    #[test]
    fn nested_list_elements_are_depended() {
        let inner = record_of(&[("x", 1)]);
        let list: List = vec![Value::from(inner.clone())].into_iter().collect();
        let holder = Record::new();
        holder.set("items", list);
        observe(&Value::from(holder.clone()), false);

        let source = holder.clone();
        let (watcher, _) = sync_counter(move || source.get("items"));

        let inner_ob = inner.observer().expect("observed");
        assert!(inner_ob.dep().has_subscriber(watcher.id()));
    }
}
