//! Observable Lists
//!
//! A [`List`] is an ordered sequence of values. Lists are not instrumented
//! per index: an observed list has one [`Dep`](super::Dep) on its observer,
//! every read method depends on it, and every mutator notifies it exactly
//! once, however many indices it touched. Elements inserted by a mutator
//! are observed as they go in.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use super::context::ReactiveContext;
use super::observer::{observe, Observer};
use super::value::Value;
use crate::error::warn;

/// Shared handle to a list of values.
#[derive(Clone)]
pub struct List {
    inner: Rc<ListInner>,
}

struct ListInner {
    items: RefCell<Vec<Value>>,
    observer: RefCell<Option<Rc<Observer>>>,
    frozen: Cell<bool>,
}

impl List {
    /// Create an empty, unobserved list.
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    pub fn from_vec(items: Vec<Value>) -> Self {
        Self {
            inner: Rc::new(ListInner {
                items: RefCell::new(items),
                observer: RefCell::new(None),
                frozen: Cell::new(false),
            }),
        }
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    pub fn len(&self) -> usize {
        self.depend();
        self.inner.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at `index`, or `Undefined` past the end.
    pub fn get(&self, index: usize) -> Value {
        self.depend();
        self.get_untracked(index)
    }

    pub fn get_untracked(&self, index: usize) -> Value {
        self.inner
            .items
            .borrow()
            .get(index)
            .cloned()
            .unwrap_or_default()
    }

    /// Snapshot of every element.
    pub fn to_vec(&self) -> Vec<Value> {
        self.depend();
        self.raw_items()
    }

    // ------------------------------------------------------------------------
    // Mutators
    // ------------------------------------------------------------------------

    /// Append a value, returning the new length.
    pub fn push(&self, value: impl Into<Value>) -> usize {
        let value = value.into();
        self.mutate("push", |items| {
            items.push(value.clone());
            (items.len(), vec![value])
        })
        .unwrap_or_else(|| self.len_untracked())
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Option<Value> {
        self.mutate("pop", |items| (items.pop(), Vec::new())).flatten()
    }

    /// Remove and return the first element.
    pub fn shift(&self) -> Option<Value> {
        self.mutate("shift", |items| {
            let first = (!items.is_empty()).then(|| items.remove(0));
            (first, Vec::new())
        })
        .flatten()
    }

    /// Prepend a value, returning the new length.
    pub fn unshift(&self, value: impl Into<Value>) -> usize {
        let value = value.into();
        self.mutate("unshift", |items| {
            items.insert(0, value.clone());
            (items.len(), vec![value])
        })
        .unwrap_or_else(|| self.len_untracked())
    }

    /// Insert at `index`, clamped to the current length.
    pub fn insert(&self, index: usize, value: impl Into<Value>) {
        let value = value.into();
        self.mutate("insert", |items| {
            let index = index.min(items.len());
            items.insert(index, value.clone());
            ((), vec![value])
        });
    }

    /// Remove and return the element at `index`.
    pub fn remove(&self, index: usize) -> Option<Value> {
        self.mutate("remove", |items| {
            let removed = (index < items.len()).then(|| items.remove(index));
            (removed, Vec::new())
        })
        .flatten()
    }

    /// Remove `delete_count` elements from `start` and insert `items` in
    /// their place. Returns the removed elements.
    pub fn splice<I>(&self, start: usize, delete_count: usize, items: I) -> Vec<Value>
    where
        I: IntoIterator<Item = Value>,
    {
        let inserted: Vec<Value> = items.into_iter().collect();
        self.mutate("splice", |current| {
            let start = start.min(current.len());
            let end = start.saturating_add(delete_count).min(current.len());
            let removed = current
                .splice(start..end, inserted.iter().cloned())
                .collect();
            (removed, inserted.clone())
        })
        .unwrap_or_default()
    }

    /// Shorten the list to `len` elements.
    pub fn truncate(&self, len: usize) {
        self.mutate("truncate", |items| {
            items.truncate(len);
            ((), Vec::new())
        });
    }

    /// Sort with a comparator.
    ///
    /// Sorting happens on a copy, so the comparator may read the list
    /// without a borrow conflict and a panicking comparator leaves it intact.
    pub fn sort_by<F>(&self, compare: F)
    where
        F: FnMut(&Value, &Value) -> Ordering,
    {
        if self.reject_frozen("sort") {
            return;
        }
        let mut items = self.raw_items();
        items.sort_by(compare);
        *self.inner.items.borrow_mut() = items;
        self.notify("sort", &[]);
    }

    pub fn reverse(&self) {
        self.mutate("reverse", |items| {
            items.reverse();
            ((), Vec::new())
        });
    }

    /// Write `value` at `index`, growing the list with `Undefined` when the
    /// index is past the end. One notification.
    pub fn set_index(&self, index: usize, value: impl Into<Value>) {
        let value = value.into();
        self.mutate("set", |items| {
            if index < items.len() {
                items[index] = value.clone();
            } else {
                items.resize(index, Value::Undefined);
                items.push(value.clone());
            }
            ((), vec![value])
        });
    }

    // ------------------------------------------------------------------------
    // Identity and observation
    // ------------------------------------------------------------------------

    /// Make the list immutable; `observe` will leave it alone.
    pub fn freeze(&self) -> Self {
        self.inner.frozen.set(true);
        self.clone()
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.frozen.get()
    }

    pub fn observer(&self) -> Option<Rc<Observer>> {
        self.inner.observer.borrow().clone()
    }

    pub fn ptr_eq(&self, other: &List) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn ptr_key(&self) -> usize {
        Rc::as_ptr(&self.inner) as usize
    }

    pub(crate) fn install_observer(&self, observer: Rc<Observer>) {
        *self.inner.observer.borrow_mut() = Some(observer);
    }

    pub(crate) fn raw_items(&self) -> Vec<Value> {
        self.inner.items.borrow().clone()
    }

    fn len_untracked(&self) -> usize {
        self.inner.items.borrow().len()
    }

    fn depend(&self) {
        if !ReactiveContext::is_tracking() {
            return;
        }
        if let Some(observer) = self.observer() {
            observer.dep().depend();
        }
    }

    fn reject_frozen(&self, op: &str) -> bool {
        if self.is_frozen() {
            warn(format!("Cannot {op} a frozen list."));
            return true;
        }
        false
    }

    /// Apply `f` to the elements, then observe what it inserted and notify
    /// once. `None` when the list is frozen.
    fn mutate<R>(
        &self,
        op: &'static str,
        f: impl FnOnce(&mut Vec<Value>) -> (R, Vec<Value>),
    ) -> Option<R> {
        if self.reject_frozen(op) {
            return None;
        }
        let (result, inserted) = {
            let mut items = self.inner.items.borrow_mut();
            f(&mut items)
        };
        self.notify(op, &inserted);
        Some(result)
    }

    fn notify(&self, op: &'static str, inserted: &[Value]) {
        let Some(observer) = self.observer() else {
            return;
        };
        for value in inserted {
            observe(value, false);
        }
        tracing::trace!(op, inserted = inserted.len(), "list mutated");
        observer.dep().notify();
    }
}

impl Default for List {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Into<Value>> FromIterator<V> for List {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Debug for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("List")
            .field("len", &self.len_untracked())
            .field("observed", &self.observer().is_some())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
