//! Deep traversal for `deep` watchers.
//!
//! Reads every reachable field and element through the tracked accessors so
//! that the running watcher subscribes to all of them. Each collection is
//! visited once, which keeps self-referencing graphs finite. Frozen values
//! are not reactive and are skipped.

use std::collections::HashSet;

use super::value::Value;

/// Touch everything reachable from `value`.
pub fn traverse(value: &Value) {
    let mut seen = HashSet::new();
    visit(value, &mut seen);
}

fn visit(value: &Value, seen: &mut HashSet<usize>) {
    if value.is_frozen() {
        return;
    }
    let Some(key) = value.ptr_key() else {
        return;
    };
    if !seen.insert(key) {
        return;
    }

    match value {
        Value::List(list) => {
            for item in list.to_vec() {
                visit(&item, seen);
            }
        }
        Value::Record(record) => {
            for name in record.keys() {
                visit(&record.get(&name), seen);
            }
        }
        _ => {}
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{observe, List, Record, WatchSource, Watcher, WatcherOptions};

    #[test]
    fn subscribes_to_every_nested_field() {
        let leaf: Record = [("x", 1)].into_iter().collect();
        let list: List = vec![Value::from(leaf.clone())].into_iter().collect();
        let root: Record = [("items", Value::from(list.clone()))].into_iter().collect();
        observe(&Value::from(root.clone()), false);

        let source = root.clone();
        let watcher = Watcher::new(
            None,
            WatchSource::getter(move || {
                traverse(&Value::from(source.clone()));
                Ok(Value::Undefined)
            }),
            None,
            WatcherOptions::default().sync(),
        );

        let leaf_dep = leaf.field_dep("x").expect("reactive");
        assert!(leaf_dep.has_subscriber(watcher.id()));
        let list_ob = list.observer().expect("observed");
        assert!(list_ob.dep().has_subscriber(watcher.id()));
    }

    #[test]
    fn terminates_on_cycles() {
        let record: Record = [("n", 1)].into_iter().collect();
        record.set("me", record.clone());
        observe(&Value::from(record.clone()), false);
        traverse(&Value::from(record));
    }

    #[test]
    fn skips_frozen_values() {
        let frozen: Record = [("x", 1)].into_iter().collect();
        frozen.freeze();
        traverse(&Value::from(frozen));
        traverse(&Value::from(3));
    }
}
