//! Value Model
//!
//! [`Value`] is the dynamic value stored in observed fields. Primitives are
//! held inline; records and lists are shared handles, so cloning a value
//! never copies a collection and two values can be compared by identity.
//!
//! # Equality
//!
//! `PartialEq` is strict equality: primitives compare by value (so `NaN`
//! differs from itself) and collections compare by identity. Field writes
//! use [`Value::same_value`] instead, which additionally treats `NaN` as
//! equal to `NaN` so that re-writing a `NaN` sentinel does not notify.

use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use super::list::List;
use super::observer::Observer;
use super::record::Record;

/// A dynamically typed value.
#[derive(Clone, Default)]
pub enum Value {
    /// Absent value (missing field, failed getter).
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Record(Record),
    List(List),
}

impl Value {
    /// Write short-circuit predicate: strict equality, plus `NaN == NaN`.
    pub fn same_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            _ => self == other,
        }
    }

    /// Whether this is a record or a list.
    pub fn is_structured(&self) -> bool {
        matches!(self, Value::Record(_) | Value::List(_))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&List> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// The observer attached to this value, if it has been observed.
    pub fn observer(&self) -> Option<Rc<Observer>> {
        match self {
            Value::Record(r) => r.observer(),
            Value::List(l) => l.observer(),
            _ => None,
        }
    }

    /// Whether the value is frozen (only collections can be).
    pub fn is_frozen(&self) -> bool {
        match self {
            Value::Record(r) => r.is_frozen(),
            Value::List(l) => l.is_frozen(),
            _ => false,
        }
    }

    /// Identity of a collection handle, used to detect cycles.
    pub(crate) fn ptr_key(&self) -> Option<usize> {
        match self {
            Value::Record(r) => Some(r.ptr_key()),
            Value::List(l) => Some(l.ptr_key()),
            _ => None,
        }
    }

    /// Name of the variant, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Record(_) => "record",
            Value::List(_) => "list",
        }
    }

    /// Untracked deep snapshot as JSON.
    ///
    /// `Undefined` and non-finite numbers become `null`; a collection that
    /// contains itself is cut off with `null` at the repeat.
    pub fn to_json(&self) -> serde_json::Value {
        let mut path = HashSet::new();
        self.to_json_inner(&mut path)
    }

    fn to_json_inner(&self, path: &mut HashSet<usize>) -> serde_json::Value {
        use serde_json::Value as Json;

        if let Some(key) = self.ptr_key() {
            if !path.insert(key) {
                return Json::Null;
            }
        }
        let json = match self {
            Value::Undefined | Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n).map_or(Json::Null, Json::Number),
            Value::String(s) => Json::String(s.to_string()),
            Value::Record(r) => Json::Object(
                r.raw_entries()
                    .into_iter()
                    .map(|(k, v)| (k, v.to_json_inner(path)))
                    .collect(),
            ),
            Value::List(l) => Json::Array(
                l.raw_items()
                    .iter()
                    .map(|v| v.to_json_inner(path))
                    .collect(),
            ),
        };
        if let Some(key) = self.ptr_key() {
            path.remove(&key);
        }
        json
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => a.ptr_eq(b),
            (Value::List(a), Value::List(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("Undefined"),
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Record(r) => fmt::Debug::fmt(r, f),
            Value::List(l) => fmt::Debug::fmt(l, f),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<Record> for Value {
    fn from(r: Record) -> Self {
        Value::Record(r)
    }
}

impl From<List> for Value {
    fn from(l: List) -> Self {
        Value::List(l)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Builds fresh, unobserved collections.
impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;

        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::from(s),
            Json::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            Json::Object(fields) => Value::Record(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strict_equality() {
        assert_eq!(Value::from(1), Value::from(1.0));
        assert_ne!(Value::from(1), Value::from("1"));
        assert_ne!(Value::Number(f64::NAN), Value::Number(f64::NAN));
        assert_eq!(Value::Undefined, Value::Undefined);
        assert_ne!(Value::Undefined, Value::Null);
    }

    #[test]
    fn same_value_treats_nan_as_equal() {
        let nan = Value::Number(f64::NAN);
        assert!(nan.same_value(&Value::Number(f64::NAN)));
        assert!(Value::from(0.0).same_value(&Value::from(-0.0)));
        assert!(!Value::from(1).same_value(&Value::from(2)));
    }

    #[test]
    fn collections_compare_by_identity() {
        let a = Record::new();
        let b = Record::new();
        assert_eq!(Value::from(a.clone()), Value::from(a));
        assert_ne!(Value::from(Record::new()), Value::from(b));

        let list = List::new();
        assert_eq!(Value::from(list.clone()), Value::from(list));
    }

    #[test]
    fn json_round_trip_shape() {
        let source = json!({
            "name": "ada",
            "tags": ["x", "y"],
            "age": 36.5,
            "nested": { "ok": true }
        });
        let value = Value::from(source.clone());

        let record = value.as_record().expect("record");
        assert_eq!(record.get("name").as_str(), Some("ada"));
        assert_eq!(record.get("age").as_number(), Some(36.5));
        assert!(record.observer().is_none());
        assert_eq!(value.to_json(), source);
    }

    #[test]
    fn to_json_cuts_cycles() {
        let record = Record::new();
        record.set("me", record.clone());
        record.set("n", 1);

        assert_eq!(record_json(&record), json!({ "me": null, "n": 1.0 }));
    }

    fn record_json(record: &Record) -> serde_json::Value {
        Value::from(record.clone()).to_json()
    }

    #[test]
    fn option_conversion() {
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from(Some("x")).as_str(), Some("x"));
    }
}
