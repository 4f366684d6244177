#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::class::ClassId;

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// A user-defined object: identity, class, and instance variables fixed at
/// construction.
#[derive(Debug)]
pub struct Object {
    id: u64,
    class: ClassId,
    ivars: BTreeMap<String, Value>,
}

impl Object {
    pub(crate) fn new(class: ClassId, ivars: BTreeMap<String, Value>) -> Self {
        Object {
            id: NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed),
            class,
            ivars,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn class(&self) -> ClassId {
        self.class
    }

    pub fn ivar(&self, name: &str) -> Option<&Value> {
        self.ivars.get(name)
    }

    pub fn ivars(&self) -> &BTreeMap<String, Value> {
        &self.ivars
    }

    /// Same class and a copy of the given instance variables, new identity.
    pub fn duplicate(&self, ivars: BTreeMap<String, Value>) -> Object {
        Object::new(self.class, ivars)
    }
}

/// A dynamically-typed host value.
#[derive(Clone, Debug)]
pub enum Value {
    Nil,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Symbol(String),
    Array(Vec<Value>),
    /// Insertion-ordered entries.
    Hash(Vec<(Value, Value)>),
    Set(Vec<Value>),
    /// A class or module object.
    Class(ClassId),
    Object(Arc<Object>),
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn sym(s: impl Into<String>) -> Self {
        Value::Symbol(s.into())
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_object(&self) -> Option<&Arc<Object>> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Identity comparison: objects compare by identity, everything else by
    /// value.
    pub fn identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Object(a), Value::Object(b)) => a.id == b.id,
            _ => self == other,
        }
    }

    /// Look up a hash entry by key.
    pub fn hash_get(&self, key: &Value) -> Option<&Value> {
        match self {
            Value::Hash(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Hash(a), Value::Hash(b)) => {
                a.len() == b.len()
                    && a
                        .iter()
                        .all(|(k, v)| b.iter().any(|(k2, v2)| k == k2 && v == v2))
            }
            (Value::Set(a), Value::Set(b)) => {
                a.len() == b.len() && a.iter().all(|v| b.contains(v))
            }
            (Value::Class(a), Value::Class(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.id == b.id,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Nil)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::ClassRegistry;

    #[test]
    fn objects_compare_by_identity() {
        let mut reg = ClassRegistry::new();
        let c = reg.define_class("Point", None).unwrap();
        let a = reg.instantiate(c).unwrap();
        let b = reg.instantiate(c).unwrap();
        assert_ne!(a, b);
        assert!(a.identical(&a.clone()));
        assert!(!a.identical(&b));
    }

    #[test]
    fn hashes_compare_regardless_of_order() {
        let a = Value::Hash(vec![
            (Value::sym("a"), Value::Integer(1)),
            (Value::sym("b"), Value::Integer(2)),
        ]);
        let b = Value::Hash(vec![
            (Value::sym("b"), Value::Integer(2)),
            (Value::sym("a"), Value::Integer(1)),
        ]);
        assert_eq!(a, b);
        assert_eq!(a.hash_get(&Value::sym("b")), Some(&Value::Integer(2)));
    }

    #[test]
    fn option_converts_to_nil() {
        assert_eq!(Value::from(None::<i64>), Value::Nil);
        assert_eq!(
            Value::from(vec![1i64, 2]),
            Value::Array(vec![Value::Integer(1), Value::Integer(2)])
        );
    }
}
