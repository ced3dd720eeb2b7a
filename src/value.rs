//! Runtime values produced by operations and attribute reads.
//!
//! Operations return [`Value`]s: plain data (scalars, lists, maps) or opaque
//! domain objects behind the [`Object`] trait. Rendering turns them into
//! [`Rendered`] JSON, and only through a selection can an object's fields be
//! reached.

use indexmap::IndexMap;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::ast::EagerLoad;

/// Rendered output.
pub type Rendered = serde_json::Value;
/// Rendered mapping, key order preserved.
pub type RenderedMap = serde_json::Map<String, serde_json::Value>;

/// Shared handle to a domain object.
pub type ObjectRef = Arc<dyn Object>;

#[doc(hidden)]
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A domain object exposed through an entity descriptor.
///
/// `field` is plain member access. It is only ever reached after the
/// entity's attribute whitelist admitted the first path segment.
pub trait Object: AsAny + Send + Sync + fmt::Debug + 'static {
    /// Type tag used in policies and diagnostics.
    fn type_name(&self) -> &'static str;

    /// Read a member. `None` when the object has no such member.
    fn field(&self, name: &str, args: &[Value]) -> Option<Value>;

    /// Primary key, if the object is a persisted record.
    fn id(&self) -> Option<Value> {
        None
    }

    /// Return a copy with the hinted relations loaded, if supported.
    fn prefetch(&self, _hints: &EagerLoad) -> Option<Value> {
        None
    }
}

impl dyn Object {
    /// Runtime type of the concrete object.
    pub fn concrete_type_id(&self) -> TypeId {
        AsAny::as_any(self).type_id()
    }

    pub fn downcast_ref<T: Object>(&self) -> Option<&T> {
        AsAny::as_any(self).downcast_ref::<T>()
    }
}

/// Dynamic value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
    Object(ObjectRef),
}

impl Value {
    pub fn object<T: Object>(object: T) -> Self {
        Value::Object(Arc::new(object))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Plain data that may leave the engine without a selection.
    pub fn is_simple(&self) -> bool {
        !matches!(self, Value::List(_) | Value::Object(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Object(o) => o.type_name(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer view. Integral floats (`2.0`) count, since schema literals
    /// are parsed as floats; floats outside the `i64` range do not.
    pub fn as_i64(&self) -> Option<i64> {
        const LIMIT: f64 = 9_223_372_036_854_775_808.0; // 2^63
        match self {
            Value::Int(n) => Some(*n),
            Value::Float(f) if f.fract() == 0.0 && (-LIMIT..LIMIT).contains(f) => Some(*f as i64),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Plain member access: map key or object member.
    pub fn member(&self, name: &str, args: &[Value]) -> Option<Value> {
        match self {
            Value::Map(m) => m.get(name).cloned(),
            Value::Object(o) => o.field(name, args),
            _ => None,
        }
    }

    /// JSON form of plain data. Objects never serialize; they become `null`.
    pub fn to_json(&self) -> Rendered {
        match self {
            Value::Null | Value::Object(_) => Rendered::Null,
            Value::Bool(b) => Rendered::Bool(*b),
            Value::Int(n) => Rendered::from(*n),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(Rendered::Number)
                .unwrap_or(Rendered::Null),
            Value::String(s) => Rendered::String(s.clone()),
            Value::List(items) => Rendered::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(m) => Rendered::Object(
                m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Rendering of a call without a selection.
    ///
    /// Plain data passes through; a list passes only if every item is plain.
    /// Anything else is `null`: a leaf never leaks unrendered objects.
    pub fn to_leaf(&self) -> Rendered {
        match self {
            Value::List(items) if items.iter().all(Value::is_simple) => self.to_json(),
            Value::List(_) | Value::Object(_) => Rendered::Null,
            _ => self.to_json(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        i64::try_from(v)
            .map(Value::Int)
            .unwrap_or(Value::Float(v as f64))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<ObjectRef> for Value {
    fn from(v: ObjectRef) -> Self {
        Value::Object(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(v: IndexMap<String, Value>) -> Self {
        Value::Map(v)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Value {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Value::Map(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(m) => {
                Value::Map(m.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug)]
    struct Secret;

    impl Object for Secret {
        fn type_name(&self) -> &'static str {
            "Secret"
        }

        fn field(&self, name: &str, _args: &[Value]) -> Option<Value> {
            (name == "password").then(|| Value::from("hunter2"))
        }
    }

    #[test]
    fn test_leaf_passes_plain_data() {
        assert_eq!(Value::from("Ada").to_leaf(), json!("Ada"));
        assert_eq!(Value::from(7).to_leaf(), json!(7));
        assert_eq!(Value::from(vec![1, 2]).to_leaf(), json!([1, 2]));
        let map: Value = [("a", 1)].into_iter().collect();
        assert_eq!(map.to_leaf(), json!({"a": 1}));
    }

    #[test]
    fn test_leaf_never_leaks_objects() {
        assert_eq!(Value::object(Secret).to_leaf(), json!(null));
        let list = Value::List(vec![Value::from(1), Value::object(Secret)]);
        assert_eq!(list.to_leaf(), json!(null));
        let map: Value = [("s", Value::object(Secret))].into_iter().collect();
        assert_eq!(map.to_leaf(), json!({"s": null}));
        // nested lists are not plain either
        let nested = Value::List(vec![Value::from(vec![1])]);
        assert_eq!(nested.to_leaf(), json!(null));
    }

    #[test]
    fn test_integral_float_as_i64() {
        assert_eq!(Value::Float(3.0).as_i64(), Some(3));
        assert_eq!(Value::Float(3.5).as_i64(), None);
        assert_eq!(Value::from("12").as_i64(), Some(12));
        assert_eq!(Value::Float(1e19).as_i64(), None);
        assert_eq!(Value::Float(-1e19).as_i64(), None);
        assert_eq!(Value::Float(f64::INFINITY).as_i64(), None);
    }

    #[test]
    fn test_downcast() {
        let value = Value::object(Secret);
        let object = value.as_object().unwrap();
        assert!(object.downcast_ref::<Secret>().is_some());
        assert_eq!(object.concrete_type_id(), TypeId::of::<Secret>());
        assert_eq!(value.member("password", &[]), Some(Value::from("hunter2")));
    }

    #[test]
    fn test_from_json() {
        let value = Value::from(json!({"id": 1, "tags": ["a"], "score": 1.5}));
        let map = value.as_map().unwrap();
        assert_eq!(map["id"], Value::Int(1));
        assert_eq!(map["tags"], Value::from(vec!["a"]));
        assert_eq!(map["score"], Value::Float(1.5));
    }
}
