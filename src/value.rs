//! Generic document values handed to the engine by the change-event decoder.
//!
//! The decoder converts whatever the source produced (JSON, Avro records,
//! row images) into [`Value`], a closed set of booleans, integers, floats,
//! strings, ordered lists, and string-keyed maps. Normalizer output may also
//! contain [`PartialValue`] markers for values that could not be cast into
//! their assigned column.

use std::{
    collections::BTreeMap,
    fmt,
    hash::{Hash, Hasher},
};

use serde::{Serialize, Serializer};

use crate::error::{EngineError, Result};

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
    Partial(Box<PartialValue>),
}

/// Floats compare and hash by bits, with `-0.0` folded into `0.0` and every
/// NaN into one canonical NaN.
fn float_bits(f: f64) -> u64 {
    if f == 0.0 {
        0.0f64.to_bits()
    } else if f.is_nan() {
        f64::NAN.to_bits()
    } else {
        f.to_bits()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(left), Value::Boolean(right)) => left == right,
            (Value::Integer(left), Value::Integer(right)) => left == right,
            (Value::Float(left), Value::Float(right)) => float_bits(*left) == float_bits(*right),
            (Value::String(left), Value::String(right)) => left == right,
            (Value::Array(left), Value::Array(right)) => left == right,
            (Value::Object(left), Value::Object(right)) => left == right,
            (Value::Partial(left), Value::Partial(right)) => left == right,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Boolean(b) => b.hash(state),
            Value::Integer(i) => i.hash(state),
            Value::Float(f) => float_bits(*f).hash(state),
            Value::String(s) => s.hash(state),
            Value::Array(items) => items.hash(state),
            Value::Object(map) => map.hash(state),
            Value::Partial(partial) => partial.hash(state),
        }
    }
}

/// A value that could not be stored losslessly at its slot.
///
/// `normalized` is written to the clean document, `original` is preserved
/// verbatim in the parallel malformed-fragment document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartialValue {
    pub normalized: Value,
    pub original: Value,
}

impl PartialValue {
    pub fn new(normalized: Value, original: Value) -> Self {
        Self {
            normalized,
            original,
        }
    }

    /// A fragment whose clean side is dropped to null.
    pub fn dropped(original: Value) -> Self {
        Self::new(Value::Null, original)
    }
}

impl Value {
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Object(
            entries
                .into_iter()
                .map(|(key, value)| (key.into(), value))
                .collect(),
        )
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Returns true when any partial marker is reachable from this value.
    pub fn contains_partial(&self) -> bool {
        match self {
            Value::Partial(_) => true,
            Value::Array(items) => items.iter().any(Value::contains_partial),
            Value::Object(map) => map.values().any(Value::contains_partial),
            _ => false,
        }
    }

    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        Ok(match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(number) => {
                if let Some(i) = number.as_i64() {
                    Value::Integer(i)
                } else if number.is_u64() {
                    return Err(EngineError::UnsupportedValueKind(format!(
                        "unsigned integer {number} exceeds the signed 64-bit range"
                    )));
                } else {
                    let f = number.as_f64().ok_or_else(|| {
                        EngineError::UnsupportedValueKind(format!("number {number}"))
                    })?;
                    Value::Float(f)
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(Value::from_json)
                    .collect::<Result<Vec<_>>>()?,
            ),
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(key, value)| Ok((key, Value::from_json(value)?)))
                    .collect::<Result<BTreeMap<_, _>>>()?,
            ),
        })
    }

    /// Renders as JSON. Partial markers render as their normalized side and
    /// non-finite floats as null.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Integer(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
            Value::Partial(partial) => partial.normalized.to_json(),
        }
    }
}

impl TryFrom<serde_json::Value> for Value {
    type Error = EngineError;

    fn try_from(value: serde_json::Value) -> Result<Self> {
        Value::from_json(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::Array(value)
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_json().serialize(serializer)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_json_maps_every_kind() {
        let value = Value::from_json(json!({
            "a": null,
            "b": true,
            "c": 3,
            "d": 1.5,
            "e": "x",
            "f": [1, {"g": []}]
        }))
        .expect("convert");
        let map = value.as_object().expect("object");
        assert_eq!(map["a"], Value::Null);
        assert_eq!(map["b"], Value::Boolean(true));
        assert_eq!(map["c"], Value::Integer(3));
        assert_eq!(map["d"], Value::Float(1.5));
        assert_eq!(map["e"], Value::from("x"));
        assert!(matches!(&map["f"], Value::Array(items) if items.len() == 2));
    }

    #[test]
    fn from_json_rejects_out_of_range_unsigned() {
        let err = Value::from_json(json!(u64::MAX)).expect_err("u64::MAX should fail");
        assert!(matches!(err, EngineError::UnsupportedValueKind(_)));
    }

    #[test]
    fn partial_renders_normalized_side() {
        let value = Value::object([(
            "n",
            Value::Partial(Box::new(PartialValue::new(
                Value::from("1"),
                Value::from(true),
            ))),
        )]);
        assert_eq!(value.to_json(), json!({"n": "1"}));
        assert!(value.contains_partial());
    }

    #[test]
    fn signed_zero_and_nan_agree_between_eq_and_hash() {
        use std::collections::hash_map::DefaultHasher;

        fn hash_of(value: &Value) -> u64 {
            let mut hasher = DefaultHasher::new();
            value.hash(&mut hasher);
            hasher.finish()
        }

        let (zero, negative_zero) = (Value::Float(0.0), Value::Float(-0.0));
        assert_eq!(zero, negative_zero);
        assert_eq!(hash_of(&zero), hash_of(&negative_zero));

        let nan = Value::Float(f64::NAN);
        assert_eq!(nan, nan.clone());
        assert_eq!(nan, Value::Float(-f64::NAN));
        assert_eq!(hash_of(&nan), hash_of(&Value::Float(-f64::NAN)));
        assert_ne!(Value::Float(1.0), Value::Integer(1));
    }

    #[test]
    fn partial_equality_considers_both_sides() {
        let left = PartialValue::new(Value::Null, Value::from(1));
        let right = PartialValue::new(Value::Null, Value::from(2));
        assert_ne!(left, right);
        assert_eq!(left, PartialValue::dropped(Value::from(1)));
    }
}
