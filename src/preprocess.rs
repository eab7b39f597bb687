//! Reverses the index-keyed array encoding some source connectors apply.
//!
//! Such connectors ship `[a, b]` as `{"_0": a, "_1": b}`. The rewrite runs
//! before normalization so the schema learns a real array type.

use std::collections::BTreeMap;

use crate::value::Value;

pub fn de_index_encode(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(de_index_encode).collect()),
        Value::Object(map) => {
            let map: BTreeMap<String, Value> = map
                .into_iter()
                .map(|(key, item)| (key, de_index_encode(item)))
                .collect();
            if is_index_encoded(&map) {
                Value::Array(into_positional(map))
            } else {
                Value::Object(map)
            }
        }
        other => other,
    }
}

/// True for a non-empty object whose keys are exactly `_0 .. _{n-1}`.
pub fn is_index_encoded(map: &BTreeMap<String, Value>) -> bool {
    !map.is_empty() && (0..map.len()).all(|position| map.contains_key(&index_key(position)))
}

fn index_key(position: usize) -> String {
    format!("_{position}")
}

fn into_positional(mut map: BTreeMap<String, Value>) -> Vec<Value> {
    (0..map.len())
        .filter_map(|position| map.remove(&index_key(position)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(items: Vec<Value>) -> Value {
        Value::object(
            items
                .into_iter()
                .enumerate()
                .map(|(position, item)| (index_key(position), item)),
        )
    }

    #[test]
    fn index_keyed_object_becomes_array_in_order() {
        let items: Vec<Value> = (0..12i64).map(Value::Integer).collect();
        let decoded = de_index_encode(encoded(items.clone()));
        assert_eq!(decoded, Value::Array(items));
    }

    #[test]
    fn nested_encodings_unwrap_fully() {
        let inner = encoded(vec![Value::from("a"), Value::from("b")]);
        let outer = Value::object([("tags", encoded(vec![inner]))]);
        let decoded = de_index_encode(outer);
        assert_eq!(
            decoded,
            Value::object([(
                "tags",
                Value::Array(vec![Value::Array(vec![Value::from("a"), Value::from("b")])])
            )])
        );
    }

    #[test]
    fn non_matching_objects_pass_through() {
        let gap = Value::object([("_0", Value::from(1)), ("_2", Value::from(2))]);
        assert_eq!(de_index_encode(gap.clone()), gap);

        let mixed = Value::object([("_0", Value::from(1)), ("name", Value::from("x"))]);
        assert_eq!(de_index_encode(mixed.clone()), mixed);

        let empty = Value::object(Vec::<(String, Value)>::new());
        assert_eq!(de_index_encode(empty.clone()), empty);
    }
}
