use crate::{
    error::{EngineError, Result},
    schema::SchemaType,
    value::Value,
};

/// Maps a value to its minimal structural type, without history.
///
/// Arrays are typed by their first element; an empty array yields the
/// `array<null>` placeholder, which merges freely with the first non-empty
/// observation.
pub fn detect(value: &Value) -> Result<SchemaType> {
    Ok(match value {
        Value::Null => SchemaType::NULL,
        Value::Boolean(_) => SchemaType::BOOLEAN,
        Value::Integer(_) => SchemaType::INTEGER,
        Value::Float(_) => SchemaType::FLOAT,
        Value::String(_) => SchemaType::TEXT,
        Value::Array(items) => match items.first() {
            Some(first) => SchemaType::array(detect(first)?),
            None => SchemaType::array(SchemaType::NULL),
        },
        Value::Object(map) => SchemaType::Object(
            map.iter()
                .map(|(key, item)| Ok((key.clone(), detect(item)?)))
                .collect::<Result<_>>()?,
        ),
        Value::Partial(_) => {
            return Err(EngineError::UnsupportedValueKind(
                "partial values only appear in normalizer output".to_string(),
            ));
        }
    })
}
