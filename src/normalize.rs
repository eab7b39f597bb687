//! Document normalizer: co-walks a value against the running schema, widens
//! the schema, and renames fields whose observed type collides with the type
//! that first claimed the slot.
//!
//! ## Field naming
//!
//! The bare field name belongs to the first type observed at a slot. A later
//! value of a different shape is written to `<name>_<token>` (see
//! [`suffix`]), so every physical column keeps holding one shape. Names are
//! derived only from the union's first-inserted member and the value's own
//! detected type, with empty or null-led arrays typed by the array shape the
//! slot has already learned, so a name, once assigned to a shape, never
//! changes.
//!
//! ## Malformed values
//!
//! Under the non-suffixing strategies a conflicting value stays at the bare
//! name and is checked with [`try_cast`]; values that cannot be cast become
//! [`PartialValue`] markers, later split out by [`extract_non_cast`]. When
//! suffixing, a value is kept as a marker at its bare name if its suffixed
//! name is already a sibling key, or if it is an untyped array at a slot that
//! has not learned an array shape yet.

use std::collections::BTreeMap;

use chrono::DateTime;
use log::{debug, warn};

use crate::{
    config::ConflictStrategy,
    detect::detect,
    error::{EngineError, Result},
    merge::merge,
    schema::{PrimitiveKind, SchemaType},
    value::{PartialValue, Value},
};

/// Result of normalizing one document.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub schema: SchemaType,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer {
    strategy: ConflictStrategy,
}

impl Normalizer {
    pub fn new(strategy: ConflictStrategy) -> Self {
        Self { strategy }
    }

    /// Normalizes `value` against `schema` and returns the widened schema
    /// with the transformed value. `schema` is never modified.
    pub fn normalize(&self, schema: &SchemaType, value: &Value) -> Result<Normalized> {
        let (schema, value) = self.walk(schema, value)?;
        Ok(Normalized { schema, value })
    }

    /// Normalizes documents in order, threading the widened schema through.
    pub fn normalize_batch<'a, I>(
        &self,
        schema: &SchemaType,
        documents: I,
    ) -> Result<(SchemaType, Vec<Value>)>
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let mut current = schema.clone();
        let mut values = Vec::new();
        for document in documents {
            let (widened, value) = self.walk(&current, document)?;
            current = widened;
            values.push(value);
        }
        Ok((current, values))
    }

    /// Splits a normalized document into the clean document and, when the
    /// strategy keeps them, the malformed-fragment document.
    pub fn split(&self, document: &Value) -> (Value, Option<Value>) {
        let extracted = extract_non_cast(document);
        if extracted.fragments == 0 {
            return (extracted.clean, None);
        }
        if self.strategy.keeps_fragments() {
            warn!(
                "Preserving {} malformed value(s) as fragments",
                extracted.fragments
            );
            (extracted.clean, Some(extracted.malformed))
        } else {
            debug!(
                "Dropping {} malformed value(s) under {}",
                extracted.fragments, self.strategy
            );
            (extracted.clean, None)
        }
    }

    fn walk(&self, slot: &SchemaType, value: &Value) -> Result<(SchemaType, Value)> {
        match (slot, value) {
            (_, Value::Null) => Ok((slot.clone(), Value::Null)),
            (SchemaType::Primitive(PrimitiveKind::Null), _) => self.fresh(value),
            (SchemaType::Object(fields), Value::Object(map)) => self.walk_object(fields, map),
            (SchemaType::Array(element), Value::Array(items)) => self.walk_array(element, items),
            (SchemaType::Union(set), Value::Object(_) | Value::Array(_)) => {
                let member = set.iter().find(|member| {
                    matches!(
                        (member, value),
                        (SchemaType::Object(_), Value::Object(_))
                            | (SchemaType::Array(_), Value::Array(_))
                    )
                });
                match member {
                    Some(member) => {
                        let (child, transformed) = self.walk(member, value)?;
                        Ok((merge(slot, &child), transformed))
                    }
                    None => self.conflict(slot, value),
                }
            }
            _ => {
                let observed = detect(value)?;
                if observed == *slot || accepts_in_place(slot, value) {
                    Ok((slot.clone(), value.clone()))
                } else {
                    self.conflict(slot, value)
                }
            }
        }
    }

    /// First observation of a slot: the value's own detected type is the
    /// starting point and nothing is renamed.
    fn fresh(&self, value: &Value) -> Result<(SchemaType, Value)> {
        let observed = detect(value)?;
        match value {
            Value::Object(_) | Value::Array(_) => self.walk(&observed, value),
            _ => Ok((observed, value.clone())),
        }
    }

    fn conflict(&self, slot: &SchemaType, value: &Value) -> Result<(SchemaType, Value)> {
        if self.strategy.suffixes_fields() {
            let (observed, transformed) = self.fresh(value)?;
            Ok((merge(slot, &observed), transformed))
        } else {
            Ok((slot.clone(), try_cast(value, slot)))
        }
    }

    fn walk_array(&self, element: &SchemaType, items: &[Value]) -> Result<(SchemaType, Value)> {
        let mut current = element.clone();
        let mut transformed = Vec::with_capacity(items.len());
        for item in items {
            let (child, value) = self.walk(&current, item)?;
            current = merge(&current, &child);
            transformed.push(value);
        }
        Ok((SchemaType::array(current), Value::Array(transformed)))
    }

    fn walk_object(
        &self,
        fields: &BTreeMap<String, SchemaType>,
        map: &BTreeMap<String, Value>,
    ) -> Result<(SchemaType, Value)> {
        let mut fields = fields.clone();
        let mut output = BTreeMap::new();
        for (key, item) in map {
            let Some(existing) = fields.get(key) else {
                let (child, transformed) = self.fresh(item)?;
                fields.insert(key.clone(), child);
                output.insert(key.clone(), transformed);
                continue;
            };
            let (child, transformed) = self.walk(existing, item)?;
            let merged = merge(existing, &child);
            let placed = if self.strategy.suffixes_fields() {
                placement(key, &merged, item, map, &output)?
            } else {
                Some(key.clone())
            };
            fields.insert(key.clone(), merged);
            match placed {
                Some(name) => {
                    output.insert(name, transformed);
                }
                None => {
                    output.insert(
                        key.clone(),
                        Value::Partial(Box::new(PartialValue::dropped(item.clone()))),
                    );
                }
            }
        }
        Ok((SchemaType::Object(fields), Value::Object(output)))
    }
}

/// Output name for `item` under `key`, or `None` when the value has no column
/// it can be written to: its array shape is still unknown at this slot, or
/// its suffixed name is already taken by a sibling.
fn placement(
    key: &str,
    slot: &SchemaType,
    item: &Value,
    siblings: &BTreeMap<String, Value>,
    output: &BTreeMap<String, Value>,
) -> Result<Option<String>> {
    if item.is_null() || accepts_in_place(slot, item) {
        return Ok(Some(key.to_string()));
    }
    let observed = resolve_placeholders(&detect(item)?, slot);
    let name = suffix(key, slot, &observed);
    if name == key {
        return Ok(Some(name));
    }
    if observed.is_unmaterialized() {
        warn!("Field '{key}' holds an untyped {observed} at {slot}; keeping it as a fragment");
        return Ok(None);
    }
    if siblings.contains_key(&name) || output.contains_key(&name) {
        warn!("Field '{key}' would move to '{name}', which is already present; keeping it as a fragment");
        return Ok(None);
    }
    debug!("Field '{key}' collides with {slot}; writing to '{name}'");
    Ok(Some(name))
}

/// Replaces the null placeholders of an empty or null-led array with the
/// element type the slot has already learned for arrays.
fn resolve_placeholders(observed: &SchemaType, slot: &SchemaType) -> SchemaType {
    match observed {
        SchemaType::Primitive(PrimitiveKind::Null) => slot.physical_view().clone(),
        SchemaType::Array(element) => match same_kind_member(slot, observed) {
            Some(SchemaType::Array(learned)) => {
                SchemaType::array(resolve_placeholders(element, learned))
            }
            _ => observed.clone(),
        },
        _ => observed.clone(),
    }
}

fn same_kind_member<'a>(slot: &'a SchemaType, observed: &SchemaType) -> Option<&'a SchemaType> {
    match slot {
        SchemaType::Union(set) => set.iter().find(|member| member.same_kind(observed)),
        other if other.same_kind(observed) => Some(other),
        _ => None,
    }
}

/// Detection never yields TIMESTAMPTZ or bit columns; they only come from the
/// catalog. A scalar those columns accept is stored in place.
fn accepts_in_place(slot: &SchemaType, value: &Value) -> bool {
    matches!(
        slot.physical_view(),
        SchemaType::Primitive(PrimitiveKind::TimestampTz) | SchemaType::FixedBits(_)
    ) && !matches!(value, Value::Array(_) | Value::Object(_))
        && !matches!(try_cast(value, slot), Value::Partial(_))
}

/// Normalizes with the default suffix-and-fragment strategy.
pub fn normalize(schema: &SchemaType, value: &Value) -> Result<(SchemaType, Value)> {
    let normalized = Normalizer::default().normalize(schema, value)?;
    Ok((normalized.schema, normalized.value))
}

/// Output name for a value of type `observed` stored under `field`, given the
/// slot's type after widening.
pub fn suffix(field: &str, slot: &SchemaType, observed: &SchemaType) -> String {
    if slot == observed || observed.is_null() || slot.is_null() {
        return field.to_string();
    }
    match (slot, observed) {
        (SchemaType::Union(set), _) => suffix(field, set.first(), observed),
        (SchemaType::Array(slot_element), SchemaType::Array(observed_element)) => {
            let inner = suffix(field, slot_element, observed_element);
            if inner == field {
                inner
            } else {
                format!("{inner}_array")
            }
        }
        (SchemaType::Object(_), SchemaType::Object(_)) => field.to_string(),
        _ => format!("{field}_{}", observed.canonical_token()),
    }
}

/// Checks whether `value` can be stored in a column of type `target`.
///
/// Returns the value unchanged when it can; otherwise wraps it in a partial
/// marker whose clean side is null. Arrays and objects are checked per
/// element so only the offending leaves are marked.
pub fn try_cast(value: &Value, target: &SchemaType) -> Value {
    match (value, target.physical_view()) {
        (Value::Null | Value::Partial(_), _) => value.clone(),
        (_, SchemaType::Primitive(PrimitiveKind::Null)) => value.clone(),
        (Value::Array(items), SchemaType::Array(element)) => {
            Value::Array(items.iter().map(|item| try_cast(item, element)).collect())
        }
        (Value::Object(map), SchemaType::Object(fields)) => Value::Object(
            map.iter()
                .map(|(key, item)| {
                    let cast = match fields.get(key) {
                        Some(field_type) => try_cast(item, field_type),
                        None => item.clone(),
                    };
                    (key.clone(), cast)
                })
                .collect(),
        ),
        (_, SchemaType::Primitive(kind)) if scalar_castable(value, *kind) => value.clone(),
        (Value::String(bits), SchemaType::FixedBits(size))
            if bits.len() == *size as usize && bits.chars().all(|c| c == '0' || c == '1') =>
        {
            value.clone()
        }
        _ => Value::Partial(Box::new(PartialValue::dropped(value.clone()))),
    }
}

fn scalar_castable(value: &Value, kind: PrimitiveKind) -> bool {
    match (value, kind) {
        (Value::Boolean(_), PrimitiveKind::Boolean)
        | (Value::Integer(_), PrimitiveKind::Integer)
        | (Value::Float(_), PrimitiveKind::Float)
        | (Value::String(_), PrimitiveKind::Text) => true,
        (Value::Integer(_), PrimitiveKind::Float | PrimitiveKind::TimestampTz) => true,
        (Value::Integer(_) | Value::Float(_) | Value::Boolean(_), PrimitiveKind::Text) => true,
        (Value::Float(f), PrimitiveKind::Integer) => {
            f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64
        }
        (Value::String(s), PrimitiveKind::Integer) => s.trim().parse::<i64>().is_ok(),
        (Value::String(s), PrimitiveKind::Float) => s.trim().parse::<f64>().is_ok(),
        (Value::String(s), PrimitiveKind::Boolean) => {
            matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "false")
        }
        (Value::String(s), PrimitiveKind::TimestampTz) => {
            DateTime::parse_from_rfc3339(s.trim()).is_ok()
        }
        _ => false,
    }
}

/// Checks a normalized document against the physical schema reconstructed
/// from the store catalog. Fields without a physical column pass through.
pub fn cast_document(physical: &SchemaType, document: &Value) -> Result<Value> {
    if !matches!(physical, SchemaType::Object(_)) {
        return Err(EngineError::InvalidSchemaShape(format!(
            "physical schema must be an object, found {physical}"
        )));
    }
    Ok(try_cast(document, physical))
}

/// Clean and malformed halves of a normalized document.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub clean: Value,
    pub malformed: Value,
    pub fragments: usize,
}

/// Replaces every partial marker with null in the clean document and with
/// its original value in the malformed document. All other leaves are null
/// in the malformed document, so both documents share one shape.
pub fn extract_non_cast(document: &Value) -> Extracted {
    match document {
        Value::Partial(partial) => Extracted {
            clean: Value::Null,
            malformed: partial.original.clone(),
            fragments: 1,
        },
        Value::Array(items) => {
            let mut clean = Vec::with_capacity(items.len());
            let mut malformed = Vec::with_capacity(items.len());
            let mut fragments = 0;
            for item in items {
                let split = extract_non_cast(item);
                clean.push(split.clean);
                malformed.push(split.malformed);
                fragments += split.fragments;
            }
            Extracted {
                clean: Value::Array(clean),
                malformed: Value::Array(malformed),
                fragments,
            }
        }
        Value::Object(map) => {
            let mut clean = BTreeMap::new();
            let mut malformed = BTreeMap::new();
            let mut fragments = 0;
            for (key, item) in map {
                let split = extract_non_cast(item);
                clean.insert(key.clone(), split.clean);
                malformed.insert(key.clone(), split.malformed);
                fragments += split.fragments;
            }
            Extracted {
                clean: Value::Object(clean),
                malformed: Value::Object(malformed),
                fragments,
            }
        }
        scalar => Extracted {
            clean: scalar.clone(),
            malformed: Value::Null,
            fragments: 0,
        },
    }
}
