//! Additive DDL generation.
//!
//! Walks the last-known physical schema and the widened schema in lock-step
//! and emits one `ALTER TABLE .. ADD COLUMN` per newly reachable column.
//! Existing columns whose inferred type changed are reported in the log and
//! left alone: the store cannot retype a column.

use std::collections::BTreeMap;

use log::{debug, warn};

use crate::{
    error::{EngineError, Result},
    schema::{ColumnPath, PrimitiveKind, SchemaType},
};

/// Column-creation statements taking `before` to `after` for `table`.
pub fn diff_statements(before: &SchemaType, after: &SchemaType, table: &str) -> Result<Vec<String>> {
    Ok(new_columns(before, after)?
        .iter()
        .filter_map(|(path, ty)| add_column_statement(table, path, ty))
        .collect())
}

/// Every column reachable in `after` but not in `before`, with the type it
/// should be created with.
pub fn new_columns(before: &SchemaType, after: &SchemaType) -> Result<Vec<(ColumnPath, SchemaType)>> {
    let before_fields = expect_object("before", before)?;
    let after_fields = expect_object("after", after)?;
    let mut columns = Vec::new();
    collect_additions(before_fields, after_fields, None, &mut columns);
    Ok(columns)
}

fn expect_object<'a>(label: &str, schema: &'a SchemaType) -> Result<&'a BTreeMap<String, SchemaType>> {
    schema.as_object().ok_or_else(|| {
        EngineError::InvalidSchemaShape(format!(
            "{label} schema must be an object at the top level, found {schema}"
        ))
    })
}

fn collect_additions(
    before: &BTreeMap<String, SchemaType>,
    after: &BTreeMap<String, SchemaType>,
    parent: Option<&ColumnPath>,
    columns: &mut Vec<(ColumnPath, SchemaType)>,
) {
    for (name, after_type) in after {
        let path = match parent {
            Some(parent) => parent.child(name),
            None => ColumnPath::new(name.as_str()),
        };
        let Some(before_type) = before.get(name) else {
            collect_terminals(&path, after_type, columns);
            continue;
        };
        let (before_view, after_view) = (before_type.physical_view(), after_type.physical_view());
        match (object_fields(before_view), object_fields(after_view)) {
            (Some((before_depth, before_nested)), Some((after_depth, after_nested)))
                if before_depth == after_depth =>
            {
                collect_additions(before_nested, after_nested, Some(&path), columns);
            }
            _ if before_view == after_view => {}
            _ if before_view.is_unmaterialized() => collect_terminals(&path, after_type, columns),
            _ if after_view.is_unmaterialized() => {}
            _ => warn!(
                "Column {path} changed from {before_view} to {after_view}; existing columns cannot be retyped"
            ),
        }
    }
}

/// Object fields behind a slot, looking through array wrappers. Returns the
/// number of wrappers crossed.
fn object_fields(ty: &SchemaType) -> Option<(usize, &BTreeMap<String, SchemaType>)> {
    match ty.physical_view() {
        SchemaType::Object(fields) => Some((0, fields)),
        SchemaType::Array(element) => object_fields(element).map(|(depth, fields)| (depth + 1, fields)),
        _ => None,
    }
}

fn collect_terminals(path: &ColumnPath, ty: &SchemaType, columns: &mut Vec<(ColumnPath, SchemaType)>) {
    let view = ty.physical_view();
    match view {
        SchemaType::Object(fields) if !fields.is_empty() => {
            for (name, field) in fields {
                collect_terminals(&path.child(name), field, columns);
            }
        }
        _ if view.is_unmaterialized() => {
            debug!("Skipping {path}: no value observed yet");
        }
        _ => columns.push((path.clone(), view.clone())),
    }
}

/// Column type syntax for `ty`. `None` when nothing real has been observed.
pub fn type_syntax(ty: &SchemaType) -> Option<String> {
    match ty.physical_view() {
        SchemaType::Primitive(kind) => keyword(*kind).map(str::to_string),
        SchemaType::FixedBits(size) => Some(format!("BIT({size})")),
        SchemaType::Array(element) => type_syntax(element).map(|inner| format!("ARRAY({inner})")),
        SchemaType::Object(_) => Some("OBJECT(DYNAMIC)".to_string()),
        SchemaType::Union(_) => None,
    }
}

fn keyword(kind: PrimitiveKind) -> Option<&'static str> {
    match kind {
        PrimitiveKind::Integer => Some("BIGINT"),
        PrimitiveKind::Float => Some("DOUBLE PRECISION"),
        PrimitiveKind::Boolean => Some("BOOLEAN"),
        PrimitiveKind::Text => Some("TEXT"),
        PrimitiveKind::TimestampTz => Some("TIMESTAMP WITH TIME ZONE"),
        PrimitiveKind::Null => None,
    }
}

pub fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

pub fn add_column_statement(table: &str, path: &ColumnPath, ty: &SchemaType) -> Option<String> {
    let syntax = type_syntax(ty)?;
    Some(format!(
        "ALTER TABLE {} ADD COLUMN {} {syntax}",
        quote_identifier(table),
        quote_identifier(&path.subscript())
    ))
}
