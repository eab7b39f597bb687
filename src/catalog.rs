//! Catalog reconstruction: rebuilds the learned schema from the store's flat
//! column listing after a restart, so evolution continues without
//! re-learning from scratch.
//!
//! The store reports one descriptor per physical column, including every
//! subscript column of an object column. Subscript columns below an
//! `ARRAY(OBJECT)` column are reported as arrays of their element type; the
//! reconstructor peels one array layer per enclosing object array so the
//! field lands inside the element object.

use std::collections::BTreeMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    error::{EngineError, Result},
    merge::merge,
    schema::{ColumnPath, PrimitiveKind, SchemaType},
};

const ARRAY_SUFFIX: &str = "_array";

/// One row of the store's column catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalColumnDescriptor {
    pub data_type: String,
    pub column_name: String,
    pub path: Vec<String>,
    #[serde(default)]
    pub primary_key: bool,
}

impl PhysicalColumnDescriptor {
    pub fn new(data_type: impl Into<String>, path: ColumnPath) -> Self {
        Self {
            data_type: data_type.into(),
            column_name: path.subscript(),
            path: path.segments().to_vec(),
            primary_key: false,
        }
    }
}

/// Maps a catalog data type token to a schema type. Returns `None` for
/// tokens the engine does not know.
pub fn parse_physical_type(token: &str) -> Option<SchemaType> {
    let normalized = token.trim().to_ascii_lowercase();
    if let Some(element) = normalized.strip_suffix(ARRAY_SUFFIX) {
        return parse_physical_type(element).map(SchemaType::array);
    }
    let primitive = match normalized.as_str() {
        "bigint" | "integer" | "smallint" | "byte" | "long" | "int" => PrimitiveKind::Integer,
        "real" | "double precision" | "double" | "float" => PrimitiveKind::Float,
        "boolean" => PrimitiveKind::Boolean,
        "text" | "character varying" | "varchar" | "string" => PrimitiveKind::Text,
        "timestamp with time zone" | "timestamptz" => PrimitiveKind::TimestampTz,
        "undefined" => PrimitiveKind::Null,
        "object" => return Some(SchemaType::empty_object()),
        "bit" => return Some(SchemaType::FixedBits(1)),
        other => return parse_bit_type(other),
    };
    Some(SchemaType::Primitive(primitive))
}

fn parse_bit_type(token: &str) -> Option<SchemaType> {
    let inner = token.strip_prefix("bit(")?.strip_suffix(')')?;
    inner.trim().parse().ok().map(SchemaType::FixedBits)
}

/// Catalog token for a non-union type. Unions have no single token; they
/// are listed as one descriptor per member.
pub fn physical_type_token(ty: &SchemaType) -> Option<String> {
    match ty {
        SchemaType::Primitive(kind) => Some(
            match kind {
                PrimitiveKind::Integer => "bigint",
                PrimitiveKind::Float => "double precision",
                PrimitiveKind::Boolean => "boolean",
                PrimitiveKind::Text => "text",
                PrimitiveKind::TimestampTz => "timestamp with time zone",
                PrimitiveKind::Null => "undefined",
            }
            .to_string(),
        ),
        SchemaType::FixedBits(size) => Some(format!("bit({size})")),
        SchemaType::Object(_) => Some("object".to_string()),
        SchemaType::Array(element) => {
            physical_type_token(element).map(|token| format!("{token}{ARRAY_SUFFIX}"))
        }
        SchemaType::Union(_) => None,
    }
}

/// Rebuilds the table schema from catalog descriptors. The result is always
/// an object and does not depend on descriptor order, including the member
/// order of unions rebuilt from repeated paths.
pub fn rebuild(columns: &[PhysicalColumnDescriptor]) -> Result<SchemaType> {
    let mut ordered: Vec<&PhysicalColumnDescriptor> = columns.iter().collect();
    ordered.sort_by_cached_key(|column| {
        (
            column.path.len(),
            column.path.clone(),
            column.data_type.trim().to_ascii_lowercase(),
        )
    });

    let mut root = BTreeMap::new();
    for column in ordered {
        if column.path.is_empty() {
            return Err(EngineError::InvalidSchemaShape(format!(
                "catalog column '{}' has an empty path",
                column.column_name
            )));
        }
        let leaf = parse_physical_type(&column.data_type).ok_or_else(|| {
            EngineError::UnknownPhysicalType {
                column: column.column_name.clone(),
                data_type: column.data_type.clone(),
            }
        })?;
        insert_path(&mut root, &column.path, leaf);
    }
    debug!(
        "Rebuilt schema with {} root column(s) from {} catalog entries",
        root.len(),
        columns.len()
    );
    Ok(SchemaType::Object(root))
}

fn insert_path(fields: &mut BTreeMap<String, SchemaType>, path: &[String], leaf: SchemaType) {
    let Some((head, rest)) = path.split_first() else {
        return;
    };
    if rest.is_empty() {
        let merged = match fields.get(head) {
            Some(existing) => merge(existing, &leaf),
            None => leaf,
        };
        fields.insert(head.clone(), merged);
        return;
    }
    let slot = fields
        .entry(head.clone())
        .or_insert_with(SchemaType::empty_object);
    let (leaf_depth, _) = leaf.innermost();
    match object_container(slot, leaf_depth) {
        Some((depth, nested)) => insert_path(nested, rest, peel_arrays(leaf, depth)),
        None => {
            let tree = nest(rest, leaf);
            *slot = merge(slot, &tree);
        }
    }
}

/// Finds the object a subscript child belongs to: the slot itself, or the
/// element object of an object array. Inside a union, prefers the deepest
/// container the child's array depth can account for.
fn object_container(
    slot: &mut SchemaType,
    leaf_depth: usize,
) -> Option<(usize, &mut BTreeMap<String, SchemaType>)> {
    match slot {
        SchemaType::Object(fields) => Some((0, fields)),
        SchemaType::Array(element) => object_container(element, leaf_depth.saturating_sub(1))
            .map(|(depth, fields)| (depth + 1, fields)),
        SchemaType::Union(set) => {
            let members = set.members_mut();
            let candidates: Vec<(usize, usize)> = members
                .iter()
                .enumerate()
                .filter_map(|(idx, member)| container_depth(member).map(|depth| (idx, depth)))
                .collect();
            let (idx, _) = candidates
                .iter()
                .copied()
                .filter(|(_, depth)| *depth <= leaf_depth)
                .max_by_key(|(_, depth)| *depth)
                .or_else(|| candidates.first().copied())?;
            object_container(&mut members[idx], leaf_depth)
        }
        _ => None,
    }
}

fn container_depth(ty: &SchemaType) -> Option<usize> {
    match ty {
        SchemaType::Object(_) => Some(0),
        SchemaType::Array(element) => container_depth(element).map(|depth| depth + 1),
        SchemaType::Union(set) => set.iter().filter_map(container_depth).min(),
        _ => None,
    }
}

fn peel_arrays(ty: SchemaType, depth: usize) -> SchemaType {
    let mut current = ty;
    for _ in 0..depth {
        match current {
            SchemaType::Array(element) => current = *element,
            other => return other,
        }
    }
    current
}

fn nest(path: &[String], leaf: SchemaType) -> SchemaType {
    path.iter()
        .rev()
        .fold(leaf, |inner, segment| SchemaType::object([(segment.clone(), inner)]))
}

/// Lists the descriptors the store would report for `schema`. Inverse of
/// [`rebuild`].
pub fn flatten(schema: &SchemaType) -> Result<Vec<PhysicalColumnDescriptor>> {
    let SchemaType::Object(fields) = schema else {
        return Err(EngineError::InvalidSchemaShape(format!(
            "table schema must be an object, found {schema}"
        )));
    };
    let mut columns = Vec::new();
    for (name, ty) in fields {
        flatten_into(&ColumnPath::new(name.as_str()), ty, 0, &mut columns);
    }
    Ok(columns)
}

fn flatten_into(
    path: &ColumnPath,
    ty: &SchemaType,
    array_depth: usize,
    columns: &mut Vec<PhysicalColumnDescriptor>,
) {
    match ty {
        SchemaType::Union(set) => {
            for member in set {
                flatten_into(path, member, array_depth, columns);
            }
        }
        SchemaType::Array(element) => flatten_into(path, element, array_depth + 1, columns),
        SchemaType::Object(fields) => {
            columns.push(PhysicalColumnDescriptor::new(
                wrap_token("object", array_depth),
                path.clone(),
            ));
            for (name, field) in fields {
                flatten_into(&path.child(name), field, array_depth, columns);
            }
        }
        leaf => {
            if let Some(token) = physical_type_token(leaf) {
                columns.push(PhysicalColumnDescriptor::new(
                    wrap_token(&token, array_depth),
                    path.clone(),
                ));
            }
        }
    }
}

fn wrap_token(token: &str, array_depth: usize) -> String {
    let mut wrapped = token.to_string();
    for _ in 0..array_depth {
        wrapped.push_str(ARRAY_SUFFIX);
    }
    wrapped
}
