//! Structural type model for inferred document schemas.
//!
//! This module owns [`SchemaType`] (the recursive type of a document slot),
//! [`UnionSet`] (the flat, order-preserving set of alternatives recorded for a
//! slot observed with incompatible shapes), and [`ColumnPath`] (the subscript
//! address of one physical column inside a root object column).
//!
//! ## Equality contract
//!
//! - Object fields compare as maps; insertion order never matters.
//! - Union members compare as sets; the first-inserted member is kept because
//!   it decides the bare field name and the rendered column type.

use std::{
    collections::BTreeMap,
    fmt,
    hash::{DefaultHasher, Hash, Hasher},
};

use itertools::Itertools;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::merge::merge;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveKind {
    Integer,
    Float,
    Boolean,
    Text,
    #[serde(rename = "timestamptz")]
    TimestampTz,
    Null,
}

impl PrimitiveKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrimitiveKind::Integer => "integer",
            PrimitiveKind::Float => "float",
            PrimitiveKind::Boolean => "boolean",
            PrimitiveKind::Text => "text",
            PrimitiveKind::TimestampTz => "timestamptz",
            PrimitiveKind::Null => "null",
        }
    }

    /// Short token appended to a field name when a value of this kind is
    /// moved out of the bare column.
    pub fn token(&self) -> &'static str {
        match self {
            PrimitiveKind::Integer => "int",
            PrimitiveKind::Float => "float",
            PrimitiveKind::Boolean => "bool",
            PrimitiveKind::Text => "text",
            PrimitiveKind::TimestampTz => "tz",
            PrimitiveKind::Null => "null",
        }
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaType {
    Primitive(PrimitiveKind),
    FixedBits(u32),
    Array(Box<SchemaType>),
    Object(BTreeMap<String, SchemaType>),
    Union(UnionSet),
}

impl SchemaType {
    pub const INTEGER: SchemaType = SchemaType::Primitive(PrimitiveKind::Integer);
    pub const FLOAT: SchemaType = SchemaType::Primitive(PrimitiveKind::Float);
    pub const BOOLEAN: SchemaType = SchemaType::Primitive(PrimitiveKind::Boolean);
    pub const TEXT: SchemaType = SchemaType::Primitive(PrimitiveKind::Text);
    pub const TIMESTAMPTZ: SchemaType = SchemaType::Primitive(PrimitiveKind::TimestampTz);
    pub const NULL: SchemaType = SchemaType::Primitive(PrimitiveKind::Null);

    pub fn array(element: SchemaType) -> Self {
        SchemaType::Array(Box::new(element))
    }

    pub fn empty_object() -> Self {
        SchemaType::Object(BTreeMap::new())
    }

    pub fn object<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, SchemaType)>,
    {
        SchemaType::Object(
            fields
                .into_iter()
                .map(|(name, ty)| (name.into(), ty))
                .collect(),
        )
    }

    /// Folds `members` with the type merger. Returns a plain type when the
    /// members unify without collision.
    pub fn union_of<I>(members: I) -> Self
    where
        I: IntoIterator<Item = SchemaType>,
    {
        members
            .into_iter()
            .fold(SchemaType::NULL, |acc, member| merge(&acc, &member))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SchemaType::Primitive(PrimitiveKind::Null))
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, SchemaType>> {
        match self {
            SchemaType::Object(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn field(&self, name: &str) -> Option<&SchemaType> {
        self.as_object().and_then(|fields| fields.get(name))
    }

    /// The type a single physical column holds for this slot. Unions are
    /// stored as their first-inserted member.
    pub fn physical_view(&self) -> &SchemaType {
        match self {
            SchemaType::Union(set) => set.first(),
            other => other,
        }
    }

    /// Strips every array wrapper and returns the element type with the
    /// number of wrappers removed.
    pub fn innermost(&self) -> (usize, &SchemaType) {
        let mut depth = 0;
        let mut current = self;
        while let SchemaType::Array(element) = current {
            depth += 1;
            current = element;
        }
        (depth, current)
    }

    /// True when no real value has been observed for this slot yet: a bare
    /// null or an array of nulls.
    pub fn is_unmaterialized(&self) -> bool {
        let (_, inner) = self.innermost();
        matches!(inner.physical_view(), SchemaType::Primitive(PrimitiveKind::Null))
    }

    /// Two types of the same kind unify structurally instead of colliding.
    pub fn same_kind(&self, other: &SchemaType) -> bool {
        match (self, other) {
            (SchemaType::Object(_), SchemaType::Object(_)) => true,
            (SchemaType::Array(_), SchemaType::Array(_)) => true,
            (SchemaType::FixedBits(left), SchemaType::FixedBits(right)) => left == right,
            (SchemaType::Primitive(left), SchemaType::Primitive(right)) => left == right,
            _ => false,
        }
    }

    pub fn canonical_token(&self) -> String {
        match self {
            SchemaType::Primitive(kind) => kind.token().to_string(),
            SchemaType::FixedBits(size) => format!("bit{size}"),
            SchemaType::Object(_) => "object".to_string(),
            SchemaType::Array(element) => format!("{}_array", element.canonical_token()),
            SchemaType::Union(_) => "collision".to_string(),
        }
    }
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaType::Primitive(kind) => write!(f, "{kind}"),
            SchemaType::FixedBits(size) => write!(f, "bit({size})"),
            SchemaType::Array(element) => write!(f, "array<{element}>"),
            SchemaType::Object(fields) => write!(
                f,
                "{{{}}}",
                fields
                    .iter()
                    .map(|(name, ty)| format!("{name}: {ty}"))
                    .join(", ")
            ),
            SchemaType::Union(set) => write!(f, "union<{}>", set.iter().join("|")),
        }
    }
}

/// Alternatives recorded for a slot that was observed with incompatible shapes.
///
/// Always holds at least two members, never a nested union, and at most one
/// member per structural kind.
#[derive(Debug, Clone)]
pub struct UnionSet {
    members: Vec<SchemaType>,
}

impl UnionSet {
    /// Builds a union from two already-distinct, non-union members.
    pub(crate) fn pair(first: SchemaType, second: SchemaType) -> Self {
        debug_assert!(!matches!(first, SchemaType::Union(_)));
        debug_assert!(!matches!(second, SchemaType::Union(_)));
        Self {
            members: vec![first, second],
        }
    }

    /// Adds a non-union member, unifying it with the member of the same kind
    /// when one exists.
    pub(crate) fn absorb(&mut self, member: &SchemaType) {
        debug_assert!(!matches!(member, SchemaType::Union(_)));
        if member.is_null() {
            return;
        }
        match self
            .members
            .iter_mut()
            .find(|existing| existing.same_kind(member))
        {
            Some(existing) => *existing = merge(existing, member),
            None => self.members.push(member.clone()),
        }
    }

    pub(crate) fn members_mut(&mut self) -> &mut [SchemaType] {
        &mut self.members
    }

    pub fn first(&self) -> &SchemaType {
        &self.members[0]
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, member: &SchemaType) -> bool {
        self.members.contains(member)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SchemaType> {
        self.members.iter()
    }
}

impl PartialEq for UnionSet {
    fn eq(&self, other: &Self) -> bool {
        self.members.len() == other.members.len()
            && self.members.iter().all(|member| other.contains(member))
    }
}

impl Eq for UnionSet {}

impl Hash for UnionSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let combined = self
            .members
            .iter()
            .map(|member| {
                let mut hasher = DefaultHasher::new();
                member.hash(&mut hasher);
                hasher.finish()
            })
            .fold(0u64, u64::wrapping_add);
        self.members.len().hash(state);
        combined.hash(state);
    }
}

impl<'a> IntoIterator for &'a UnionSet {
    type Item = &'a SchemaType;
    type IntoIter = std::slice::Iter<'a, SchemaType>;

    fn into_iter(self) -> Self::IntoIter {
        self.members.iter()
    }
}

impl Serialize for UnionSet {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.members.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for UnionSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let members = Vec::<SchemaType>::deserialize(deserializer)?;
        match SchemaType::union_of(members) {
            SchemaType::Union(set) => Ok(set),
            other => Err(de::Error::custom(format!(
                "union members collapse to a single type '{other}'"
            ))),
        }
    }
}

/// Address of one physical column: the root column name followed by zero or
/// more subscript segments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnPath(Vec<String>);

impl ColumnPath {
    pub fn new<S: Into<String>>(root: S) -> Self {
        ColumnPath(vec![root.into()])
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ColumnPath(segments.into_iter().map(Into::into).collect())
    }

    pub fn child(&self, segment: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.to_string());
        ColumnPath(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Renders `root['a']['b']`, doubling embedded single quotes.
    pub fn subscript(&self) -> String {
        let mut rendered = String::new();
        for (idx, segment) in self.0.iter().enumerate() {
            if idx == 0 {
                rendered.push_str(segment);
            } else {
                rendered.push_str("['");
                rendered.push_str(&segment.replace('\'', "''"));
                rendered.push_str("']");
            }
        }
        rendered
    }

    pub fn dotted(&self) -> String {
        self.0.join(".")
    }
}

impl fmt::Display for ColumnPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.subscript())
    }
}
