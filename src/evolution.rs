//! Human-readable comparison of two schema trees.
//!
//! Unlike the DDL generator this walk records every branch, including
//! removals and retypes the store could never apply.

use std::{collections::BTreeMap, fmt};

use crate::{
    error::{EngineError, Result},
    schema::SchemaType,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Added(SchemaType),
    Removed(SchemaType),
    Unchanged(SchemaType),
    Retyped {
        before: SchemaType,
        after: SchemaType,
    },
    /// Both sides are objects; the entry holds the field-level comparison.
    Nested(ChangeSet),
    /// Both sides are arrays; the entry holds the element-level comparison.
    Positional(Box<Change>),
}

impl Change {
    pub fn is_unchanged(&self) -> bool {
        match self {
            Change::Unchanged(_) => true,
            Change::Nested(set) => set.is_empty(),
            Change::Positional(inner) => inner.is_unchanged(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub entries: BTreeMap<String, Change>,
}

impl ChangeSet {
    pub fn get(&self, field: &str) -> Option<&Change> {
        self.entries.get(field)
    }

    /// True when nothing was added, removed or retyped at any depth.
    pub fn is_empty(&self) -> bool {
        self.entries.values().all(Change::is_unchanged)
    }

    /// One line per difference, in field order.
    pub fn report_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for (name, change) in &self.entries {
            render(name, change, &mut lines);
        }
        lines
    }
}

impl fmt::Display for ChangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines = self.report_lines();
        if lines.is_empty() {
            return writeln!(f, "(no changes)");
        }
        for line in lines {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

fn render(path: &str, change: &Change, lines: &mut Vec<String>) {
    match change {
        Change::Unchanged(_) => {}
        Change::Added(ty) => lines.push(format!("+ {path}: {ty}")),
        Change::Removed(ty) => lines.push(format!("- {path}: {ty}")),
        Change::Retyped { before, after } => lines.push(format!("~ {path}: {before} -> {after}")),
        Change::Nested(set) => {
            for (name, nested) in &set.entries {
                render(&format!("{path}.{name}"), nested, lines);
            }
        }
        Change::Positional(inner) => render(&format!("{path}[]"), inner, lines),
    }
}

pub fn compare(before: &SchemaType, after: &SchemaType) -> Result<ChangeSet> {
    match (before, after) {
        (SchemaType::Object(before), SchemaType::Object(after)) => Ok(compare_fields(before, after)),
        _ => Err(EngineError::InvalidSchemaShape(format!(
            "cannot compare {before} with {after}: both schemas must be objects"
        ))),
    }
}

fn compare_fields(
    before: &BTreeMap<String, SchemaType>,
    after: &BTreeMap<String, SchemaType>,
) -> ChangeSet {
    let mut entries = BTreeMap::new();
    for (name, before_type) in before {
        let change = match after.get(name) {
            Some(after_type) => compare_slot(before_type, after_type),
            None => Change::Removed(before_type.clone()),
        };
        entries.insert(name.clone(), change);
    }
    for (name, after_type) in after {
        if !before.contains_key(name) {
            entries.insert(name.clone(), Change::Added(after_type.clone()));
        }
    }
    ChangeSet { entries }
}

fn compare_slot(before: &SchemaType, after: &SchemaType) -> Change {
    if before == after {
        return Change::Unchanged(after.clone());
    }
    match (before, after) {
        (SchemaType::Object(before), SchemaType::Object(after)) => {
            Change::Nested(compare_fields(before, after))
        }
        (SchemaType::Array(before), SchemaType::Array(after)) => {
            Change::Positional(Box::new(compare_slot(before, after)))
        }
        _ => Change::Retyped {
            before: before.clone(),
            after: after.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compare_tags_every_branch() {
        let before = SchemaType::object([
            ("id", SchemaType::INTEGER),
            ("gone", SchemaType::TEXT),
            ("doc", SchemaType::object([("a", SchemaType::TEXT)])),
            ("tags", SchemaType::array(SchemaType::INTEGER)),
        ]);
        let after = SchemaType::object([
            ("id", SchemaType::TEXT),
            ("doc", SchemaType::object([("a", SchemaType::TEXT), ("b", SchemaType::BOOLEAN)])),
            ("tags", SchemaType::array(SchemaType::TEXT)),
            ("fresh", SchemaType::FLOAT),
        ]);
        let changes = compare(&before, &after).unwrap();

        assert!(matches!(changes.get("id"), Some(Change::Retyped { .. })));
        assert_eq!(changes.get("gone"), Some(&Change::Removed(SchemaType::TEXT)));
        assert_eq!(changes.get("fresh"), Some(&Change::Added(SchemaType::FLOAT)));
        let Some(Change::Nested(doc)) = changes.get("doc") else {
            panic!("expected nested change for doc");
        };
        assert_eq!(doc.get("a"), Some(&Change::Unchanged(SchemaType::TEXT)));
        assert_eq!(doc.get("b"), Some(&Change::Added(SchemaType::BOOLEAN)));
        let Some(Change::Positional(tags)) = changes.get("tags") else {
            panic!("expected positional change for tags");
        };
        assert!(matches!(tags.as_ref(), Change::Retyped { .. }));
    }

    #[test]
    fn report_uses_markers_and_dotted_paths() {
        let before = SchemaType::object([
            ("items", SchemaType::array(SchemaType::object([("qty", SchemaType::INTEGER)]))),
            ("old", SchemaType::BOOLEAN),
        ]);
        let after = SchemaType::object([
            (
                "items",
                SchemaType::array(SchemaType::object([
                    ("qty", SchemaType::FLOAT),
                    ("sku", SchemaType::TEXT),
                ])),
            ),
        ]);
        let report = compare(&before, &after).unwrap().to_string();
        assert_eq!(
            report,
            "~ items[].qty: integer -> float\n+ items[].sku: text\n- old: boolean\n"
        );
    }

    #[test]
    fn identical_schemas_report_no_changes() {
        let schema = SchemaType::object([("id", SchemaType::INTEGER)]);
        let changes = compare(&schema, &schema).unwrap();
        assert!(changes.is_empty());
        assert_eq!(changes.to_string(), "(no changes)\n");
    }

    #[test]
    fn non_object_inputs_are_rejected() {
        let err = compare(&SchemaType::TEXT, &SchemaType::empty_object()).unwrap_err();
        assert!(matches!(err, EngineError::InvalidSchemaShape(_)));
    }
}
