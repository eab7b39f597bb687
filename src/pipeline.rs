//! One consumer batch: optional array de-indexing, normalization against the
//! running schema, catalog reconciliation, and the clean/malformed split.

use log::debug;

use crate::{
    error::Result,
    normalize::{Normalizer, cast_document},
    preprocess::de_index_encode,
    schema::SchemaType,
    value::Value,
};

#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    /// Running schema widened by every document in the batch.
    pub schema: SchemaType,
    /// Documents ready for insertion, in input order.
    pub clean: Vec<Value>,
    /// `(position, fragment)` for documents that carried uncastable values.
    pub malformed: Vec<(usize, Value)>,
}

impl BatchOutcome {
    pub fn malformed_count(&self) -> usize {
        self.malformed.len()
    }
}

/// Normalizes `documents` against `schema`. When `physical` is given (the
/// schema rebuilt from the store catalog), every normalized document is also
/// cast against it so values aimed at an existing column of another type
/// become fragments.
pub fn run_batch(
    normalizer: &Normalizer,
    schema: &SchemaType,
    documents: Vec<Value>,
    de_index: bool,
    physical: Option<&SchemaType>,
) -> Result<BatchOutcome> {
    let documents: Vec<Value> = if de_index {
        documents.into_iter().map(de_index_encode).collect()
    } else {
        documents
    };
    let (schema, normalized) = normalizer.normalize_batch(schema, &documents)?;

    let mut clean = Vec::with_capacity(normalized.len());
    let mut malformed = Vec::new();
    for (position, document) in normalized.into_iter().enumerate() {
        let document = match physical {
            Some(physical) => cast_document(physical, &document)?,
            None => document,
        };
        let (kept, fragment) = normalizer.split(&document);
        if let Some(fragment) = fragment {
            malformed.push((position, fragment));
        }
        clean.push(kept);
    }
    debug!(
        "Normalized {} document(s); {} carried malformed fragments",
        clean.len(),
        malformed.len()
    );
    Ok(BatchOutcome {
        schema,
        clean,
        malformed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        catalog::{PhysicalColumnDescriptor, rebuild},
        config::ConflictStrategy,
        schema::ColumnPath,
    };

    fn doc(raw: &str) -> Value {
        Value::from_json(serde_json::from_str(raw).unwrap()).unwrap()
    }

    #[test]
    fn suffixing_batch_widens_schema_without_fragments() {
        let normalizer = Normalizer::new(ConflictStrategy::SuffixAndFragment);
        let outcome = run_batch(
            &normalizer,
            &SchemaType::empty_object(),
            vec![doc(r#"{"id": 1}"#), doc(r#"{"id": "abc"}"#)],
            false,
            None,
        )
        .unwrap();
        assert_eq!(outcome.clean[1], doc(r#"{"id_text": "abc"}"#));
        assert_eq!(outcome.malformed_count(), 0);
        assert!(outcome.schema.field("id").is_some());
    }

    #[test]
    fn preserving_batch_reports_fragment_positions() {
        let normalizer = Normalizer::new(ConflictStrategy::PreserveAsFragment);
        let outcome = run_batch(
            &normalizer,
            &SchemaType::empty_object(),
            vec![doc(r#"{"n": 1}"#), doc(r#"{"n": 2}"#), doc(r#"{"n": "many"}"#)],
            false,
            None,
        )
        .unwrap();
        assert_eq!(outcome.clean[2], doc(r#"{"n": null}"#));
        assert_eq!(outcome.malformed, vec![(2, doc(r#"{"n": "many"}"#))]);
        assert_eq!(outcome.schema, SchemaType::object([("n", SchemaType::INTEGER)]));
    }

    #[test]
    fn dropping_batch_discards_fragments() {
        let normalizer = Normalizer::new(ConflictStrategy::Drop);
        let outcome = run_batch(
            &normalizer,
            &SchemaType::empty_object(),
            vec![doc(r#"{"n": true}"#), doc(r#"{"n": "nope"}"#)],
            false,
            None,
        )
        .unwrap();
        assert_eq!(outcome.clean[1], doc(r#"{"n": null}"#));
        assert!(outcome.malformed.is_empty());
    }

    #[test]
    fn catalog_columns_reconcile_suffixed_and_timestamp_values() {
        let physical = rebuild(&[
            PhysicalColumnDescriptor::new("bigint", ColumnPath::new("id")),
            PhysicalColumnDescriptor::new("bigint", ColumnPath::new("id_text")),
            PhysicalColumnDescriptor::new("timestamp with time zone", ColumnPath::new("ts")),
        ])
        .unwrap();
        let outcome = run_batch(
            &Normalizer::default(),
            &physical,
            vec![doc(r#"{"id": "x", "ts": "2024-01-01T00:00:00Z"}"#)],
            false,
            Some(&physical),
        )
        .unwrap();
        assert_eq!(
            outcome.clean,
            vec![doc(r#"{"id_text": null, "ts": "2024-01-01T00:00:00Z"}"#)]
        );
        assert_eq!(
            outcome.malformed,
            vec![(0, doc(r#"{"id_text": "x", "ts": null}"#))]
        );
    }

    #[test]
    fn de_indexing_runs_before_inference() {
        let normalizer = Normalizer::default();
        let outcome = run_batch(
            &normalizer,
            &SchemaType::empty_object(),
            vec![doc(r#"{"tags": {"_0": "a", "_1": "b"}}"#)],
            true,
            None,
        )
        .unwrap();
        assert_eq!(
            outcome.schema,
            SchemaType::object([("tags", SchemaType::array(SchemaType::TEXT))])
        );
        assert_eq!(outcome.clean[0], doc(r#"{"tags": ["a", "b"]}"#));
    }
}
