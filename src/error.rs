use thiserror::Error;

pub type Result<T, E = EngineError> = std::result::Result<T, E>;

/// Failures surfaced by the schema-evolution engine.
///
/// Malformed values are not errors: they degrade into partial values and are
/// split out by the normalizer according to the configured conflict strategy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The input holds a value the engine cannot type. The document must be
    /// surfaced to the caller rather than dropped.
    #[error("Unsupported value kind: {0}")]
    UnsupportedValueKind(String),

    /// The store catalog reported a data type token with no schema mapping.
    /// The table needs a manual schema review before evolution can continue.
    #[error("Unknown physical type '{data_type}' for column '{column}'")]
    UnknownPhysicalType { column: String, data_type: String },

    #[error("Invalid schema shape: {0}")]
    InvalidSchemaShape(String),
}
