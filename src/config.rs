use std::{fmt, fs::File, io::Read, path::Path, str::FromStr};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// How the normalizer treats a value whose type conflicts with its slot.
///
/// Held fixed for the lifetime of a consumer process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// Conflicting values become null and are discarded.
    #[serde(alias = "null_on_conflict")]
    Drop,
    /// Conflicting values keep the bare name; uncastable ones are preserved
    /// in the malformed-fragment document.
    #[serde(alias = "store_malformed")]
    PreserveAsFragment,
    /// Conflicting values move to a type-suffixed sibling field; anything
    /// still uncastable is preserved as a fragment.
    #[default]
    #[serde(alias = "suffix_and_malformed")]
    SuffixAndFragment,
}

impl ConflictStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictStrategy::Drop => "null_on_conflict",
            ConflictStrategy::PreserveAsFragment => "store_malformed",
            ConflictStrategy::SuffixAndFragment => "suffix_and_malformed",
        }
    }

    pub fn variants() -> &'static [&'static str] {
        &["null_on_conflict", "store_malformed", "suffix_and_malformed"]
    }

    pub fn suffixes_fields(&self) -> bool {
        matches!(self, ConflictStrategy::SuffixAndFragment)
    }

    pub fn keeps_fragments(&self) -> bool {
        !matches!(self, ConflictStrategy::Drop)
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictStrategy {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "drop" | "null_on_conflict" | "null" => Ok(ConflictStrategy::Drop),
            "preserve_as_fragment" | "store_malformed" | "malformed" => {
                Ok(ConflictStrategy::PreserveAsFragment)
            }
            "suffix_and_fragment" | "suffix_and_malformed" | "suffix" => {
                Ok(ConflictStrategy::SuffixAndFragment)
            }
            _ => Err(anyhow!(
                "Unknown conflict strategy '{value}'. Supported strategies: {}",
                ConflictStrategy::variants().join(", ")
            )),
        }
    }
}

/// Consumer settings read once at start.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub conflict_strategy: ConflictStrategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    /// Rewrite `{"_0": .., "_1": ..}` objects into arrays before normalizing.
    pub de_index_arrays: bool,
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let mut file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let mut raw = String::new();
        file.read_to_string(&mut raw)
            .with_context(|| format!("Reading config file {path:?}"))?;
        Self::from_yaml(&raw).with_context(|| format!("Parsing config file {path:?}"))
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    /// The table to target: `table_override` (a CLI flag) wins over the
    /// configured table.
    pub fn table_with_override<'a>(&'a self, table_override: Option<&'a str>) -> Option<&'a str> {
        table_override.or(self.table.as_deref())
    }
}
