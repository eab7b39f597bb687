use std::{path::PathBuf, str::FromStr};

use clap::{Args, Parser, Subcommand};

use crate::config::ConflictStrategy;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Evolve CrateDB table schemas from change-data-capture documents",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Normalize JSON-lines documents against a running schema and print the DDL it needs
    Normalize(NormalizeArgs),
    /// Rebuild a schema tree from a column catalog listing
    Rebuild(RebuildArgs),
    /// Compare two schema files as DDL statements or a change report
    Diff(DiffArgs),
}

#[derive(Debug, Args)]
pub struct NormalizeArgs {
    /// JSON-lines input file (use '-' for stdin)
    #[arg(short, long)]
    pub input: PathBuf,
    /// Engine configuration YAML
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Starting schema YAML (defaults to an empty table)
    #[arg(short, long, conflicts_with = "catalog")]
    pub schema: Option<PathBuf>,
    /// Starting column catalog JSON, rebuilt into the starting schema
    #[arg(long)]
    pub catalog: Option<PathBuf>,
    /// Destination for normalized documents (defaults to stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Destination for malformed fragments as JSON lines
    #[arg(long = "malformed")]
    pub malformed: Option<PathBuf>,
    /// Write the widened schema YAML here
    #[arg(long = "schema-out")]
    pub schema_out: Option<PathBuf>,
    /// Write the ALTER TABLE statements here instead of stderr
    #[arg(long = "ddl-out")]
    pub ddl_out: Option<PathBuf>,
    /// Target table name used in generated DDL
    #[arg(short, long)]
    pub table: Option<String>,
    /// Conflict strategy (null_on_conflict, store_malformed, suffix_and_malformed)
    #[arg(long, value_parser = parse_strategy)]
    pub strategy: Option<ConflictStrategy>,
    /// Rewrite `{"_0": .., "_1": ..}` objects into arrays before normalizing
    #[arg(long = "de-index")]
    pub de_index: bool,
}

#[derive(Debug, Args)]
pub struct RebuildArgs {
    /// Column catalog JSON (array of descriptors, '-' for stdin)
    #[arg(short, long)]
    pub catalog: PathBuf,
    /// Destination schema YAML (defaults to stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct DiffArgs {
    /// Last-known schema YAML
    #[arg(long)]
    pub before: PathBuf,
    /// Widened schema YAML
    #[arg(long)]
    pub after: PathBuf,
    /// Target table name used in generated DDL
    #[arg(short, long, default_value = "doc")]
    pub table: String,
    /// Print a change report instead of DDL statements
    #[arg(long)]
    pub report: bool,
}

pub fn parse_strategy(value: &str) -> Result<ConflictStrategy, String> {
    ConflictStrategy::from_str(value).map_err(|err| err.to_string())
}
