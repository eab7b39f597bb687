pub mod catalog;
pub mod cli;
pub mod config;
pub mod ddl;
pub mod detect;
pub mod error;
pub mod evolution;
pub mod io_utils;
pub mod merge;
pub mod normalize;
pub mod pipeline;
pub mod preprocess;
pub mod schema;
pub mod value;

use std::{env, io::Write, path::Path, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, info, warn};

use crate::{
    cli::{Cli, Commands},
    config::EngineConfig,
    normalize::Normalizer,
    schema::SchemaType,
};

pub use crate::{
    catalog::{PhysicalColumnDescriptor, flatten, rebuild},
    ddl::diff_statements,
    detect::detect,
    error::EngineError,
    evolution::{Change, ChangeSet, compare},
    merge::merge,
    normalize::normalize,
    preprocess::de_index_encode,
    schema::{ColumnPath, PrimitiveKind, UnionSet},
    value::{PartialValue, Value},
};

const DEFAULT_TABLE: &str = "doc";

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("crate_evolve", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Normalize(args) => handle_normalize(&args),
        Commands::Rebuild(args) => handle_rebuild(&args),
        Commands::Diff(args) => handle_diff(&args),
    }
}

fn handle_normalize(args: &cli::NormalizeArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let strategy = args.strategy.unwrap_or(config.conflict_strategy);
    let de_index = args.de_index || config.de_index_arrays;
    let table = config
        .table_with_override(args.table.as_deref())
        .unwrap_or(DEFAULT_TABLE)
        .to_string();
    info!(
        "Normalizing '{}' for table '{}' with strategy {}",
        args.input.display(),
        table,
        strategy
    );

    let (starting, from_catalog) =
        starting_schema(args.schema.as_deref(), args.catalog.as_deref())?;
    let documents = io_utils::read_documents_from_path(&args.input)?;
    debug!("Read {} document(s)", documents.len());

    let normalizer = Normalizer::new(strategy);
    let physical = from_catalog.then_some(&starting);
    let outcome = pipeline::run_batch(&normalizer, &starting, documents, de_index, physical)
        .with_context(|| format!("Normalizing documents from {:?}", args.input))?;

    let mut output = io_utils::open_output(args.output.as_deref())?;
    let written = io_utils::write_documents(&mut output, &outcome.clean)?;

    match &args.malformed {
        Some(path) => {
            let mut sink = io_utils::open_output(Some(path.as_path()))?;
            let fragments = outcome.malformed.iter().map(|(_, fragment)| fragment);
            io_utils::write_documents(&mut sink, fragments)
                .with_context(|| format!("Writing malformed fragments to {path:?}"))?;
        }
        None if outcome.malformed_count() > 0 => warn!(
            "{} document(s) carried malformed values; pass --malformed to keep them",
            outcome.malformed_count()
        ),
        None => {}
    }

    if let Some(path) = &args.schema_out {
        io_utils::save_schema(path, &outcome.schema)?;
        info!("Widened schema written to {path:?}");
    }

    let statements = ddl::diff_statements(&starting, &outcome.schema, &table)
        .context("Generating column DDL")?;
    match &args.ddl_out {
        Some(path) => {
            let mut sink = io_utils::open_output(Some(path.as_path()))?;
            write_statements(&mut sink, &statements)
                .with_context(|| format!("Writing DDL to {path:?}"))?;
        }
        None => write_statements(&mut std::io::stderr(), &statements).context("Writing DDL")?,
    }

    info!(
        "Normalized {} document(s); {} new column(s); {} malformed",
        written,
        statements.len(),
        outcome.malformed_count()
    );
    Ok(())
}

/// Starting schema for a normalize run, and whether it describes the columns
/// that already exist in the store.
fn starting_schema(schema: Option<&Path>, catalog: Option<&Path>) -> Result<(SchemaType, bool)> {
    if let Some(path) = schema {
        return Ok((io_utils::load_schema(path)?, false));
    }
    if let Some(path) = catalog {
        let columns = io_utils::load_catalog(path)?;
        let rebuilt = catalog::rebuild(&columns)
            .with_context(|| format!("Rebuilding schema from catalog {path:?}"))?;
        return Ok((rebuilt, true));
    }
    Ok((SchemaType::empty_object(), false))
}

fn handle_rebuild(args: &cli::RebuildArgs) -> Result<()> {
    let columns = io_utils::load_catalog(&args.catalog)?;
    let schema = catalog::rebuild(&columns)
        .with_context(|| format!("Rebuilding schema from catalog {:?}", args.catalog))?;
    match &args.output {
        Some(path) if !io_utils::is_dash(path) => io_utils::save_schema(path, &schema)?,
        _ => {
            let yaml = serde_yaml::to_string(&schema).context("Serializing schema YAML")?;
            print!("{yaml}");
        }
    }
    info!(
        "Rebuilt schema with {} top-level column(s) from {} descriptor(s)",
        schema.as_object().map_or(0, |fields| fields.len()),
        columns.len()
    );
    Ok(())
}

fn handle_diff(args: &cli::DiffArgs) -> Result<()> {
    let before = io_utils::load_schema(&args.before)?;
    let after = io_utils::load_schema(&args.after)?;
    if args.report {
        let changes = evolution::compare(&before, &after).context("Comparing schemas")?;
        print!("{changes}");
        return Ok(());
    }
    let statements =
        ddl::diff_statements(&before, &after, &args.table).context("Generating column DDL")?;
    write_statements(&mut std::io::stdout(), &statements)?;
    info!("{} column statement(s) for table '{}'", statements.len(), args.table);
    Ok(())
}

fn write_statements<W: Write + ?Sized>(writer: &mut W, statements: &[String]) -> Result<()> {
    for statement in statements {
        writeln!(writer, "{statement};")?;
    }
    writer.flush()?;
    Ok(())
}
