//! File and stream plumbing for the command layer.
//!
//! Documents travel as JSON lines, schemas as YAML, and catalog listings as a
//! JSON array of column descriptors. The `-` path routes through stdin or
//! stdout.

use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};

use crate::{catalog::PhysicalColumnDescriptor, schema::SchemaType, value::Value};

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn open_input(path: &Path) -> Result<Box<dyn BufRead>> {
    if is_dash(path) {
        Ok(Box::new(BufReader::new(std::io::stdin().lock())))
    } else {
        Ok(Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Opening input file {path:?}"))?,
        )))
    }
}

pub fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    match path {
        Some(p) if !is_dash(p) => Ok(Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("Creating output file {p:?}"))?,
        ))),
        _ => Ok(Box::new(std::io::stdout())),
    }
}

/// Reads one JSON document per non-blank line.
pub fn read_documents<R: BufRead>(reader: R) -> Result<Vec<Value>> {
    let mut documents = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line_number = idx + 1;
        let line = line.with_context(|| format!("Reading line {line_number}"))?;
        if line.trim().is_empty() {
            continue;
        }
        let raw: serde_json::Value = serde_json::from_str(&line)
            .with_context(|| format!("Parsing JSON document on line {line_number}"))?;
        let document = Value::from_json(raw)
            .with_context(|| format!("Converting document on line {line_number}"))?;
        documents.push(document);
    }
    Ok(documents)
}

pub fn read_documents_from_path(path: &Path) -> Result<Vec<Value>> {
    let reader = open_input(path)?;
    read_documents(reader).with_context(|| format!("Reading documents from {path:?}"))
}

pub fn write_documents<'a, W, I>(writer: &mut W, documents: I) -> Result<usize>
where
    W: Write + ?Sized,
    I: IntoIterator<Item = &'a Value>,
{
    let mut written = 0;
    for document in documents {
        serde_json::to_writer(&mut *writer, document).context("Serializing document")?;
        writer.write_all(b"\n").context("Writing document separator")?;
        written += 1;
    }
    writer.flush().context("Flushing document output")?;
    Ok(written)
}

pub fn load_schema(path: &Path) -> Result<SchemaType> {
    let mut file = File::open(path).with_context(|| format!("Opening schema file {path:?}"))?;
    let mut raw = String::new();
    file.read_to_string(&mut raw)
        .with_context(|| format!("Reading schema file {path:?}"))?;
    if raw.trim().is_empty() {
        return Ok(SchemaType::empty_object());
    }
    let schema: SchemaType =
        serde_yaml::from_str(&raw).with_context(|| format!("Parsing schema file {path:?}"))?;
    if schema.as_object().is_none() {
        return Err(anyhow!(
            "Schema file {path:?} must describe an object at the top level, found {schema}"
        ));
    }
    Ok(schema)
}

pub fn save_schema(path: &Path, schema: &SchemaType) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Creating schema file {path:?}"))?;
    serde_yaml::to_writer(BufWriter::new(file), schema)
        .with_context(|| format!("Writing schema YAML to {path:?}"))
}

pub fn load_catalog(path: &Path) -> Result<Vec<PhysicalColumnDescriptor>> {
    let reader = open_input(path)?;
    serde_json::from_reader(reader).with_context(|| format!("Parsing catalog JSON from {path:?}"))
}
