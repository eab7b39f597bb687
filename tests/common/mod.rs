#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate_evolve::value::Value;
use tempfile::{TempDir, tempdir};

/// Parses a JSON literal into an engine value.
pub fn doc(raw: &str) -> Value {
    let json: serde_json::Value = serde_json::from_str(raw).expect("valid JSON literal");
    Value::from_json(json).expect("convertible JSON literal")
}

pub fn docs(raw: &[&str]) -> Vec<Value> {
    raw.iter().map(|literal| doc(literal)).collect()
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }
}
