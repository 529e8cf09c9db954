#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use placement_metrics::{
    catalog,
    data::Dataset,
    ingest::{self, IngestOptions},
    view::ViewDefinition,
};
use tempfile::{TempDir, tempdir};

/// Absolute path to a fixture under `tests/data`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

pub fn fixture_str(name: &str) -> String {
    fixture_path(name).to_str().expect("utf-8 path").to_string()
}

pub fn view(name: &str) -> ViewDefinition {
    catalog::find(name).unwrap_or_else(|| panic!("view {name} exists"))
}

/// Ingests CSV text for `view`, panicking on rejection.
pub fn load_csv(view: &ViewDefinition, contents: &str) -> Dataset {
    ingest::ingest_bytes(
        contents.as_bytes(),
        "inline.csv",
        &view.schema,
        &IngestOptions::default(),
    )
    .expect("ingest inline csv")
    .dataset
}

pub fn load_fixture(view: &ViewDefinition, name: &str) -> Dataset {
    ingest::ingest_path(&fixture_path(name), &view.schema, &IngestOptions::default())
        .expect("ingest fixture")
        .dataset
}

/// Scratch directory removed on drop.
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

    pub fn file(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// Writes `contents` under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.file(name);
        fs::write(&path, contents).expect("write temp file");
        path
    }
}
