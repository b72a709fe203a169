//! Common test utilities for pipeline integration tests
//!
//! Provides a throwaway workspace (data directory plus SQLite store) and
//! a small pattern corpus written as frontmatter markdown.

pub mod corpus;

pub use corpus::{write_pattern, PatternFixture, FOUR_PATTERNS};

use constellation::{DataFiles, OpenStore, SqliteStore};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Temporary data directory, pattern directory and database
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        std::fs::create_dir_all(dir.path().join("patterns")).expect("failed to create patterns dir");
        Self { dir }
    }

    pub fn files(&self) -> DataFiles {
        DataFiles::new(self.dir.path().join("data"))
    }

    pub fn patterns_dir(&self) -> PathBuf {
        self.dir.path().join("patterns")
    }

    pub fn db_path(&self) -> PathBuf {
        self.dir.path().join("graph.db")
    }

    pub fn open_store(&self) -> SqliteStore {
        SqliteStore::open(self.db_path()).expect("failed to open store")
    }

    /// Write every fixture into the pattern directory
    pub fn write_patterns(&self, patterns: &[PatternFixture]) {
        for pattern in patterns {
            write_pattern(&self.patterns_dir(), pattern);
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }
}

/// One relationship as the inference service would return it
pub fn proposal(source: &str, target: &str, ty: &str, confidence: f64) -> Value {
    json!({
        "source_id": source,
        "target_id": target,
        "relationship_type": ty,
        "confidence": confidence,
        "evidence": format!("{} feeds into {}", source, target),
    })
}
