//! Where entities come from
//!
//! Discovery reads the corpus through `EntitySource`. The graph store is
//! the usual source; a directory of pattern markdown files seeds the store
//! in the first place.

mod frontmatter;

pub use frontmatter::{PatternDirectory, ScanReport, SeedReport};

use crate::graph::Entity;
use crate::storage::{GraphStore, StorageError};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("bad frontmatter in {path}: {message}")]
    Frontmatter { path: PathBuf, message: String },
}

/// Supplies the full entity set for a discovery run. Read-only.
pub trait EntitySource: Send + Sync {
    fn load_entities(&self) -> Result<Vec<Entity>, SourceError>;
}

/// Entities currently in a graph store
pub struct StoreSource {
    store: Arc<dyn GraphStore>,
}

impl StoreSource {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }
}

impl EntitySource for StoreSource {
    fn load_entities(&self) -> Result<Vec<Entity>, SourceError> {
        Ok(self.store.list_entities()?)
    }
}

impl EntitySource for Vec<Entity> {
    fn load_entities(&self) -> Result<Vec<Entity>, SourceError> {
        Ok(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{OpenStore, SqliteStore};

    #[test]
    fn store_source_lists_entities_in_title_order() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.upsert_entity(&Entity::new("b", "Beta")).unwrap();
        store.upsert_entity(&Entity::new("a", "Alpha")).unwrap();

        let source = StoreSource::new(Arc::new(store));
        let ids: Vec<String> = source
            .load_entities()
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
