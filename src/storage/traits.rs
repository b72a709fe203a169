//! Storage trait definitions

use crate::graph::{Entity, GraphEdge, RelationshipType};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParse(String),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// What happened when an edge was offered to the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeOutcome {
    /// A new edge was written
    Created,
    /// One or both endpoints are not in the store; nothing was written
    EndpointNotFound { missing: Vec<String> },
    /// An edge with the same (source, target, type) already exists
    AlreadyExists,
}

/// Trait for graph storage backends
///
/// Implementations must be thread-safe (Send + Sync) so a single store can
/// back discovery workers and the review display at the same time.
pub trait GraphStore: Send + Sync {
    // === Entity Operations ===

    /// Insert or update a pattern
    fn upsert_entity(&self, entity: &Entity) -> StorageResult<()>;

    /// Load a pattern by ID
    fn find_entity(&self, id: &str) -> StorageResult<Option<Entity>>;

    /// All patterns, ordered by title then id
    fn list_entities(&self) -> StorageResult<Vec<Entity>>;

    // === Edge Operations ===

    /// Create an edge if both endpoints exist and it is not already present.
    ///
    /// Must be atomic: the endpoint check and the insert happen in one
    /// transaction, and at most one edge exists per (source, target, type).
    fn create_edge(&self, edge: &GraphEdge) -> StorageResult<EdgeOutcome>;

    /// Whether an edge with this (source, target, type) exists
    fn has_edge(
        &self,
        source_id: &str,
        target_id: &str,
        relationship_type: RelationshipType,
    ) -> StorageResult<bool>;

    /// Number of edges of one type
    fn count_edges(&self, relationship_type: RelationshipType) -> StorageResult<usize>;

    /// Edges touching a pattern, in either direction
    fn edges_for(&self, entity_id: &str) -> StorageResult<Vec<GraphEdge>>;

    /// Display title for a pattern, falling back to the raw id
    fn title_of(&self, id: &str) -> String {
        match self.find_entity(id) {
            Ok(Some(entity)) if !entity.title.is_empty() => entity.title,
            _ => id.to_string(),
        }
    }
}

/// Extension trait for opening stores from paths
pub trait OpenStore: GraphStore + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}
