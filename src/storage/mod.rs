//! Storage backends for the pattern graph
//!
//! The pipeline talks to storage through the `GraphStore` trait.
//! The shipped implementation is `SqliteStore` for persistent storage.

mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{EdgeOutcome, GraphStore, OpenStore, StorageError, StorageResult};
