//! Constellation: pattern knowledge graph with reviewed relationship discovery
//!
//! Patterns are loaded into a graph store, partitioned into clusters, and
//! handed to an inference service that proposes typed relationships
//! between them. Proposals wait in a staging file until a reviewer
//! approves or rejects them; approved relationships become graph edges.
//!
//! # Core Concepts
//!
//! - **Entity**: a pattern (id, title, summary, tags)
//! - **Cluster**: a bounded group of entities sharing a primary tag
//! - **Candidate relationship**: a proposed `ENABLES`, `REQUIRES` or
//!   `TENSIONS_WITH` link with confidence, evidence and review status
//! - **Edge**: an approved relationship materialized in the store
//!
//! # Example
//!
//! ```
//! use constellation::{Clusterer, Entity};
//!
//! let entities = vec![
//!     Entity::new("pat_a", "Flywheel").with_tag("business"),
//!     Entity::new("pat_b", "Moat").with_tag("business"),
//! ];
//! let clusters = Clusterer::new(50).unwrap().cluster(&entities);
//! assert_eq!(clusters.len(), 1);
//! ```

pub mod config;
pub mod graph;
pub mod inference;
pub mod pipeline;
pub mod source;
pub mod storage;

pub use config::{Config, ConfigError};
pub use graph::{Entity, GraphEdge, RelationshipType, UnknownRelationshipType};
pub use inference::{
    ChatCompletionClient, InferenceError, InferenceService, MockInference, Prompt,
};
pub use pipeline::{
    ApprovedStore, CandidateRelationship, Cluster, Clusterer, DataFiles, DiscoveryEngine,
    DiscoveryOptions, DiscoveryReport, DiscoveryRun, MaterializeReport, Materializer,
    PipelineError, PipelineResult, ReviewEngine, ReviewStatus, StagingStore,
};
pub use source::{EntitySource, PatternDirectory, SourceError, StoreSource};
pub use storage::{EdgeOutcome, GraphStore, OpenStore, SqliteStore, StorageError, StorageResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
