//! Discovery → review → materialization pipeline
//!
//! Entities are partitioned into clusters, each cluster is sent to the
//! inference service once, proposals land in the staging file as
//! `pending_review`, reviewers approve or reject them, and approved
//! relationships are written into the graph store as edges.
//!
//! The JSON files under the data directory are the interchange format
//! between stages. A single writer process per data directory is assumed.

pub mod cluster;
pub mod discovery;
pub mod materialize;
pub mod review;
pub mod staging;

pub use cluster::{cluster_id, Cluster, Clusterer};
pub use discovery::{
    staging_summary, ClusterOutcome, DiscoveryEngine, DiscoveryOptions, DiscoveryPlan,
    DiscoveryReport, DiscoveryRun, StagingSummary,
};
pub use materialize::{MaterializeReport, Materializer};
pub use review::{
    AssumeYes, BatchOutcome, Decision, RelationshipView, ReviewEngine, ReviewPrompt,
    ReviewStatistics, SessionSummary, TerminalPrompt,
};
pub use staging::{
    ApprovedStore, CandidateRelationship, ExportRecord, ProgressCheckpoint, ReviewStatus,
    StagingStore,
};

use crate::source::SourceError;
use crate::storage::StorageError;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by pipeline stages
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("entity source error: {0}")]
    Source(#[from] SourceError),

    #[error("failed to persist {path}: {source}")]
    Persistence {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("corrupt state file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("relationship {id} is {from}; cannot move it to {to}")]
    IllegalTransition {
        id: Uuid,
        from: ReviewStatus,
        to: ReviewStatus,
    },

    #[error("relationship not found: {0}")]
    RelationshipNotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("prompt I/O failed: {0}")]
    Prompt(#[source] std::io::Error),
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// File layout of a data directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFiles {
    root: PathBuf,
}

impl DataFiles {
    pub const STAGING: &'static str = "relationship_staging.json";
    pub const APPROVED: &'static str = "relationships_approved.json";
    pub const PROGRESS: &'static str = "discovery_progress.json";
    pub const EXPORT: &'static str = "relationships_export.json";

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn staging(&self) -> PathBuf {
        self.root.join(Self::STAGING)
    }

    pub fn approved(&self) -> PathBuf {
        self.root.join(Self::APPROVED)
    }

    pub fn progress(&self) -> PathBuf {
        self.root.join(Self::PROGRESS)
    }

    pub fn export(&self) -> PathBuf {
        self.root.join(Self::EXPORT)
    }
}
