//! Staged relationships, the review state machine, and the durable files
//!
//! Three JSON documents carry state between runs:
//! - staging: every proposed relationship with its review status
//! - approved: append-only log of approved relationships
//! - progress: the set of cluster ids already sent to inference
//!
//! All three are rewritten whole through a temporary sibling file and a
//! rename, so a crash leaves either the old or the new document.

use super::{PipelineError, PipelineResult};
use crate::graph::RelationshipType;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

/// Review lifecycle of a staged relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    PendingReview,
    Approved,
    Rejected,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::PendingReview => "pending_review",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReviewStatus::PendingReview)
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A relationship proposed by discovery and awaiting (or past) review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRelationship {
    /// Nil only transiently, for records written before ids existed
    #[serde(default)]
    pub id: Uuid,
    pub source_id: String,
    pub target_id: String,
    pub relationship_type: RelationshipType,
    pub confidence: f64,
    #[serde(default)]
    pub evidence: String,
    pub discovered_by: String,
    pub discovered_at: DateTime<Utc>,
    /// Cluster whose inference call produced this proposal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
    pub status: ReviewStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_by: Option<String>,
}

impl CandidateRelationship {
    /// A fresh `pending_review` proposal
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        relationship_type: RelationshipType,
        confidence: f64,
        evidence: impl Into<String>,
        discovered_by: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_id: source_id.into(),
            target_id: target_id.into(),
            relationship_type,
            confidence,
            evidence: evidence.into(),
            discovered_by: discovered_by.into(),
            discovered_at: Utc::now(),
            cluster_id: None,
            status: ReviewStatus::PendingReview,
            reviewed_by: None,
            reviewed_at: None,
            modified_by: None,
        }
    }

    pub fn with_cluster(mut self, cluster_id: impl Into<String>) -> Self {
        self.cluster_id = Some(cluster_id.into());
        self
    }

    pub fn is_pending(&self) -> bool {
        self.status == ReviewStatus::PendingReview
    }

    /// First 8 hex digits of the id; enough for `review approve <ID>`
    pub fn short_id(&self) -> String {
        self.id.simple().to_string()[..8].to_string()
    }

    /// Identity used for duplicate suppression and edge uniqueness
    pub fn key(&self) -> (&str, &str, RelationshipType) {
        (&self.source_id, &self.target_id, self.relationship_type)
    }

    pub fn approve(&mut self, reviewer: &str) -> PipelineResult<()> {
        self.transition(ReviewStatus::Approved, reviewer)
    }

    pub fn reject(&mut self, reviewer: &str) -> PipelineResult<()> {
        self.transition(ReviewStatus::Rejected, reviewer)
    }

    /// Change the proposed type; the relationship stays pending
    pub fn retype(&mut self, relationship_type: RelationshipType, editor: &str) -> PipelineResult<()> {
        if !self.is_pending() {
            return Err(PipelineError::IllegalTransition {
                id: self.id,
                from: self.status,
                to: self.status,
            });
        }
        self.relationship_type = relationship_type;
        self.modified_by = Some(editor.to_string());
        Ok(())
    }

    /// Only pending_review → approved | rejected is legal.
    fn transition(&mut self, to: ReviewStatus, reviewer: &str) -> PipelineResult<()> {
        if self.status != ReviewStatus::PendingReview || to == ReviewStatus::PendingReview {
            return Err(PipelineError::IllegalTransition {
                id: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.reviewed_by = Some(reviewer.to_string());
        self.reviewed_at = Some(Utc::now());
        Ok(())
    }
}

/// Minimal shape handed to external loaders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRecord {
    pub source_id: String,
    pub target_id: String,
    #[serde(rename = "type")]
    pub relationship_type: RelationshipType,
    pub confidence: f64,
    pub evidence: String,
}

impl From<&CandidateRelationship> for ExportRecord {
    fn from(rel: &CandidateRelationship) -> Self {
        Self {
            source_id: rel.source_id.clone(),
            target_id: rel.target_id.clone(),
            relationship_type: rel.relationship_type,
            confidence: rel.confidence,
            evidence: rel.evidence.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// File helpers
// ---------------------------------------------------------------------------

/// Give id-less records a fresh id; returns how many were assigned
fn assign_missing_ids(relationships: &mut [CandidateRelationship]) -> usize {
    let mut assigned = 0;
    for rel in relationships.iter_mut().filter(|r| r.id.is_nil()) {
        rel.id = Uuid::new_v4();
        assigned += 1;
    }
    assigned
}

fn read_json<T: DeserializeOwned>(path: &Path) -> PipelineResult<Option<T>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(PipelineError::Persistence {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| PipelineError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
}

/// Write `value` as pretty JSON via a temporary sibling and a rename
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> PipelineResult<()> {
    let persistence = |source| PipelineError::Persistence {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(persistence)?;
    }
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| PipelineError::Corrupt {
        path: path.to_path_buf(),
        source,
    })?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes).map_err(persistence)?;
    fs::rename(&tmp, path).map_err(persistence)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// StagingStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
struct StagingDocument {
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    total_relationships: usize,
    #[serde(default)]
    pending_review: usize,
    #[serde(default)]
    relationships: Vec<CandidateRelationship>,
}

/// Every staged relationship, loaded in memory and flushed on `save`
#[derive(Debug)]
pub struct StagingStore {
    path: PathBuf,
    relationships: Vec<CandidateRelationship>,
    last_updated: Option<DateTime<Utc>>,
}

impl StagingStore {
    /// Load the staging file; a missing file is an empty store
    pub fn load(path: impl Into<PathBuf>) -> PipelineResult<Self> {
        let path = path.into();
        let doc: StagingDocument = read_json(&path)?.unwrap_or_default();
        let mut store = Self {
            path,
            relationships: doc.relationships,
            last_updated: doc.last_updated,
        };
        // Ids must survive between invocations for prefix lookups to work
        let assigned = assign_missing_ids(&mut store.relationships);
        if assigned > 0 {
            info!(count = assigned, path = %store.path.display(), "assigned missing relationship ids");
            store.save()?;
        }
        Ok(store)
    }

    pub fn save(&mut self) -> PipelineResult<()> {
        let now = Utc::now();
        let doc = StagingDocument {
            last_updated: Some(now),
            total_relationships: self.relationships.len(),
            pending_review: self.pending_count(),
            relationships: std::mem::take(&mut self.relationships),
        };
        let result = write_json_atomic(&self.path, &doc);
        self.relationships = doc.relationships;
        if result.is_ok() {
            self.last_updated = Some(now);
        }
        result
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    pub fn relationships(&self) -> &[CandidateRelationship] {
        &self.relationships
    }

    pub fn len(&self) -> usize {
        self.relationships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relationships.is_empty()
    }

    pub fn pending(&self) -> impl Iterator<Item = &CandidateRelationship> {
        self.relationships.iter().filter(|r| r.is_pending())
    }

    pub fn pending_count(&self) -> usize {
        self.pending().count()
    }

    /// Ids of pending relationships, in staging order
    pub fn pending_ids(&self) -> Vec<Uuid> {
        self.pending().map(|r| r.id).collect()
    }

    pub fn get(&self, id: Uuid) -> Option<&CandidateRelationship> {
        self.relationships.iter().find(|r| r.id == id)
    }

    pub fn get_mut(&mut self, id: Uuid) -> Option<&mut CandidateRelationship> {
        self.relationships.iter_mut().find(|r| r.id == id)
    }

    /// Whether any staged relationship, in any status, has this identity
    pub fn contains_key(&self, source_id: &str, target_id: &str, ty: RelationshipType) -> bool {
        self.relationships
            .iter()
            .any(|r| r.key() == (source_id, target_id, ty))
    }

    pub fn append(&mut self, relationships: impl IntoIterator<Item = CandidateRelationship>) -> usize {
        let before = self.relationships.len();
        self.relationships.extend(relationships);
        self.relationships.len() - before
    }
}

// ---------------------------------------------------------------------------
// ApprovedStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
struct ApprovedDocument {
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    total: usize,
    #[serde(default)]
    relationships: Vec<CandidateRelationship>,
}

/// Append-only log of approved relationships; the materializer's input
#[derive(Debug)]
pub struct ApprovedStore {
    path: PathBuf,
    relationships: Vec<CandidateRelationship>,
}

impl ApprovedStore {
    pub fn load(path: impl Into<PathBuf>) -> PipelineResult<Self> {
        let path = path.into();
        let doc: ApprovedDocument = read_json(&path)?.unwrap_or_default();
        let mut store = Self {
            path,
            relationships: doc.relationships,
        };
        if assign_missing_ids(&mut store.relationships) > 0 {
            store.save()?;
        }
        Ok(store)
    }

    pub fn save(&self) -> PipelineResult<()> {
        #[derive(Serialize)]
        struct Borrowed<'a> {
            last_updated: DateTime<Utc>,
            total: usize,
            relationships: &'a [CandidateRelationship],
        }
        write_json_atomic(
            &self.path,
            &Borrowed {
                last_updated: Utc::now(),
                total: self.relationships.len(),
                relationships: &self.relationships,
            },
        )
    }

    /// Record an approved relationship. Anything else is refused.
    pub fn append(&mut self, relationship: CandidateRelationship) -> PipelineResult<()> {
        if relationship.status != ReviewStatus::Approved {
            return Err(PipelineError::IllegalTransition {
                id: relationship.id,
                from: relationship.status,
                to: ReviewStatus::Approved,
            });
        }
        if !self.relationships.iter().any(|r| r.id == relationship.id) {
            self.relationships.push(relationship);
        }
        Ok(())
    }

    pub fn relationships(&self) -> &[CandidateRelationship] {
        &self.relationships
    }

    pub fn len(&self) -> usize {
        self.relationships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relationships.is_empty()
    }

    /// Write the minimal `{source_id, target_id, type, confidence, evidence}`
    /// export; returns the number of records written.
    pub fn export(&self, path: &Path) -> PipelineResult<usize> {
        let records: Vec<ExportRecord> = self.relationships.iter().map(ExportRecord::from).collect();
        write_json_atomic(path, &records)?;
        Ok(records.len())
    }
}

// ---------------------------------------------------------------------------
// ProgressCheckpoint
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
struct ProgressDocument {
    #[serde(default)]
    processed_clusters: BTreeSet<String>,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
}

/// Set of cluster ids already sent to inference
#[derive(Debug)]
pub struct ProgressCheckpoint {
    path: PathBuf,
    processed: BTreeSet<String>,
}

impl ProgressCheckpoint {
    pub fn load(path: impl Into<PathBuf>) -> PipelineResult<Self> {
        let path = path.into();
        let doc: ProgressDocument = read_json(&path)?.unwrap_or_default();
        Ok(Self {
            path,
            processed: doc.processed_clusters,
        })
    }

    /// An empty checkpoint bound to `path`; nothing is written until `save`
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            processed: BTreeSet::new(),
        }
    }

    pub fn save(&self) -> PipelineResult<()> {
        #[derive(Serialize)]
        struct Borrowed<'a> {
            processed_clusters: &'a BTreeSet<String>,
            last_updated: DateTime<Utc>,
        }
        write_json_atomic(
            &self.path,
            &Borrowed {
                processed_clusters: &self.processed,
                last_updated: Utc::now(),
            },
        )
    }

    pub fn contains(&self, cluster_id: &str) -> bool {
        self.processed.contains(cluster_id)
    }

    /// Returns false if the cluster was already recorded
    pub fn mark(&mut self, cluster_id: impl Into<String>) -> bool {
        self.processed.insert(cluster_id.into())
    }

    pub fn clear(&mut self) {
        self.processed.clear();
    }

    pub fn len(&self) -> usize {
        self.processed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processed.is_empty()
    }
}
