//! Approved relationships → graph edges

use super::staging::{ApprovedStore, CandidateRelationship, ReviewStatus};
use super::{DataFiles, PipelineResult};
use crate::graph::{GraphEdge, RelationshipType};
use crate::storage::{EdgeOutcome, GraphStore, StorageResult};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Error messages kept verbatim in a report
const MAX_REPORTED_ERRORS: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterializeReport {
    pub attempted: usize,
    pub loaded: usize,
    /// An endpoint is not in the store
    pub skipped: usize,
    /// Edge with the same (source, target, type) already present
    pub duplicates: usize,
    pub errored: usize,
    pub by_type: BTreeMap<RelationshipType, usize>,
    /// First few failure messages
    pub errors: Vec<String>,
}

impl MaterializeReport {
    fn record_error(&mut self, message: String) {
        self.errored += 1;
        if self.errors.len() < MAX_REPORTED_ERRORS {
            self.errors.push(message);
        }
    }
}

/// Writes approved relationships into a graph store
pub struct Materializer<'a> {
    store: &'a dyn GraphStore,
}

impl<'a> Materializer<'a> {
    pub fn new(store: &'a dyn GraphStore) -> Self {
        Self { store }
    }

    /// Materialize everything in the approved log of `files`
    pub fn materialize_approved(&self, files: &DataFiles) -> PipelineResult<MaterializeReport> {
        let approved = ApprovedStore::load(files.approved())?;
        Ok(self.materialize(approved.relationships()))
    }

    pub fn materialize(&self, relationships: &[CandidateRelationship]) -> MaterializeReport {
        let mut report = MaterializeReport::default();

        for rel in relationships {
            report.attempted += 1;

            if rel.status != ReviewStatus::Approved {
                report.record_error(format!(
                    "{} -[{}]-> {}: status is {}, not approved",
                    rel.source_id, rel.relationship_type, rel.target_id, rel.status
                ));
                continue;
            }

            match self.load_one(rel) {
                Ok(EdgeOutcome::Created) => {
                    report.loaded += 1;
                    *report.by_type.entry(rel.relationship_type).or_default() += 1;
                }
                Ok(EdgeOutcome::AlreadyExists) => report.duplicates += 1,
                Ok(EdgeOutcome::EndpointNotFound { missing }) => {
                    debug!(
                        source = %rel.source_id,
                        target = %rel.target_id,
                        missing = ?missing,
                        "endpoint missing, skipping"
                    );
                    report.skipped += 1;
                }
                Err(e) => {
                    warn!(source = %rel.source_id, target = %rel.target_id, error = %e, "edge failed");
                    report.record_error(format!(
                        "{} -[{}]-> {}: {}",
                        rel.source_id, rel.relationship_type, rel.target_id, e
                    ));
                }
            }
        }

        info!(
            attempted = report.attempted,
            loaded = report.loaded,
            skipped = report.skipped,
            duplicates = report.duplicates,
            errored = report.errored,
            "materialization complete"
        );
        report
    }

    fn load_one(&self, rel: &CandidateRelationship) -> StorageResult<EdgeOutcome> {
        if self
            .store
            .has_edge(&rel.source_id, &rel.target_id, rel.relationship_type)?
        {
            return Ok(EdgeOutcome::AlreadyExists);
        }

        let reviewed_by = rel.reviewed_by.as_deref().unwrap_or("unknown");
        let edge = GraphEdge::new(&rel.source_id, &rel.target_id, rel.relationship_type)
            .with_confidence(rel.confidence)
            .with_evidence(&rel.evidence)
            .with_provenance(&rel.discovered_by, reviewed_by);
        self.store.create_edge(&edge)
    }

    /// Edge counts per type, read back from the store
    pub fn verify(&self) -> StorageResult<BTreeMap<RelationshipType, usize>> {
        RelationshipType::ALL
            .iter()
            .map(|ty| Ok((*ty, self.store.count_edges(*ty)?)))
            .collect()
    }
}
