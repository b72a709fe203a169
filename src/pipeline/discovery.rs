//! Relationship discovery
//!
//! `DiscoveryEngine` turns one cluster into candidate relationships with a
//! single inference call. `DiscoveryRun` drives a whole pass: cluster the
//! corpus, skip clusters recorded in the checkpoint, fan the rest out to a
//! bounded pool of tasks, and persist staging plus checkpoint as each
//! cluster completes.
//!
//! Inference failures never abort a run. The failed cluster is logged,
//! counted, and still marked processed; `--reset` is the only way to send
//! it again.

use super::cluster::{Cluster, Clusterer};
use super::staging::{CandidateRelationship, ProgressCheckpoint, ReviewStatus, StagingStore};
use super::{DataFiles, PipelineError, PipelineResult};
use crate::graph::RelationshipType;
use crate::inference::{InferenceError, InferenceService, Prompt};
use crate::source::EntitySource;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Characters of each member summary included in the prompt
const SUMMARY_PREVIEW_CHARS: usize = 100;

const SYSTEM_PROMPT: &str =
    "You are an expert pattern analyst. Respond only with valid JSON.";

// ---------------------------------------------------------------------------
// DiscoveryEngine
// ---------------------------------------------------------------------------

/// What one cluster produced
#[derive(Debug, Clone, Default)]
pub struct ClusterOutcome {
    pub cluster_id: String,
    pub relationships: Vec<CandidateRelationship>,
    /// Entries in the payload before any filtering
    pub returned: usize,
    /// Unknown type, missing or foreign ids, self-loops, empty evidence
    pub invalid: usize,
    pub filtered_low_confidence: usize,
    /// Same (source, target, type) proposed twice in one payload
    pub collapsed: usize,
    /// Set when the inference call or payload parse failed
    pub failure: Option<String>,
    /// True when the cluster was too small to send
    pub skipped: bool,
}

impl ClusterOutcome {
    fn new(cluster_id: &str) -> Self {
        Self {
            cluster_id: cluster_id.to_string(),
            ..Default::default()
        }
    }

    pub fn failed(&self) -> bool {
        self.failure.is_some()
    }
}

/// Proposes relationships for one cluster at a time
#[derive(Clone)]
pub struct DiscoveryEngine {
    service: Arc<dyn InferenceService>,
    min_confidence: f64,
}

impl DiscoveryEngine {
    pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.6;

    pub fn new(service: Arc<dyn InferenceService>) -> Self {
        Self {
            service,
            min_confidence: Self::DEFAULT_MIN_CONFIDENCE,
        }
    }

    pub fn with_min_confidence(mut self, min_confidence: f64) -> PipelineResult<Self> {
        if !(0.0..=1.0).contains(&min_confidence) {
            return Err(PipelineError::InvalidArgument(format!(
                "min confidence must be within [0, 1], got {}",
                min_confidence
            )));
        }
        self.min_confidence = min_confidence;
        Ok(self)
    }

    pub fn min_confidence(&self) -> f64 {
        self.min_confidence
    }

    pub fn model_name(&self) -> &str {
        self.service.model_name()
    }

    pub fn build_prompt(&self, cluster: &Cluster) -> Prompt {
        let members: Vec<String> = cluster
            .members()
            .iter()
            .map(|e| {
                let mut summary: String = e.summary.chars().take(SUMMARY_PREVIEW_CHARS).collect();
                if e.summary.chars().count() > SUMMARY_PREVIEW_CHARS {
                    summary.push_str("...");
                }
                format!("- {}: {} - {}", e.id, e.title, summary)
            })
            .collect();

        let definitions: Vec<String> = RelationshipType::ALL
            .iter()
            .map(|t| format!("- {}: {}", t.as_str(), t.definition()))
            .collect();

        let user = format!(
            r#"Analyze the following patterns and identify meaningful relationships between them.

PATTERNS:
{members}

For each relationship you identify, provide:
1. source_id: The ID of the source pattern
2. target_id: The ID of the target pattern
3. relationship_type: One of "ENABLES", "REQUIRES", or "TENSIONS_WITH"
4. confidence: Your confidence in this relationship (0.0 to 1.0)
5. evidence: A brief explanation of why this relationship exists (required)

RELATIONSHIP DEFINITIONS:
{definitions}

CONFIDENCE SCALE:
- 0.9 or above: core relationship, central to both patterns
- 0.7 to 0.9: strong relationship, clearly supported
- 0.5 to 0.7: moderate relationship, plausible but situational
- below 0.5: do not report

IMPORTANT:
- Only identify relationships where there is a clear, meaningful connection
- Only use the pattern IDs listed above
- Every relationship must include evidence
- Be conservative with confidence scores

Respond with a JSON object of the form {{"relationships": [...]}} where each
element has source_id, target_id, relationship_type, confidence and evidence.
If no meaningful relationships exist, return {{"relationships": []}}."#,
            members = members.join("\n"),
            definitions = definitions.join("\n"),
        );

        Prompt::new(SYSTEM_PROMPT, user)
    }

    /// Run inference for one cluster. Never fails; problems are recorded
    /// on the outcome.
    pub async fn discover(&self, cluster: &Cluster) -> ClusterOutcome {
        let mut outcome = ClusterOutcome::new(cluster.id());

        if cluster.len() < 2 {
            debug!(cluster_id = cluster.id(), "cluster has fewer than two members, skipping");
            outcome.skipped = true;
            return outcome;
        }

        let prompt = self.build_prompt(cluster);
        let payload = match self.service.complete(&prompt).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(cluster_id = cluster.id(), error = %e, "inference failed");
                outcome.failure = Some(e.to_string());
                return outcome;
            }
        };

        let entries = match relationship_entries(payload) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(cluster_id = cluster.id(), error = %e, "unusable inference payload");
                outcome.failure = Some(e.to_string());
                return outcome;
            }
        };
        outcome.returned = entries.len();

        let discovered_at = Utc::now();
        let mut index: HashMap<(String, String, RelationshipType), usize> = HashMap::new();
        for entry in &entries {
            let Some(proposal) = Proposal::parse(entry, cluster) else {
                outcome.invalid += 1;
                continue;
            };
            if proposal.confidence < self.min_confidence {
                outcome.filtered_low_confidence += 1;
                continue;
            }

            let key = (
                proposal.source_id.clone(),
                proposal.target_id.clone(),
                proposal.relationship_type,
            );
            if let Some(&at) = index.get(&key) {
                outcome.collapsed += 1;
                let existing = &mut outcome.relationships[at];
                if proposal.confidence > existing.confidence {
                    existing.confidence = proposal.confidence;
                    existing.evidence = proposal.evidence;
                }
                continue;
            }

            index.insert(key, outcome.relationships.len());
            outcome
                .relationships
                .push(proposal.into_candidate(self.model_name(), cluster.id(), discovered_at));
        }

        info!(
            cluster_id = cluster.id(),
            returned = outcome.returned,
            kept = outcome.relationships.len(),
            invalid = outcome.invalid,
            low_confidence = outcome.filtered_low_confidence,
            "cluster discovered"
        );
        outcome
    }
}

/// Accepts a bare array or `{"relationships": [...]}`
fn relationship_entries(payload: Value) -> Result<Vec<Value>, InferenceError> {
    match payload {
        Value::Array(entries) => Ok(entries),
        Value::Object(mut map) => match map.remove("relationships") {
            Some(Value::Array(entries)) => Ok(entries),
            Some(other) => Err(InferenceError::MalformedResponse(format!(
                "\"relationships\" is not an array: {}",
                other
            ))),
            None => Err(InferenceError::MalformedResponse(
                "object payload without \"relationships\"".to_string(),
            )),
        },
        other => Err(InferenceError::MalformedResponse(format!(
            "expected an array of relationships, got {}",
            other
        ))),
    }
}

/// A payload entry that passed validation
struct Proposal {
    source_id: String,
    target_id: String,
    relationship_type: RelationshipType,
    confidence: f64,
    evidence: String,
}

impl Proposal {
    fn parse(entry: &Value, cluster: &Cluster) -> Option<Self> {
        let field = |name: &str| {
            entry
                .get(name)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
        };

        let source_id = field("source_id")?;
        let target_id = field("target_id")?;
        if source_id == target_id || !cluster.contains(source_id) || !cluster.contains(target_id) {
            return None;
        }

        let relationship_type: RelationshipType = field("relationship_type")?.parse().ok()?;
        let confidence = entry
            .get("confidence")
            .and_then(Value::as_f64)
            .filter(|c| (0.0..=1.0).contains(c))?;
        let evidence = field("evidence")?;

        Some(Self {
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            relationship_type,
            confidence,
            evidence: evidence.to_string(),
        })
    }

    fn into_candidate(
        self,
        model: &str,
        cluster_id: &str,
        discovered_at: DateTime<Utc>,
    ) -> CandidateRelationship {
        let mut candidate = CandidateRelationship::new(
            self.source_id,
            self.target_id,
            self.relationship_type,
            self.confidence,
            self.evidence,
            model,
        )
        .with_cluster(cluster_id);
        candidate.discovered_at = discovered_at;
        candidate
    }
}

// ---------------------------------------------------------------------------
// DiscoveryRun
// ---------------------------------------------------------------------------

/// Knobs for one discovery pass
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Process at most this many unprocessed clusters
    pub max_clusters: Option<usize>,
    /// Forget the checkpoint and consider every cluster again
    pub reset: bool,
    /// Concurrent inference calls; 1 processes clusters strictly in order
    pub concurrency: usize,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            max_clusters: None,
            reset: false,
            concurrency: 5,
        }
    }
}

/// What a run would do, computed without inference or writes
#[derive(Debug, Clone)]
pub struct DiscoveryPlan {
    pub entities: usize,
    pub clusters_total: usize,
    pub already_processed: usize,
    pub remaining: usize,
    /// Clusters this run would send, after the `max_clusters` cap
    pub clusters: Vec<Cluster>,
}

/// Outcome of a completed run
#[derive(Debug, Clone, Default)]
pub struct DiscoveryReport {
    pub clusters_total: usize,
    /// Cumulative, read back from the checkpoint
    pub clusters_processed: usize,
    pub clusters_attempted: usize,
    pub clusters_failed: usize,
    pub clusters_skipped: usize,
    pub new_relationships: usize,
    pub total_relationships: usize,
    pub filtered_low_confidence: usize,
    pub invalid: usize,
    /// Proposals dropped because staging already holds the same key
    pub already_staged: usize,
}

/// One discovery pass over an entity source
pub struct DiscoveryRun<'a> {
    source: &'a dyn EntitySource,
    clusterer: Clusterer,
    files: DataFiles,
}

impl<'a> DiscoveryRun<'a> {
    pub fn new(source: &'a dyn EntitySource, clusterer: Clusterer, files: DataFiles) -> Self {
        Self {
            source,
            clusterer,
            files,
        }
    }

    fn prepare(
        &self,
        options: &DiscoveryOptions,
    ) -> PipelineResult<(DiscoveryPlan, ProgressCheckpoint)> {
        let entities = self.source.load_entities()?;
        let clusters = self.clusterer.cluster(&entities);

        let checkpoint = if options.reset {
            ProgressCheckpoint::empty(self.files.progress())
        } else {
            ProgressCheckpoint::load(self.files.progress())?
        };

        let clusters_total = clusters.len();
        let mut remaining: Vec<Cluster> = clusters
            .into_iter()
            .filter(|c| !checkpoint.contains(c.id()))
            .collect();
        let already_processed = clusters_total - remaining.len();
        let remaining_count = remaining.len();
        if let Some(max) = options.max_clusters {
            remaining.truncate(max);
        }

        info!(
            entities = entities.len(),
            clusters = clusters_total,
            already_processed,
            selected = remaining.len(),
            "discovery planned"
        );

        Ok((
            DiscoveryPlan {
                entities: entities.len(),
                clusters_total,
                already_processed,
                remaining: remaining_count,
                clusters: remaining,
            },
            checkpoint,
        ))
    }

    /// Dry run: no inference, nothing written
    pub fn plan(&self, options: &DiscoveryOptions) -> PipelineResult<DiscoveryPlan> {
        self.prepare(options).map(|(plan, _)| plan)
    }

    pub async fn run(
        &self,
        engine: &DiscoveryEngine,
        options: &DiscoveryOptions,
    ) -> PipelineResult<DiscoveryReport> {
        if options.concurrency == 0 {
            return Err(PipelineError::InvalidArgument(
                "concurrency must be at least 1".to_string(),
            ));
        }

        let (plan, mut checkpoint) = self.prepare(options)?;
        let mut staging = StagingStore::load(self.files.staging())?;
        if options.reset {
            checkpoint.save()?;
        }

        let mut report = DiscoveryReport {
            clusters_total: plan.clusters_total,
            ..Default::default()
        };

        let semaphore = Arc::new(Semaphore::new(options.concurrency));
        let (tx, mut rx) = mpsc::channel::<ClusterOutcome>(options.concurrency);
        let mut workers = JoinSet::new();
        for cluster in plan.clusters {
            let engine = engine.clone();
            let semaphore = Arc::clone(&semaphore);
            let tx = tx.clone();
            workers.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                let outcome = engine.discover(&cluster).await;
                // Receiver gone means the writer already bailed out.
                let _ = tx.send(outcome).await;
            });
        }
        drop(tx);

        while let Some(mut outcome) = rx.recv().await {
            report.clusters_attempted += 1;
            report.invalid += outcome.invalid;
            report.filtered_low_confidence += outcome.filtered_low_confidence;
            if outcome.failed() {
                report.clusters_failed += 1;
            }
            if outcome.skipped {
                report.clusters_skipped += 1;
            }

            let before = outcome.relationships.len();
            outcome.relationships.retain(|r| {
                !staging.contains_key(&r.source_id, &r.target_id, r.relationship_type)
            });
            report.already_staged += before - outcome.relationships.len();
            report.new_relationships += staging.append(outcome.relationships);

            checkpoint.mark(outcome.cluster_id.as_str());
            if let Err(e) = staging.save().and_then(|_| checkpoint.save()) {
                // No outcome after this one can be recorded
                workers.abort_all();
                warn!(cluster_id = %outcome.cluster_id, error = %e, "discovery aborted");
                return Err(e);
            }

            debug!(
                cluster_id = %outcome.cluster_id,
                completed = report.clusters_attempted,
                "cluster checkpointed"
            );
        }

        report.clusters_processed = checkpoint.len();
        report.total_relationships = staging.len();

        info!(
            attempted = report.clusters_attempted,
            failed = report.clusters_failed,
            new_relationships = report.new_relationships,
            total = report.total_relationships,
            "discovery complete"
        );
        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// Contents of the staging file at a glance
#[derive(Debug, Clone, Default)]
pub struct StagingSummary {
    pub total: usize,
    pub by_type: BTreeMap<RelationshipType, usize>,
    pub by_status: BTreeMap<ReviewStatus, usize>,
    pub clusters_processed: usize,
    pub last_updated: Option<DateTime<Utc>>,
}

pub fn staging_summary(files: &DataFiles) -> PipelineResult<StagingSummary> {
    let staging = StagingStore::load(files.staging())?;
    let checkpoint = ProgressCheckpoint::load(files.progress())?;

    let mut summary = StagingSummary {
        total: staging.len(),
        clusters_processed: checkpoint.len(),
        last_updated: staging.last_updated(),
        ..Default::default()
    };
    for rel in staging.relationships() {
        *summary.by_type.entry(rel.relationship_type).or_default() += 1;
        *summary.by_status.entry(rel.status).or_default() += 1;
    }
    Ok(summary)
}
