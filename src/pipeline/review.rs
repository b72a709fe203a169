//! Human and rule-based review of staged relationships
//!
//! Every path that approves a relationship appends it to the approved log
//! and rewrites the staging file before returning, so a decision is on disk
//! before the process can exit. Quitting an interactive session flushes
//! the same way.

use super::staging::{ApprovedStore, CandidateRelationship, ReviewStatus, StagingStore};
use super::{DataFiles, PipelineError, PipelineResult};
use crate::graph::RelationshipType;
use crate::storage::GraphStore;
use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Reviewer label for threshold batches
pub const BATCH_CONFIDENCE_REVIEWER: &str = "batch_confidence";

/// Sample size shown before a type batch is confirmed
const CONFIRM_SAMPLE: usize = 5;

/// A reviewer's answer for one relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
    Skip,
    /// Change the type and ask again
    Retype(RelationshipType),
    Quit,
}

/// A staged relationship as presented to a reviewer
#[derive(Debug, Clone)]
pub struct RelationshipView<'a> {
    pub index: usize,
    pub total: usize,
    pub relationship: &'a CandidateRelationship,
    pub source_title: String,
    pub target_title: String,
}

/// Where review decisions come from
pub trait ReviewPrompt {
    fn decide(&mut self, view: &RelationshipView<'_>) -> io::Result<Decision>;

    /// Ask before a batch approval; `sample` is a preview of what matches.
    fn confirm(&mut self, question: &str, sample: &[RelationshipView<'_>]) -> io::Result<bool>;
}

/// Line-oriented prompt over any reader/writer pair
pub struct TerminalPrompt<R, W> {
    input: R,
    output: W,
}

impl TerminalPrompt<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> TerminalPrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// `None` on end of input
    fn read_answer(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_lowercase()))
    }

    fn render(&mut self, view: &RelationshipView<'_>) -> io::Result<()> {
        let rel = view.relationship;
        let rule = "=".repeat(70);
        writeln!(self.output)?;
        writeln!(self.output, "{}", rule)?;
        writeln!(
            self.output,
            "Relationship {} of {}  [{}]",
            view.index + 1,
            view.total,
            rel.short_id()
        )?;
        writeln!(self.output, "{}", rule)?;
        writeln!(self.output, "\n  Source: {}", view.source_title)?;
        writeln!(self.output, "          ({})", rel.source_id)?;
        writeln!(self.output, "\n  Target: {}", view.target_title)?;
        writeln!(self.output, "          ({})", rel.target_id)?;
        writeln!(self.output, "\n  Type:       {}", rel.relationship_type)?;
        writeln!(self.output, "  Confidence: {:.2}", rel.confidence)?;
        writeln!(self.output, "\n  Evidence:")?;
        writeln!(self.output, "    {}", rel.evidence)?;
        writeln!(
            self.output,
            "\n  Discovered: {}",
            rel.discovered_at.format("%Y-%m-%d %H:%M:%S")
        )?;
        writeln!(self.output, "  By:         {}", rel.discovered_by)?;
        if let Some(editor) = &rel.modified_by {
            writeln!(self.output, "  Edited by:  {}", editor)?;
        }
        writeln!(self.output)
    }
}

impl<R: BufRead, W: Write> ReviewPrompt for TerminalPrompt<R, W> {
    fn decide(&mut self, view: &RelationshipView<'_>) -> io::Result<Decision> {
        self.render(view)?;
        loop {
            write!(self.output, "Your decision [a/r/s/e/q]: ")?;
            self.output.flush()?;
            let Some(answer) = self.read_answer()? else {
                return Ok(Decision::Quit);
            };
            match answer.as_str() {
                "a" => return Ok(Decision::Approve),
                "r" => return Ok(Decision::Reject),
                "s" => return Ok(Decision::Skip),
                "q" => return Ok(Decision::Quit),
                "e" => {
                    writeln!(self.output, "\nRelationship types:")?;
                    for (n, ty) in RelationshipType::ALL.iter().enumerate() {
                        writeln!(self.output, "  {} = {}", n + 1, ty)?;
                    }
                    write!(self.output, "New type [1/2/3]: ")?;
                    self.output.flush()?;
                    let Some(choice) = self.read_answer()? else {
                        return Ok(Decision::Quit);
                    };
                    let picked = choice
                        .parse::<usize>()
                        .ok()
                        .and_then(|n| n.checked_sub(1))
                        .and_then(|n| RelationshipType::ALL.get(n).copied());
                    match picked {
                        Some(ty) => return Ok(Decision::Retype(ty)),
                        None => writeln!(self.output, "Unknown type, keeping {}", view.relationship.relationship_type)?,
                    }
                }
                _ => writeln!(self.output, "Invalid choice. Use a/r/s/e/q")?,
            }
        }
    }

    fn confirm(&mut self, question: &str, sample: &[RelationshipView<'_>]) -> io::Result<bool> {
        if !sample.is_empty() {
            writeln!(self.output, "\nSample (first {}):", sample.len())?;
            for view in sample {
                writeln!(
                    self.output,
                    "  {} {:30} → {:30} ({:.2})",
                    view.relationship.short_id(),
                    truncate(&view.source_title, 30),
                    truncate(&view.target_title, 30),
                    view.relationship.confidence
                )?;
            }
        }
        write!(self.output, "\n{} [y/N]: ", question)?;
        self.output.flush()?;
        Ok(matches!(self.read_answer()?.as_deref(), Some("y" | "yes")))
    }
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Non-interactive prompt for batch commands: confirms every batch.
/// An interactive session driven by it ends at the first relationship.
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeYes;

impl ReviewPrompt for AssumeYes {
    fn decide(&mut self, _view: &RelationshipView<'_>) -> io::Result<Decision> {
        Ok(Decision::Quit)
    }

    fn confirm(&mut self, _question: &str, _sample: &[RelationshipView<'_>]) -> io::Result<bool> {
        Ok(true)
    }
}

/// Tally of an interactive session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub reviewed: usize,
    pub approved: usize,
    pub rejected: usize,
    pub skipped: usize,
    pub retyped: usize,
    /// Session ended by the reviewer before the queue was exhausted
    pub quit: bool,
    pub remaining_pending: usize,
}

/// Tally of a batch approval
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub matched: usize,
    pub approved: usize,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewStatistics {
    pub total: usize,
    pub by_status: BTreeMap<ReviewStatus, usize>,
    pub by_type: BTreeMap<RelationshipType, usize>,
    /// confidence ≥ 0.85
    pub high_confidence: usize,
    /// 0.7 ≤ confidence < 0.85
    pub medium_confidence: usize,
    /// confidence < 0.7
    pub low_confidence: usize,
    /// Records in the approved log
    pub approved_total: usize,
}

/// Applies review decisions to the staging and approved files
pub struct ReviewEngine {
    files: DataFiles,
    staging: StagingStore,
    approved: ApprovedStore,
    titles: Option<Arc<dyn GraphStore>>,
    reviewer: String,
}

impl ReviewEngine {
    pub fn open(files: DataFiles) -> PipelineResult<Self> {
        let staging = StagingStore::load(files.staging())?;
        let approved = ApprovedStore::load(files.approved())?;
        Ok(Self {
            files,
            staging,
            approved,
            titles: None,
            reviewer: "human".to_string(),
        })
    }

    /// Resolve pattern titles for display from `store`
    pub fn with_titles(mut self, store: Arc<dyn GraphStore>) -> Self {
        self.titles = Some(store);
        self
    }

    pub fn with_reviewer(mut self, reviewer: impl Into<String>) -> Self {
        self.reviewer = reviewer.into();
        self
    }

    pub fn staging(&self) -> &StagingStore {
        &self.staging
    }

    pub fn approved(&self) -> &ApprovedStore {
        &self.approved
    }

    fn title_of(&self, id: &str) -> String {
        match &self.titles {
            Some(store) => store.title_of(id),
            None => id.to_string(),
        }
    }

    fn view(&self, id: Uuid, index: usize, total: usize) -> PipelineResult<RelationshipView<'_>> {
        let relationship = self
            .staging
            .get(id)
            .ok_or_else(|| PipelineError::RelationshipNotFound(id.to_string()))?;
        Ok(RelationshipView {
            index,
            total,
            relationship,
            source_title: self.title_of(&relationship.source_id),
            target_title: self.title_of(&relationship.target_id),
        })
    }

    /// Every pending relationship, in staging order, with display titles
    pub fn pending_views(&self) -> Vec<RelationshipView<'_>> {
        let total = self.staging.pending_count();
        self.staging
            .pending()
            .enumerate()
            .map(|(index, relationship)| RelationshipView {
                index,
                total,
                relationship,
                source_title: self.title_of(&relationship.source_id),
                target_title: self.title_of(&relationship.target_id),
            })
            .collect()
    }

    fn persist(&mut self) -> PipelineResult<()> {
        self.approved.save()?;
        self.staging.save()
    }

    /// Full uuid or an unambiguous prefix of one
    pub fn resolve_id(&self, id: &str) -> PipelineResult<Uuid> {
        if let Ok(uuid) = Uuid::parse_str(id) {
            return Ok(uuid);
        }
        let needle = id.trim().to_lowercase();
        if needle.is_empty() {
            return Err(PipelineError::InvalidArgument("empty relationship id".to_string()));
        }
        let mut matches = self
            .staging
            .relationships()
            .iter()
            .filter(|r| r.id.to_string().starts_with(&needle));
        match (matches.next(), matches.next()) {
            (Some(rel), None) => Ok(rel.id),
            (None, _) => Err(PipelineError::RelationshipNotFound(id.to_string())),
            (Some(_), Some(_)) => Err(PipelineError::InvalidArgument(format!(
                "relationship id prefix {} is ambiguous",
                id
            ))),
        }
    }

    fn approve_as(&mut self, id: Uuid, reviewer: &str) -> PipelineResult<()> {
        let rel = self
            .staging
            .get_mut(id)
            .ok_or_else(|| PipelineError::RelationshipNotFound(id.to_string()))?;
        rel.approve(reviewer)?;
        let approved = rel.clone();
        self.approved.append(approved)
    }

    fn reject_as(&mut self, id: Uuid, reviewer: &str) -> PipelineResult<()> {
        self.staging
            .get_mut(id)
            .ok_or_else(|| PipelineError::RelationshipNotFound(id.to_string()))?
            .reject(reviewer)
    }

    /// Approve one pending relationship and persist
    pub fn approve(&mut self, id: Uuid) -> PipelineResult<()> {
        let reviewer = self.reviewer.clone();
        self.approve_as(id, &reviewer)?;
        self.persist()
    }

    /// Reject one pending relationship and persist
    pub fn reject(&mut self, id: Uuid) -> PipelineResult<()> {
        let reviewer = self.reviewer.clone();
        self.reject_as(id, &reviewer)?;
        self.staging.save()
    }

    /// Walk the pending queue one relationship at a time.
    pub fn interactive(&mut self, prompt: &mut dyn ReviewPrompt) -> PipelineResult<SessionSummary> {
        let queue = self.staging.pending_ids();
        let total = queue.len();
        let reviewer = self.reviewer.clone();
        let mut summary = SessionSummary::default();

        'queue: for (index, id) in queue.into_iter().enumerate() {
            loop {
                let decision = {
                    let view = self.view(id, index, total)?;
                    prompt.decide(&view).map_err(PipelineError::Prompt)?
                };
                match decision {
                    Decision::Approve => {
                        self.approve_as(id, &reviewer)?;
                        self.persist()?;
                        summary.approved += 1;
                    }
                    Decision::Reject => {
                        self.reject_as(id, &reviewer)?;
                        self.staging.save()?;
                        summary.rejected += 1;
                    }
                    Decision::Skip => summary.skipped += 1,
                    Decision::Retype(ty) => {
                        if let Some(rel) = self.staging.get_mut(id) {
                            rel.retype(ty, &reviewer)?;
                        }
                        self.staging.save()?;
                        summary.retyped += 1;
                        continue;
                    }
                    Decision::Quit => {
                        summary.quit = true;
                        break 'queue;
                    }
                }
                summary.reviewed += 1;
                break;
            }
        }

        self.persist()?;
        summary.remaining_pending = self.staging.pending_count();
        info!(
            approved = summary.approved,
            rejected = summary.rejected,
            skipped = summary.skipped,
            "review session finished"
        );
        Ok(summary)
    }

    fn approve_batch(
        &mut self,
        ids: Vec<Uuid>,
        reviewer: &str,
        question: &str,
        sample_size: usize,
        prompt: &mut dyn ReviewPrompt,
    ) -> PipelineResult<BatchOutcome> {
        let mut outcome = BatchOutcome {
            matched: ids.len(),
            ..Default::default()
        };
        if ids.is_empty() {
            return Ok(outcome);
        }

        let confirmed = {
            let sample = ids
                .iter()
                .take(sample_size)
                .enumerate()
                .map(|(i, id)| self.view(*id, i, ids.len()))
                .collect::<PipelineResult<Vec<_>>>()?;
            prompt.confirm(question, &sample).map_err(PipelineError::Prompt)?
        };
        if !confirmed {
            outcome.cancelled = true;
            return Ok(outcome);
        }

        for id in ids {
            self.approve_as(id, reviewer)?;
            outcome.approved += 1;
        }
        self.persist()?;
        info!(reviewer, approved = outcome.approved, "batch approved");
        Ok(outcome)
    }

    /// Approve every pending relationship with confidence ≥ `min_confidence`
    pub fn batch_by_confidence(
        &mut self,
        min_confidence: f64,
        prompt: &mut dyn ReviewPrompt,
    ) -> PipelineResult<BatchOutcome> {
        if !(0.0..=1.0).contains(&min_confidence) {
            return Err(PipelineError::InvalidArgument(format!(
                "threshold must be within [0, 1], got {}",
                min_confidence
            )));
        }
        let ids: Vec<Uuid> = self
            .staging
            .pending()
            .filter(|r| r.confidence >= min_confidence)
            .map(|r| r.id)
            .collect();
        let question = format!(
            "Approve all {} relationships with confidence >= {}?",
            ids.len(),
            min_confidence
        );
        self.approve_batch(ids, BATCH_CONFIDENCE_REVIEWER, &question, 0, prompt)
    }

    /// Approve every pending relationship of one type
    pub fn batch_by_type(
        &mut self,
        relationship_type: RelationshipType,
        prompt: &mut dyn ReviewPrompt,
    ) -> PipelineResult<BatchOutcome> {
        let ids: Vec<Uuid> = self
            .staging
            .pending()
            .filter(|r| r.relationship_type == relationship_type)
            .map(|r| r.id)
            .collect();
        let question = format!("Approve all {} {} relationships?", ids.len(), relationship_type);
        let reviewer = format!("batch_type_{}", relationship_type.slug());
        self.approve_batch(ids, &reviewer, &question, CONFIRM_SAMPLE, prompt)
    }

    pub fn statistics(&self) -> ReviewStatistics {
        let mut stats = ReviewStatistics {
            total: self.staging.len(),
            approved_total: self.approved.len(),
            ..Default::default()
        };
        for rel in self.staging.relationships() {
            *stats.by_status.entry(rel.status).or_default() += 1;
            *stats.by_type.entry(rel.relationship_type).or_default() += 1;
            if rel.confidence >= 0.85 {
                stats.high_confidence += 1;
            } else if rel.confidence >= 0.7 {
                stats.medium_confidence += 1;
            } else {
                stats.low_confidence += 1;
            }
        }
        stats
    }

    /// Write the load-ready export; returns the record count
    pub fn export(&self) -> PipelineResult<usize> {
        self.approved.export(&self.files.export())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Entity;
    use crate::storage::{OpenStore, SqliteStore};
    use std::collections::VecDeque;
    use std::io::Cursor;

    /// Replays canned decisions and records what was shown
    struct ScriptedPrompt {
        decisions: VecDeque<Decision>,
        confirm: bool,
        shown: Vec<(String, String, RelationshipType)>,
        samples: Vec<usize>,
    }

    impl ScriptedPrompt {
        fn new(decisions: Vec<Decision>) -> Self {
            Self {
                decisions: decisions.into(),
                confirm: true,
                shown: Vec::new(),
                samples: Vec::new(),
            }
        }

        fn declining() -> Self {
            Self {
                confirm: false,
                ..Self::new(Vec::new())
            }
        }
    }

    impl ReviewPrompt for ScriptedPrompt {
        fn decide(&mut self, view: &RelationshipView<'_>) -> io::Result<Decision> {
            self.shown.push((
                view.source_title.clone(),
                view.target_title.clone(),
                view.relationship.relationship_type,
            ));
            Ok(self.decisions.pop_front().unwrap_or(Decision::Quit))
        }

        fn confirm(&mut self, _question: &str, sample: &[RelationshipView<'_>]) -> io::Result<bool> {
            self.samples.push(sample.len());
            Ok(self.confirm)
        }
    }

    fn seed(dir: &std::path::Path, rels: &[(&str, &str, RelationshipType, f64)]) -> DataFiles {
        let files = DataFiles::new(dir);
        let mut staging = StagingStore::load(files.staging()).unwrap();
        staging.append(rels.iter().map(|(s, t, ty, c)| {
            CandidateRelationship::new(*s, *t, *ty, *c, "evidence", "mock-model")
        }));
        staging.save().unwrap();
        files
    }

    fn three(dir: &std::path::Path) -> DataFiles {
        seed(
            dir,
            &[
                ("a", "b", RelationshipType::Enables, 0.9),
                ("b", "c", RelationshipType::Requires, 0.75),
                ("c", "a", RelationshipType::TensionsWith, 0.65),
            ],
        )
    }

    #[test]
    fn interactive_decisions_are_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let files = three(dir.path());
        let mut engine = ReviewEngine::open(files.clone()).unwrap();
        let mut prompt =
            ScriptedPrompt::new(vec![Decision::Approve, Decision::Reject, Decision::Skip]);

        let summary = engine.interactive(&mut prompt).unwrap();
        assert_eq!(summary.approved, 1);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.skipped, 1);
        assert!(!summary.quit);
        assert_eq!(summary.remaining_pending, 1);

        let reopened = ReviewEngine::open(files).unwrap();
        let statuses: Vec<ReviewStatus> =
            reopened.staging().relationships().iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![ReviewStatus::Approved, ReviewStatus::Rejected, ReviewStatus::PendingReview]
        );
        assert_eq!(reopened.approved().len(), 1);
        assert_eq!(reopened.approved().relationships()[0].reviewed_by.as_deref(), Some("human"));
    }

    #[test]
    fn quit_flushes_partial_progress() {
        let dir = tempfile::tempdir().unwrap();
        let files = three(dir.path());
        let mut engine = ReviewEngine::open(files.clone())
            .unwrap()
            .with_reviewer("alex");
        let mut prompt = ScriptedPrompt::new(vec![Decision::Approve, Decision::Quit]);

        let summary = engine.interactive(&mut prompt).unwrap();
        assert!(summary.quit);
        assert_eq!(summary.reviewed, 1);
        assert_eq!(summary.remaining_pending, 2);

        let reopened = ReviewEngine::open(files).unwrap();
        assert_eq!(reopened.staging().pending_count(), 2);
        assert_eq!(reopened.approved().relationships()[0].reviewed_by.as_deref(), Some("alex"));
    }

    #[test]
    fn retype_reprompts_with_new_type() {
        let dir = tempfile::tempdir().unwrap();
        let files = seed(dir.path(), &[("a", "b", RelationshipType::Enables, 0.9)]);
        let mut engine = ReviewEngine::open(files).unwrap();
        let mut prompt = ScriptedPrompt::new(vec![
            Decision::Retype(RelationshipType::Requires),
            Decision::Approve,
        ]);

        let summary = engine.interactive(&mut prompt).unwrap();
        assert_eq!(summary.retyped, 1);
        assert_eq!(summary.approved, 1);
        assert_eq!(prompt.shown.len(), 2);
        assert_eq!(prompt.shown[1].2, RelationshipType::Requires);

        let approved = &engine.approved().relationships()[0];
        assert_eq!(approved.relationship_type, RelationshipType::Requires);
        assert_eq!(approved.modified_by.as_deref(), Some("human"));
    }

    #[test]
    fn titles_come_from_store_with_id_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let files = seed(dir.path(), &[("a", "ghost", RelationshipType::Enables, 0.9)]);
        let store = SqliteStore::open_in_memory().unwrap();
        store.upsert_entity(&Entity::new("a", "Alpha")).unwrap();

        let mut engine = ReviewEngine::open(files).unwrap().with_titles(Arc::new(store));
        let mut prompt = ScriptedPrompt::new(vec![Decision::Skip]);
        engine.interactive(&mut prompt).unwrap();

        assert_eq!(prompt.shown[0].0, "Alpha");
        assert_eq!(prompt.shown[0].1, "ghost");
    }

    #[test]
    fn threshold_batch_approves_at_or_above_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let files = three(dir.path());
        let mut engine = ReviewEngine::open(files.clone()).unwrap();

        let outcome = engine
            .batch_by_confidence(0.75, &mut ScriptedPrompt::new(Vec::new()))
            .unwrap();
        assert_eq!(outcome.matched, 2);
        assert_eq!(outcome.approved, 2);

        let reopened = ReviewEngine::open(files).unwrap();
        assert_eq!(reopened.approved().len(), 2);
        assert!(reopened
            .approved()
            .relationships()
            .iter()
            .all(|r| r.reviewed_by.as_deref() == Some(BATCH_CONFIDENCE_REVIEWER)));
        assert_eq!(reopened.staging().pending_count(), 1);
    }

    #[test]
    fn declined_batch_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let files = three(dir.path());
        let mut engine = ReviewEngine::open(files).unwrap();

        let mut prompt = ScriptedPrompt::declining();
        let outcome = engine
            .batch_by_type(RelationshipType::Enables, &mut prompt)
            .unwrap();
        assert!(outcome.cancelled);
        assert_eq!(outcome.approved, 0);
        assert_eq!(engine.staging().pending_count(), 3);
        assert_eq!(prompt.samples, vec![1]);
    }

    #[test]
    fn type_batch_labels_reviewer_with_type() {
        let dir = tempfile::tempdir().unwrap();
        let files = three(dir.path());
        let mut engine = ReviewEngine::open(files).unwrap();

        let outcome = engine
            .batch_by_type(RelationshipType::TensionsWith, &mut AssumeYes)
            .unwrap();
        assert_eq!(outcome.approved, 1);
        assert_eq!(
            engine.approved().relationships()[0].reviewed_by.as_deref(),
            Some("batch_type_tensions_with")
        );
    }

    #[test]
    fn rejected_relationship_cannot_be_approved() {
        let dir = tempfile::tempdir().unwrap();
        let files = three(dir.path());
        let mut engine = ReviewEngine::open(files).unwrap();
        let id = engine.staging().relationships()[0].id;

        engine.reject(id).unwrap();
        let err = engine.approve(id).unwrap_err();
        assert!(matches!(err, PipelineError::IllegalTransition { .. }));
        assert!(engine.approved().is_empty());

        let outcome = engine.batch_by_confidence(0.0, &mut AssumeYes).unwrap();
        assert_eq!(outcome.matched, 2);
    }

    #[test]
    fn ids_resolve_by_unique_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let files = three(dir.path());
        let engine = ReviewEngine::open(files).unwrap();
        let id = engine.staging().relationships()[1].id;

        assert_eq!(engine.resolve_id(&id.to_string()).unwrap(), id);
        assert_eq!(engine.resolve_id(&id.to_string()[..13]).unwrap(), id);
        assert!(matches!(
            engine.resolve_id("zzzz"),
            Err(PipelineError::RelationshipNotFound(_))
        ));
    }

    #[test]
    fn statistics_band_confidence() {
        let dir = tempfile::tempdir().unwrap();
        let files = three(dir.path());
        let mut engine = ReviewEngine::open(files).unwrap();
        let id = engine.staging().relationships()[0].id;
        engine.approve(id).unwrap();

        let stats = engine.statistics();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.high_confidence, 1);
        assert_eq!(stats.medium_confidence, 1);
        assert_eq!(stats.low_confidence, 1);
        assert_eq!(stats.by_status[&ReviewStatus::Approved], 1);
        assert_eq!(stats.by_status[&ReviewStatus::PendingReview], 2);
        assert_eq!(stats.by_type[&RelationshipType::Requires], 1);
        assert_eq!(stats.approved_total, 1);
    }

    #[test]
    fn export_writes_approved_records() {
        let dir = tempfile::tempdir().unwrap();
        let files = three(dir.path());
        let mut engine = ReviewEngine::open(files.clone()).unwrap();
        engine.batch_by_confidence(0.85, &mut AssumeYes).unwrap();

        assert_eq!(engine.export().unwrap(), 1);
        assert!(files.export().exists());
    }

    #[test]
    fn terminal_prompt_reads_decisions() {
        let rel = CandidateRelationship::new("a", "b", RelationshipType::Enables, 0.8, "x", "m");
        let view = RelationshipView {
            index: 0,
            total: 1,
            relationship: &rel,
            source_title: "Alpha".to_string(),
            target_title: "Beta".to_string(),
        };

        let mut out = Vec::new();
        let mut prompt = TerminalPrompt::new(Cursor::new("x\ne\n2\n"), &mut out);
        assert_eq!(
            prompt.decide(&view).unwrap(),
            Decision::Retype(RelationshipType::Requires)
        );
        let rendered = String::from_utf8(out).unwrap();
        assert!(rendered.contains("Source: Alpha"));
        assert!(rendered.contains(&rel.short_id()));
        assert!(rel.id.to_string().starts_with(&rel.short_id()));
        assert!(rendered.contains("Invalid choice"));

        let mut prompt = TerminalPrompt::new(Cursor::new("A\n"), Vec::new());
        assert_eq!(prompt.decide(&view).unwrap(), Decision::Approve);

        let mut prompt = TerminalPrompt::new(Cursor::new(""), Vec::new());
        assert_eq!(prompt.decide(&view).unwrap(), Decision::Quit);
    }

    #[test]
    fn pending_views_expose_resolvable_ids() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = ReviewEngine::open(three(dir.path())).unwrap();
        let first = engine.staging().relationships()[0].id;
        engine.reject(first).unwrap();

        let views = engine.pending_views();
        assert_eq!(views.len(), 2);
        assert!(views.iter().all(|v| v.total == 2 && v.relationship.is_pending()));
        let short = views[0].relationship.short_id();
        let expected = views[0].relationship.id;
        assert_eq!(engine.resolve_id(&short).unwrap(), expected);
    }

    #[test]
    fn terminal_confirm_defaults_to_no() {
        let mut prompt = TerminalPrompt::new(Cursor::new("y\n"), Vec::new());
        assert!(prompt.confirm("Approve?", &[]).unwrap());

        let mut prompt = TerminalPrompt::new(Cursor::new("\n"), Vec::new());
        assert!(!prompt.confirm("Approve?", &[]).unwrap());

        let mut prompt = TerminalPrompt::new(Cursor::new(""), Vec::new());
        assert!(!prompt.confirm("Approve?", &[]).unwrap());
    }
}
