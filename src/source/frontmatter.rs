//! Pattern markdown files with YAML frontmatter
//!
//! ```text
//! ---
//! id: pat_001
//! slug: flywheel
//! title: Flywheel
//! classification:
//!   commons_domain: [business, tech]
//!   category: growth
//! sources: [https://example.org/flywheel]
//! ---
//! # Flywheel
//!
//! First paragraph becomes the summary.
//! ```
//!
//! Files without an `id` are skipped. A file whose frontmatter fails to
//! parse is reported and the scan carries on.

use super::{EntitySource, SourceError};
use crate::graph::Entity;
use crate::storage::GraphStore;
use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const SUMMARY_MAX_CHARS: usize = 200;
const CONTENT_MAX_CHARS: usize = 10_000;

/// Result of reading a pattern directory
#[derive(Debug, Default)]
pub struct ScanReport {
    pub entities: Vec<Entity>,
    /// Files with no `id` in their frontmatter
    pub skipped: Vec<PathBuf>,
    /// Files that could not be read or parsed
    pub errors: Vec<SourceError>,
}

/// Result of loading a pattern directory into a store
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedReport {
    pub loaded: usize,
    pub skipped: usize,
    pub errors: usize,
}

/// A directory of `*.md` pattern files
#[derive(Debug, Clone)]
pub struct PatternDirectory {
    dir: PathBuf,
}

impl PatternDirectory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Read every markdown file, in file-name order
    pub fn scan(&self) -> Result<ScanReport, SourceError> {
        let io_error = |source| SourceError::Io {
            path: self.dir.clone(),
            source,
        };

        let mut paths: Vec<PathBuf> = fs::read_dir(&self.dir)
            .map_err(io_error)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "md"))
            .collect();
        paths.sort();

        let mut report = ScanReport::default();
        for path in paths {
            match parse_pattern_file(&path) {
                Ok(Some(entity)) => report.entities.push(entity),
                Ok(None) => {
                    debug!(path = %path.display(), "no id in frontmatter, skipping");
                    report.skipped.push(path);
                }
                Err(e) => {
                    warn!(error = %e, "failed to load pattern file");
                    report.errors.push(e);
                }
            }
        }
        Ok(report)
    }

    /// Upsert every pattern into `store`
    pub fn seed_into(&self, store: &dyn GraphStore) -> Result<SeedReport, SourceError> {
        let scan = self.scan()?;
        let mut report = SeedReport {
            skipped: scan.skipped.len(),
            errors: scan.errors.len(),
            ..Default::default()
        };
        for entity in &scan.entities {
            store.upsert_entity(entity)?;
            report.loaded += 1;
        }
        Ok(report)
    }
}

impl EntitySource for PatternDirectory {
    fn load_entities(&self) -> Result<Vec<Entity>, SourceError> {
        Ok(self.scan()?.entities)
    }
}

fn parse_pattern_file(path: &Path) -> Result<Option<Entity>, SourceError> {
    let content = fs::read_to_string(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let (frontmatter, body) = match split_frontmatter(&content) {
        Some((yaml, body)) => {
            let fm = parse_yaml(yaml).map_err(|message| SourceError::Frontmatter {
                path: path.to_path_buf(),
                message,
            })?;
            (fm, body)
        }
        None => return Ok(None),
    };

    let Some(id) = frontmatter.get("id").and_then(scalar_string) else {
        return Ok(None);
    };

    let title = frontmatter
        .get("title")
        .and_then(scalar_string)
        .unwrap_or_default();
    let classification = frontmatter.get("classification");

    let mut entity = Entity::new(id, title)
        .with_summary(extract_summary(body))
        .with_tags(string_list(classification.and_then(|c| c.get("commons_domain"))));
    for category in string_list(classification.and_then(|c| c.get("category"))) {
        entity = entity.with_category(category);
    }

    entity.slug = frontmatter
        .get("slug")
        .and_then(scalar_string)
        .or_else(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()));
    entity.source_url = match frontmatter.get("sources") {
        Some(Value::Array(sources)) => sources.first().and_then(scalar_string),
        _ => None,
    };
    entity.content = Some(body.chars().take(CONTENT_MAX_CHARS).collect());

    Ok(Some(entity))
}

/// Split `---\n<yaml>\n---\n<body>`; `None` when there is no frontmatter.
fn split_frontmatter(content: &str) -> Option<(&str, &str)> {
    let trimmed = content.trim_start();
    let after_first = trimmed.strip_prefix("---")?;
    let end_pos = after_first.find("\n---")?;

    let yaml = &after_first[..end_pos];
    let rest = &after_first[end_pos + 4..];
    let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or("");
    Some((yaml, body))
}

/// Parse YAML into a JSON value via serde_yaml
fn parse_yaml(yaml: &str) -> Result<Value, String> {
    let yaml_val = serde_yaml::from_str::<serde_yaml::Value>(yaml)
        .map_err(|e| format!("YAML parse error: {}", e))?;
    serde_json::to_value(yaml_val).map_err(|e| format!("YAML to JSON conversion failed: {}", e))
}

fn scalar_string(value: &Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}

/// A YAML scalar or sequence of scalars, as strings
fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(scalar_string).collect(),
        Some(other) => scalar_string(other).into_iter().collect(),
        None => Vec::new(),
    }
}

/// First paragraph of the body, headings skipped, capped at 200 chars
fn extract_summary(body: &str) -> String {
    let mut text = String::new();
    let mut in_paragraph = false;

    for event in Parser::new_ext(body, Options::all()) {
        match event {
            Event::Start(Tag::Paragraph) => in_paragraph = true,
            Event::End(TagEnd::Paragraph) => {
                if !text.trim().is_empty() {
                    break;
                }
                in_paragraph = false;
            }
            Event::Text(t) | Event::Code(t) if in_paragraph => text.push_str(&t),
            Event::SoftBreak | Event::HardBreak if in_paragraph => text.push(' '),
            _ => {}
        }
    }

    let summary = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if summary.chars().count() > SUMMARY_MAX_CHARS {
        let mut cut: String = summary.chars().take(SUMMARY_MAX_CHARS - 3).collect();
        cut.push_str("...");
        cut
    } else {
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{OpenStore, SqliteStore};

    const FLYWHEEL: &str = "---
id: pat_001
slug: flywheel
title: Flywheel
classification:
  commons_domain: [business, tech]
  category: growth
sources:
  - https://example.org/flywheel
---
# Flywheel

Momentum compounds when each turn
feeds the next.

## Details

Second paragraph.
";

    fn write(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn parses_frontmatter_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "flywheel.md", FLYWHEEL);

        let scan = PatternDirectory::new(dir.path()).scan().unwrap();
        assert_eq!(scan.entities.len(), 1);
        let e = &scan.entities[0];
        assert_eq!(e.id, "pat_001");
        assert_eq!(e.title, "Flywheel");
        assert_eq!(e.tags, vec!["business", "tech"]);
        assert_eq!(e.primary_tag(), Some("business"));
        assert_eq!(e.categories, vec!["growth"]);
        assert_eq!(e.slug.as_deref(), Some("flywheel"));
        assert_eq!(e.source_url.as_deref(), Some("https://example.org/flywheel"));
        assert_eq!(e.summary, "Momentum compounds when each turn feeds the next.");
        assert!(e.content.as_deref().unwrap().contains("Second paragraph."));
    }

    #[test]
    fn skips_files_without_id_and_reports_bad_yaml() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.md", FLYWHEEL);
        write(dir.path(), "b.md", "---\ntitle: No Id\n---\nBody.\n");
        write(dir.path(), "c.md", "---\nid: [unclosed\n---\nBody.\n");
        write(dir.path(), "d.md", "No frontmatter at all.\n");
        write(dir.path(), "notes.txt", FLYWHEEL);

        let scan = PatternDirectory::new(dir.path()).scan().unwrap();
        assert_eq!(scan.entities.len(), 1);
        assert_eq!(scan.skipped.len(), 2);
        assert_eq!(scan.errors.len(), 1);
        assert!(matches!(scan.errors[0], SourceError::Frontmatter { .. }));
    }

    #[test]
    fn slug_defaults_to_file_stem_and_scalars_become_lists() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "commons-ledger.md",
            "---\nid: 42\ntitle: Commons Ledger\nclassification:\n  commons_domain: finance\n---\nA shared record.\n",
        );

        let e = &PatternDirectory::new(dir.path()).scan().unwrap().entities[0];
        assert_eq!(e.id, "42");
        assert_eq!(e.slug.as_deref(), Some("commons-ledger"));
        assert_eq!(e.tags, vec!["finance"]);
        assert!(e.source_url.is_none());
    }

    #[test]
    fn long_summaries_are_truncated() {
        let body = format!("{}\n", "word ".repeat(80));
        let summary = extract_summary(&body);
        assert_eq!(summary.chars().count(), SUMMARY_MAX_CHARS);
        assert!(summary.ends_with("..."));
    }

    #[test]
    fn seed_upserts_into_store() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "flywheel.md", FLYWHEEL);
        write(dir.path(), "b.md", "---\ntitle: No Id\n---\n");

        let store = SqliteStore::open_in_memory().unwrap();
        let report = PatternDirectory::new(dir.path()).seed_into(&store).unwrap();
        assert_eq!(
            report,
            SeedReport {
                loaded: 1,
                skipped: 1,
                errors: 0
            }
        );
        assert_eq!(store.title_of("pat_001"), "Flywheel");
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = PatternDirectory::new(dir.path().join("absent")).scan().unwrap_err();
        assert!(matches!(err, SourceError::Io { .. }));
    }
}
