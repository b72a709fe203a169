//! Typed relationships between patterns

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Kinds of relationship the pipeline discovers and materializes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    /// Source makes the target possible or significantly easier
    Enables,
    /// Source depends on the target being in place first
    Requires,
    /// Source and target pull in different directions
    TensionsWith,
}

impl RelationshipType {
    pub const ALL: [RelationshipType; 3] = [
        RelationshipType::Enables,
        RelationshipType::Requires,
        RelationshipType::TensionsWith,
    ];

    /// Canonical upper-case name, as stored in the graph
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::Enables => "ENABLES",
            RelationshipType::Requires => "REQUIRES",
            RelationshipType::TensionsWith => "TENSIONS_WITH",
        }
    }

    /// Lower-case name used in reviewer labels
    pub fn slug(&self) -> &'static str {
        match self {
            RelationshipType::Enables => "enables",
            RelationshipType::Requires => "requires",
            RelationshipType::TensionsWith => "tensions_with",
        }
    }

    /// One-line definition handed to the inference service
    pub fn definition(&self) -> &'static str {
        match self {
            RelationshipType::Enables => {
                "Pattern A makes Pattern B possible or significantly easier to implement"
            }
            RelationshipType::Requires => "Pattern A depends on Pattern B being in place first",
            RelationshipType::TensionsWith => {
                "Pattern A and Pattern B have inherent tensions or trade-offs"
            }
        }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown relationship type: {0}")]
pub struct UnknownRelationshipType(pub String);

impl FromStr for RelationshipType {
    type Err = UnknownRelationshipType;

    /// Case-insensitive; accepts `-` or ` ` in place of `_`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "ENABLES" => Ok(RelationshipType::Enables),
            "REQUIRES" => Ok(RelationshipType::Requires),
            "TENSIONS_WITH" => Ok(RelationshipType::TensionsWith),
            _ => Err(UnknownRelationshipType(s.to_string())),
        }
    }
}

/// A materialized edge between two patterns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source_id: String,
    pub target_id: String,
    pub relationship_type: RelationshipType,
    /// Confidence assigned at discovery (0.0 - 1.0)
    pub confidence: f64,
    pub evidence: String,
    /// Model or process that proposed the relationship
    pub discovered_by: String,
    /// Reviewer or batch rule that approved it
    pub reviewed_by: String,
    pub created_at: DateTime<Utc>,
}

impl GraphEdge {
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        relationship_type: RelationshipType,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            relationship_type,
            confidence: 0.5,
            evidence: String::new(),
            discovered_by: "unknown".to_string(),
            reviewed_by: "unknown".to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence = evidence.into();
        self
    }

    pub fn with_provenance(
        mut self,
        discovered_by: impl Into<String>,
        reviewed_by: impl Into<String>,
    ) -> Self {
        self.discovered_by = discovered_by.into();
        self.reviewed_by = reviewed_by.into();
        self
    }
}
