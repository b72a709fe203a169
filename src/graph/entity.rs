//! Pattern entities: the nodes of the knowledge graph

use serde::{Deserialize, Serialize};

/// A pattern in the knowledge graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Stable identifier (e.g. `pat_01HX...`)
    pub id: String,
    /// Human-readable title
    pub title: String,
    /// Short summary, usually the first paragraph of the pattern body
    #[serde(default)]
    pub summary: String,
    /// Classification tags in document order; the first one is the primary tag
    #[serde(default)]
    pub tags: Vec<String>,
    /// Secondary categories
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// Raw markdown body, when loaded from a document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl Entity {
    /// Create an entity with an id and title
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            summary: String::new(),
            tags: Vec::new(),
            categories: Vec::new(),
            slug: None,
            source_url: None,
            content: None,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    /// Append a tag, ignoring blanks and duplicates
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.push_tag(tag);
        self
    }

    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        for tag in tags {
            self.push_tag(tag);
        }
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        let category = category.into();
        if !category.is_empty() && !self.categories.contains(&category) {
            self.categories.push(category);
        }
        self
    }

    fn push_tag(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        let tag = tag.trim();
        if !tag.is_empty() && !self.tags.iter().any(|t| t == tag) {
            self.tags.push(tag.to_string());
        }
    }

    /// The tag used to group this entity for discovery
    pub fn primary_tag(&self) -> Option<&str> {
        self.tags.first().map(String::as_str)
    }
}
