//! Pattern markdown fixtures

use std::path::Path;

#[derive(Debug, Clone, Copy)]
pub struct PatternFixture {
    pub id: &'static str,
    pub title: &'static str,
    pub domain: &'static str,
    pub summary: &'static str,
}

/// A, B tagged tech; C, D tagged finance
pub const FOUR_PATTERNS: [PatternFixture; 4] = [
    PatternFixture {
        id: "pat_a",
        title: "A Continuous Delivery",
        domain: "tech",
        summary: "Ship small changes to production many times a day.",
    },
    PatternFixture {
        id: "pat_b",
        title: "B Feature Flags",
        domain: "tech",
        summary: "Decouple deploying code from releasing behaviour.",
    },
    PatternFixture {
        id: "pat_c",
        title: "C Participatory Budgeting",
        domain: "finance",
        summary: "Members decide together how shared funds are spent.",
    },
    PatternFixture {
        id: "pat_d",
        title: "D Open Books",
        domain: "finance",
        summary: "Every member can read the organisation's accounts.",
    },
];

pub fn write_pattern(dir: &Path, pattern: &PatternFixture) {
    let content = format!(
        "---\nid: {id}\ntitle: {title}\nclassification:\n  commons_domain:\n    - {domain}\n---\n# {title}\n\n{summary}\n",
        id = pattern.id,
        title = pattern.title,
        domain = pattern.domain,
        summary = pattern.summary,
    );
    std::fs::write(dir.join(format!("{}.md", pattern.id)), content)
        .expect("failed to write pattern fixture");
}
