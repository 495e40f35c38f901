//! Automatic glossary maintenance.
//!
//! Scans processed document text for a fixed vocabulary of legal terms,
//! extracts a plain-language definition where the text offers one, and
//! writes the result into the tenant glossary.

use std::sync::LazyLock;

use aho_corasick::AhoCorasick;
use regex::{Regex, RegexBuilder};

use crate::db::{GlossaryMergeOutcome, GlossaryStore};

/// Stored when neither text defines a detected term.
pub const NO_EXPLANATION: &str = "Simplified explanation not found.";

/// Starter glossary written into every new tenant store.
pub const SEED_TERMS: &[(&str, &str)] = &[
    ("liability", "Legal responsibility for one's acts or omissions."),
    ("indemnify", "To compensate someone for harm or loss."),
    ("jurisdiction", "The official power to make legal decisions."),
    ("arbitration", "A way to resolve disputes outside the courts."),
];

/// Terms the merger looks for, in scan order.
pub const CANDIDATE_TERMS: &[&str] = &[
    "liability",
    "indemnify",
    "jurisdiction",
    "arbitration",
    "contract",
    "breach",
    "confidentiality",
    "termination",
    "warranty",
    "damages",
    "obligation",
    "disclosure",
    "clause",
];

static TERM_MATCHER: LazyLock<Option<AhoCorasick>> = LazyLock::new(|| {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(CANDIDATE_TERMS)
        .ok()
});

static DEFINITION_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    CANDIDATE_TERMS
        .iter()
        .filter_map(|term| definition_pattern(term).map(|re| (*term, re)))
        .collect()
});

fn definition_pattern(term: &str) -> Option<Regex> {
    RegexBuilder::new(&format!(
        r#"\b{}\b["']?\s*(?:is defined as|refers to|means|is)\s+([^.!?]+)[.!?]"#,
        regex::escape(term)
    ))
    .case_insensitive(true)
    .build()
    .ok()
}

/// The first sentence in `text` that defines `term`, trimmed.
///
/// Matches `<term> is|means|refers to|is defined as <definition>.`, with an
/// optional closing quote after the term.
pub fn extract_explanation(term: &str, text: &str) -> Option<String> {
    if text.trim().is_empty() {
        return None;
    }
    let captured = match DEFINITION_PATTERNS.iter().find(|(t, _)| *t == term) {
        Some((_, re)) => re.captures(text)?.get(1)?.as_str().trim().to_string(),
        None => definition_pattern(term)?
            .captures(text)?
            .get(1)?
            .as_str()
            .trim()
            .to_string(),
    };
    (!captured.is_empty()).then_some(captured)
}

/// Candidate terms occurring anywhere in either text, in vocabulary order.
///
/// Matching is a case-insensitive substring test, so "Contracts" counts as
/// "contract".
pub fn detect_terms(original: &str, simplified: &str) -> Vec<&'static str> {
    let Some(matcher) = TERM_MATCHER.as_ref() else {
        return Vec::new();
    };
    let mut present = vec![false; CANDIDATE_TERMS.len()];
    for text in [original, simplified] {
        for found in matcher.find_overlapping_iter(text) {
            present[found.pattern().as_usize()] = true;
        }
    }
    CANDIDATE_TERMS
        .iter()
        .zip(present)
        .filter_map(|(term, hit)| hit.then_some(*term))
        .collect()
}

/// A detected term and the definition chosen for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedTerm {
    pub term: &'static str,
    /// `None` when neither text defines the term.
    pub explanation: Option<String>,
}

impl DetectedTerm {
    pub fn definition(&self) -> &str {
        self.explanation.as_deref().unwrap_or(NO_EXPLANATION)
    }
}

/// Detect terms and pick a definition for each: simplified text first, then
/// the original. The first matching sentence wins.
pub fn explain_terms(original: &str, simplified: &str) -> Vec<DetectedTerm> {
    detect_terms(original, simplified)
        .into_iter()
        .map(|term| DetectedTerm {
            term,
            explanation: extract_explanation(term, simplified)
                .or_else(|| extract_explanation(term, original)),
        })
        .collect()
}

/// What one merger pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub inserted: Vec<String>,
    pub updated: Vec<String>,
    /// Manual entries left alone because no explanation was found.
    pub kept_manual: Vec<String>,
    /// `(term, error)` for writes that failed. Other terms still proceed.
    pub failed: Vec<(String, String)>,
}

impl MergeReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Keeps a tenant glossary in step with processed documents.
pub struct GlossaryMerger;

impl GlossaryMerger {
    /// Scan both texts and write every detected term into `store`.
    ///
    /// A failing write is recorded in the report and the scan moves on.
    pub async fn update_from_text(
        store: &dyn GlossaryStore,
        original: &str,
        simplified: &str,
    ) -> MergeReport {
        let mut report = MergeReport::default();
        for detected in explain_terms(original, simplified) {
            let found = detected.explanation.is_some();
            match store
                .merge_detected_term(detected.term, detected.definition(), found)
                .await
            {
                Ok(GlossaryMergeOutcome::Inserted) => report.inserted.push(detected.term.to_string()),
                Ok(GlossaryMergeOutcome::Updated) => report.updated.push(detected.term.to_string()),
                Ok(GlossaryMergeOutcome::KeptManual) => {
                    report.kept_manual.push(detected.term.to_string())
                }
                Err(err) => {
                    tracing::warn!(term = detected.term, error = %err, "Glossary merge failed for term");
                    report.failed.push((detected.term.to_string(), err.to_string()));
                }
            }
        }
        report
    }
}
