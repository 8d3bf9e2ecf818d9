//! Fact extraction
//!
//! Collects fact-consuming nodes per language in document order. Blank fact
//! ids are logged and skipped; they never abort extraction.

use crate::models::{Document, LanguageScope, NodeFlags};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// One fact-consuming node as seen in a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactOccurrence {
    pub fact_id: String,
    /// Current inline text of the node
    pub value: String,
    pub flags: NodeFlags,
}

/// Fact occurrences of one document, per language
#[derive(Debug, Clone, Default)]
pub struct ExtractedFacts {
    pub languages: BTreeMap<String, Vec<FactOccurrence>>,
    /// Nodes skipped because their fact id was blank
    pub skipped_blank: usize,
}

impl ExtractedFacts {
    pub fn for_language(&self, lang: &str) -> &[FactOccurrence] {
        self.languages.get(lang).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Distinct ids of non-exempt facts across all languages
    pub fn managed_ids(&self) -> BTreeSet<&str> {
        self.languages
            .values()
            .flatten()
            .filter(|o| !o.flags.exempt)
            .map(|o| o.fact_id.as_str())
            .collect()
    }

    pub fn total(&self) -> usize {
        self.languages.values().map(Vec::len).sum()
    }
}

/// Extract fact occurrences for one language or all of them
///
/// `project_languages` drives footnote collections; content documents use the
/// languages they contain.
pub fn extract_facts(
    document: &Document,
    scope: &LanguageScope,
    project_languages: &[String],
) -> ExtractedFacts {
    let mut facts = ExtractedFacts::default();

    document
        .as_source()
        .visit(project_languages, &mut |lang, node| {
            if !scope.includes(lang) {
                return;
            }
            let Some(fact_id) = node.fact_ref() else {
                return;
            };

            let fact_id = fact_id.trim();
            if fact_id.is_empty() {
                facts.skipped_blank += 1;
                return;
            }

            facts
                .languages
                .entry(lang.to_string())
                .or_default()
                .push(FactOccurrence {
                    fact_id: fact_id.to_string(),
                    value: node.text.clone(),
                    flags: node.flags,
                });
        });

    if facts.skipped_blank > 0 {
        warn!(
            skipped = facts.skipped_blank,
            "Skipped fact-consuming nodes with a blank fact id"
        );
    }

    facts
}
