//! Save path: fold author edits back into the document cache
//!
//! Only the saved language's values are written. Entries for facts the author
//! did not touch keep their values and status. Unreferenced entries are
//! removed only when pruning is requested.

use crate::cache::{build_cache, cache_path_for, load_cache, save_cache, BuildOptions};
use crate::error::{Result, SdeError};
use crate::models::{CacheEntry, Document, FactCache, LanguageScope, SyncStatus};
use crate::parsers::{extract_facts, ExtractedFacts};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

/// Options for a single save
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconcileOptions {
    /// Discard the existing cache and rebuild from the document
    pub rebuild_from_scratch: bool,
    /// Drop entries no longer referenced by any language of the document
    pub prune_unreferenced: bool,
}

/// What a save did to the cache
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    /// The cache was (re)built from the document instead of merged
    pub rebuilt: bool,
    /// The cache file on disk changed
    pub written: bool,
    pub added: usize,
    pub updated: usize,
    pub pruned: usize,
    pub duplicates_collapsed: usize,
}

impl ReconcileOutcome {
    pub fn changed(&self) -> bool {
        self.rebuilt
            || self.added > 0
            || self.updated > 0
            || self.pruned > 0
            || self.duplicates_collapsed > 0
    }
}

/// Merge one language's facts into an existing cache
pub fn merge_into_cache(
    cache: &mut FactCache,
    facts: &ExtractedFacts,
    lang: &str,
    prune: bool,
) -> ReconcileOutcome {
    let mut outcome = ReconcileOutcome::default();

    let mut pending_removal: HashSet<String> = if prune {
        cache.ids().map(str::to_string).collect()
    } else {
        HashSet::new()
    };
    let mut seen: HashSet<&str> = HashSet::new();

    for occurrence in facts.for_language(lang).iter().filter(|o| !o.flags.exempt) {
        let fact_id = occurrence.fact_id.as_str();
        // Only the first occurrence of a fact in a save updates the cache
        if !seen.insert(fact_id) {
            continue;
        }
        pending_removal.remove(fact_id);

        if cache.contains(fact_id) {
            let collapsed = cache.collapse_duplicates(fact_id);
            if collapsed > 0 {
                debug!(fact_id, collapsed, "Collapsing duplicate cache entries");
                outcome.duplicates_collapsed += collapsed;
            }

            if occurrence.flags.no_cache_update {
                continue;
            }
            if let Some(entry) = cache.get_mut(fact_id) {
                if entry.set_value(lang, &occurrence.value) {
                    outcome.updated += 1;
                }
            }
        } else {
            let mut entry = CacheEntry::new(fact_id, SyncStatus::New);
            if !occurrence.flags.no_cache_update {
                entry.values.insert(lang.to_string(), occurrence.value.clone());
            }
            cache.push(entry);
            outcome.added += 1;
        }
    }

    if prune {
        // Facts still used by another language of the document are kept
        for fact_id in facts.managed_ids() {
            pending_removal.remove(fact_id);
        }
        let before = cache.len();
        cache.facts.retain(|e| !pending_removal.contains(&e.id));
        outcome.pruned = before - cache.len();
    }

    outcome
}

/// Reconcile the cache next to `document_path` with a saved document
///
/// Without an existing cache (or with `rebuild_from_scratch`) the cache is
/// built from every language of the document.
pub fn reconcile_document(
    document_path: &Path,
    document: &Document,
    lang: &str,
    project_languages: &[String],
    options: ReconcileOptions,
) -> Result<ReconcileOutcome> {
    let cache_path = cache_path_for(document_path).ok_or_else(|| SdeError::InvalidPath {
        path: document_path.to_path_buf(),
        reason: "document has no cache path".to_string(),
    })?;

    let existing = if options.rebuild_from_scratch {
        None
    } else {
        load_cache(&cache_path)?
    };

    let Some(mut cache) = existing else {
        let cache = build_cache(
            document_path,
            document,
            project_languages,
            BuildOptions {
                persist: true,
                delete_existing: options.rebuild_from_scratch,
            },
        )?;
        return Ok(ReconcileOutcome {
            rebuilt: true,
            written: true,
            added: cache.len(),
            ..Default::default()
        });
    };

    let facts = extract_facts(document, &LanguageScope::All, project_languages);
    let mut outcome = merge_into_cache(&mut cache, &facts, lang, options.prune_unreferenced);
    if outcome.duplicates_collapsed > 0 {
        warn!(
            path = %document_path.display(),
            collapsed = outcome.duplicates_collapsed,
            "Collapsed duplicate cache entries"
        );
    }

    if outcome.changed() {
        outcome.written = save_cache(&cache_path, &cache)?;
    }

    info!(
        path = %document_path.display(),
        lang,
        added = outcome.added,
        updated = outcome.updated,
        pruned = outcome.pruned,
        "Cache reconciled"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentDocument, ContentNode, LanguageSection, NodeFlags};
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn langs() -> Vec<String> {
        vec!["en".into(), "nl".into()]
    }

    fn en_doc(nodes: Vec<ContentNode>) -> Document {
        Document::Content(ContentDocument {
            languages: BTreeMap::from([("en".to_string(), LanguageSection { nodes })]),
        })
    }

    fn seeded() -> FactCache {
        let mut cache = FactCache::new();
        cache.push(
            CacheEntry::new("a", SyncStatus::Ok)
                .with_value("en", "1")
                .with_value("nl", "een"),
        );
        cache.push(CacheEntry::new("b", SyncStatus::Ok).with_value("en", "2"));
        cache
    }

    fn extract(document: &Document) -> ExtractedFacts {
        extract_facts(document, &LanguageScope::All, &langs())
    }

    #[test]
    fn test_merge_updates_edited_and_adds_new() {
        let mut cache = seeded();
        let document = en_doc(vec![ContentNode::fact("a", "3"), ContentNode::fact("c", "4")]);

        let outcome = merge_into_cache(&mut cache, &extract(&document), "en", false);

        assert_eq!(cache.value("a", "en"), Some("3"));
        assert_eq!(cache.value("a", "nl"), Some("een"));
        assert_eq!(cache.value("b", "en"), Some("2"));
        assert_eq!(cache.get("c").unwrap().status, SyncStatus::New);
        assert_eq!((outcome.added, outcome.updated, outcome.pruned), (1, 1, 0));
    }

    #[test]
    fn test_prune_keeps_facts_used_by_other_languages() {
        let mut cache = seeded();
        let document = Document::Content(ContentDocument {
            languages: BTreeMap::from([
                ("en".to_string(), LanguageSection { nodes: vec![] }),
                (
                    "nl".to_string(),
                    LanguageSection {
                        nodes: vec![ContentNode::fact("a", "een")],
                    },
                ),
            ]),
        });

        let outcome = merge_into_cache(&mut cache, &extract(&document), "en", true);

        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert_eq!(outcome.pruned, 1);
    }

    #[test]
    fn test_first_occurrence_wins_within_a_save() {
        let mut cache = seeded();
        let document = en_doc(vec![ContentNode::fact("a", "first"), ContentNode::fact("a", "second")]);

        merge_into_cache(&mut cache, &extract(&document), "en", false);
        assert_eq!(cache.value("a", "en"), Some("first"));
    }

    #[test]
    fn test_no_cache_update_and_duplicates() {
        let mut cache = seeded();
        cache.push(CacheEntry::new("a", SyncStatus::New).with_value("en", "dup"));

        let document = en_doc(vec![ContentNode::fact("a", "edited").with_flags(NodeFlags {
            no_cache_update: true,
            ..Default::default()
        })]);

        let outcome = merge_into_cache(&mut cache, &extract(&document), "en", false);

        assert_eq!(cache.value("a", "en"), Some("1"));
        assert_eq!(outcome.duplicates_collapsed, 1);
        assert_eq!(cache.ids().filter(|id| *id == "a").count(), 1);
    }

    #[test]
    fn test_reconcile_without_cache_builds_all_languages() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.json");
        let document = Document::Content(ContentDocument {
            languages: BTreeMap::from([
                ("en".to_string(), LanguageSection { nodes: vec![ContentNode::fact("a", "1")] }),
                ("nl".to_string(), LanguageSection { nodes: vec![ContentNode::fact("a", "een")] }),
            ]),
        });

        let outcome =
            reconcile_document(&path, &document, "en", &langs(), ReconcileOptions::default())
                .unwrap();

        assert!(outcome.rebuilt);
        let cache = load_cache(&cache_path_for(&path).unwrap()).unwrap().unwrap();
        assert_eq!(cache.value("a", "nl"), Some("een"));
    }

    #[test]
    fn test_unchanged_save_does_not_touch_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.json");
        let cache_path = cache_path_for(&path).unwrap();
        save_cache(&cache_path, &seeded()).unwrap();
        let before = std::fs::read(&cache_path).unwrap();

        let document = en_doc(vec![ContentNode::fact("a", "1"), ContentNode::fact("b", "2")]);
        let outcome =
            reconcile_document(&path, &document, "en", &langs(), ReconcileOptions::default())
                .unwrap();

        assert!(!outcome.written);
        assert_eq!(std::fs::read(&cache_path).unwrap(), before);
    }

    #[test]
    fn test_duplicates_collapsed_on_save_are_persisted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.json");
        let cache_path = cache_path_for(&path).unwrap();
        let mut cache = seeded();
        cache.push(CacheEntry::new("b", SyncStatus::New).with_value("en", "stale"));
        save_cache(&cache_path, &cache).unwrap();

        let document = en_doc(vec![ContentNode::fact("a", "1"), ContentNode::fact("b", "2")]);
        let outcome =
            reconcile_document(&path, &document, "en", &langs(), ReconcileOptions::default())
                .unwrap();

        assert_eq!(outcome.duplicates_collapsed, 1);
        assert!(outcome.written);
        let cache = load_cache(&cache_path).unwrap().unwrap();
        assert_eq!(cache.ids().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(cache.get("b").unwrap().status, SyncStatus::Ok);
    }

    #[test]
    fn test_rebuild_from_scratch_drops_stale_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.json");
        let cache_path = cache_path_for(&path).unwrap();
        save_cache(&cache_path, &seeded()).unwrap();

        let document = en_doc(vec![ContentNode::fact("z", "26")]);
        let options = ReconcileOptions {
            rebuild_from_scratch: true,
            ..Default::default()
        };
        reconcile_document(&path, &document, "en", &langs(), options).unwrap();

        let cache = load_cache(&cache_path).unwrap().unwrap();
        assert_eq!(cache.ids().collect::<Vec<_>>(), vec!["z"]);
    }
}
