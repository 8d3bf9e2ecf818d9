//! Build a fresh cache from the facts observed in a document

use crate::cache::{cache_path_for, remove_file, save_cache};
use crate::error::{Result, SdeError};
use crate::models::{CacheEntry, Document, FactCache, LanguageScope, SyncStatus};
use crate::parsers::{extract_facts, ExtractedFacts};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// How [`build_cache`] treats the disk
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    /// Write the built cache next to the document
    pub persist: bool,
    /// Remove any existing cache file before building
    pub delete_existing: bool,
}

impl BuildOptions {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn persisted() -> Self {
        Self {
            persist: true,
            delete_existing: false,
        }
    }
}

/// One entry per distinct fact id, with explicit per-language values
///
/// The first occurrence seeds a language's value; later duplicates only fill
/// languages not yet recorded. Exempt nodes are not cached.
pub fn build_from_facts(facts: &ExtractedFacts) -> FactCache {
    let mut cache = FactCache::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for (lang, occurrences) in &facts.languages {
        for occurrence in occurrences.iter().filter(|o| !o.flags.exempt) {
            match index.get(occurrence.fact_id.as_str()) {
                Some(&i) => {
                    cache.facts[i]
                        .values
                        .entry(lang.clone())
                        .or_insert_with(|| occurrence.value.clone());
                }
                None => {
                    index.insert(occurrence.fact_id.as_str(), cache.len());
                    cache.push(
                        CacheEntry::new(occurrence.fact_id.clone(), SyncStatus::New)
                            .with_value(lang.clone(), occurrence.value.clone()),
                    );
                }
            }
        }
    }

    cache
}

/// Build a cache for `document`, optionally replacing and persisting it
pub fn build_cache(
    document_path: &Path,
    document: &Document,
    project_languages: &[String],
    options: BuildOptions,
) -> Result<FactCache> {
    let facts = extract_facts(document, &LanguageScope::All, project_languages);
    let cache = build_from_facts(&facts);

    if !options.persist && !options.delete_existing {
        debug!(path = %document_path.display(), facts = cache.len(), "Built in-memory cache");
        return Ok(cache);
    }

    let cache_path = cache_path_for(document_path).ok_or_else(|| SdeError::InvalidPath {
        path: document_path.to_path_buf(),
        reason: "document has no cache path".to_string(),
    })?;

    if options.delete_existing && remove_file(&cache_path)? {
        info!(path = %cache_path.display(), "Deleted existing cache before rebuild");
    }

    if options.persist {
        save_cache(&cache_path, &cache)?;
        info!(path = %cache_path.display(), facts = cache.len(), "Cache created");
    }

    Ok(cache)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::load_cache;
    use crate::models::{ContentDocument, ContentNode, LanguageSection, NodeFlags};
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn doc() -> Document {
        let mut languages = BTreeMap::new();
        languages.insert(
            "en".to_string(),
            LanguageSection {
                nodes: vec![
                    ContentNode::fact("a", "1"),
                    ContentNode::fact("a", "999"),
                    ContentNode::fact("b", ""),
                    ContentNode::fact("skip", "x").with_flags(NodeFlags {
                        exempt: true,
                        ..Default::default()
                    }),
                ],
            },
        );
        languages.insert(
            "nl".to_string(),
            LanguageSection {
                nodes: vec![ContentNode::fact("a", "een"), ContentNode::fact("c", "drie")],
            },
        );
        Document::Content(ContentDocument { languages })
    }

    fn langs() -> Vec<String> {
        vec!["en".into(), "nl".into()]
    }

    #[test]
    fn test_first_occurrence_wins_and_other_languages_fill_in() {
        let facts = extract_facts(&doc(), &LanguageScope::All, &langs());
        let cache = build_from_facts(&facts);

        let ids: Vec<_> = cache.ids().collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(cache.value("a", "en"), Some("1"));
        assert_eq!(cache.value("a", "nl"), Some("een"));
        // Empty is recorded explicitly, absent stays absent
        assert_eq!(cache.value("b", "en"), Some(""));
        assert_eq!(cache.value("b", "nl"), None);
        assert!(!cache.contains("skip"));
        assert!(cache.facts.iter().all(|e| e.status == SyncStatus::New));
    }

    #[test]
    fn test_in_memory_build_writes_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.json");

        build_cache(&path, &doc(), &langs(), BuildOptions::in_memory()).unwrap();
        assert!(!dir.path().join("__structured-data--report.json").exists());
    }

    #[test]
    fn test_persisted_build_replaces_existing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.json");
        let cache_path = cache_path_for(&path).unwrap();

        let mut stale = FactCache::new();
        stale.push(CacheEntry::new("old", SyncStatus::Ok));
        save_cache(&cache_path, &stale).unwrap();

        let options = BuildOptions {
            persist: true,
            delete_existing: true,
        };
        build_cache(&path, &doc(), &langs(), options).unwrap();

        let on_disk = load_cache(&cache_path).unwrap().unwrap();
        assert!(!on_disk.contains("old"));
        assert_eq!(on_disk.len(), 3);
    }

    #[test]
    fn test_persist_without_cache_path_fails() {
        let result = build_cache(
            Path::new("/tmp/report.xml"),
            &doc(),
            &langs(),
            BuildOptions::persisted(),
        );
        assert!(matches!(result, Err(SdeError::InvalidPath { .. })));
    }
}
