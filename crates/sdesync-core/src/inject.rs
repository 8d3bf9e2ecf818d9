//! Read path: populate a document's fact nodes from its cache
//!
//! Injection never writes to the document on disk. Status stamps live only on
//! the in-memory nodes and are never persisted.

use crate::cache::{build_cache, cache_path_for, load_cache, BuildOptions};
use crate::error::Result;
use crate::models::{Document, FactCache, LanguageScope, SyncStatus};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

/// Counters for one injection pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct InjectionOutcome {
    /// A cache file existed before injection
    pub cache_found: bool,
    /// The cache was built and persisted during this pass
    pub cache_created: bool,
    /// Nodes whose text was replaced by a cached value
    pub nodes_injected: usize,
    /// Nodes forced to empty text by `hideValue`
    pub nodes_hidden: usize,
    /// Nodes stamped with any status
    pub nodes_stamped: usize,
    /// Nodes whose fact id was not in the cache
    pub missing_elements: usize,
}

/// Injects cached values into documents before they are displayed
#[derive(Debug, Clone, Copy)]
pub struct ValueInjector {
    auto_create: bool,
}

impl ValueInjector {
    /// `auto_create` builds and persists a cache when a document has none
    pub fn new(auto_create: bool) -> Self {
        Self { auto_create }
    }

    /// Populate `document` in place from the cache next to `document_path`
    ///
    /// A missing cache is not an error: nodes are stamped
    /// `404-missing-sdecachefile` and keep their text. A cache that exists but
    /// cannot be parsed is a structural error.
    pub fn inject(
        &self,
        document_path: &Path,
        document: &mut Document,
        project_languages: &[String],
        scope: &LanguageScope,
    ) -> Result<InjectionOutcome> {
        let cache_path = cache_path_for(document_path);

        let existing = match &cache_path {
            Some(path) => load_cache(path)?,
            None => None,
        };
        let cache_found = existing.is_some();

        let (cache, created) = match existing {
            Some(cache) => (Some(cache), false),
            None if self.auto_create && cache_path.is_some() => {
                let cache = build_cache(
                    document_path,
                    document,
                    project_languages,
                    BuildOptions::persisted(),
                )?;
                info!(path = %document_path.display(), facts = cache.len(), "Auto-created missing cache");
                (Some(cache), true)
            }
            None => (None, false),
        };

        let mut outcome = apply_cache(cache.as_ref(), document, project_languages, scope);
        outcome.cache_found = cache_found;
        outcome.cache_created = created;

        debug!(
            path = %document_path.display(),
            injected = outcome.nodes_injected,
            missing = outcome.missing_elements,
            "Injected cached values"
        );
        Ok(outcome)
    }
}

/// Apply a (possibly absent) cache to every in-scope fact node
pub fn apply_cache(
    cache: Option<&FactCache>,
    document: &mut Document,
    project_languages: &[String],
    scope: &LanguageScope,
) -> InjectionOutcome {
    let mut outcome = InjectionOutcome::default();

    document
        .as_source_mut()
        .visit_mut(project_languages, &mut |lang, node| {
            if !scope.includes(lang) {
                return;
            }
            let fact_id = match node.fact_ref().map(str::trim) {
                Some(id) if !id.is_empty() => id.to_string(),
                _ => return,
            };

            if node.flags.hide_value {
                node.text.clear();
                outcome.nodes_hidden += 1;
                return;
            }
            if node.flags.exempt {
                return;
            }

            let Some(cache) = cache else {
                node.status = Some(SyncStatus::MissingCacheFile);
                outcome.nodes_stamped += 1;
                return;
            };

            let Some(entry) = cache.get(&fact_id) else {
                node.status = Some(SyncStatus::MissingCacheElement);
                outcome.nodes_stamped += 1;
                outcome.missing_elements += 1;
                return;
            };

            let value = entry.value(lang);
            let status = match (&entry.status, value) {
                (SyncStatus::NoDataSource, _) => SyncStatus::NoDataSource,
                // Whitespace-only values are legitimate
                (SyncStatus::Ok, Some(value)) => {
                    node.text = value.to_string();
                    outcome.nodes_injected += 1;
                    SyncStatus::Ok
                }
                (SyncStatus::Ok, None) => SyncStatus::MissingCacheValue,
                (other, Some(value)) if !value.is_empty() => {
                    node.text = value.to_string();
                    outcome.nodes_injected += 1;
                    other.clone()
                }
                (other, _) => other.clone(),
            };

            node.status = Some(status);
            outcome.nodes_stamped += 1;
        });

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::save_cache;
    use crate::models::{CacheEntry, ContentDocument, ContentNode, LanguageSection, NodeFlags};
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn langs() -> Vec<String> {
        vec!["en".into(), "nl".into()]
    }

    fn doc(nodes: Vec<ContentNode>) -> Document {
        Document::Content(ContentDocument {
            languages: BTreeMap::from([("en".to_string(), LanguageSection { nodes })]),
        })
    }

    fn node(doc: &Document, fact_id: &str) -> ContentNode {
        doc.find_fact(&langs(), "en", fact_id).unwrap()
    }

    #[test]
    fn test_missing_cache_stamps_and_keeps_text() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.json");
        let mut document = doc(vec![ContentNode::fact("x", "original")]);

        let outcome = ValueInjector::new(false)
            .inject(&path, &mut document, &langs(), &LanguageScope::All)
            .unwrap();

        let x = node(&document, "x");
        assert_eq!(x.text, "original");
        assert_eq!(x.status, Some(SyncStatus::MissingCacheFile));
        assert!(!outcome.cache_found);
        assert!(!dir.path().join("__structured-data--report.json").exists());
    }

    #[test]
    fn test_auto_create_persists_cache() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.json");
        let mut document = doc(vec![ContentNode::fact("x", "10")]);

        let outcome = ValueInjector::new(true)
            .inject(&path, &mut document, &langs(), &LanguageScope::All)
            .unwrap();

        assert!(outcome.cache_created);
        assert!(dir.path().join("__structured-data--report.json").exists());
        // Freshly built entries are `new`, values come from the document itself
        let x = node(&document, "x");
        assert_eq!(x.text, "10");
        assert_eq!(x.status, Some(SyncStatus::New));
    }

    #[test]
    fn test_status_rules() {
        let mut cache = FactCache::new();
        cache.push(CacheEntry::new("ok", SyncStatus::Ok).with_value("en", "  "));
        cache.push(CacheEntry::new("nods", SyncStatus::NoDataSource).with_value("en", "remote"));
        cache.push(CacheEntry::new("novalue", SyncStatus::Ok).with_value("nl", "x"));
        cache.push(
            CacheEntry::new("failed", SyncStatus::UpstreamError("timeout".into()))
                .with_value("en", "last-known"),
        );
        cache.push(CacheEntry::new("empty", SyncStatus::New).with_value("en", ""));

        let mut document = doc(vec![
            ContentNode::fact("ok", "old"),
            ContentNode::fact("nods", "keep"),
            ContentNode::fact("novalue", "keep"),
            ContentNode::fact("failed", "old"),
            ContentNode::fact("empty", "keep"),
            ContentNode::fact("unknown", "keep"),
        ]);

        let outcome = apply_cache(Some(&cache), &mut document, &langs(), &LanguageScope::All);

        assert_eq!(node(&document, "ok").text, "  ");
        assert_eq!(node(&document, "nods").text, "keep");
        assert_eq!(node(&document, "nods").status, Some(SyncStatus::NoDataSource));
        assert_eq!(node(&document, "novalue").text, "keep");
        assert_eq!(node(&document, "novalue").status, Some(SyncStatus::MissingCacheValue));
        assert_eq!(node(&document, "failed").text, "last-known");
        assert_eq!(node(&document, "empty").text, "keep");
        assert_eq!(node(&document, "unknown").status, Some(SyncStatus::MissingCacheElement));
        assert_eq!(outcome.missing_elements, 1);
        assert_eq!(outcome.nodes_injected, 2);
    }

    #[test]
    fn test_hidden_and_exempt_nodes() {
        let mut cache = FactCache::new();
        cache.push(CacheEntry::new("a", SyncStatus::Ok).with_value("en", "1"));

        let mut document = doc(vec![
            ContentNode::fact("a", "visible").with_flags(NodeFlags {
                hide_value: true,
                ..Default::default()
            }),
            ContentNode::fact("b", "manual").with_flags(NodeFlags {
                exempt: true,
                ..Default::default()
            }),
        ]);

        apply_cache(Some(&cache), &mut document, &langs(), &LanguageScope::All);

        let hidden = node(&document, "a");
        assert_eq!(hidden.text, "");
        assert_eq!(hidden.status, None);
        let exempt = node(&document, "b");
        assert_eq!(exempt.text, "manual");
        assert_eq!(exempt.status, None);
    }

    #[test]
    fn test_status_stamps_are_not_persisted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.json");
        let cache_path = cache_path_for(&path).unwrap();

        let mut cache = FactCache::new();
        cache.push(CacheEntry::new("a", SyncStatus::Ok).with_value("en", "1"));
        save_cache(&cache_path, &cache).unwrap();
        let before = std::fs::read(&cache_path).unwrap();

        let mut document = doc(vec![ContentNode::fact("a", "0"), ContentNode::fact("b", "0")]);
        ValueInjector::new(true)
            .inject(&path, &mut document, &langs(), &LanguageScope::All)
            .unwrap();

        assert_eq!(std::fs::read(&cache_path).unwrap(), before);
    }

    #[test]
    fn test_scope_limits_injection() {
        let mut cache = FactCache::new();
        cache.push(
            CacheEntry::new("a", SyncStatus::Ok)
                .with_value("en", "one")
                .with_value("nl", "een"),
        );
        let mut document = Document::Content(ContentDocument {
            languages: BTreeMap::from([
                ("en".to_string(), LanguageSection { nodes: vec![ContentNode::fact("a", "")] }),
                ("nl".to_string(), LanguageSection { nodes: vec![ContentNode::fact("a", "")] }),
            ]),
        });

        apply_cache(
            Some(&cache),
            &mut document,
            &langs(),
            &LanguageScope::Only("nl".into()),
        );

        assert_eq!(document.find_fact(&langs(), "en", "a").unwrap().text, "");
        assert_eq!(document.find_fact(&langs(), "nl", "a").unwrap().text, "een");
    }
}
