//! Per-document fact cache model
//!
//! `values` is keyed by language. A missing key means the value is absent;
//! an empty string is a real (empty) value.

use crate::models::SyncStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One cached fact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub id: String,
    pub status: SyncStatus,
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

impl CacheEntry {
    pub fn new(id: impl Into<String>, status: SyncStatus) -> Self {
        Self {
            id: id.into(),
            status,
            values: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, lang: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(lang.into(), value.into());
        self
    }

    pub fn value(&self, lang: &str) -> Option<&str> {
        self.values.get(lang).map(String::as_str)
    }

    /// Set a value, returning true if it changed
    pub fn set_value(&mut self, lang: &str, value: &str) -> bool {
        if self.value(lang) == Some(value) {
            return false;
        }
        self.values.insert(lang.to_string(), value.to_string());
        true
    }

    /// Set the status, returning true if it changed
    pub fn set_status(&mut self, status: SyncStatus) -> bool {
        if self.status == status {
            return false;
        }
        self.status = status;
        true
    }
}

/// All cached facts of one content document, in first-seen order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactCache {
    #[serde(default)]
    pub facts: Vec<CacheEntry>,
}

impl FactCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&CacheEntry> {
        self.facts.iter().find(|e| e.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut CacheEntry> {
        self.facts.iter_mut().find(|e| e.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn push(&mut self, entry: CacheEntry) {
        self.facts.push(entry);
    }

    /// Cached value for a fact in one language
    pub fn value(&self, id: &str, lang: &str) -> Option<&str> {
        self.get(id).and_then(|e| e.value(lang))
    }

    /// Fact ids in cache order (duplicates included)
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.facts.iter().map(|e| e.id.as_str())
    }

    /// Remove every entry after the first for `id`, returning how many were dropped
    pub fn collapse_duplicates(&mut self, id: &str) -> usize {
        let mut seen = false;
        let before = self.facts.len();
        self.facts.retain(|e| {
            if e.id != id {
                return true;
            }
            let keep = !seen;
            seen = true;
            keep
        });
        before - self.facts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_and_absent_values_are_distinct() {
        let entry = CacheEntry::new("a", SyncStatus::Ok).with_value("en", "");
        assert_eq!(entry.value("en"), Some(""));
        assert_eq!(entry.value("nl"), None);
    }

    #[test]
    fn test_collapse_duplicates_keeps_first() {
        let mut cache = FactCache::new();
        cache.push(CacheEntry::new("a", SyncStatus::Ok).with_value("en", "1"));
        cache.push(CacheEntry::new("b", SyncStatus::Ok));
        cache.push(CacheEntry::new("a", SyncStatus::New).with_value("en", "2"));

        assert_eq!(cache.collapse_duplicates("a"), 1);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.value("a", "en"), Some("1"));
    }

    #[test]
    fn test_set_value_reports_change() {
        let mut entry = CacheEntry::new("a", SyncStatus::Ok).with_value("en", "1");
        assert!(!entry.set_value("en", "1"));
        assert!(entry.set_value("en", "2"));
        assert!(entry.set_value("nl", ""));
        assert!(!entry.set_status(SyncStatus::Ok));
    }

    #[test]
    fn test_values_serialize_in_language_order() {
        let entry = CacheEntry::new("a", SyncStatus::Ok)
            .with_value("nl", "2")
            .with_value("en", "1");
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(
            json,
            r#"{"id":"a","status":"200-ok","values":{"en":"1","nl":"2"}}"#
        );
    }
}
