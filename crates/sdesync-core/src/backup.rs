//! Cache backups, diffs against them, removal and restore
//!
//! A backup copies a project's caches into a holding area outside the
//! project (`<backup_dir>/<projectId>/`) together with a manifest. Removal
//! and restore are refused unless the manifest covers every affected cache.

use crate::cache::{cache_path_for, load_cache, load_json, remove_file, save_json, CACHE_PREFIX};
use crate::error::{Result, SdeError};
use crate::models::{FactCache, Project};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

/// Manifest file written at the root of a project's holding area
pub const MANIFEST_FILE: &str = "backup.json";

/// What a backup contains
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupManifest {
    pub project_id: String,
    pub created_at: DateTime<Utc>,
    /// Project-relative cache references
    pub caches: Vec<String>,
}

impl BackupManifest {
    pub fn covers(&self, cache_ref: &str) -> bool {
        self.caches.iter().any(|c| c == cache_ref)
    }
}

/// Kind of difference between a backed-up and a live cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
    Status,
}

/// One fact-level difference
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffEntry {
    pub cache: String,
    pub fact_id: String,
    pub kind: ChangeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    pub before: Option<String>,
    pub after: Option<String>,
}

fn quoted(value: &Option<String>) -> String {
    match value {
        Some(v) => format!("\"{}\"", v),
        None => "(absent)".to_string(),
    }
}

impl fmt::Display for DiffEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ChangeKind::Added => write!(f, "{}: added", self.fact_id),
            ChangeKind::Removed => write!(f, "{}: removed", self.fact_id),
            ChangeKind::Status => write!(
                f,
                "{} status: {} → {}",
                self.fact_id,
                self.before.as_deref().unwrap_or("-"),
                self.after.as_deref().unwrap_or("-")
            ),
            ChangeKind::Modified => write!(
                f,
                "{} [{}]: {} → {}",
                self.fact_id,
                self.lang.as_deref().unwrap_or("?"),
                quoted(&self.before),
                quoted(&self.after)
            ),
        }
    }
}

/// Differences between the backup and the live caches
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffReport {
    pub project_id: String,
    pub backup_created_at: DateTime<Utc>,
    pub caches_compared: usize,
    pub entries: Vec<DiffEntry>,
}

impl DiffReport {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn changes_for<'a>(&'a self, fact_id: &'a str) -> impl Iterator<Item = &'a DiffEntry> {
        self.entries.iter().filter(move |e| e.fact_id == fact_id)
    }
}

/// Compare two versions of one cache, fact by fact
pub fn diff_caches(cache_ref: &str, before: &FactCache, after: &FactCache) -> Vec<DiffEntry> {
    let mut entries = Vec::new();
    let entry = |fact_id: &str,
                 kind: ChangeKind,
                 lang: Option<&str>,
                 before: Option<String>,
                 after: Option<String>| DiffEntry {
        cache: cache_ref.to_string(),
        fact_id: fact_id.to_string(),
        kind,
        lang: lang.map(str::to_string),
        before,
        after,
    };

    let mut seen = BTreeSet::new();
    for old in &before.facts {
        if !seen.insert(old.id.as_str()) {
            continue;
        }
        let Some(new) = after.get(&old.id) else {
            entries.push(entry(&old.id, ChangeKind::Removed, None, None, None));
            continue;
        };

        if old.status != new.status {
            entries.push(entry(
                &old.id,
                ChangeKind::Status,
                None,
                Some(old.status.code()),
                Some(new.status.code()),
            ));
        }

        let languages: BTreeSet<&String> = old.values.keys().chain(new.values.keys()).collect();
        for lang in languages {
            let (was, is) = (old.value(lang), new.value(lang));
            if was != is {
                entries.push(entry(
                    &old.id,
                    ChangeKind::Modified,
                    Some(lang.as_str()),
                    was.map(str::to_string),
                    is.map(str::to_string),
                ));
            }
        }
    }

    for new in &after.facts {
        if seen.insert(new.id.as_str()) {
            entries.push(entry(&new.id, ChangeKind::Added, None, None, None));
        }
    }

    entries
}

/// Backs up, compares, removes and restores a project's caches
#[derive(Debug, Clone)]
pub struct BackupReporter {
    root: PathBuf,
}

impl BackupReporter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn holding_area(&self, project_id: &str) -> PathBuf {
        self.root.join(project_id)
    }

    pub fn manifest(&self, project_id: &str) -> Result<Option<BackupManifest>> {
        load_json(&self.holding_area(project_id).join(MANIFEST_FILE))
    }

    fn require_manifest(&self, project_id: &str) -> Result<BackupManifest> {
        self.manifest(project_id)?
            .ok_or_else(|| SdeError::BackupRequired {
                project_id: project_id.to_string(),
            })
    }

    /// Copy the selected caches (all when `documents` is `None`) to the
    /// holding area, replacing any previous backup
    pub fn backup(&self, project: &Project, documents: Option<&[String]>) -> Result<BackupManifest> {
        let caches = select_caches(project, documents)?;
        let area = self.holding_area(project.id());

        if area.exists() {
            std::fs::remove_dir_all(&area).map_err(|e| write_error(&area, e))?;
        }
        std::fs::create_dir_all(&area).map_err(|e| write_error(&area, e))?;

        let mut refs = Vec::with_capacity(caches.len());
        for cache in &caches {
            let cache_ref = project.document_ref(cache);
            copy_file(cache, &area.join(&cache_ref))?;
            refs.push(cache_ref);
        }

        let manifest = BackupManifest {
            project_id: project.id().to_string(),
            created_at: Utc::now(),
            caches: refs,
        };
        save_json(&area.join(MANIFEST_FILE), &manifest)?;

        info!(project = %project.id(), caches = manifest.caches.len(), area = %area.display(), "Backup created");
        Ok(manifest)
    }

    /// Compare every backed-up cache with its live version
    pub fn diff(&self, project: &Project) -> Result<DiffReport> {
        let manifest = self.require_manifest(project.id())?;
        let area = self.holding_area(project.id());

        let mut entries = Vec::new();
        for cache_ref in &manifest.caches {
            let before = load_cache(&area.join(cache_ref))?.unwrap_or_default();
            let after = load_cache(&project.root.join(cache_ref))?.unwrap_or_default();
            entries.extend(diff_caches(cache_ref, &before, &after));
        }

        Ok(DiffReport {
            project_id: project.id().to_string(),
            backup_created_at: manifest.created_at,
            caches_compared: manifest.caches.len(),
            entries,
        })
    }

    /// Delete the selected caches; every one must be covered by the backup
    pub fn remove(&self, project: &Project, documents: Option<&[String]>) -> Result<Vec<String>> {
        let manifest = self.require_manifest(project.id())?;
        let caches = select_caches(project, documents)?;

        let refs: Vec<String> = caches.iter().map(|c| project.document_ref(c)).collect();
        if let Some(uncovered) = refs.iter().find(|r| !manifest.covers(r)) {
            warn!(project = %project.id(), cache = %uncovered, "Refusing to remove cache missing from backup");
            return Err(SdeError::BackupRequired {
                project_id: project.id().to_string(),
            });
        }

        let mut removed = Vec::new();
        for (path, cache_ref) in caches.iter().zip(refs) {
            if remove_file(path)? {
                removed.push(cache_ref);
            }
        }

        info!(project = %project.id(), removed = removed.len(), "Caches removed");
        Ok(removed)
    }

    /// Copy every backed-up cache back into the project
    pub fn restore(&self, project: &Project) -> Result<Vec<String>> {
        let manifest = self.require_manifest(project.id())?;
        let area = self.holding_area(project.id());

        for cache_ref in &manifest.caches {
            copy_file(&area.join(cache_ref), &project.root.join(cache_ref))?;
        }

        info!(project = %project.id(), restored = manifest.caches.len(), "Caches restored");
        Ok(manifest.caches)
    }
}

/// Live caches of a project, or those belonging to the given documents
fn select_caches(project: &Project, documents: Option<&[String]>) -> Result<Vec<PathBuf>> {
    let Some(documents) = documents else {
        return Ok(project_caches(project));
    };

    let mut caches = Vec::new();
    for document_ref in documents {
        let path = project.resolve(document_ref)?;
        if let Some(cache) = cache_path_for(&path).filter(|c| c.is_file()) {
            caches.push(cache);
        }
    }
    caches.sort();
    caches.dedup();
    Ok(caches)
}

fn project_caches(project: &Project) -> Vec<PathBuf> {
    let prefix = format!("{}--", CACHE_PREFIX);
    let mut caches: Vec<PathBuf> = WalkDir::new(project.content_root())
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.file_name().to_str().map(|n| n.starts_with(&prefix)).unwrap_or(false))
        .map(|e| e.into_path())
        .collect();
    caches.sort();
    caches
}

fn write_error(path: &Path, source: std::io::Error) -> SdeError {
    SdeError::FileWrite {
        path: path.to_path_buf(),
        source,
    }
}

fn copy_file(from: &Path, to: &Path) -> Result<()> {
    if !from.is_file() {
        return Err(SdeError::FileNotFound {
            path: from.to_path_buf(),
        });
    }
    if let Some(dir) = to.parent() {
        std::fs::create_dir_all(dir).map_err(|e| write_error(dir, e))?;
    }
    std::fs::copy(from, to).map_err(|e| write_error(to, e))?;
    Ok(())
}
