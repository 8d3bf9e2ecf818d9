//! Bulk synchronization
//!
//! A run collects the facts of every document, resolves all of them in one
//! remote round trip and then writes each document's cache. Per-fact problems
//! end up in the [`SyncReport`]; only engine-wide failures (remote unreachable,
//! timeout, cancellation before any write) abort the run, and they abort it
//! before anything is written.

use crate::cache::{build_cache, cache_path_for, load_cache, save_cache, BuildOptions};
use crate::error::{ReportEntry, Result, SdeError, SyncReport};
use crate::lock::CancellationFlag;
use crate::models::{CacheEntry, FactCache, Project, SyncStatus};
use crate::parsers::load_document;
use crate::sync::remote::{BulkLookupRequest, BulkLookupResponse, RemoteFact, ValueService};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// A document's cache, loaded and backfilled, waiting to be written
struct PendingCache {
    document_ref: String,
    cache_path: PathBuf,
    cache: FactCache,
    fact_ids: Vec<String>,
}

/// Runs bulk lookups against a [`ValueService`]
pub struct BulkSyncEngine<'a> {
    service: &'a dyn ValueService,
    timeout: Duration,
}

impl<'a> BulkSyncEngine<'a> {
    pub fn new(service: &'a dyn ValueService, timeout: Duration) -> Self {
        Self { service, timeout }
    }

    /// Sync every document of the project
    pub async fn sync_project(
        &self,
        project: &Project,
        cancel: &CancellationFlag,
    ) -> Result<SyncReport> {
        let documents = project.documents();
        self.sync_documents(project, &documents, cancel).await
    }

    /// Sync an explicit set of documents with a single lookup
    pub async fn sync_documents(
        &self,
        project: &Project,
        documents: &[PathBuf],
        cancel: &CancellationFlag,
    ) -> Result<SyncReport> {
        let mut report = SyncReport::new();
        let mut pending = Vec::new();
        // fact id -> documents referencing it
        let mut attribution: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for path in documents {
            if cancel.is_cancelled() {
                return Err(cancelled());
            }
            report.documents_scanned += 1;

            match prepare(project, path) {
                Ok(Some(work)) => {
                    for fact_id in &work.fact_ids {
                        attribution
                            .entry(fact_id.clone())
                            .or_default()
                            .insert(work.document_ref.clone());
                    }
                    pending.push(work);
                }
                Ok(None) => debug!(path = %path.display(), "Skipping document without cache path"),
                Err(e) => {
                    let document_ref = project.document_ref(path);
                    warn!(document = %document_ref, error = %e, "Skipping unreadable document");
                    report.documents_failed += 1;
                    report.add(ReportEntry::from_error(&document_ref, &e).with_documents([document_ref]));
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(cancelled());
        }

        report.facts_requested = attribution.len();
        let response = if attribution.is_empty() {
            BulkLookupResponse::default()
        } else {
            let request =
                BulkLookupRequest::new(project.id(), attribution.keys().map(String::as_str));
            self.lookup(&request).await?
        };

        for (fact_id, document_refs) in &attribution {
            let remote = response.items.get(fact_id);
            let status = remote
                .map(|r| SyncStatus::from_remote_code(&r.code))
                .unwrap_or(SyncStatus::NotFoundInMappingService);

            let mut changed = false;
            for work in pending
                .iter_mut()
                .filter(|w| document_refs.contains(&w.document_ref))
            {
                for entry in work.cache.facts.iter_mut().filter(|e| &e.id == fact_id) {
                    changed |= apply_resolution(entry, &status, remote);
                }
            }

            record(&mut report, fact_id, &status, changed, document_refs);
        }

        for (i, work) in pending.iter().enumerate() {
            if cancel.is_cancelled() {
                let unwritten: Vec<&str> =
                    pending[i..].iter().map(|w| w.document_ref.as_str()).collect();
                report.cancelled = true;
                report.add(
                    ReportEntry::warning(
                        "bulk sync",
                        format!("Cancelled with {} caches not written", unwritten.len()),
                    )
                    .with_documents(unwritten),
                );
                break;
            }

            match save_cache(&work.cache_path, &work.cache) {
                Ok(true) => report.documents_written += 1,
                Ok(false) => report.documents_unchanged += 1,
                Err(e) => {
                    warn!(document = %work.document_ref, error = %e, "Cache write failed");
                    report.documents_failed += 1;
                    report.add(
                        ReportEntry::from_error(&work.document_ref, &e)
                            .with_documents([work.document_ref.clone()]),
                    );
                }
            }
        }

        info!(
            project = %project.id(),
            documents = report.documents_scanned,
            requested = report.facts_requested,
            updated = report.facts_updated,
            failed = report.facts_failed,
            not_found = report.facts_not_found,
            cancelled = report.cancelled,
            "Bulk sync finished"
        );
        Ok(report)
    }

    async fn lookup(&self, request: &BulkLookupRequest) -> Result<BulkLookupResponse> {
        debug!(facts = request.len(), timeout_secs = self.timeout.as_secs(), "Bulk lookup");

        match tokio::time::timeout(self.timeout, self.service.bulk_lookup(request)).await {
            Ok(result) => result,
            Err(_) => Err(SdeError::Timeout {
                operation: "bulk lookup".to_string(),
                timeout_secs: self.timeout.as_secs(),
            }),
        }
    }
}

fn cancelled() -> SdeError {
    SdeError::Cancelled {
        operation: "bulk sync".to_string(),
    }
}

/// Load a document and its cache, backfilling entries the cache lacks
fn prepare(project: &Project, path: &Path) -> Result<Option<PendingCache>> {
    let Some(cache_path) = cache_path_for(path) else {
        return Ok(None);
    };

    let document = load_document(path)?;
    let built = build_cache(path, &document, project.languages(), BuildOptions::in_memory())?;
    let mut cache = load_cache(&cache_path)?.unwrap_or_default();

    let fact_ids: Vec<String> = built.ids().map(str::to_string).collect();
    for entry in built.facts {
        if !cache.contains(&entry.id) {
            cache.push(entry);
        }
    }

    Ok(Some(PendingCache {
        document_ref: project.document_ref(path),
        cache_path,
        cache,
        fact_ids,
    }))
}

/// Apply a remote resolution to one cache entry; true if it changed
///
/// Only `200` overwrites values. Every other status keeps the last known
/// values so a failed lookup never erases data.
fn apply_resolution(entry: &mut CacheEntry, status: &SyncStatus, remote: Option<&RemoteFact>) -> bool {
    let mut changed = entry.set_status(status.clone());

    if status.is_ok() {
        if let Some(remote) = remote {
            for (lang, value) in &remote.values {
                changed |= entry.set_value(lang, value);
            }
        }
    }

    changed
}

fn record(
    report: &mut SyncReport,
    fact_id: &str,
    status: &SyncStatus,
    changed: bool,
    document_refs: &BTreeSet<String>,
) {
    match status {
        SyncStatus::Ok if changed => {
            report.facts_updated += 1;
        }
        SyncStatus::Ok => report.facts_unchanged += 1,
        SyncStatus::NoDataSource => report.facts_unmanaged += 1,
        SyncStatus::NotFoundInMappingService => {
            report.facts_not_found += 1;
            report.add(
                ReportEntry::warning(fact_id, "Fact not found in mapping service")
                    .with_documents(document_refs.iter().cloned())
                    .with_suggestion("Check the fact id or register it in the mapping service"),
            );
        }
        other => {
            report.facts_failed += 1;
            warn!(fact_id, status = %other, documents = document_refs.len(), "Fact resolution failed");
            report.add(
                ReportEntry::error(fact_id, format!("Resolution failed: {}", other))
                    .with_documents(document_refs.iter().cloned()),
            );
        }
    }
}
