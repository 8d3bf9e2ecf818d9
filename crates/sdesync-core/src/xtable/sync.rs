//! Table synchronization and injection

use crate::cache::{load_json, save_json};
use crate::error::{ReportEntry, Result, SdeError, SyncReport};
use crate::lock::CancellationFlag;
use crate::models::{Document, Project, SyncStatus};
use crate::parsers::load_document;
use crate::xtable::{table_cache_path, RemoteTable, TableService, TableSnapshot};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Documents in one directory that reference one table
#[derive(Debug, Default)]
struct TableUsage {
    documents: BTreeSet<String>,
    /// Cell counts laid out in the documents (empty layouts are ignored)
    layouts: BTreeSet<usize>,
}

/// Fetches each referenced table and refreshes its snapshots
pub struct TableSync<'a> {
    service: &'a dyn TableService,
    timeout: Duration,
}

impl<'a> TableSync<'a> {
    pub fn new(service: &'a dyn TableService, timeout: Duration) -> Self {
        Self { service, timeout }
    }

    /// Refresh every table snapshot in the project
    ///
    /// A failed fetch or drifted table is reported and the run moves on to the
    /// next table.
    pub async fn sync_project(
        &self,
        project: &Project,
        cancel: &CancellationFlag,
    ) -> Result<SyncReport> {
        let mut report = SyncReport::new();
        let mut usages: BTreeMap<(PathBuf, String), TableUsage> = BTreeMap::new();

        for path in project.documents() {
            if cancel.is_cancelled() {
                return Err(SdeError::Cancelled {
                    operation: "table sync".to_string(),
                });
            }
            report.documents_scanned += 1;

            let document = match load_document(&path) {
                Ok(document) => document,
                Err(e) => {
                    let document_ref = project.document_ref(&path);
                    report.documents_failed += 1;
                    report.add(ReportEntry::from_error(&document_ref, &e).with_documents([document_ref]));
                    continue;
                }
            };

            let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
            let document_ref = project.document_ref(&path);
            document
                .as_source()
                .visit(project.languages(), &mut |_, node| {
                    let Some(table_id) = node.table_id.as_deref() else {
                        return;
                    };
                    let usage = usages.entry((dir.clone(), table_id.to_string())).or_default();
                    usage.documents.insert(document_ref.clone());
                    if !node.cells.is_empty() {
                        usage.layouts.insert(node.cells.len());
                    }
                });
        }

        report.facts_requested = usages.len();
        let mut fetched: HashMap<String, std::result::Result<RemoteTable, String>> = HashMap::new();

        for ((dir, table_id), usage) in &usages {
            if cancel.is_cancelled() {
                report.cancelled = true;
                report.add_warning("table sync", "Cancelled before all tables were refreshed");
                break;
            }

            if !fetched.contains_key(table_id) {
                let result = self.fetch(project.id(), table_id).await.map_err(|e| e.to_string());
                fetched.insert(table_id.clone(), result);
            }
            let remote = match &fetched[table_id] {
                Ok(remote) => remote,
                Err(message) => {
                    report.facts_failed += 1;
                    report.add(
                        ReportEntry::error(table_id, message.clone())
                            .with_documents(usage.documents.iter().cloned()),
                    );
                    continue;
                }
            };

            let Some(snapshot_path) = table_cache_path(dir, table_id) else {
                report.facts_failed += 1;
                report.add(
                    ReportEntry::error(table_id, "Table id is not a valid file name")
                        .with_documents(usage.documents.iter().cloned()),
                );
                continue;
            };

            match self.refresh(&snapshot_path, table_id, usage, remote) {
                Ok(Refresh::Written) => {
                    report.facts_updated += 1;
                    report.documents_written += 1;
                    report.add_success(table_id, format!("{} cells", remote.cells.len()));
                }
                Ok(Refresh::Unchanged) => report.facts_unchanged += 1,
                Ok(Refresh::Drift) => {
                    report.facts_failed += 1;
                    report.add(
                        ReportEntry::error(
                            table_id,
                            format!(
                                "Structure drift: documents lay out {:?} cells, source has {}",
                                usage.layouts,
                                remote.cells.len()
                            ),
                        )
                        .with_documents(usage.documents.iter().cloned())
                        .with_suggestion("Update the table layout in the document, then sync again"),
                    );
                }
                Err(e) => {
                    report.documents_failed += 1;
                    report.add(
                        ReportEntry::from_error(table_id, &e)
                            .with_documents(usage.documents.iter().cloned()),
                    );
                }
            }
        }

        info!(
            project = %project.id(),
            tables = report.facts_requested,
            updated = report.facts_updated,
            failed = report.facts_failed,
            "Table sync finished"
        );
        Ok(report)
    }

    async fn fetch(&self, project_id: &str, table_id: &str) -> Result<RemoteTable> {
        debug!(table_id, "Fetching external table");
        match tokio::time::timeout(self.timeout, self.service.fetch_table(project_id, table_id)).await {
            Ok(result) => result,
            Err(_) => Err(SdeError::Timeout {
                operation: format!("table fetch {}", table_id),
                timeout_secs: self.timeout.as_secs(),
            }),
        }
    }

    fn refresh(
        &self,
        snapshot_path: &Path,
        table_id: &str,
        usage: &TableUsage,
        remote: &RemoteTable,
    ) -> Result<Refresh> {
        let compatible = usage.layouts.iter().all(|&n| n == remote.cells.len());

        if !compatible {
            warn!(table_id, source_cells = remote.cells.len(), "External table drifted");
            // Keep the old cells; only flag the snapshot
            if let Some(mut snapshot) = load_json::<TableSnapshot>(snapshot_path)? {
                snapshot.status = SyncStatus::Drift;
                save_json(snapshot_path, &snapshot)?;
            }
            return Ok(Refresh::Drift);
        }

        let snapshot = TableSnapshot {
            table_id: table_id.to_string(),
            status: SyncStatus::Ok,
            cells: remote.cells.clone(),
        };
        Ok(if save_json(snapshot_path, &snapshot)? {
            Refresh::Written
        } else {
            Refresh::Unchanged
        })
    }
}

enum Refresh {
    Written,
    Unchanged,
    Drift,
}

/// Fill table nodes from their snapshots; returns how many nodes drifted
///
/// Nodes without a snapshot are stamped `404-missing-sdecachefile` and keep
/// their cells.
pub fn inject_tables(
    document_path: &Path,
    document: &mut Document,
    project_languages: &[String],
) -> Result<usize> {
    let dir = document_path.parent().unwrap_or_else(|| Path::new(""));

    let mut table_ids = BTreeSet::new();
    document.as_source().visit(project_languages, &mut |_, node| {
        if let Some(id) = &node.table_id {
            table_ids.insert(id.clone());
        }
    });
    if table_ids.is_empty() {
        return Ok(0);
    }

    let mut snapshots: HashMap<String, TableSnapshot> = HashMap::new();
    for table_id in &table_ids {
        if let Some(path) = table_cache_path(dir, table_id) {
            if let Some(snapshot) = load_json::<TableSnapshot>(&path)? {
                snapshots.insert(table_id.clone(), snapshot);
            }
        }
    }

    let mut drifted = 0;
    document
        .as_source_mut()
        .visit_mut(project_languages, &mut |_, node| {
            let Some(table_id) = node.table_id.as_deref() else {
                return;
            };
            let Some(snapshot) = snapshots.get(table_id) else {
                node.status = Some(SyncStatus::MissingCacheFile);
                return;
            };

            let layout_differs =
                !node.cells.is_empty() && node.cells.len() != snapshot.cells.len();
            if snapshot.status == SyncStatus::Drift || layout_differs {
                node.status = Some(SyncStatus::Drift);
                drifted += 1;
            } else {
                node.cells = snapshot.cells.clone();
                node.status = Some(SyncStatus::Ok);
            }
        });

    Ok(drifted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentDocument, ContentNode, LanguageSection};
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn table_doc(cells: usize) -> Document {
        Document::Content(ContentDocument {
            languages: BTreeMap::from([(
                "en".to_string(),
                LanguageSection {
                    nodes: vec![ContentNode {
                        table_id: Some("kpi".into()),
                        cells: vec![String::new(); cells],
                        ..Default::default()
                    }],
                },
            )]),
        })
    }

    fn langs() -> Vec<String> {
        vec!["en".into()]
    }

    fn table_node(document: &Document) -> ContentNode {
        document
            .nodes(&langs())
            .into_iter()
            .map(|(_, n)| n)
            .find(|n| n.table_id.is_some())
            .unwrap()
    }

    #[test]
    fn test_inject_fills_matching_layout() {
        let dir = tempdir().unwrap();
        let snapshot = TableSnapshot {
            table_id: "kpi".into(),
            status: SyncStatus::Ok,
            cells: vec!["a".into(), "b".into()],
        };
        save_json(&table_cache_path(dir.path(), "kpi").unwrap(), &snapshot).unwrap();

        let mut document = table_doc(2);
        let drifted = inject_tables(&dir.path().join("doc.json"), &mut document, &langs()).unwrap();

        assert_eq!(drifted, 0);
        assert_eq!(table_node(&document).cells, vec!["a", "b"]);
    }

    #[test]
    fn test_inject_flags_drift_and_missing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.json");

        let mut missing = table_doc(2);
        inject_tables(&path, &mut missing, &langs()).unwrap();
        assert_eq!(table_node(&missing).status, Some(SyncStatus::MissingCacheFile));

        let snapshot = TableSnapshot {
            table_id: "kpi".into(),
            status: SyncStatus::Ok,
            cells: vec!["a".into(), "b".into(), "c".into()],
        };
        save_json(&table_cache_path(dir.path(), "kpi").unwrap(), &snapshot).unwrap();

        let mut drifted = table_doc(2);
        assert_eq!(inject_tables(&path, &mut drifted, &langs()).unwrap(), 1);
        let node = table_node(&drifted);
        assert_eq!(node.status, Some(SyncStatus::Drift));
        assert_eq!(node.cells, vec!["", ""]);
    }
}
