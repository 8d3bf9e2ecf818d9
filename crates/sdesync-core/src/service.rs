//! Service facade over projects, caches and the remote services
//!
//! Every operator and author operation goes through [`SdeService`], which owns
//! the lease registry so concurrent callers see consistent caches.

use crate::backup::{BackupManifest, BackupReporter, DiffReport};
use crate::cache::{cache_path_for, load_cache, save_cache};
use crate::config::SyncConfig;
use crate::error::{Result, SdeError, SyncReport};
use crate::event::{CacheEvent, EventBus};
use crate::inject::{InjectionOutcome, ValueInjector};
use crate::lock::{CacheLocks, CancellationFlag};
use crate::models::{Document, LanguageScope, Project, SyncStatus};
use crate::parsers::load_document;
use crate::reconcile::{reconcile_document, ReconcileOptions, ReconcileOutcome};
use crate::sync::{BulkSyncEngine, HttpRemote, ValueService};
use crate::xtable::{inject_tables, TableService, TableSync};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// A document populated from its caches
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedDocument {
    pub document: Document,
    pub outcome: InjectionOutcome,
    /// Table nodes whose layout drifted from their snapshot
    pub tables_drifted: usize,
}

/// Result of a cache removal (always preceded by a backup)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovalReport {
    pub backup_created_at: DateTime<Utc>,
    pub removed: Vec<String>,
}

/// Entry point for all cache operations
pub struct SdeService {
    config: SyncConfig,
    values: Option<Arc<dyn ValueService>>,
    tables: Option<Arc<dyn TableService>>,
    locks: CacheLocks,
    backups: BackupReporter,
    event_bus: EventBus,
}

impl SdeService {
    /// Service without remote access; sync operations fail until a value
    /// service is attached
    pub fn new(config: SyncConfig) -> Self {
        let backups = BackupReporter::new(config.backup_dir.clone());
        Self {
            config,
            values: None,
            tables: None,
            locks: CacheLocks::new(),
            backups,
            event_bus: EventBus::default_capacity(),
        }
    }

    /// Attach the HTTP remote when `service_url` is configured
    pub fn from_config(config: SyncConfig) -> Self {
        let remote = config.service_url.as_deref().map(|url| Arc::new(HttpRemote::new(url)));
        let service = Self::new(config);
        match remote {
            Some(remote) => service
                .with_value_service(remote.clone())
                .with_table_service(remote),
            None => service,
        }
    }

    pub fn with_value_service(mut self, service: Arc<dyn ValueService>) -> Self {
        self.values = Some(service);
        self
    }

    pub fn with_table_service(mut self, service: Arc<dyn TableService>) -> Self {
        self.tables = Some(service);
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn open_project(&self, project_id: &str) -> Result<Project> {
        Project::open(&self.config.workspace_root, project_id)
    }

    fn value_service(&self) -> Result<&dyn ValueService> {
        self.values.as_deref().ok_or_else(|| SdeError::InvalidConfig {
            message: "no value service configured (set SDESYNC_SERVICE_URL)".to_string(),
        })
    }

    fn table_service(&self) -> Result<&dyn TableService> {
        self.tables.as_deref().ok_or_else(|| SdeError::InvalidConfig {
            message: "no table service configured (set SDESYNC_SERVICE_URL)".to_string(),
        })
    }

    fn cache_path(&self, path: &std::path::Path) -> Result<PathBuf> {
        cache_path_for(path).ok_or_else(|| SdeError::InvalidPath {
            path: path.to_path_buf(),
            reason: "document has no cache path".to_string(),
        })
    }

    /// Document references of a project, in sorted order
    pub fn list_documents(&self, project_id: &str) -> Result<Vec<String>> {
        let project = self.open_project(project_id)?;
        Ok(project
            .documents()
            .iter()
            .map(|p| project.document_ref(p))
            .collect())
    }

    /// Load a document and inject cached fact values and table cells
    ///
    /// Reads take no lease. When a missing cache must be auto-created and the
    /// project is busy, creation is skipped and nodes are stamped as missing.
    pub async fn render_document(
        &self,
        project_id: &str,
        document_ref: &str,
        scope: &LanguageScope,
    ) -> Result<RenderedDocument> {
        let project = self.open_project(project_id)?;
        let path = project.resolve(document_ref)?;
        let mut document = load_document(&path)?;

        let mut auto_create = self.config.auto_create_cache;
        let mut _lease = None;
        if auto_create {
            if let Some(cache_path) = cache_path_for(&path).filter(|p| !p.exists()) {
                match self.locks.file(project.id(), &cache_path).await {
                    Ok(lease) => _lease = Some(lease),
                    Err(e) => {
                        debug!(document = document_ref, error = %e, "Skipping cache auto-create");
                        auto_create = false;
                    }
                }
            }
        }

        let outcome = ValueInjector::new(auto_create).inject(
            &path,
            &mut document,
            project.languages(),
            scope,
        )?;
        let tables_drifted = inject_tables(&path, &mut document, project.languages())?;

        if outcome.cache_created {
            self.event_bus.publish(CacheEvent::CacheWritten {
                project_id: project.id().to_string(),
                document: document_ref.to_string(),
            });
        }

        Ok(RenderedDocument {
            document,
            outcome,
            tables_drifted,
        })
    }

    /// Reconcile the cache with a document an author just saved in `lang`
    pub async fn save_document(
        &self,
        project_id: &str,
        document_ref: &str,
        document: &Document,
        lang: &str,
        options: ReconcileOptions,
    ) -> Result<ReconcileOutcome> {
        let project = self.open_project(project_id)?;
        if !project.languages().iter().any(|l| l == lang) {
            return Err(SdeError::InvalidConfig {
                message: format!("language {} is not configured for project {}", lang, project_id),
            });
        }

        let path = project.resolve(document_ref)?;
        let cache_path = self.cache_path(&path)?;
        let _lease = self.locks.file(project.id(), &cache_path).await?;

        let outcome =
            reconcile_document(&path, document, lang, project.languages(), options)?;
        if outcome.written {
            self.event_bus.publish(CacheEvent::CacheWritten {
                project_id: project.id().to_string(),
                document: document_ref.to_string(),
            });
        }
        Ok(outcome)
    }

    /// Sync every document of a project in one remote round trip
    pub async fn bulk_sync(&self, project_id: &str, cancel: &CancellationFlag) -> Result<SyncReport> {
        let project = self.open_project(project_id)?;
        let service = self.value_service()?;
        let _lease = self.locks.exclusive(project.id())?;

        info!(project = %project.id(), "Starting bulk sync");
        let report = BulkSyncEngine::new(service, self.config.lookup_timeout)
            .sync_project(&project, cancel)
            .await?;

        self.event_bus.publish(CacheEvent::BulkSyncCompleted {
            project_id: project.id().to_string(),
            updated: report.facts_updated,
            failed: report.facts_failed,
        });
        Ok(report)
    }

    /// Sync a single document, sharing the project with other writers
    pub async fn sync_document(&self, project_id: &str, document_ref: &str) -> Result<SyncReport> {
        let project = self.open_project(project_id)?;
        let service = self.value_service()?;
        let path = project.resolve(document_ref)?;
        let cache_path = self.cache_path(&path)?;
        if !path.is_file() {
            return Err(SdeError::FileNotFound { path });
        }
        let _lease = self.locks.file(project.id(), &cache_path).await?;

        let report = BulkSyncEngine::new(service, self.config.lookup_timeout)
            .sync_documents(&project, &[path], &CancellationFlag::new())
            .await?;

        if report.documents_written > 0 {
            self.event_bus.publish(CacheEvent::CacheWritten {
                project_id: project.id().to_string(),
                document: document_ref.to_string(),
            });
        }
        Ok(report)
    }

    /// Set the status of one fact in one document cache
    ///
    /// Returns how many entries were updated (duplicates included).
    pub async fn update_fact_status(
        &self,
        project_id: &str,
        document_ref: &str,
        fact_id: &str,
        status: SyncStatus,
    ) -> Result<usize> {
        let project = self.open_project(project_id)?;
        let path = project.resolve(document_ref)?;
        let cache_path = self.cache_path(&path)?;
        let _lease = self.locks.file(project.id(), &cache_path).await?;

        let mut cache = load_cache(&cache_path)?.ok_or_else(|| SdeError::FileNotFound {
            path: cache_path.clone(),
        })?;

        let mut updated = 0;
        for entry in cache.facts.iter_mut().filter(|e| e.id == fact_id) {
            entry.status = status.clone();
            updated += 1;
        }
        if updated == 0 {
            return Err(SdeError::FactNotFound {
                fact_id: fact_id.to_string(),
                path: cache_path,
            });
        }

        if save_cache(&cache_path, &cache)? {
            info!(document = document_ref, fact_id, status = %status, "Fact status updated");
            self.event_bus.publish(CacheEvent::CacheWritten {
                project_id: project.id().to_string(),
                document: document_ref.to_string(),
            });
        }
        Ok(updated)
    }

    /// Back up all caches, or those of the given documents
    pub async fn backup(&self, project_id: &str, documents: Option<&[String]>) -> Result<BackupManifest> {
        let project = self.open_project(project_id)?;
        let _lease = self.locks.exclusive(project.id())?;

        let manifest = self.backups.backup(&project, documents)?;
        self.event_bus.publish(CacheEvent::BackupCreated {
            project_id: project.id().to_string(),
            caches: manifest.caches.len(),
        });
        Ok(manifest)
    }

    /// Compare the live caches with the last backup
    pub async fn diff(&self, project_id: &str) -> Result<DiffReport> {
        let project = self.open_project(project_id)?;
        self.backups.diff(&project)
    }

    /// Back up, then delete, all caches or those of the given documents
    pub async fn remove_caches(
        &self,
        project_id: &str,
        documents: Option<&[String]>,
    ) -> Result<RemovalReport> {
        let project = self.open_project(project_id)?;
        let _lease = self.locks.exclusive(project.id())?;

        let manifest = self.backups.backup(&project, documents)?;
        let removed = self.backups.remove(&project, documents)?;

        self.event_bus.publish(CacheEvent::CachesRemoved {
            project_id: project.id().to_string(),
            count: removed.len(),
        });
        Ok(RemovalReport {
            backup_created_at: manifest.created_at,
            removed,
        })
    }

    /// Copy the last backup back into the project
    pub async fn restore_backup(&self, project_id: &str) -> Result<Vec<String>> {
        let project = self.open_project(project_id)?;
        let _lease = self.locks.exclusive(project.id())?;

        let restored = self.backups.restore(&project)?;
        self.event_bus.publish(CacheEvent::CachesRestored {
            project_id: project.id().to_string(),
            count: restored.len(),
        });
        Ok(restored)
    }

    /// Refresh external table snapshots
    pub async fn sync_tables(&self, project_id: &str, cancel: &CancellationFlag) -> Result<SyncReport> {
        let project = self.open_project(project_id)?;
        let service = self.table_service()?;
        let _lease = self.locks.exclusive(project.id())?;

        let report = TableSync::new(service, self.config.lookup_timeout)
            .sync_project(&project, cancel)
            .await?;

        self.event_bus.publish(CacheEvent::TablesSynced {
            project_id: project.id().to_string(),
            updated: report.facts_updated,
        });
        Ok(report)
    }
}
