//! Cache leases and cancellation
//!
//! Each project has one lease. Bulk sync and cache maintenance hold it
//! exclusively; saves and single-document syncs share it and then queue on a
//! per-cache-file mutex. Conflicts fail fast with a retryable `CacheBusy`
//! instead of waiting, so an author's save never hangs behind a long bulk run.

use crate::error::{Result, SdeError};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::debug;

/// Registry of project leases and cache-file mutexes
#[derive(Debug, Default)]
pub struct CacheLocks {
    projects: DashMap<String, Arc<RwLock<()>>>,
    files: DashMap<PathBuf, Arc<Mutex<()>>>,
}

/// Exclusive hold on a whole project
#[derive(Debug)]
pub struct ProjectLease {
    _guard: OwnedRwLockWriteGuard<()>,
}

/// Shared project hold plus exclusive access to one cache file
#[derive(Debug)]
pub struct FileLease {
    _project: OwnedRwLockReadGuard<()>,
    _file: OwnedMutexGuard<()>,
}

impl CacheLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn project_lock(&self, project_id: &str) -> Arc<RwLock<()>> {
        self.projects
            .entry(project_id.to_string())
            .or_default()
            .clone()
    }

    /// Take the project exclusively or fail with `CacheBusy`
    pub fn exclusive(&self, project_id: &str) -> Result<ProjectLease> {
        let guard = self
            .project_lock(project_id)
            .try_write_owned()
            .map_err(|_| SdeError::CacheBusy {
                project_id: project_id.to_string(),
                reason: "another sync, save or maintenance run is using the caches".to_string(),
            })?;

        debug!(project = project_id, "Exclusive project lease taken");
        Ok(ProjectLease { _guard: guard })
    }

    /// Share the project lease, then wait for the cache file's mutex
    ///
    /// Fails with `CacheBusy` while a bulk sync or maintenance run holds the
    /// project; writers of the same file are serialized.
    pub async fn file(&self, project_id: &str, cache_path: &Path) -> Result<FileLease> {
        let project = self
            .project_lock(project_id)
            .try_read_owned()
            .map_err(|_| SdeError::CacheBusy {
                project_id: project_id.to_string(),
                reason: "a bulk sync is in progress".to_string(),
            })?;

        let file_lock = self
            .files
            .entry(cache_path.to_path_buf())
            .or_default()
            .clone();
        let file = file_lock.lock_owned().await;

        Ok(FileLease {
            _project: project,
            _file: file,
        })
    }
}

/// Cooperative cancellation shared between a caller and a running sync
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
