//! Runtime configuration for the sync service

use std::path::PathBuf;
use std::time::Duration;

/// Default bound on one remote round trip
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for [`crate::SdeService`]
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Directory holding one sub-directory per project
    pub workspace_root: PathBuf,

    /// Holding area for cache backups (one sub-directory per project)
    pub backup_dir: PathBuf,

    /// Timeout for bulk lookups and table fetches
    pub lookup_timeout: Duration,

    /// Build and persist a cache when a document is rendered without one
    pub auto_create_cache: bool,

    /// Base URL of the remote value service
    pub service_url: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::from("."),
            backup_dir: default_backup_dir(),
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
            auto_create_cache: true,
            service_url: None,
        }
    }
}

impl SyncConfig {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            ..Default::default()
        }
    }

    pub fn with_backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = dir.into();
        self
    }

    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    pub fn with_auto_create_cache(mut self, enabled: bool) -> Self {
        self.auto_create_cache = enabled;
        self
    }

    pub fn with_service_url(mut self, url: impl Into<String>) -> Self {
        self.service_url = Some(url.into());
        self
    }
}

/// `~/.cache/sdesync/backup` (falls back to the temp dir)
pub fn default_backup_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("sdesync")
        .join("backup")
}
