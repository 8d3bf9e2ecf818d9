//! Event bus for cache changes using tokio::broadcast

use serde::Serialize;
use tokio::sync::broadcast;

/// Events emitted whenever caches change on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum CacheEvent {
    /// A document cache was created or updated
    CacheWritten { project_id: String, document: String },
    /// Caches were deleted by a maintenance run
    CachesRemoved { project_id: String, count: usize },
    /// Caches were copied back from the holding area
    CachesRestored { project_id: String, count: usize },
    /// A bulk sync run finished (possibly with per-fact errors)
    BulkSyncCompleted {
        project_id: String,
        updated: usize,
        failed: usize,
    },
    /// External table snapshots were refreshed
    TablesSynced { project_id: String, updated: usize },
    /// A backup was taken
    BackupCreated { project_id: String, caches: usize },
}

impl CacheEvent {
    pub fn project_id(&self) -> &str {
        match self {
            CacheEvent::CacheWritten { project_id, .. }
            | CacheEvent::CachesRemoved { project_id, .. }
            | CacheEvent::CachesRestored { project_id, .. }
            | CacheEvent::BulkSyncCompleted { project_id, .. }
            | CacheEvent::TablesSynced { project_id, .. }
            | CacheEvent::BackupCreated { project_id, .. } => project_id,
        }
    }
}

/// Multi-consumer broadcast of [`CacheEvent`]s
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CacheEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Create with default capacity (256 events)
    pub fn default_capacity() -> Self {
        Self::new(256)
    }

    pub fn publish(&self, event: CacheEvent) {
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::default_capacity()
    }
}
