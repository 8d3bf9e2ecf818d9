//! Server-Sent Events for cache changes

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use sdesync_core::{CacheEvent, EventBus};
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

fn event_name(event: &CacheEvent) -> &'static str {
    match event {
        CacheEvent::CacheWritten { .. } => "cache_written",
        CacheEvent::CachesRemoved { .. } => "caches_removed",
        CacheEvent::CachesRestored { .. } => "caches_restored",
        CacheEvent::BulkSyncCompleted { .. } => "bulk_sync_completed",
        CacheEvent::TablesSynced { .. } => "tables_synced",
        CacheEvent::BackupCreated { .. } => "backup_created",
    }
}

/// Stream every [`CacheEvent`] published after subscription
pub fn create_sse_stream(event_bus: EventBus) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(event_bus.subscribe());

    // Lagged receivers skip missed events
    let sse_stream = stream.filter_map(|result: Result<CacheEvent, _>| {
        result.ok().map(|event| {
            let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
            Ok(Event::default().event(event_name(&event)).data(data))
        })
    });

    Sse::new(sse_stream).keep_alive(KeepAlive::default())
}
