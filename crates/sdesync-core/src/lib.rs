//! sdesync-core - Core library for sdesync
//!
//! Keeps per-document caches of structured data element (fact) values in sync
//! with a remote value service: fact extraction, value injection on read,
//! cache reconciliation on save, bulk sync, backups and external tables.

pub mod backup;
pub mod cache;
pub mod config;
pub mod error;
pub mod event;
pub mod inject;
pub mod lock;
pub mod models;
pub mod parsers;
pub mod reconcile;
pub mod service;
pub mod sync;
pub mod xtable;

pub use backup::{BackupManifest, BackupReporter, ChangeKind, DiffEntry, DiffReport};
pub use config::SyncConfig;
pub use error::{ReportEntry, SdeError, Severity, SyncReport};
pub use event::{CacheEvent, EventBus};
pub use inject::{InjectionOutcome, ValueInjector};
pub use lock::{CacheLocks, CancellationFlag};
pub use models::{Document, LanguageScope, Project, SyncStatus};
pub use reconcile::{ReconcileOptions, ReconcileOutcome};
pub use service::{RemovalReport, RenderedDocument, SdeService};
pub use sync::{BulkSyncEngine, HttpRemote, InMemoryValueService, ValueService};
pub use xtable::{InMemoryTableService, TableService};
