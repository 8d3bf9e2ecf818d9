//! External tables
//!
//! Tables are referenced from documents by `tableId` and snapshotted next to
//! the documents that use them. A table whose remote shape no longer matches
//! the document is flagged as drifted instead of being overwritten.

pub mod snapshot;
pub mod sync;

pub use snapshot::{table_cache_path, TableSnapshot};
pub use sync::{inject_tables, TableSync};

use crate::error::{Result, SdeError};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Table content as served remotely, cells in row-major order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTable {
    #[serde(default)]
    pub cells: Vec<String>,
}

/// Remote source of external table contents
#[async_trait]
pub trait TableService: Send + Sync {
    async fn fetch_table(&self, project_id: &str, table_id: &str) -> Result<RemoteTable>;
}

/// In-process table service for tests and local runs
#[derive(Debug, Default)]
pub struct InMemoryTableService {
    tables: RwLock<HashMap<String, Vec<String>>>,
}

impl InMemoryTableService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_table<I, S>(&self, table_id: &str, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tables
            .write()
            .insert(table_id.to_string(), cells.into_iter().map(Into::into).collect());
    }
}

#[async_trait]
impl TableService for InMemoryTableService {
    async fn fetch_table(&self, _project_id: &str, table_id: &str) -> Result<RemoteTable> {
        let cells = self.tables.read().get(table_id).cloned();
        cells
            .map(|cells| RemoteTable { cells })
            .ok_or_else(|| SdeError::Upstream {
                operation: "table fetch".to_string(),
                message: format!("unknown table {}", table_id),
            })
    }
}
