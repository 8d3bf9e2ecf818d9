//! On-disk table snapshots

use crate::cache::{CACHE_EXTENSION, TABLE_CACHE_PREFIX};
use crate::models::SyncStatus;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Last fetched content of one external table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSnapshot {
    pub table_id: String,
    pub status: SyncStatus,
    #[serde(default)]
    pub cells: Vec<String>,
}

/// `<dir>/__external-table--<tableId>.json`, `None` for ids that are not a
/// plain file name
pub fn table_cache_path(dir: &Path, table_id: &str) -> Option<PathBuf> {
    let valid = !table_id.is_empty()
        && table_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !table_id.starts_with('.');

    valid.then(|| {
        dir.join(format!(
            "{}--{}.{}",
            TABLE_CACHE_PREFIX, table_id, CACHE_EXTENSION
        ))
    })
}
