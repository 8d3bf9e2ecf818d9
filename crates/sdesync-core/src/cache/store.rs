//! On-disk JSON persistence for caches and table snapshots
//!
//! Output is deterministic (pretty JSON, trailing newline) and written through a
//! temp file + rename. A save whose bytes match the file on disk is skipped, so
//! an unchanged cache stays byte-identical and keeps its mtime.

use crate::error::{Result, SdeError};
use crate::models::FactCache;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tracing::debug;

/// Load a JSON file, `Ok(None)` if it does not exist
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(SdeError::from_read(path, e)),
    };

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| SdeError::JsonParse {
            path: path.to_path_buf(),
            message: e.to_string(),
            source: e,
        })
}

/// Canonical serialized form
pub fn render_json<T: Serialize>(path: &Path, value: &T) -> Result<String> {
    let mut json = serde_json::to_string_pretty(value).map_err(|e| SdeError::Serialize {
        path: path.to_path_buf(),
        source: e,
    })?;
    json.push('\n');
    Ok(json)
}

/// Write a JSON file if its content changed; returns whether it was written
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<bool> {
    let json = render_json(path, value)?;

    if let Ok(existing) = std::fs::read(path) {
        if existing == json.as_bytes() {
            debug!(path = %path.display(), "Cache unchanged, skipping write");
            return Ok(false);
        }
    }

    let write_err = |e: std::io::Error| SdeError::FileWrite {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(write_err)?;
    }

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json.as_bytes()).map_err(write_err)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(write_err(e));
    }

    debug!(path = %path.display(), bytes = json.len(), "Cache written");
    Ok(true)
}

/// Delete a file if present; returns whether something was removed
pub fn remove_file(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "Cache removed");
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(SdeError::FileWrite {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

pub fn load_cache(path: &Path) -> Result<Option<FactCache>> {
    load_json(path)
}

pub fn save_cache(path: &Path, cache: &FactCache) -> Result<bool> {
    save_json(path, cache)
}
