//! Content document loading

use crate::error::{Result, SdeError};
use crate::models::Document;
use std::path::Path;
use tracing::debug;

/// Parse a content or footnote document from disk
pub fn load_document(path: &Path) -> Result<Document> {
    let content = std::fs::read_to_string(path).map_err(|e| SdeError::from_read(path, e))?;

    let document = parse_document(path, &content)?;
    debug!(path = %path.display(), "Document loaded");
    Ok(document)
}

/// Parse document JSON already in memory (`path` is only used for errors)
pub fn parse_document(path: &Path, content: &str) -> Result<Document> {
    serde_json::from_str(content).map_err(|e| SdeError::JsonParse {
        path: path.to_path_buf(),
        message: e.to_string(),
        source: e,
    })
}
