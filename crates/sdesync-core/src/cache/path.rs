//! Deterministic document → cache path mapping
//!
//! `<dir>/report.json` maps to `<dir>/__structured-data--report.json`.

use std::path::{Path, PathBuf};

/// Prefix of every fact cache file
pub const CACHE_PREFIX: &str = "__structured-data";

/// Prefix of every external table snapshot
pub const TABLE_CACHE_PREFIX: &str = "__external-table";

/// Extension shared by documents and caches
pub const CACHE_EXTENSION: &str = "json";

/// Resolve the cache path for a document
///
/// Returns `None` for unexpected extensions and for cache files themselves;
/// callers treat `None` as "no cache".
pub fn cache_path_for(document: &Path) -> Option<PathBuf> {
    if document.extension()? != CACHE_EXTENSION || is_cache_artifact(document) {
        return None;
    }

    let base = document.file_stem()?.to_str()?;
    if base.is_empty() {
        return None;
    }

    let file_name = format!("{}--{}.{}", CACHE_PREFIX, base, CACHE_EXTENSION);
    Some(match document.parent() {
        Some(dir) => dir.join(file_name),
        None => PathBuf::from(file_name),
    })
}

/// True for files derived by sdesync (fact caches and table snapshots)
pub fn is_cache_artifact(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| {
            n.starts_with(&format!("{}--", CACHE_PREFIX))
                || n.starts_with(&format!("{}--", TABLE_CACHE_PREFIX))
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_path_is_colocated() {
        let path = cache_path_for(Path::new("/p/chapters/annual-report.json")).unwrap();
        assert_eq!(
            path,
            PathBuf::from("/p/chapters/__structured-data--annual-report.json")
        );
    }

    #[test]
    fn test_unexpected_extension_yields_none() {
        assert!(cache_path_for(Path::new("/p/report.xml")).is_none());
        assert!(cache_path_for(Path::new("/p/report")).is_none());
    }

    #[test]
    fn test_cache_of_cache_is_none() {
        let cache = Path::new("/p/__structured-data--report.json");
        assert!(is_cache_artifact(cache));
        assert!(cache_path_for(cache).is_none());
        assert!(is_cache_artifact(Path::new("/p/__external-table--t1.json")));
        assert!(!is_cache_artifact(Path::new("/p/report.json")));
    }
}
