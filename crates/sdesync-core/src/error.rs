//! Error types for sdesync-core
//!
//! Engine-wide failures are `SdeError`s. Per-fact and per-document problems are
//! collected into a [`SyncReport`] so a run with some failed facts still succeeds.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Core error type for sdesync operations
#[derive(Error, Debug)]
pub enum SdeError {
    // ===================
    // IO Errors
    // ===================
    #[error("Failed to read file: {path}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file: {path}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid path: {path} - {reason}")]
    InvalidPath { path: PathBuf, reason: String },

    // ===================
    // Structural Errors
    // ===================
    #[error("Failed to parse JSON in {path}: {message}")]
    JsonParse {
        path: PathBuf,
        message: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize cache {path}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    // ===================
    // Project / Config Errors
    // ===================
    #[error("Project not found: {project_id}")]
    ProjectNotFound { project_id: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Unknown status code {code:?}; expected one of {expected}")]
    UnknownStatus { code: String, expected: String },

    #[error("Fact {fact_id} not found in cache {path}")]
    FactNotFound { fact_id: String, path: PathBuf },

    // ===================
    // Upstream Errors
    // ===================
    #[error("Remote service error during {operation}: {message}")]
    Upstream { operation: String, message: String },

    #[error("Operation timed out after {timeout_secs}s: {operation}")]
    Timeout {
        operation: String,
        timeout_secs: u64,
    },

    #[error("Operation cancelled: {operation}")]
    Cancelled { operation: String },

    // ===================
    // Lock Errors
    // ===================
    #[error("Cache is busy for project {project_id}: {reason}")]
    CacheBusy { project_id: String, reason: String },

    #[error("No backup found for project {project_id}; back up caches before removing or restoring them")]
    BackupRequired { project_id: String },
}

impl SdeError {
    /// Lock conflicts and timeouts can succeed when retried later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SdeError::CacheBusy { .. } | SdeError::Timeout { .. }
        )
    }

    /// Map a tokio read error onto `FileNotFound` / `FileRead`
    pub(crate) fn from_read(path: &std::path::Path, e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            SdeError::FileNotFound {
                path: path.to_path_buf(),
            }
        } else {
            SdeError::FileRead {
                path: path.to_path_buf(),
                source: e,
            }
        }
    }
}

pub type Result<T, E = SdeError> = std::result::Result<T, E>;

/// Severity level for report entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Something was applied
    Success,
    /// Non-critical, value kept as-is
    Warning,
    /// Item failed, prior value retained
    Error,
    /// Cannot continue
    Fatal,
}

/// Individual entry in a sync report
#[derive(Debug, Clone, Serialize)]
pub struct ReportEntry {
    /// Fact id, table id or document reference the entry is about
    pub subject: String,
    pub message: String,
    pub severity: Severity,
    /// Documents affected by this entry
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub documents: Vec<String>,
    /// Actionable suggestion for the operator (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl ReportEntry {
    fn new(subject: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            subject: subject.into(),
            message: message.into(),
            severity,
            documents: Vec::new(),
            suggestion: None,
        }
    }

    pub fn success(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(subject, message, Severity::Success)
    }

    pub fn warning(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(subject, message, Severity::Warning)
    }

    pub fn error(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(subject, message, Severity::Error)
    }

    pub fn fatal(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(subject, message, Severity::Fatal)
    }

    /// Attach the documents this entry applies to
    pub fn with_documents<I, S>(mut self, documents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.documents = documents.into_iter().map(Into::into).collect();
        self
    }

    /// Add an actionable suggestion to this entry
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Create an operator-friendly entry from an SdeError
    pub fn from_error(subject: impl Into<String>, error: &SdeError) -> Self {
        let subject = subject.into();
        let (message, suggestion) = match error {
            SdeError::FileRead { path, .. } => (
                format!("Cannot read file: {}", path.display()),
                Some(format!("Check permissions: chmod +r {}", path.display())),
            ),
            SdeError::FileWrite { path, .. } => (
                format!("Cannot write file: {}", path.display()),
                Some(format!("Check permissions: chmod +w {}", path.display())),
            ),
            SdeError::JsonParse { path, message, .. } => (
                format!("Invalid JSON in {}: {}", path.display(), message),
                Some("Validate JSON syntax with: jq . <file>".to_string()),
            ),
            _ => (error.to_string(), None),
        };

        Self {
            subject,
            message,
            severity: Severity::Error,
            documents: Vec::new(),
            suggestion,
        }
    }
}

/// Aggregate outcome of a sync run (bulk, single document or tables)
///
/// Partial success is success: callers get the report back even when some
/// entries are errors. Not persisted beyond the run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct SyncReport {
    pub entries: Vec<ReportEntry>,
    pub documents_scanned: usize,
    pub documents_written: usize,
    pub documents_unchanged: usize,
    pub documents_failed: usize,
    pub facts_requested: usize,
    pub facts_updated: usize,
    pub facts_unchanged: usize,
    pub facts_unmanaged: usize,
    pub facts_not_found: usize,
    pub facts_failed: usize,
    pub cancelled: bool,
}

impl SyncReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, entry: ReportEntry) {
        self.entries.push(entry);
    }

    pub fn add_success(&mut self, subject: impl Into<String>, message: impl Into<String>) {
        self.entries.push(ReportEntry::success(subject, message));
    }

    pub fn add_warning(&mut self, subject: impl Into<String>, message: impl Into<String>) {
        self.entries.push(ReportEntry::warning(subject, message));
    }

    pub fn add_fatal(&mut self, subject: impl Into<String>, message: impl Into<String>) {
        self.entries.push(ReportEntry::fatal(subject, message));
    }

    fn by_severity(&self, severity: Severity) -> impl Iterator<Item = &ReportEntry> {
        self.entries.iter().filter(move |e| e.severity == severity)
    }

    pub fn successes(&self) -> impl Iterator<Item = &ReportEntry> {
        self.by_severity(Severity::Success)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ReportEntry> {
        self.by_severity(Severity::Warning)
    }

    pub fn errors(&self) -> impl Iterator<Item = &ReportEntry> {
        self.by_severity(Severity::Error)
    }

    pub fn has_fatal_errors(&self) -> bool {
        self.by_severity(Severity::Fatal).next().is_some()
    }

    /// True if any warning, error or fatal entry exists
    pub fn has_problems(&self) -> bool {
        self.entries.iter().any(|e| e.severity != Severity::Success)
    }

    /// Returns (warnings, errors, fatal)
    pub fn problem_count(&self) -> (usize, usize, usize) {
        (
            self.warnings().count(),
            self.errors().count(),
            self.by_severity(Severity::Fatal).count(),
        )
    }

    /// Merge another report into this one
    pub fn merge(&mut self, other: SyncReport) {
        self.entries.extend(other.entries);
        self.documents_scanned += other.documents_scanned;
        self.documents_written += other.documents_written;
        self.documents_unchanged += other.documents_unchanged;
        self.documents_failed += other.documents_failed;
        self.facts_requested += other.facts_requested;
        self.facts_updated += other.facts_updated;
        self.facts_unchanged += other.facts_unchanged;
        self.facts_unmanaged += other.facts_unmanaged;
        self.facts_not_found += other.facts_not_found;
        self.facts_failed += other.facts_failed;
        self.cancelled = self.cancelled || other.cancelled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_severity_counting() {
        let mut report = SyncReport::new();
        report.add_success("a", "updated");
        report.add_warning("b", "no data source");
        report.add(ReportEntry::error("c", "500-timeout").with_documents(["doc1", "doc2"]));
        report.add_fatal("project", "missing config");

        assert_eq!(report.problem_count(), (1, 1, 1));
        assert_eq!(report.successes().count(), 1);
        assert!(report.has_fatal_errors());
        assert_eq!(report.errors().next().unwrap().documents, vec!["doc1", "doc2"]);
    }

    #[test]
    fn test_report_merge() {
        let mut first = SyncReport::new();
        first.documents_scanned = 2;
        first.facts_updated = 3;

        let mut second = SyncReport::new();
        second.documents_scanned = 1;
        second.cancelled = true;
        second.add_warning("x", "skipped");

        first.merge(second);

        assert_eq!(first.documents_scanned, 3);
        assert_eq!(first.facts_updated, 3);
        assert!(first.cancelled);
        assert_eq!(first.entries.len(), 1);
    }

    #[test]
    fn test_retryable_errors() {
        let busy = SdeError::CacheBusy {
            project_id: "p".into(),
            reason: "bulk sync".into(),
        };
        let missing = SdeError::ProjectNotFound {
            project_id: "p".into(),
        };
        assert!(busy.is_retryable());
        assert!(!missing.is_retryable());
    }

    #[test]
    fn test_entry_from_error_has_suggestion() {
        let err = SdeError::FileWrite {
            path: PathBuf::from("/tmp/x.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let entry = ReportEntry::from_error("doc", &err);
        assert_eq!(entry.severity, Severity::Error);
        assert!(entry.suggestion.unwrap().contains("chmod +w"));
    }
}
