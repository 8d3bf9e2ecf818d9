//! Output formatting for CLI commands
//!
//! Every formatter returns a string so the caller decides where it goes.

use comfy_table::{Cell, Color, ContentArrangement, Row, Table};
use sdesync_core::{BackupManifest, DiffReport, ReportEntry, Severity, SyncReport};

// ============================================================================
// Sync reports
// ============================================================================

/// Render a sync report as a counter summary plus a table of problems
pub fn format_sync_report(report: &SyncReport, json: bool, no_color: bool) -> String {
    if json {
        return serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string());
    }

    let mut out = format!(
        "documents: {} scanned, {} written, {} unchanged, {} failed\n\
         facts:     {} requested, {} updated, {} unchanged, {} unmanaged, {} not found, {} failed",
        report.documents_scanned,
        report.documents_written,
        report.documents_unchanged,
        report.documents_failed,
        report.facts_requested,
        report.facts_updated,
        report.facts_unchanged,
        report.facts_unmanaged,
        report.facts_not_found,
        report.facts_failed,
    );

    if report.cancelled {
        out.push_str("\nrun was cancelled before every document was written");
    }

    let problems: Vec<&ReportEntry> = report
        .entries
        .iter()
        .filter(|e| e.severity != Severity::Success)
        .collect();
    if !problems.is_empty() {
        out.push_str("\n\n");
        out.push_str(&entry_table(&problems, no_color));
    }

    out
}

fn severity_cell(severity: Severity, no_color: bool) -> Cell {
    let (label, color) = match severity {
        Severity::Success => ("ok", Color::Green),
        Severity::Warning => ("warning", Color::Yellow),
        Severity::Error => ("error", Color::Red),
        Severity::Fatal => ("fatal", Color::Magenta),
    };
    if no_color {
        Cell::new(label)
    } else {
        Cell::new(label).fg(color)
    }
}

fn entry_table(entries: &[&ReportEntry], no_color: bool) -> String {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(header(&["Severity", "Subject", "Message", "Documents"], no_color));

    for entry in entries {
        let mut message = entry.message.clone();
        if let Some(suggestion) = &entry.suggestion {
            message.push_str(&format!("\n→ {}", suggestion));
        }
        table.add_row(Row::from(vec![
            severity_cell(entry.severity, no_color),
            Cell::new(&entry.subject),
            Cell::new(message),
            Cell::new(entry.documents.join("\n")),
        ]));
    }

    table.to_string()
}

fn header(labels: &[&str], no_color: bool) -> Vec<Cell> {
    labels
        .iter()
        .map(|label| {
            if no_color {
                Cell::new(label)
            } else {
                Cell::new(label).fg(Color::Cyan)
            }
        })
        .collect()
}

// ============================================================================
// Backups
// ============================================================================

pub fn format_manifest(manifest: &BackupManifest, json: bool) -> String {
    if json {
        return serde_json::to_string_pretty(manifest).unwrap_or_else(|_| "{}".to_string());
    }

    let mut out = format!(
        "backup of {} at {}: {} caches",
        manifest.project_id,
        manifest.created_at.format("%Y-%m-%d %H:%M:%S"),
        manifest.caches.len()
    );
    for cache in &manifest.caches {
        out.push_str("\n  ");
        out.push_str(cache);
    }
    out
}

pub fn format_diff_report(report: &DiffReport, json: bool, no_color: bool) -> String {
    if json {
        return serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string());
    }

    let since = report.backup_created_at.format("%Y-%m-%d %H:%M:%S");
    if report.is_empty() {
        return format!(
            "No changes in {} caches since backup of {}",
            report.caches_compared, since
        );
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(header(&["Cache", "Change"], no_color));
    for entry in &report.entries {
        table.add_row(Row::from(vec![
            Cell::new(&entry.cache),
            Cell::new(entry.to_string()),
        ]));
    }

    format!(
        "{}\n{} changes in {} caches since backup of {}",
        table, report.entries.len(), report.caches_compared, since
    )
}

pub fn format_documents(documents: &[String]) -> String {
    if documents.is_empty() {
        return "No documents found.".to_string();
    }
    documents.join("\n")
}
