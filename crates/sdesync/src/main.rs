//! sdesync - structured data element cache sync

mod cli;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sdesync_core::parsers::load_document;
use sdesync_core::{
    CancellationFlag, LanguageScope, ReconcileOptions, SdeService, SyncConfig, SyncStatus,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "sdesync",
    version,
    about = "Keep structured data element caches in sync with a remote value service",
    long_about = "Maintains one cache file next to every document that consumes facts,\n\
                  injects cached values on read and refreshes them from the value service.\n\
                  \n\
                  Examples:\n\
                    sdesync sync ar2025                      # Bulk sync every document\n\
                    sdesync render ar2025 chapters/intro.json --lang en\n\
                    sdesync backup ar2025                    # Snapshot caches before a change\n\
                    sdesync diff ar2025                      # Compare live caches to the snapshot\n\
                    sdesync serve --port 8080                # Operator HTTP endpoints\n\
                  \n\
                  Environment Variables:\n\
                    SDESYNC_ROOT                             # Workspace holding the projects\n\
                    SDESYNC_SERVICE_URL                      # Base URL of the value service\n\
                    SDESYNC_TIMEOUT_SECS                     # Remote lookup timeout\n\
                    RUST_LOG                                 # Log filter (default: info)"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Workspace directory holding one sub-directory per project
    #[arg(long, env = "SDESYNC_ROOT", default_value = ".")]
    root: PathBuf,

    /// Base URL of the remote value service
    #[arg(long, env = "SDESYNC_SERVICE_URL")]
    service_url: Option<String>,

    /// Timeout for one remote round trip, in seconds
    #[arg(long, env = "SDESYNC_TIMEOUT_SECS", default_value_t = 30)]
    timeout_secs: u64,

    /// Backup holding area (default: ~/.cache/sdesync/backup)
    #[arg(long, env = "SDESYNC_BACKUP_DIR")]
    backup_dir: Option<PathBuf>,

    /// Do not create a missing cache when rendering
    #[arg(long)]
    no_auto_create: bool,

    /// Disable ANSI colors (log-friendly)
    #[arg(long, env = "SDESYNC_NO_COLOR")]
    no_color: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Bulk sync every document of a project
    Sync {
        project: String,
        #[arg(long)]
        json: bool,
    },
    /// Sync a single document
    SyncDoc {
        project: String,
        /// Project-relative document path
        document: String,
        #[arg(long)]
        json: bool,
    },
    /// Print a document with cached values injected
    Render {
        project: String,
        document: String,
        /// Language code or "all"
        #[arg(long, default_value = "all")]
        lang: String,
    },
    /// Reconcile the cache after a document was saved in one language
    Save {
        project: String,
        document: String,
        #[arg(long)]
        lang: String,
        /// Discard the existing cache and rebuild it
        #[arg(long)]
        rebuild: bool,
        /// Drop entries no longer referenced by the document
        #[arg(long)]
        prune: bool,
    },
    /// Set the sync status of one fact in one document cache
    SetStatus {
        project: String,
        document: String,
        fact_id: String,
        /// Status code, e.g. 200-ok, 201-nodatasource or 500-<reason>
        status: SyncStatus,
    },
    /// Copy caches to the backup holding area
    Backup {
        project: String,
        /// Limit to these documents (default: all)
        #[arg(long, value_delimiter = ',')]
        documents: Option<Vec<String>>,
        #[arg(long)]
        json: bool,
    },
    /// Show fact-level changes since the last backup
    Diff {
        project: String,
        #[arg(long)]
        json: bool,
    },
    /// Back up, then delete caches
    Clear {
        project: String,
        #[arg(long, value_delimiter = ',')]
        documents: Option<Vec<String>>,
    },
    /// Restore caches from the last backup
    Restore { project: String },
    /// Refresh external table snapshots
    Tables {
        project: String,
        #[arg(long)]
        json: bool,
    },
    /// List documents that consume facts
    Documents { project: String },
    /// Run the operator HTTP endpoints
    Serve {
        #[arg(long, default_value = "3333")]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_ansi(!cli.no_color)
        .init();

    let service = Arc::new(build_service(&cli)?);
    let no_color = cli.no_color;

    match cli.command {
        Command::Sync { project, json } => run_sync(&service, &project, json, no_color).await?,
        Command::SyncDoc {
            project,
            document,
            json,
        } => {
            let report = service
                .sync_document(&project, &document)
                .await
                .with_context(|| format!("Failed to sync {}", document))?;
            println!("{}", cli::format_sync_report(&report, json, no_color));
        }
        Command::Render {
            project,
            document,
            lang,
        } => run_render(&service, &project, &document, &lang).await?,
        Command::Save {
            project,
            document,
            lang,
            rebuild,
            prune,
        } => {
            run_save(
                &service,
                &project,
                &document,
                &lang,
                ReconcileOptions {
                    rebuild_from_scratch: rebuild,
                    prune_unreferenced: prune,
                },
            )
            .await?
        }
        Command::SetStatus {
            project,
            document,
            fact_id,
            status,
        } => {
            let updated = service
                .update_fact_status(&project, &document, &fact_id, status)
                .await?;
            println!("Updated {} entr{}", updated, if updated == 1 { "y" } else { "ies" });
        }
        Command::Backup {
            project,
            documents,
            json,
        } => {
            let manifest = service.backup(&project, documents.as_deref()).await?;
            println!("{}", cli::format_manifest(&manifest, json));
        }
        Command::Diff { project, json } => {
            let report = service
                .diff(&project)
                .await
                .with_context(|| format!("Failed to diff caches of {}", project))?;
            println!("{}", cli::format_diff_report(&report, json, no_color));
        }
        Command::Clear { project, documents } => {
            let report = service.remove_caches(&project, documents.as_deref()).await?;
            for cache in &report.removed {
                println!("removed {}", cache);
            }
            eprintln!(
                "{} caches removed (backup from {})",
                report.removed.len(),
                report.backup_created_at.format("%Y-%m-%d %H:%M:%S")
            );
        }
        Command::Restore { project } => {
            let restored = service.restore_backup(&project).await?;
            for cache in &restored {
                println!("restored {}", cache);
            }
        }
        Command::Tables { project, json } => {
            let report = service
                .sync_tables(&project, &CancellationFlag::new())
                .await?;
            println!("{}", cli::format_sync_report(&report, json, no_color));
        }
        Command::Documents { project } => {
            let documents = service.list_documents(&project)?;
            println!("{}", cli::format_documents(&documents));
        }
        Command::Serve { port } => {
            sdesync_web::run(service, port).await?;
        }
    }

    Ok(())
}

fn build_service(cli: &Cli) -> Result<SdeService> {
    let root = cli
        .root
        .canonicalize()
        .with_context(|| format!("Workspace not found: {}", cli.root.display()))?;

    let mut config = SyncConfig::new(root)
        .with_lookup_timeout(Duration::from_secs(cli.timeout_secs))
        .with_auto_create_cache(!cli.no_auto_create);
    if let Some(dir) = &cli.backup_dir {
        config = config.with_backup_dir(dir);
    }
    if let Some(url) = &cli.service_url {
        config = config.with_service_url(url);
    }

    tracing::debug!(
        root = %config.workspace_root.display(),
        remote = config.service_url.is_some(),
        "Workspace resolved"
    );
    Ok(SdeService::from_config(config))
}

async fn run_sync(service: &SdeService, project: &str, json: bool, no_color: bool) -> Result<()> {
    let cancel = CancellationFlag::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, finishing the current document...");
            on_interrupt.cancel();
        }
    });

    if !json {
        eprint!("Syncing {}... ", project);
    }
    let report = service
        .bulk_sync(project, &cancel)
        .await
        .with_context(|| format!("Bulk sync of {} failed", project))?;
    if !json {
        eprintln!("done");
    }

    println!("{}", cli::format_sync_report(&report, json, no_color));
    Ok(())
}

async fn run_render(service: &SdeService, project: &str, document: &str, lang: &str) -> Result<()> {
    let rendered = service
        .render_document(project, document, &LanguageScope::parse(lang))
        .await?;

    let outcome = &rendered.outcome;
    eprintln!(
        "{} values injected, {} stamped, {} hidden, {} tables drifted",
        outcome.nodes_injected, outcome.nodes_stamped, outcome.nodes_hidden, rendered.tables_drifted
    );
    if outcome.missing_elements > 0 {
        eprintln!("{} nodes reference facts missing from the cache", outcome.missing_elements);
    }

    println!("{}", serde_json::to_string_pretty(&rendered.document)?);
    Ok(())
}

async fn run_save(
    service: &SdeService,
    project: &str,
    document: &str,
    lang: &str,
    options: ReconcileOptions,
) -> Result<()> {
    let path = service.open_project(project)?.resolve(document)?;
    let content = load_document(&path)?;

    let outcome = service
        .save_document(project, document, &content, lang, options)
        .await
        .with_context(|| format!("Failed to reconcile cache for {}", document))?;

    if outcome.written {
        println!(
            "cache written: {} added, {} updated, {} pruned",
            outcome.added, outcome.updated, outcome.pruned
        );
    } else {
        println!("cache unchanged");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("sdesync").chain(args.iter().copied()))
    }

    #[test]
    fn test_set_status_accepts_known_codes() {
        let cli = parse(&["set-status", "ar2025", "intro.json", "rev", "500-timeout"]).unwrap();
        match cli.command {
            Command::SetStatus { status, .. } => {
                assert_eq!(status, SyncStatus::UpstreamError("timeout".into()))
            }
            _ => panic!("expected set-status"),
        }
    }

    #[test]
    fn test_set_status_rejects_typos() {
        let err = parse(&["set-status", "ar2025", "intro.json", "rev", "200-okk"])
            .err()
            .unwrap();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        assert!(err.to_string().contains("200-okk"));
    }
}
