//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - meeting / proposal / agenda-item: update or delete one document
//! - appointments: replace the stored calendar window
//! - status: entity counts per kind

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;

use crate::batch::FlatSyncReport;
use crate::cli::DocumentAction;
use crate::config::Config;
use crate::db::Database;
use crate::reconcile::ReconcileReport;
use crate::source::{FsDocumentReader, JsonExtractor};
use crate::sync::{DeleteReport, SyncEngine, SyncReport};

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Parent document type addressed by a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Meeting,
    Proposal,
    AgendaItem,
}

async fn open_database(config: &Config) -> Result<Arc<Database>> {
    let db_path = config.database_path();
    let database = Database::new(&db_path, &config.store)
        .await
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
    Ok(Arc::new(database))
}

fn build_engine(config: &Config, database: Arc<Database>) -> SyncEngine {
    SyncEngine::new(
        config,
        database,
        Arc::new(FsDocumentReader::new(config.source.root.clone())),
        Arc::new(JsonExtractor::new()),
    )
}

/// Update or delete one parent document
pub async fn handle_document(
    kind: DocumentKind,
    action: DocumentAction,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let database = open_database(config).await?;
    let engine = build_engine(config, Arc::clone(&database));

    match action {
        DocumentAction::Update { path } => {
            let report = match kind {
                DocumentKind::Meeting => engine.update_meeting(&path).await,
                DocumentKind::Proposal => engine.update_proposal(&path).await,
                DocumentKind::AgendaItem => engine.update_agenda_item(&path).await,
            }
            .with_context(|| format!("Failed to update from {}", path))?;

            print_sync_report(&path, &report, format)?;
        }
        DocumentAction::Delete { path } => {
            let report = match kind {
                DocumentKind::Meeting => engine.delete_meeting(&path).await,
                DocumentKind::Proposal => engine.delete_proposal(&path).await,
                DocumentKind::AgendaItem => engine.delete_agenda_item(&path).await,
            }
            .with_context(|| format!("Failed to delete for {}", path))?;

            print_delete_report(&path, &report, format)?;
        }
    }

    database.flush_wal().await.context("Failed to flush database")?;
    Ok(())
}

/// Replace stored appointments after `since` (default: now minus retention)
pub async fn handle_appointments(
    since: Option<DateTime<Utc>>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let min_date = match since {
        Some(since) => since,
        None => config.sync.retention_cutoff(Utc::now())?,
    };

    let database = open_database(config).await?;
    let engine = build_engine(config, Arc::clone(&database));

    let report = engine
        .update_appointments(min_date)
        .await
        .context("Failed to sync appointments")?;

    print_flat_report(min_date, &report, format)?;

    database.flush_wal().await.context("Failed to flush database")?;
    Ok(())
}

/// Show entity counts per kind
pub async fn handle_status(config: &Config, format: OutputFormat) -> Result<()> {
    let database = open_database(config).await?;
    let counts = database
        .count_by_kind()
        .await
        .context("Failed to count entities")?;

    match format {
        OutputFormat::Text => {
            println!("Store: {}", config.database_path().display());
            if counts.is_empty() {
                println!("No entities stored");
            }
            for (kind, count) in &counts {
                println!("  {:<14} {}", kind, count);
            }
        }
        OutputFormat::Json => {
            let kinds: serde_json::Map<String, serde_json::Value> = counts
                .iter()
                .map(|(kind, count)| (kind.clone(), json!(count)))
                .collect();
            let output = json!({
                "store": config.database_path(),
                "kinds": kinds,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

fn print_children(label: &str, report: &ReconcileReport) {
    println!(
        "  {}: {} inserted, {} updated, {} deleted",
        label, report.inserted, report.updated, report.deleted
    );
    for key in &report.failed_deletes {
        println!("    not deleted: {}", key);
    }
}

fn print_sync_report(path: &str, report: &SyncReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            let verb = if report.created { "Created" } else { "Updated" };
            println!("{} {} from {}", verb, report.parent, path);
            if let Some(items) = &report.agenda_items {
                print_children("agenda items", items);
            }
            print_children("attachments", &report.attachments);
        }
        OutputFormat::Json => {
            let output = json!({
                "path": path,
                "report": report,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

fn print_delete_report(path: &str, report: &DeleteReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!("Deleted {} entities for {}", report.deleted, path);
            if report.detached > 0 {
                println!("  detached {} referrals", report.detached);
            }
            for key in &report.failed_deletes {
                println!("  not deleted: {}", key);
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "path": path,
                "report": report,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

fn print_flat_report(
    min_date: DateTime<Utc>,
    report: &FlatSyncReport,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!("Appointments after {}:", min_date.format("%Y-%m-%d %H:%M"));
            println!(
                "  {} upserted, {} deleted, {} before cutoff, {} duplicates",
                report.upserted, report.deleted, report.expired, report.duplicates
            );
        }
        OutputFormat::Json => {
            let output = json!({
                "since": min_date.to_rfc3339(),
                "report": report,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}
