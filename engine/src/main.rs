// Council Sync
// Main entry point for the council-sync binary

use clap::Parser;
use council_engine::cli::{Cli, Command};
use council_engine::config::Config;
use council_engine::handlers::{
    handle_appointments, handle_document, handle_status, DocumentKind, OutputFormat,
};
use council_engine::telemetry::init_telemetry_with_level;
use sdk::errors::{SyncError, SyncErrorExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration (or use custom path if provided)
    let config = match &cli.config {
        Some(config_path) => Config::load_from_path(config_path),
        None => Config::load_or_create(),
    };

    // --log wins over the config file; RUST_LOG wins over both
    let log_level = cli
        .log
        .clone()
        .or_else(|| config.as_ref().ok().map(|c| c.core.log_level.clone()))
        .unwrap_or_else(|| "info".to_string());
    init_telemetry_with_level(&log_level);

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    tracing::debug!("council-sync v{} ({} - {})", version, commit, timestamp);

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, hint = e.user_hint(), "Failed to load configuration");
            return Err(e.into());
        }
    };

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Handle commands
    let result = match cli.command {
        Command::Meeting { action } => {
            handle_document(DocumentKind::Meeting, action, &config, format).await
        }
        Command::Proposal { action } => {
            handle_document(DocumentKind::Proposal, action, &config, format).await
        }
        Command::AgendaItem { action } => {
            handle_document(DocumentKind::AgendaItem, action, &config, format).await
        }
        Command::Appointments { since } => handle_appointments(since, &config, format).await,
        Command::Status => handle_status(&config, format).await,
    };

    if let Err(e) = &result {
        let message = format!("{:#}", e);
        match e.downcast_ref::<SyncError>() {
            Some(sync) => tracing::error!(
                error = %message,
                hint = sync.user_hint(),
                recoverable = sync.is_recoverable(),
                "Sync cycle failed"
            ),
            None => tracing::error!(error = %message, "Sync cycle failed"),
        }
    }

    result
}
