//! CLI interface for council-sync
//!
//! This module provides the command-line interface using clap's derive API.
//! Each invocation runs exactly one sync cycle against the configured store.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Council records sync
///
/// Keeps the document store in line with freshly fetched council pages
/// while preserving fields the pages do not repeat.
#[derive(Parser, Debug)]
#[command(name = "council-sync")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sync or delete a meeting document
    Meeting {
        #[command(subcommand)]
        action: DocumentAction,
    },

    /// Sync or delete a proposal document
    Proposal {
        #[command(subcommand)]
        action: DocumentAction,
    },

    /// Sync or delete an agenda item document
    AgendaItem {
        #[command(subcommand)]
        action: DocumentAction,
    },

    /// Replace stored appointments with the fetched calendar
    Appointments {
        /// Only keep appointments after this date (default: now minus retention)
        #[arg(long, value_name = "DATE", value_parser = parse_since)]
        since: Option<DateTime<Utc>>,
    },

    /// Show stored entity counts
    Status,
}

/// Cycle to run for one document
#[derive(Subcommand, Debug, Clone)]
pub enum DocumentAction {
    /// Reconcile the store with the document
    Update {
        /// Document path relative to the source root
        path: String,
    },

    /// Remove the document's record and everything below it
    Delete {
        /// Document path relative to the source root
        path: String,
    },
}

/// Accept `YYYY-MM-DD` (midnight UTC) or a full RFC 3339 timestamp
pub fn parse_since(value: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|dt| Utc.from_utc_datetime(&dt))
            .ok_or_else(|| format!("invalid date '{}'", value));
    }

    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid date '{}': {}", value, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_document_command() {
        let cli = Cli::try_parse_from([
            "council-sync",
            "--json",
            "agenda-item",
            "update",
            "tops/sitzung-1-top-2.html",
        ])
        .unwrap();

        assert!(cli.json);
        match cli.command {
            Command::AgendaItem {
                action: DocumentAction::Update { path },
            } => assert_eq!(path, "tops/sitzung-1-top-2.html"),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_since() {
        assert_eq!(
            parse_since("2024-03-05").unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_since("2024-03-05T17:00:00+01:00").unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 5, 16, 0, 0).unwrap()
        );
        assert!(parse_since("05.03.2024").is_err());
    }

    #[test]
    fn test_appointments_since_flag() {
        let cli =
            Cli::try_parse_from(["council-sync", "appointments", "--since", "2024-01-01"]).unwrap();

        assert!(matches!(
            cli.command,
            Command::Appointments { since: Some(_) }
        ));
    }
}
