//! Configuration management
//!
//! This module handles loading, validation, and management of the sync
//! configuration. Configuration is stored in TOML format at
//! ~/.council-sync/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, data directory
//! - **store**: Database path and per-call operation ceilings
//! - **source**: Where fetched documents live and how they are named
//! - **entities**: Kind names used in store keys
//! - **sync**: Batch size, key date format, appointment retention
//!
//! The struct is built once at startup and handed to the engine; nothing
//! reads configuration from global state.
//!
//! # Examples
//!
//! ```no_run
//! use council_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Store: {:?}", config.store.path);
//! # Ok(())
//! # }
//! ```

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Duration, Utc};
use sdk::errors::SyncError;
use sdk::key::is_valid_kind;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core settings
    pub core: CoreConfig,

    /// Document store settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Fetched document source
    #[serde(default)]
    pub source: SourceConfig,

    /// Entity kind names
    #[serde(default)]
    pub entities: EntityKinds,

    /// Reconciliation settings
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Document store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database path; defaults to `<data_dir>/council.db`
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Maximum mutations buffered in one transaction
    #[serde(default = "default_max_ops")]
    pub max_transaction_ops: usize,

    /// Maximum items in one non-transactional multi-put or multi-delete
    #[serde(default = "default_max_ops")]
    pub max_batch_ops: usize,

    /// Seconds to wait on a locked database before failing
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_secs: u64,
}

/// Fetched document source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Root directory of fetched documents (supports ~ expansion)
    #[serde(default = "default_source_root")]
    pub root: PathBuf,

    /// Folder prefix of meeting documents
    #[serde(default = "default_meetings_folder")]
    pub meetings_folder: String,

    /// Folder prefix of proposal documents
    #[serde(default = "default_proposals_folder")]
    pub proposals_folder: String,

    /// Folder prefix of agenda item documents
    #[serde(default = "default_agenda_items_folder")]
    pub agenda_items_folder: String,

    /// Document listing all scheduled meetings
    #[serde(default = "default_appointments_document")]
    pub appointments_document: String,
}

/// Entity kind names used in store keys
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntityKinds {
    #[serde(default = "default_meeting_kind")]
    pub meeting: String,

    #[serde(default = "default_agenda_item_kind")]
    pub agenda_item: String,

    #[serde(default = "default_proposal_kind")]
    pub proposal: String,

    #[serde(default = "default_attachment_kind")]
    pub attachment: String,

    #[serde(default = "default_appointment_kind")]
    pub appointment: String,
}

/// Reconciliation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Items per store call when syncing flat collections
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// chrono format of the timestamp part of appointment keys
    #[serde(default = "default_key_date_format")]
    pub key_date_format: String,

    /// Appointments older than this many days are left alone
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

/// Upper bound for `sync.retention_days`
pub const MAX_RETENTION_DAYS: u32 = 36_500;

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_transaction_ops: default_max_ops(),
            max_batch_ops: default_max_ops(),
            busy_timeout_secs: default_busy_timeout(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            root: default_source_root(),
            meetings_folder: default_meetings_folder(),
            proposals_folder: default_proposals_folder(),
            agenda_items_folder: default_agenda_items_folder(),
            appointments_document: default_appointments_document(),
        }
    }
}

impl Default for EntityKinds {
    fn default() -> Self {
        Self {
            meeting: default_meeting_kind(),
            agenda_item: default_agenda_item_kind(),
            proposal: default_proposal_kind(),
            attachment: default_attachment_kind(),
            appointment: default_appointment_kind(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            key_date_format: default_key_date_format(),
            retention_days: default_retention_days(),
        }
    }
}

impl SyncConfig {
    /// Default appointment cutoff: `now` minus the retention window
    pub fn retention_cutoff(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, SyncError> {
        Duration::try_days(i64::from(self.retention_days))
            .and_then(|window| now.checked_sub_signed(window))
            .ok_or_else(|| {
                SyncError::Config(format!(
                    "sync.retention_days {} is out of range",
                    self.retention_days
                ))
            })
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.council-sync")
}

fn default_max_ops() -> usize {
    500
}

fn default_busy_timeout() -> u64 {
    5
}

fn default_source_root() -> PathBuf {
    PathBuf::from("~/.council-sync/fetched")
}

fn default_meetings_folder() -> String {
    "sitzungen/".to_string()
}

fn default_proposals_folder() -> String {
    "vorlagen/".to_string()
}

fn default_agenda_items_folder() -> String {
    "tops/".to_string()
}

fn default_appointments_document() -> String {
    "alle-sitzungen.json".to_string()
}

fn default_meeting_kind() -> String {
    "Meeting".to_string()
}

fn default_agenda_item_kind() -> String {
    "AgendaItem".to_string()
}

fn default_proposal_kind() -> String {
    "Proposal".to_string()
}

fn default_attachment_kind() -> String {
    "Attachment".to_string()
}

fn default_appointment_kind() -> String {
    "Appointment".to_string()
}

fn default_batch_size() -> usize {
    500
}

fn default_key_date_format() -> String {
    "%Y-%m-%d-%H-%M".to_string()
}

fn default_retention_days() -> u32 {
    30
}

impl EntityKinds {
    fn all(&self) -> [&str; 5] {
        [
            &self.meeting,
            &self.agenda_item,
            &self.proposal,
            &self.attachment,
            &self.appointment,
        ]
    }
}

impl Config {
    /// Load configuration from the default location (~/.council-sync/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, SyncError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, SyncError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, SyncError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| SyncError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, SyncError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                SyncError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        // Serialize before processing so the file keeps the portable ~ paths
        let default = Self::default_config();
        let toml_string = toml::to_string_pretty(&default)
            .map_err(|e| SyncError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| SyncError::Config(format!("Failed to write config file: {}", e)))?;

        let mut config = default;
        config.validate_and_process()?;
        Ok(config)
    }

    /// Get the default configuration file path (~/.council-sync/config.toml)
    fn default_config_path() -> Result<PathBuf, SyncError> {
        let home = dirs::home_dir()
            .ok_or_else(|| SyncError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".council-sync").join("config.toml"))
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            core: CoreConfig {
                log_level: default_log_level(),
                data_dir: default_data_dir(),
            },
            store: StoreConfig::default(),
            source: SourceConfig::default(),
            entities: EntityKinds::default(),
            sync: SyncConfig::default(),
        }
    }

    /// Database path, falling back to `<data_dir>/council.db`
    pub fn database_path(&self) -> PathBuf {
        self.store
            .path
            .clone()
            .unwrap_or_else(|| self.core.data_dir.join("council.db"))
    }

    /// Validate and process configuration
    ///
    /// This method validates limits and kind names and expands ~ in paths.
    /// It does not touch the filesystem; directories are created by the
    /// components that write to them.
    fn validate_and_process(&mut self) -> Result<(), SyncError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(SyncError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if self.store.max_transaction_ops == 0 || self.store.max_batch_ops == 0 {
            return Err(SyncError::Config(
                "store operation limits must be greater than zero".to_string(),
            ));
        }

        if self.sync.batch_size == 0 || self.sync.batch_size > self.store.max_batch_ops {
            return Err(SyncError::Config(format!(
                "sync.batch_size must be between 1 and store.max_batch_ops ({})",
                self.store.max_batch_ops
            )));
        }

        if self.sync.key_date_format.trim().is_empty() {
            return Err(SyncError::Config(
                "sync.key_date_format must not be empty".to_string(),
            ));
        }

        if StrftimeItems::new(&self.sync.key_date_format).any(|item| matches!(item, Item::Error)) {
            return Err(SyncError::Config(format!(
                "sync.key_date_format '{}' is not a valid strftime format",
                self.sync.key_date_format
            )));
        }

        if self.sync.retention_days > MAX_RETENTION_DAYS {
            return Err(SyncError::Config(format!(
                "sync.retention_days must be at most {}",
                MAX_RETENTION_DAYS
            )));
        }

        let mut seen = HashSet::new();
        for kind in self.entities.all() {
            if !is_valid_kind(kind) {
                return Err(SyncError::Config(format!(
                    "Invalid entity kind '{}'. Use letters, digits and underscores",
                    kind
                )));
            }
            if !seen.insert(kind) {
                return Err(SyncError::Config(format!(
                    "Entity kind '{}' is used twice",
                    kind
                )));
            }
        }

        self.core.data_dir = expand_path(&self.core.data_dir)?;
        self.source.root = expand_path(&self.source.root)?;
        if let Some(path) = &self.store.path {
            self.store.path = Some(expand_path(path)?);
        }

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, SyncError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| SyncError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| SyncError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| SyncError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}
