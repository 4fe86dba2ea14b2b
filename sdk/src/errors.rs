//! Error types and handling
//!
//! This module provides the error types used throughout the sync engine.
//! All cycle errors implement the `SyncErrorExt` trait which provides a
//! user-facing hint and tells the caller whether re-driving the cycle can
//! succeed without operator intervention.
//!
//! # Error Categories
//!
//! - **NotFound**: the source document is missing
//! - **Parse**: the document or its path has an unexpected structure
//! - **Store**: a query, write or commit against the document store failed
//! - **DataAnomaly**: the extraction result is implausible (e.g. empty)
//! - **Config**: invalid or unreadable configuration

use thiserror::Error;

/// Result type for document store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Trait for sync error extensions
pub trait SyncErrorExt {
    /// Returns a user-friendly hint for the error
    fn user_hint(&self) -> &str;

    /// Returns whether the next scheduled cycle may succeed on its own
    ///
    /// The core never retries; this only informs the scheduler or CLI.
    fn is_recoverable(&self) -> bool;
}

/// Errors raised while building or decoding store keys
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("Empty encoded key")]
    Empty,

    #[error("Malformed key segment '{0}'")]
    MalformedSegment(String),

    #[error("Invalid entity kind '{0}'")]
    InvalidKind(String),
}

/// Errors raised by a document store implementation
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Transaction limit exceeded: {attempted} operations > {limit}")]
    TransactionLimit { attempted: usize, limit: usize },

    #[error("Batch limit exceeded: {attempted} items > {limit}")]
    BatchLimit { attempted: usize, limit: usize },

    #[error("Commit failed: {0}")]
    Commit(String),

    #[error("Entity codec error for {key}: {reason}")]
    Codec { key: String, reason: String },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error(transparent)]
    Key(#[from] KeyError),
}

/// Main sync cycle error type
///
/// # Examples
///
/// ```
/// use sdk::errors::{SyncError, SyncErrorExt};
///
/// let error = SyncError::DataAnomaly("empty result set".to_string());
/// assert!(error.to_string().contains("empty result set"));
/// assert!(error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Store error: {context}")]
    Store {
        context: String,
        #[source]
        source: StoreError,
    },

    #[error("Data anomaly: {0}")]
    DataAnomaly(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Wrap a store error with a description of the failed step
    pub fn store(context: impl Into<String>, source: StoreError) -> Self {
        Self::Store {
            context: context.into(),
            source,
        }
    }
}

/// Attach step context to store results, in the manner of `anyhow::Context`
pub trait StoreContext<T> {
    fn context(self, context: impl Into<String>) -> Result<T, SyncError>;

    fn with_context<F, C>(self, f: F) -> Result<T, SyncError>
    where
        F: FnOnce() -> C,
        C: Into<String>;
}

impl<T> StoreContext<T> for StoreResult<T> {
    fn context(self, context: impl Into<String>) -> Result<T, SyncError> {
        self.map_err(|e| SyncError::store(context, e))
    }

    fn with_context<F, C>(self, f: F) -> Result<T, SyncError>
    where
        F: FnOnce() -> C,
        C: Into<String>,
    {
        self.map_err(|e| SyncError::store(f(), e))
    }
}

impl SyncErrorExt for SyncError {
    fn user_hint(&self) -> &str {
        match self {
            Self::NotFound(_) => "The source document is missing. Check the fetch step",
            Self::Parse(_) => "The document structure is unexpected. Check the extractor",
            Self::Store { source, .. } => match source {
                StoreError::TransactionLimit { .. } | StoreError::BatchLimit { .. } => {
                    "Too many operations for one store call. Lower sync.batch_size"
                }
                StoreError::Codec { .. } => "A stored record could not be decoded",
                _ => "Document store operation failed. The next cycle will retry",
            },
            Self::DataAnomaly(_) => "The extraction returned implausible data",
            Self::Config(_) => "Check your config.toml file for errors",
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::Config(_) | Self::Parse(_) => false,
            Self::Store { source, .. } => !matches!(
                source,
                StoreError::TransactionLimit { .. }
                    | StoreError::BatchLimit { .. }
                    | StoreError::Codec { .. }
                    | StoreError::InvalidQuery(_)
                    | StoreError::Key(_)
            ),
            _ => true,
        }
    }
}
