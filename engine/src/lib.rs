//! Council Sync Engine Library
//!
//! This library keeps a document store synchronized with freshly fetched
//! council records. It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Document store module
pub mod db;

/// Store key resolution
pub mod resolver;

/// Child-set reconciliation
pub mod reconcile;

/// Chunked sync of flat collections
pub mod batch;

/// Document reading and extraction
pub mod source;

/// Sync cycles per parent document
pub mod sync;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
