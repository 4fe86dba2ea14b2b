//! Council Sync SDK
//!
//! Shared record model, store keys and error types.
//! This crate is used by the engine and by anything that reads the store.

/// Error types and handling
pub mod errors;

/// Hierarchical store keys
pub mod key;

/// Council record types
pub mod types;

// Re-export commonly used types
pub use errors::{KeyError, StoreContext, StoreError, StoreResult, SyncError, SyncErrorExt};
pub use key::{sanitize_name, Key};
pub use types::{
    AgendaItem, Appointment, Attachment, AttachmentKind, Meeting, Proposal, VoteTally,
};
