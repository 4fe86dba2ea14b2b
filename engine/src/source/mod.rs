/// Document source
///
/// Raw documents are read through [`DocumentReader`] and turned into
/// record trees by an [`Extractor`]. The shipped reader serves files below
/// a configured root; the shipped extractor reads JSON snapshots of
/// already-extracted records.
use async_trait::async_trait;
use sdk::errors::SyncError;
use sdk::types::Appointment;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use crate::sync::owner::{AgendaItemDoc, MeetingDoc, ProposalDoc};

pub mod json;
pub mod paths;

pub use json::JsonExtractor;
pub use paths::PathParser;

/// Reads raw documents by logical path
#[async_trait]
pub trait DocumentReader: Send + Sync {
    /// Raw bytes of `path`; [`SyncError::NotFound`] when it does not exist
    async fn read_document(&self, path: &str) -> Result<Vec<u8>, SyncError>;
}

/// Turns raw documents into parent records with their children
pub trait Extractor: Send + Sync {
    fn meeting(&self, meeting_id: i64, raw: &[u8]) -> Result<MeetingDoc, SyncError>;

    fn agenda_item(
        &self,
        meeting_id: i64,
        item_id: i64,
        raw: &[u8],
    ) -> Result<AgendaItemDoc, SyncError>;

    fn proposal(&self, proposal_id: i64, raw: &[u8]) -> Result<ProposalDoc, SyncError>;

    fn appointments(&self, raw: &[u8]) -> Result<Vec<Appointment>, SyncError>;
}

/// Reads documents from a directory tree
pub struct FsDocumentReader {
    root: PathBuf,
}

impl FsDocumentReader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve `path` below the root, refusing anything that escapes it
    fn resolve(&self, path: &str) -> Result<PathBuf, SyncError> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));

        if path.is_empty() || escapes {
            return Err(SyncError::Parse(format!("invalid document path '{}'", path)));
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl DocumentReader for FsDocumentReader {
    async fn read_document(&self, path: &str) -> Result<Vec<u8>, SyncError> {
        let full = self.resolve(path)?;
        debug!("Reading document {}", full.display());

        match tokio::fs::read(&full).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SyncError::NotFound(path.to_string()))
            }
            Err(e) => Err(SyncError::Io(e)),
        }
    }
}
