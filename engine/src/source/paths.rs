//! Identifiers from document paths
//!
//! Fetched documents are named after the source's own ids, e.g.
//! `sitzungen/sitzung-4711.html` or `tops/sitzung-4711-top-12.html`. A
//! parent's identity for delete cycles comes from the path alone.

use crate::config::SourceConfig;
use regex::Regex;
use sdk::errors::SyncError;
use std::sync::OnceLock;

static MEETING_NAME: OnceLock<Regex> = OnceLock::new();
static AGENDA_ITEM_NAME: OnceLock<Regex> = OnceLock::new();
static PROPOSAL_NAME: OnceLock<Regex> = OnceLock::new();

fn meeting_name() -> &'static Regex {
    MEETING_NAME.get_or_init(|| Regex::new(r"^sitzung-(\d+)\.\w+$").expect("Invalid meeting pattern"))
}

fn agenda_item_name() -> &'static Regex {
    AGENDA_ITEM_NAME.get_or_init(|| {
        Regex::new(r"^sitzung-(\d+)-top-(\d+)\.\w+$").expect("Invalid agenda item pattern")
    })
}

fn proposal_name() -> &'static Regex {
    PROPOSAL_NAME.get_or_init(|| Regex::new(r"^vorlage-(\d+)\.\w+$").expect("Invalid proposal pattern"))
}

/// Parses ids out of logical document paths
#[derive(Debug, Clone)]
pub struct PathParser {
    meetings_folder: String,
    proposals_folder: String,
    agenda_items_folder: String,
}

impl PathParser {
    pub fn new(source: &SourceConfig) -> Self {
        Self {
            meetings_folder: source.meetings_folder.clone(),
            proposals_folder: source.proposals_folder.clone(),
            agenda_items_folder: source.agenda_items_folder.clone(),
        }
    }

    pub fn meeting_id(&self, path: &str) -> Result<i64, SyncError> {
        let caps = match_name(meeting_name(), strip(path, &self.meetings_folder), path)?;
        parse_id(&caps[1], path)
    }

    /// `(meeting_id, item_id)` of an agenda item document
    pub fn agenda_item_ids(&self, path: &str) -> Result<(i64, i64), SyncError> {
        let caps = match_name(agenda_item_name(), strip(path, &self.agenda_items_folder), path)?;
        Ok((parse_id(&caps[1], path)?, parse_id(&caps[2], path)?))
    }

    pub fn proposal_id(&self, path: &str) -> Result<i64, SyncError> {
        let caps = match_name(proposal_name(), strip(path, &self.proposals_folder), path)?;
        parse_id(&caps[1], path)
    }
}

fn strip<'p>(path: &'p str, folder: &str) -> &'p str {
    if folder.is_empty() {
        return path;
    }
    path.strip_prefix(folder).unwrap_or(path)
}

fn match_name<'p>(
    pattern: &Regex,
    name: &'p str,
    path: &str,
) -> Result<regex::Captures<'p>, SyncError> {
    pattern
        .captures(name)
        .ok_or_else(|| SyncError::Parse(format!("unexpected document name '{}'", path)))
}

fn parse_id(digits: &str, path: &str) -> Result<i64, SyncError> {
    digits
        .parse()
        .map_err(|_| SyncError::Parse(format!("id out of range in '{}'", path)))
}
