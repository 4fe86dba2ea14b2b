//! Key resolution
//!
//! Maps business identifiers to store keys. Everything here is pure: the
//! same fields always give the same encoded key, which is what lets the
//! reconciler recognize a record across re-scrapes without a surrogate id.

use crate::config::{Config, EntityKinds};
use sdk::errors::KeyError;
use sdk::key::Key;
use sdk::types::{Appointment, Attachment};

/// Builds store keys with the configured kind names
#[derive(Debug, Clone)]
pub struct KeyResolver {
    kinds: EntityKinds,
    key_date_format: String,
}

impl KeyResolver {
    pub fn new(kinds: EntityKinds, key_date_format: impl Into<String>) -> Self {
        Self {
            kinds,
            key_date_format: key_date_format.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.entities.clone(), config.sync.key_date_format.clone())
    }

    pub fn kinds(&self) -> &EntityKinds {
        &self.kinds
    }

    pub fn meeting_key(&self, meeting_id: i64) -> Result<Key, KeyError> {
        Key::new(&self.kinds.meeting, meeting_id.to_string(), None)
    }

    /// Agenda item key, scoped under its meeting
    pub fn agenda_item_key(&self, meeting_id: i64, item_id: i64) -> Result<Key, KeyError> {
        let meeting = self.meeting_key(meeting_id)?;
        Key::new(&self.kinds.agenda_item, item_id.to_string(), Some(&meeting))
    }

    pub fn proposal_key(&self, proposal_id: i64) -> Result<Key, KeyError> {
        Key::new(&self.kinds.proposal, proposal_id.to_string(), None)
    }

    /// Attachment key under whichever parent owns it in the current context
    pub fn attachment_key(&self, attachment: &Attachment, parent: &Key) -> Result<Key, KeyError> {
        let name = format!(
            "{}_{}_{}_{}_{}",
            attachment.document_id,
            attachment.meeting_id,
            attachment.agenda_item_id,
            attachment.proposal_id,
            attachment.title
        );
        Key::new(&self.kinds.attachment, name, Some(parent))
    }

    /// Flat appointment key from committee and start time
    pub fn appointment_key(&self, appointment: &Appointment) -> Result<Key, KeyError> {
        let name = format!(
            "{}_{}",
            appointment.committee,
            appointment.start.format(&self.key_date_format)
        );
        Key::new(&self.kinds.appointment, name, None)
    }
}
