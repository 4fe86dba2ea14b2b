//! JSON snapshot extractor
//!
//! A snapshot is the record tree of one fetched page, already pulled out of
//! its markup. The extractor decodes it and fills in what the page layout
//! implies but the rows themselves do not carry: parent ids, inherited
//! columns and ordering positions. Ids taken from the document path always
//! win over ids inside the snapshot.

use super::Extractor;
use crate::sync::owner::{AgendaItemDoc, MeetingDoc, ProposalDoc};
use chrono::{DateTime, Utc};
use sdk::errors::SyncError;
use sdk::types::{AgendaItem, Appointment, Attachment, Meeting, Proposal};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct MeetingSnapshot {
    meeting: Meeting,
    #[serde(default)]
    agenda_items: Vec<AgendaItem>,
    #[serde(default)]
    attachments: Vec<Attachment>,
}

#[derive(Debug, Deserialize)]
struct AgendaItemSnapshot {
    agenda_item: AgendaItem,
    #[serde(default)]
    attachments: Vec<Attachment>,
}

#[derive(Debug, Deserialize)]
struct ProposalSnapshot {
    proposal: Proposal,
    #[serde(default)]
    referrals: Vec<AgendaItem>,
    #[serde(default)]
    attachments: Vec<Attachment>,
}

#[derive(Debug, Deserialize)]
struct AppointmentSnapshot {
    committee: String,
    #[serde(default)]
    meeting_id: i64,
    start: DateTime<Utc>,
    #[serde(default)]
    end: Option<DateTime<Utc>>,
}

fn decode<T: DeserializeOwned>(raw: &[u8], what: &str) -> Result<T, SyncError> {
    serde_json::from_slice(raw).map_err(|e| SyncError::Parse(format!("{} snapshot: {}", what, e)))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonExtractor;

impl JsonExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Extractor for JsonExtractor {
    fn meeting(&self, meeting_id: i64, raw: &[u8]) -> Result<MeetingDoc, SyncError> {
        let MeetingSnapshot {
            mut meeting,
            mut agenda_items,
            mut attachments,
        } = decode(raw, "meeting")?;

        meeting.meeting_id = meeting_id;

        for (index, item) in agenda_items.iter_mut().enumerate() {
            item.meeting_id = meeting_id;
            item.date = meeting.date;
            item.committee = meeting.committee.clone();
            item.index_in_meeting = index as i32;
        }

        for attachment in &mut attachments {
            attachment.meeting_id = meeting_id;
            attachment.agenda_item_id = 0;
        }

        debug!(
            meeting_id,
            agenda_items = agenda_items.len(),
            attachments = attachments.len(),
            "Extracted meeting"
        );

        Ok(MeetingDoc {
            meeting,
            agenda_items,
            attachments,
        })
    }

    fn agenda_item(
        &self,
        meeting_id: i64,
        item_id: i64,
        raw: &[u8],
    ) -> Result<AgendaItemDoc, SyncError> {
        let AgendaItemSnapshot {
            agenda_item: mut item,
            mut attachments,
        } = decode(raw, "agenda item")?;

        item.meeting_id = meeting_id;
        item.item_id = item_id;

        for attachment in &mut attachments {
            attachment.meeting_id = meeting_id;
            attachment.agenda_item_id = item_id;
        }

        Ok(AgendaItemDoc { item, attachments })
    }

    fn proposal(&self, proposal_id: i64, raw: &[u8]) -> Result<ProposalDoc, SyncError> {
        let ProposalSnapshot {
            mut proposal,
            referrals,
            mut attachments,
        } = decode(raw, "proposal")?;

        proposal.proposal_id = proposal_id;

        // Referrals without a date never reached a meeting
        let mut referrals: Vec<AgendaItem> =
            referrals.into_iter().filter(|r| r.date.is_some()).collect();

        for (index, referral) in referrals.iter_mut().enumerate() {
            referral.proposal_id = proposal_id;
            referral.proposal_number = proposal.number.clone();
            referral.status = proposal.status.clone();
            referral.lead_department = proposal.lead_department.clone();
            referral.index_in_referral = index as i32;
        }

        if proposal.subject.trim().is_empty() {
            return Err(SyncError::Parse(format!(
                "proposal {} has an empty subject",
                proposal_id
            )));
        }

        referrals.sort_by_key(|r| r.date);

        for attachment in &mut attachments {
            attachment.proposal_id = proposal_id;
        }

        Ok(ProposalDoc {
            proposal,
            referrals,
            attachments,
        })
    }

    fn appointments(&self, raw: &[u8]) -> Result<Vec<Appointment>, SyncError> {
        let snapshots: Vec<AppointmentSnapshot> = decode(raw, "appointments")?;

        Ok(snapshots
            .into_iter()
            .map(|s| Appointment {
                committee: s.committee,
                meeting_id: s.meeting_id,
                start: s.start,
                end: s.end.unwrap_or(s.start),
                ..Default::default()
            })
            .collect())
    }
}
