//! Council record types
//!
//! These are the entities persisted in the document store. Every field is
//! `#[serde(default)]` so that snapshots and older stored bodies missing a
//! field still decode; a missing numeric id decodes as `0`, which is also
//! the "no such parent" marker used throughout (e.g. `agenda_item_id == 0`
//! for an attachment that hangs directly off a meeting).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel used for vote counts the source did not state
pub const UNKNOWN_COUNT: i32 = -1;

/// Committee session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Meeting {
    pub meeting_id: i64,
    pub date: Option<DateTime<Utc>>,
    pub committee: String,
    pub status: String,
    pub title: String,
    /// Time of day as printed by the source, e.g. "17:00-19:30"
    pub time: String,
    pub room: String,
    pub location: String,
    pub saved_at: DateTime<Utc>,
}

/// Vote tally of a resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoteTally {
    pub approve: i32,
    pub reject: i32,
    pub abstain: i32,
}

impl Default for VoteTally {
    fn default() -> Self {
        Self {
            approve: UNKNOWN_COUNT,
            reject: UNKNOWN_COUNT,
            abstain: UNKNOWN_COUNT,
        }
    }
}

/// One discussion point of a meeting, also used as a proposal referral
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgendaItem {
    pub meeting_id: i64,
    pub item_id: i64,
    /// Proposal this item deliberates, `0` when none or detached
    pub proposal_id: i64,
    pub saved_at: DateTime<Utc>,

    pub subject: String,
    pub decision: String,
    pub minutes: String,
    pub minutes_addendum: String,
    /// Agenda position label, e.g. "Ö 4.1"
    pub number: String,
    pub resolution_kind: String,
    pub committee: String,
    pub lead_department: String,
    pub clerk: String,
    pub date: Option<DateTime<Utc>>,
    pub votes: VoteTally,
    pub status: String,

    /// Printed number of the linked proposal
    pub proposal_number: String,
    /// Referral classification (e.g. "Vorberatung", "Entscheidung")
    pub kind: String,
    pub index_in_meeting: i32,
    pub index_in_referral: i32,
    pub resolution_status: String,
}

/// Submitted motion routed through committee referrals
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Proposal {
    pub proposal_id: i64,
    /// Printed number, e.g. "VO/2024/0815"
    pub number: String,
    pub subject: String,
    pub status: String,
    pub lead_department: String,
    pub clerk: String,
    pub resolution_draft: String,
    pub rationale: String,
    pub financial_impact: String,
    pub created_on: Option<DateTime<Utc>>,
    pub related_proposal_id: i64,
    pub related_number: String,
    pub saved_at: DateTime<Utc>,
}

/// Attachment flavour as named by the source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    /// Listed in the attachment table of a page
    #[default]
    Attachment,
    /// Base document linked from the header form of a page
    BaseAttachment,
}

/// File reference owned by a meeting, agenda item or proposal
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Attachment {
    pub document_id: i64,
    pub meeting_id: i64,
    pub agenda_item_id: i64,
    pub proposal_id: i64,
    pub title: String,
    pub kind: AttachmentKind,
    pub filename: String,
    pub saved_at: DateTime<Utc>,
}

/// Flat calendar entry of a committee
///
/// `start` and `end` are stored as epoch seconds so that retention range
/// queries compare numerically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Appointment {
    pub committee: String,
    pub meeting_id: i64,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub start: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub end: DateTime<Utc>,
    pub saved_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_agenda_item_decodes_with_missing_fields() {
        let item: AgendaItem =
            serde_json::from_str(r#"{"meeting_id": 7, "item_id": 3, "subject": "Haushalt"}"#)
                .unwrap();

        assert_eq!(item.meeting_id, 7);
        assert_eq!(item.item_id, 3);
        assert_eq!(item.proposal_id, 0);
        assert_eq!(item.votes, VoteTally::default());
        assert_eq!(item.votes.approve, UNKNOWN_COUNT);
        assert!(item.status.is_empty());
    }

    #[test]
    fn test_appointment_start_is_epoch_seconds() {
        let appointment = Appointment {
            committee: "Rat".to_string(),
            start: Utc.with_ymd_and_hms(2024, 3, 5, 17, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 3, 5, 19, 0, 0).unwrap(),
            ..Default::default()
        };

        let value = serde_json::to_value(&appointment).unwrap();
        assert_eq!(value["start"], serde_json::json!(1709658000));
    }

    #[test]
    fn test_attachment_kind_snake_case() {
        let value = serde_json::to_value(AttachmentKind::BaseAttachment).unwrap();
        assert_eq!(value, serde_json::json!("base_attachment"));
    }
}
