//! Field merge rules
//!
//! A merge takes the persisted record and the freshly scraped one and
//! returns the value to write. The persisted record is the base, so fields
//! the current page does not carry survive; scraped text only replaces the
//! stored value when it is non-empty after trimming.

use sdk::types::{AgendaItem, Attachment, Meeting, Proposal};

/// Replace `target` with `value` unless `value` is blank
fn overwrite_non_empty(target: &mut String, value: String) {
    if !value.trim().is_empty() {
        *target = value;
    }
}

/// Agenda item seen on its meeting's page
///
/// The meeting page states position, date and committee authoritatively and
/// carries a few summary columns; all other fields come from the item's own
/// page and are kept.
pub fn agenda_item_in_meeting(old: AgendaItem, new: AgendaItem) -> AgendaItem {
    let mut merged = old;

    overwrite_non_empty(&mut merged.proposal_number, new.proposal_number);
    overwrite_non_empty(&mut merged.status, new.status);
    overwrite_non_empty(&mut merged.kind, new.kind);
    overwrite_non_empty(&mut merged.number, new.number);
    overwrite_non_empty(&mut merged.subject, new.subject);

    merged.index_in_meeting = new.index_in_meeting;
    merged.date = new.date;
    merged.committee = new.committee;
    merged.saved_at = new.saved_at;

    merged
}

/// Agenda item seen as a referral on a proposal's page
pub fn agenda_item_in_referral(old: AgendaItem, new: AgendaItem) -> AgendaItem {
    let mut merged = old;

    overwrite_non_empty(&mut merged.proposal_number, new.proposal_number);
    overwrite_non_empty(&mut merged.status, new.status);
    overwrite_non_empty(&mut merged.kind, new.kind);
    overwrite_non_empty(&mut merged.resolution_status, new.resolution_status);

    merged.index_in_referral = new.index_in_referral;
    merged.saved_at = new.saved_at;

    merged
}

/// Attachments only ever change their title
pub fn attachment(old: Attachment, new: Attachment) -> Attachment {
    Attachment {
        title: new.title,
        saved_at: new.saved_at,
        ..old
    }
}

/// Agenda item page saved as a parent record
///
/// The item page does not show the context columns gathered from meeting
/// and proposal pages, so those carry forward from the stored record.
pub fn agenda_item_record(old: Option<AgendaItem>, new: AgendaItem) -> AgendaItem {
    match old {
        Some(old) => AgendaItem {
            proposal_number: old.proposal_number,
            kind: old.kind,
            index_in_meeting: old.index_in_meeting,
            index_in_referral: old.index_in_referral,
            resolution_status: old.resolution_status,
            ..new
        },
        None => new,
    }
}

/// Meeting pages carry every meeting field, so the fresh record wins
pub fn meeting_record(_old: Option<Meeting>, new: Meeting) -> Meeting {
    new
}

/// Proposal pages carry every proposal field, so the fresh record wins
pub fn proposal_record(_old: Option<Proposal>, new: Proposal) -> Proposal {
    new
}
