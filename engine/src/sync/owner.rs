//! Parent documents and the children they own
//!
//! Each parsed document type knows its own key, which stored children
//! belong to it and how its children and its own record merge with what is
//! already stored. The orchestrator only talks to [`ChildOwner`].

use crate::db::{Entity, Query};
use crate::reconcile::merge;
use crate::resolver::KeyResolver;
use chrono::{DateTime, Utc};
use sdk::errors::{KeyError, StoreResult};
use sdk::key::Key;
use sdk::types::{AgendaItem, Attachment, Meeting, Proposal};

/// A parsed parent document together with its fresh children
pub trait ChildOwner: Send + Sync {
    /// Short name used in logs and reports
    fn label(&self) -> &'static str;

    fn key(&self, resolver: &KeyResolver) -> Result<Key, KeyError>;

    /// Query for stored agenda items owned by this parent, if it owns any
    fn agenda_item_query(&self, resolver: &KeyResolver, key: &Key) -> Option<Query>;

    fn agenda_items(&self) -> &[AgendaItem];

    fn merge_agenda_item(&self, old: AgendaItem, new: AgendaItem) -> AgendaItem;

    /// Query for stored attachments owned directly by this parent
    fn attachment_query(&self, resolver: &KeyResolver, key: &Key) -> Query;

    fn attachments(&self) -> &[Attachment];

    fn merge_attachment(&self, old: Attachment, new: Attachment) -> Attachment {
        merge::attachment(old, new)
    }

    /// Entity to store for the parent record, given the stored one if any
    fn merge_parent(&self, key: Key, old: Option<&Entity>) -> StoreResult<Entity>;

    /// Set `saved_at` on the parent and every child
    fn stamp(&mut self, now: DateTime<Utc>);
}

/// Meeting page: agenda items by ancestry plus direct attachments
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeetingDoc {
    pub meeting: Meeting,
    pub agenda_items: Vec<AgendaItem>,
    pub attachments: Vec<Attachment>,
}

impl ChildOwner for MeetingDoc {
    fn label(&self) -> &'static str {
        "meeting"
    }

    fn key(&self, resolver: &KeyResolver) -> Result<Key, KeyError> {
        resolver.meeting_key(self.meeting.meeting_id)
    }

    fn agenda_item_query(&self, resolver: &KeyResolver, key: &Key) -> Option<Query> {
        Some(Query::new(&resolver.kinds().agenda_item).ancestor(key))
    }

    fn agenda_items(&self) -> &[AgendaItem] {
        &self.agenda_items
    }

    fn merge_agenda_item(&self, old: AgendaItem, new: AgendaItem) -> AgendaItem {
        merge::agenda_item_in_meeting(old, new)
    }

    // Attachments of the meeting's agenda items also sit under the meeting
    // key; only the ones not tied to an item belong to the meeting page.
    fn attachment_query(&self, resolver: &KeyResolver, key: &Key) -> Query {
        Query::new(&resolver.kinds().attachment)
            .ancestor(key)
            .filter_eq("agenda_item_id", 0)
    }

    fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    fn merge_parent(&self, key: Key, old: Option<&Entity>) -> StoreResult<Entity> {
        let old = old.map(Entity::to_record::<Meeting>).transpose()?;
        Entity::from_record(key, &merge::meeting_record(old, self.meeting.clone()))
    }

    fn stamp(&mut self, now: DateTime<Utc>) {
        self.meeting.saved_at = now;
        for item in &mut self.agenda_items {
            item.saved_at = now;
        }
        for attachment in &mut self.attachments {
            attachment.saved_at = now;
        }
    }
}

/// Proposal page: referral sequence by `proposal_id` plus attachments
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProposalDoc {
    pub proposal: Proposal,
    pub referrals: Vec<AgendaItem>,
    pub attachments: Vec<Attachment>,
}

impl ChildOwner for ProposalDoc {
    fn label(&self) -> &'static str {
        "proposal"
    }

    fn key(&self, resolver: &KeyResolver) -> Result<Key, KeyError> {
        resolver.proposal_key(self.proposal.proposal_id)
    }

    // Referrals are agenda items of other meetings, found by field rather
    // than by ancestry.
    fn agenda_item_query(&self, resolver: &KeyResolver, _key: &Key) -> Option<Query> {
        Some(
            Query::new(&resolver.kinds().agenda_item)
                .filter_eq("proposal_id", self.proposal.proposal_id),
        )
    }

    fn agenda_items(&self) -> &[AgendaItem] {
        &self.referrals
    }

    fn merge_agenda_item(&self, old: AgendaItem, new: AgendaItem) -> AgendaItem {
        merge::agenda_item_in_referral(old, new)
    }

    fn attachment_query(&self, resolver: &KeyResolver, key: &Key) -> Query {
        Query::new(&resolver.kinds().attachment).ancestor(key)
    }

    fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    fn merge_parent(&self, key: Key, old: Option<&Entity>) -> StoreResult<Entity> {
        let old = old.map(Entity::to_record::<Proposal>).transpose()?;
        Entity::from_record(key, &merge::proposal_record(old, self.proposal.clone()))
    }

    fn stamp(&mut self, now: DateTime<Utc>) {
        self.proposal.saved_at = now;
        for referral in &mut self.referrals {
            referral.saved_at = now;
        }
        for attachment in &mut self.attachments {
            attachment.saved_at = now;
        }
    }
}

/// Agenda item page: the item itself plus its attachments
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgendaItemDoc {
    pub item: AgendaItem,
    pub attachments: Vec<Attachment>,
}

impl ChildOwner for AgendaItemDoc {
    fn label(&self) -> &'static str {
        "agenda item"
    }

    fn key(&self, resolver: &KeyResolver) -> Result<Key, KeyError> {
        resolver.agenda_item_key(self.item.meeting_id, self.item.item_id)
    }

    fn agenda_item_query(&self, _resolver: &KeyResolver, _key: &Key) -> Option<Query> {
        None
    }

    fn agenda_items(&self) -> &[AgendaItem] {
        &[]
    }

    fn merge_agenda_item(&self, old: AgendaItem, _new: AgendaItem) -> AgendaItem {
        old
    }

    fn attachment_query(&self, resolver: &KeyResolver, key: &Key) -> Query {
        Query::new(&resolver.kinds().attachment).ancestor(key)
    }

    fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    fn merge_parent(&self, key: Key, old: Option<&Entity>) -> StoreResult<Entity> {
        let old = old.map(Entity::to_record::<AgendaItem>).transpose()?;
        Entity::from_record(key, &merge::agenda_item_record(old, self.item.clone()))
    }

    fn stamp(&mut self, now: DateTime<Utc>) {
        self.item.saved_at = now;
        for attachment in &mut self.attachments {
            attachment.saved_at = now;
        }
    }
}
