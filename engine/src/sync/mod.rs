/// Sync cycles
///
/// One cycle handles one fetched document: read it, extract the parent and
/// its children, reconcile every child collection the parent owns, then
/// merge and persist the parent record itself. Delete cycles remove a
/// parent and everything hanging off it, identified by the document path
/// alone. The appointment cycle replaces the stored calendar window.
use crate::batch::{FlatCollectionSyncer, FlatSyncReport};
use crate::config::Config;
use crate::db::{DocumentStore, Entity, Query, Transaction};
use crate::reconcile::{ChildSet, ReconcileReport, Reconciler};
use crate::resolver::KeyResolver;
use crate::source::{DocumentReader, Extractor, PathParser};
use chrono::{DateTime, Utc};
use sdk::errors::{KeyError, StoreContext, StoreError, SyncError};
use sdk::key::Key;
use sdk::types::AgendaItem;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

pub mod owner;

pub use owner::{AgendaItemDoc, ChildOwner, MeetingDoc, ProposalDoc};

/// Outcome of an update cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub parent: Key,
    /// True when the parent record did not exist before this cycle
    pub created: bool,
    /// Absent for parents that own no agenda items
    pub agenda_items: Option<ReconcileReport>,
    pub attachments: ReconcileReport,
}

/// Outcome of a delete cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    pub deleted: usize,
    /// Referrals whose `proposal_id` was reset
    pub detached: usize,
    pub failed_deletes: Vec<Key>,
}

fn key_error(e: KeyError) -> SyncError {
    SyncError::store("resolve key", StoreError::from(e))
}

/// Runs sync cycles against one store
pub struct SyncEngine {
    store: Arc<dyn DocumentStore>,
    reader: Arc<dyn DocumentReader>,
    extractor: Arc<dyn Extractor>,
    resolver: KeyResolver,
    paths: PathParser,
    appointments_document: String,
    batch_size: usize,
}

impl SyncEngine {
    pub fn new(
        config: &Config,
        store: Arc<dyn DocumentStore>,
        reader: Arc<dyn DocumentReader>,
        extractor: Arc<dyn Extractor>,
    ) -> Self {
        Self {
            store,
            reader,
            extractor,
            resolver: KeyResolver::from_config(config),
            paths: PathParser::new(&config.source),
            appointments_document: config.source.appointments_document.clone(),
            batch_size: config.sync.batch_size,
        }
    }

    pub fn resolver(&self) -> &KeyResolver {
        &self.resolver
    }

    pub async fn update_meeting(&self, path: &str) -> Result<SyncReport, SyncError> {
        let meeting_id = self.paths.meeting_id(path)?;
        let raw = self.reader.read_document(path).await?;
        let mut doc = self.extractor.meeting(meeting_id, &raw)?;
        self.update(&mut doc).await
    }

    pub async fn update_agenda_item(&self, path: &str) -> Result<SyncReport, SyncError> {
        let (meeting_id, item_id) = self.paths.agenda_item_ids(path)?;
        let raw = self.reader.read_document(path).await?;
        let mut doc = self.extractor.agenda_item(meeting_id, item_id, &raw)?;
        self.update(&mut doc).await
    }

    pub async fn update_proposal(&self, path: &str) -> Result<SyncReport, SyncError> {
        let proposal_id = self.paths.proposal_id(path)?;
        let raw = self.reader.read_document(path).await?;
        let mut doc = self.extractor.proposal(proposal_id, &raw)?;
        self.update(&mut doc).await
    }

    /// Reconcile the children of an extracted document, then its own record
    pub async fn update<O: ChildOwner + ?Sized>(
        &self,
        owner: &mut O,
    ) -> Result<SyncReport, SyncError> {
        owner.stamp(Utc::now());
        let owner = &*owner;

        let key = owner.key(&self.resolver).map_err(key_error)?;
        info!(parent = %key, "Syncing {}", owner.label());

        let reconciler = Reconciler::new(self.store.as_ref(), &self.resolver);

        let agenda_items = match owner.agenda_item_query(&self.resolver, &key) {
            Some(query) => Some(
                reconciler
                    .reconcile(
                        ChildSet {
                            parent: &key,
                            records: owner.agenda_items(),
                            query,
                        },
                        |old, new| owner.merge_agenda_item(old, new),
                    )
                    .await?,
            ),
            None => None,
        };

        let attachments = reconciler
            .reconcile(
                ChildSet {
                    parent: &key,
                    records: owner.attachments(),
                    query: owner.attachment_query(&self.resolver, &key),
                },
                |old, new| owner.merge_attachment(old, new),
            )
            .await?;

        let old = self
            .store
            .get(&key)
            .await
            .with_context(|| format!("load {}", key))?;
        let created = old.is_none();

        let entity = owner
            .merge_parent(key.clone(), old.as_ref())
            .with_context(|| format!("merge {}", key))?;

        let mut tx = Transaction::new(self.store.as_ref());
        tx.put(entity).context("put parent")?;
        tx.commit()
            .await
            .with_context(|| format!("commit {}", key))?;

        info!(parent = %key, created, "Saved {}", owner.label());

        Ok(SyncReport {
            parent: key,
            created,
            agenda_items,
            attachments,
        })
    }

    /// Delete a meeting with its agenda items and all attachments below it
    pub async fn delete_meeting(&self, path: &str) -> Result<DeleteReport, SyncError> {
        let meeting_id = self.paths.meeting_id(path)?;
        let key = self.resolver.meeting_key(meeting_id).map_err(key_error)?;
        let kinds = self.resolver.kinds();

        let attachments = self
            .store
            .run_keys(&Query::new(&kinds.attachment).ancestor(&key))
            .await
            .context("query attachments of meeting")?;
        let items = self
            .store
            .run_keys(&Query::new(&kinds.agenda_item).ancestor(&key))
            .await
            .context("query agenda items of meeting")?;

        let mut report = DeleteReport::default();
        let mut tx = Transaction::new(self.store.as_ref());

        delete_best_effort(&mut tx, &attachments, &mut report);
        delete_best_effort(&mut tx, &items, &mut report);
        delete_best_effort(&mut tx, std::slice::from_ref(&key), &mut report);

        tx.commit()
            .await
            .with_context(|| format!("commit delete of {}", key))?;

        info!(parent = %key, deleted = report.deleted, "Deleted meeting");
        Ok(report)
    }

    /// Delete an agenda item and its attachments
    pub async fn delete_agenda_item(&self, path: &str) -> Result<DeleteReport, SyncError> {
        let (meeting_id, item_id) = self.paths.agenda_item_ids(path)?;
        let key = self
            .resolver
            .agenda_item_key(meeting_id, item_id)
            .map_err(key_error)?;

        let attachments = self
            .store
            .run_keys(&Query::new(&self.resolver.kinds().attachment).ancestor(&key))
            .await
            .context("query attachments of agenda item")?;

        let mut report = DeleteReport::default();
        let mut tx = Transaction::new(self.store.as_ref());

        delete_best_effort(&mut tx, &attachments, &mut report);
        delete_best_effort(&mut tx, std::slice::from_ref(&key), &mut report);

        tx.commit()
            .await
            .with_context(|| format!("commit delete of {}", key))?;

        info!(parent = %key, deleted = report.deleted, "Deleted agenda item");
        Ok(report)
    }

    /// Delete a proposal, detaching the agenda items that referred to it
    pub async fn delete_proposal(&self, path: &str) -> Result<DeleteReport, SyncError> {
        let proposal_id = self.paths.proposal_id(path)?;
        let key = self.resolver.proposal_key(proposal_id).map_err(key_error)?;
        let kinds = self.resolver.kinds();

        let attachments = self
            .store
            .run_keys(&Query::new(&kinds.attachment).ancestor(&key))
            .await
            .context("query attachments of proposal")?;
        let referrals = self
            .store
            .run(&Query::new(&kinds.agenda_item).filter_eq("proposal_id", proposal_id))
            .await
            .context("query referrals of proposal")?;

        let mut report = DeleteReport::default();
        let mut tx = Transaction::new(self.store.as_ref());

        for entity in referrals {
            let mut item: AgendaItem = entity
                .to_record()
                .with_context(|| format!("decode {}", entity.key))?;
            item.proposal_id = 0;
            let detached = Entity::from_record(entity.key, &item)
                .context("encode detached referral")?;
            tx.put(detached).context("detach referral")?;
            report.detached += 1;
        }

        delete_best_effort(&mut tx, &attachments, &mut report);
        delete_best_effort(&mut tx, std::slice::from_ref(&key), &mut report);

        tx.commit()
            .await
            .with_context(|| format!("commit delete of {}", key))?;

        info!(
            parent = %key,
            deleted = report.deleted,
            detached = report.detached,
            "Deleted proposal"
        );
        Ok(report)
    }

    /// Replace stored appointments starting after `min_date`
    pub async fn update_appointments(
        &self,
        min_date: DateTime<Utc>,
    ) -> Result<FlatSyncReport, SyncError> {
        let raw = self.reader.read_document(&self.appointments_document).await?;
        let mut appointments = self.extractor.appointments(&raw)?;

        let now = Utc::now();
        for appointment in &mut appointments {
            appointment.saved_at = now;
        }

        FlatCollectionSyncer::new(self.store.as_ref(), &self.resolver, self.batch_size)
            .sync(appointments, min_date)
            .await
    }
}

/// Buffer deletes of `keys`; a failure is logged and reported, never raised
fn delete_best_effort(tx: &mut Transaction<'_>, keys: &[Key], report: &mut DeleteReport) {
    if keys.is_empty() {
        return;
    }
    match tx.delete_multi(keys) {
        Ok(()) => report.deleted += keys.len(),
        Err(e) => {
            error!(count = keys.len(), error = %e, "Failed to delete entities");
            report.failed_deletes.extend_from_slice(keys);
        }
    }
}
