/// Child-set reconciliation
///
/// Brings the persisted children of one parent in line with a freshly
/// scraped set. Fresh and stored records are matched on their encoded key;
/// matches are merged, stored records without a fresh counterpart are
/// deleted and the rest of the fresh set is inserted. All writes for one
/// parent go through a single transaction.
///
/// Deletes are best effort: a delete that cannot be buffered is logged and
/// reported, and the cycle continues. A put that cannot be buffered, or a
/// failed commit, aborts with nothing applied.
use crate::db::{DocumentStore, Entity, Query, Transaction};
use crate::resolver::KeyResolver;
use sdk::errors::{KeyError, StoreContext, SyncError};
use sdk::key::Key;
use sdk::types::{AgendaItem, Attachment};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

pub mod merge;

/// Record type that can be reconciled under a parent
pub trait ChildRecord: Serialize + DeserializeOwned + Clone + Send + Sync {
    /// Store key of this record in the context of `parent`
    fn resolve_key(&self, resolver: &KeyResolver, parent: &Key) -> Result<Key, KeyError>;
}

impl ChildRecord for AgendaItem {
    // Agenda items always live under their meeting, also when reached
    // through a proposal's referral list.
    fn resolve_key(&self, resolver: &KeyResolver, _parent: &Key) -> Result<Key, KeyError> {
        resolver.agenda_item_key(self.meeting_id, self.item_id)
    }
}

impl ChildRecord for Attachment {
    fn resolve_key(&self, resolver: &KeyResolver, parent: &Key) -> Result<Key, KeyError> {
        resolver.attachment_key(self, parent)
    }
}

/// Fresh children of one parent and the query selecting their stored state
pub struct ChildSet<'a, R> {
    pub parent: &'a Key,
    pub records: &'a [R],
    pub query: Query,
}

/// Outcome of one reconciliation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Stored keys that should have been deleted but were not
    pub failed_deletes: Vec<Key>,
}

impl ReconcileReport {
    /// Fold another report into this one
    pub fn absorb(&mut self, other: ReconcileReport) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.deleted += other.deleted;
        self.failed_deletes.extend(other.failed_deletes);
    }
}

pub struct Reconciler<'a> {
    store: &'a dyn DocumentStore,
    resolver: &'a KeyResolver,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a dyn DocumentStore, resolver: &'a KeyResolver) -> Self {
        Self { store, resolver }
    }

    /// Reconcile `set` against the store, merging matches with `merge(old, new)`
    pub async fn reconcile<R, F>(
        &self,
        set: ChildSet<'_, R>,
        merge: F,
    ) -> Result<ReconcileReport, SyncError>
    where
        R: ChildRecord,
        F: Fn(R, R) -> R,
    {
        let mut fresh: BTreeMap<String, (Key, R)> = BTreeMap::new();
        for record in set.records {
            let key = record
                .resolve_key(self.resolver, set.parent)
                .map_err(|e| SyncError::store("resolve child key", e.into()))?;
            let encoded = key.encode();
            if fresh.insert(encoded.clone(), (key, record.clone())).is_some() {
                warn!(
                    parent = %set.parent,
                    key = %encoded,
                    "Duplicate child key in fresh set, keeping the later record"
                );
            }
        }

        let old_keys = self
            .store
            .run_keys(&set.query)
            .await
            .with_context(|| format!("query children of {}", set.parent))?;
        let old = self
            .store
            .get_multi(&old_keys)
            .await
            .with_context(|| format!("load children of {}", set.parent))?;

        let mut report = ReconcileReport::default();
        let mut tx = Transaction::new(self.store);

        for entity in old {
            match fresh.remove(&entity.key.encode()) {
                None => match tx.delete(&entity.key) {
                    Ok(()) => report.deleted += 1,
                    Err(e) => {
                        error!(key = %entity.key, error = %e, "Failed to delete stale child");
                        report.failed_deletes.push(entity.key);
                    }
                },
                Some((key, new)) => {
                    let stored: R = entity
                        .to_record()
                        .with_context(|| format!("decode {}", entity.key))?;
                    let merged = merge(stored, new);
                    let entity = Entity::from_record(key, &merged).context("encode child")?;
                    debug!(key = %entity.key, "Updating child");
                    tx.put(entity).context("put merged child")?;
                    report.updated += 1;
                }
            }
        }

        for (_, (key, record)) in fresh {
            let entity = Entity::from_record(key, &record).context("encode child")?;
            debug!(key = %entity.key, "Inserting child");
            tx.put(entity).context("put new child")?;
            report.inserted += 1;
        }

        if !tx.is_empty() {
            tx.commit()
                .await
                .with_context(|| format!("commit children of {}", set.parent))?;
        }

        info!(
            parent = %set.parent,
            kind = %set.query.kind,
            inserted = report.inserted,
            updated = report.updated,
            deleted = report.deleted,
            failed_deletes = report.failed_deletes.len(),
            "Reconciled children"
        );

        Ok(report)
    }
}
