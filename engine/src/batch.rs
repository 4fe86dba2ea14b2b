//! Flat collection sync
//!
//! Top-level collections without a parent (appointments) are too large for
//! one transaction. They are written with plain multi-put and multi-delete
//! calls in fixed-size chunks: first every stale key inside the retention
//! window is deleted, then the whole fresh set is overwritten. Chunks run
//! in order and the first failing chunk ends the sync; earlier chunks stay
//! applied.

use crate::config::EntityKinds;
use crate::db::{DocumentStore, Entity, Query};
use crate::resolver::KeyResolver;
use chrono::{DateTime, Utc};
use sdk::errors::{KeyError, StoreContext, SyncError};
use sdk::key::Key;
use sdk::types::Appointment;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Record of a flat, time-windowed collection
pub trait FlatRecord: Serialize + Send + Sync {
    /// Body field holding the window timestamp as epoch seconds
    const TIMESTAMP_FIELD: &'static str;

    fn kind(kinds: &EntityKinds) -> &str;

    fn resolve_key(&self, resolver: &KeyResolver) -> Result<Key, KeyError>;

    fn timestamp(&self) -> DateTime<Utc>;
}

impl FlatRecord for Appointment {
    const TIMESTAMP_FIELD: &'static str = "start";

    fn kind(kinds: &EntityKinds) -> &str {
        &kinds.appointment
    }

    fn resolve_key(&self, resolver: &KeyResolver) -> Result<Key, KeyError> {
        resolver.appointment_key(self)
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.start
    }
}

/// Items per store call: the configured size capped by the store ceiling
pub fn chunk_size(configured: usize, store_limit: usize) -> usize {
    configured.min(store_limit).max(1)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlatSyncReport {
    pub upserted: usize,
    pub deleted: usize,
    /// Records dropped because an earlier record had the same key
    pub duplicates: usize,
    /// Records at or before the retention cutoff
    pub expired: usize,
}

pub struct FlatCollectionSyncer<'a> {
    store: &'a dyn DocumentStore,
    resolver: &'a KeyResolver,
    batch_size: usize,
}

impl<'a> FlatCollectionSyncer<'a> {
    pub fn new(store: &'a dyn DocumentStore, resolver: &'a KeyResolver, batch_size: usize) -> Self {
        Self {
            store,
            resolver,
            batch_size,
        }
    }

    /// Replace the stored window after `min_date` with `records`
    pub async fn sync<R: FlatRecord>(
        &self,
        records: Vec<R>,
        min_date: DateTime<Utc>,
    ) -> Result<FlatSyncReport, SyncError> {
        if records.is_empty() {
            return Err(SyncError::DataAnomaly("empty result set".to_string()));
        }

        let kind = R::kind(self.resolver.kinds());
        let mut report = FlatSyncReport::default();
        let mut seen = HashSet::new();
        let mut fresh = Vec::with_capacity(records.len());

        for record in records {
            let key = record
                .resolve_key(self.resolver)
                .map_err(|e| SyncError::store("resolve record key", e.into()))?;
            if !seen.insert(key.encode()) {
                debug!(key = %key, "Skipping duplicate record");
                report.duplicates += 1;
                continue;
            }
            // Stored timestamps have second precision
            if record.timestamp().timestamp() <= min_date.timestamp() {
                report.expired += 1;
                continue;
            }
            fresh.push(Entity::from_record(key, &record).context("encode record")?);
        }

        if report.duplicates > 0 {
            warn!(kind, duplicates = report.duplicates, "Fresh set contained duplicate keys");
        }

        let fresh_keys: HashSet<String> = fresh.iter().map(|e| e.key.encode()).collect();
        let existing = self
            .store
            .run_keys(&Query::new(kind).filter_gt(R::TIMESTAMP_FIELD, min_date.timestamp()))
            .await
            .with_context(|| format!("query {} after {}", kind, min_date))?;

        let stale: Vec<Key> = existing
            .into_iter()
            .filter(|k| !fresh_keys.contains(&k.encode()))
            .collect();

        let size = chunk_size(self.batch_size, self.store.limits().max_batch_ops);

        for (i, chunk) in stale.chunks(size).enumerate() {
            debug!(kind, chunk = i, len = chunk.len(), "Deleting chunk");
            self.store
                .delete_multi(chunk)
                .await
                .with_context(|| format!("delete {} chunk {}", kind, i))?;
            report.deleted += chunk.len();
        }

        for (i, chunk) in fresh.chunks(size).enumerate() {
            debug!(kind, chunk = i, len = chunk.len(), "Upserting chunk");
            self.store
                .put_multi(chunk.to_vec())
                .await
                .with_context(|| format!("put {} chunk {}", kind, i))?;
            report.upserted += chunk.len();
        }

        info!(
            kind,
            upserted = report.upserted,
            deleted = report.deleted,
            expired = report.expired,
            "Synced flat collection"
        );

        Ok(report)
    }
}
