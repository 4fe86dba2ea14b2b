//! In-memory document store
//!
//! Same contract as the SQLite store, held in a sorted map. Used by tests
//! and dry runs. Failure injection lets callers exercise the commit and
//! batch error paths without a real backend.

use super::{check_batch, check_transaction, DocumentStore, Entity, Mutation, Query, StoreLimits};
use async_trait::async_trait;
use sdk::errors::{StoreError, StoreResult};
use sdk::key::Key;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Mutex;

/// Kind of non-transactional call recorded by [`MemoryStore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchCall {
    Put(usize),
    Delete(usize),
}

pub struct MemoryStore {
    entities: Mutex<BTreeMap<String, Entity>>,
    limits: StoreLimits,
    fail_commits: AtomicBool,
    /// Batch calls allowed to succeed before every further one fails
    fail_batches_after: AtomicUsize,
    batch_calls: Mutex<Vec<BatchCall>>,
    commits: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_limits(StoreLimits::default())
    }

    pub fn with_limits(limits: StoreLimits) -> Self {
        Self {
            entities: Mutex::new(BTreeMap::new()),
            limits,
            fail_commits: AtomicBool::new(false),
            fail_batches_after: AtomicUsize::new(usize::MAX),
            batch_calls: Mutex::new(Vec::new()),
            commits: AtomicUsize::new(0),
        }
    }

    /// Make every following commit fail without applying anything
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Let `n` more batch calls succeed, then fail the rest
    pub fn fail_batches_after(&self, n: usize) {
        let done = self.batch_calls_blocking_len();
        self.fail_batches_after
            .store(done.saturating_add(n), Ordering::SeqCst);
    }

    fn batch_calls_blocking_len(&self) -> usize {
        self.batch_calls
            .try_lock()
            .map(|calls| calls.len())
            .unwrap_or_default()
    }

    /// Every put_multi/delete_multi call so far, in order
    pub async fn batch_calls(&self) -> Vec<BatchCall> {
        self.batch_calls.lock().await.clone()
    }

    /// Number of successful commits
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Number of stored entities
    pub async fn len(&self) -> usize {
        self.entities.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entities.lock().await.is_empty()
    }

    /// Insert entities directly, bypassing limits
    pub async fn seed(&self, entities: impl IntoIterator<Item = Entity>) {
        let mut map = self.entities.lock().await;
        for entity in entities {
            map.insert(entity.key.encode(), entity);
        }
    }

    async fn record_batch(&self, call: BatchCall) -> StoreResult<()> {
        let mut calls = self.batch_calls.lock().await;
        if calls.len() >= self.fail_batches_after.load(Ordering::SeqCst) {
            calls.push(call);
            return Err(StoreError::Backend("injected batch failure".to_string()));
        }
        calls.push(call);
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn limits(&self) -> StoreLimits {
        self.limits
    }

    async fn get(&self, key: &Key) -> StoreResult<Option<Entity>> {
        Ok(self.entities.lock().await.get(&key.encode()).cloned())
    }

    async fn get_multi(&self, keys: &[Key]) -> StoreResult<Vec<Entity>> {
        let map = self.entities.lock().await;
        Ok(keys
            .iter()
            .filter_map(|k| map.get(&k.encode()).cloned())
            .collect())
    }

    async fn run_keys(&self, query: &Query) -> StoreResult<Vec<Key>> {
        Ok(self
            .run(query)
            .await?
            .into_iter()
            .map(|entity| entity.key)
            .collect())
    }

    async fn run(&self, query: &Query) -> StoreResult<Vec<Entity>> {
        query.validate()?;
        let map = self.entities.lock().await;
        Ok(map
            .values()
            .filter(|entity| query.matches(&entity.key, &entity.properties))
            .cloned()
            .collect())
    }

    async fn put_multi(&self, entities: Vec<Entity>) -> StoreResult<()> {
        check_batch(entities.len(), self.limits.max_batch_ops)?;
        self.record_batch(BatchCall::Put(entities.len())).await?;

        let mut map = self.entities.lock().await;
        for entity in entities {
            map.insert(entity.key.encode(), entity);
        }
        Ok(())
    }

    async fn delete_multi(&self, keys: &[Key]) -> StoreResult<()> {
        check_batch(keys.len(), self.limits.max_batch_ops)?;
        self.record_batch(BatchCall::Delete(keys.len())).await?;

        let mut map = self.entities.lock().await;
        for key in keys {
            map.remove(&key.encode());
        }
        Ok(())
    }

    async fn commit(&self, mutations: Vec<Mutation>) -> StoreResult<()> {
        check_transaction(mutations.len(), self.limits.max_transaction_ops)?;
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(StoreError::Commit("injected commit failure".to_string()));
        }

        let mut map = self.entities.lock().await;
        for mutation in mutations {
            match mutation {
                Mutation::Put(entity) => {
                    map.insert(entity.key.encode(), entity);
                }
                Mutation::Delete(key) => {
                    map.remove(&key.encode());
                }
            }
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
