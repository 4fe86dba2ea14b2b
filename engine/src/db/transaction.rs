//! Buffered store transactions
//!
//! Mutations are collected in memory and handed to the store in one atomic
//! [`DocumentStore::commit`] call. The buffer enforces the store's
//! per-transaction operation ceiling at the moment an operation is added, so
//! an oversized plan fails on the offending put or delete rather than at
//! commit time.

use super::{DocumentStore, Entity};
use sdk::errors::{StoreError, StoreResult};
use sdk::key::Key;
use tracing::debug;

/// Single buffered write
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Put(Entity),
    Delete(Key),
}

impl Mutation {
    pub fn key(&self) -> &Key {
        match self {
            Mutation::Put(entity) => &entity.key,
            Mutation::Delete(key) => key,
        }
    }
}

/// Write-only transaction against a [`DocumentStore`]
///
/// Reads belong before the transaction is opened; nothing here holds a
/// lock on the store until [`Transaction::commit`].
pub struct Transaction<'a> {
    store: &'a dyn DocumentStore,
    mutations: Vec<Mutation>,
    max_ops: usize,
}

impl<'a> Transaction<'a> {
    pub fn new(store: &'a dyn DocumentStore) -> Self {
        Self {
            store,
            mutations: Vec::new(),
            max_ops: store.limits().max_transaction_ops,
        }
    }

    /// Number of buffered mutations
    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    fn reserve(&self, count: usize) -> StoreResult<()> {
        let attempted = self.mutations.len() + count;
        if attempted > self.max_ops {
            return Err(StoreError::TransactionLimit {
                attempted,
                limit: self.max_ops,
            });
        }
        Ok(())
    }

    pub fn put(&mut self, entity: Entity) -> StoreResult<()> {
        self.reserve(1)?;
        self.mutations.push(Mutation::Put(entity));
        Ok(())
    }

    pub fn delete(&mut self, key: &Key) -> StoreResult<()> {
        self.reserve(1)?;
        self.mutations.push(Mutation::Delete(key.clone()));
        Ok(())
    }

    /// Buffer all deletes or none of them
    pub fn delete_multi(&mut self, keys: &[Key]) -> StoreResult<()> {
        self.reserve(keys.len())?;
        self.mutations
            .extend(keys.iter().cloned().map(Mutation::Delete));
        Ok(())
    }

    /// Apply every buffered mutation atomically
    pub async fn commit(self) -> StoreResult<()> {
        debug!("Committing transaction with {} mutations", self.mutations.len());
        self.store.commit(self.mutations).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, StoreLimits};
    use serde_json::json;

    fn entity(name: &str) -> Entity {
        Entity {
            key: Key::new("Meeting", name, None).unwrap(),
            properties: json!({"title": name}),
        }
    }

    #[tokio::test]
    async fn test_limit_enforced_on_add() {
        let store = MemoryStore::with_limits(StoreLimits {
            max_transaction_ops: 2,
            max_batch_ops: 10,
        });
        let mut tx = Transaction::new(&store);

        tx.put(entity("1")).unwrap();
        tx.put(entity("2")).unwrap();
        let err = tx.put(entity("3")).unwrap_err();

        assert!(matches!(
            err,
            StoreError::TransactionLimit {
                attempted: 3,
                limit: 2
            }
        ));
        assert_eq!(tx.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_multi_is_all_or_nothing() {
        let store = MemoryStore::with_limits(StoreLimits {
            max_transaction_ops: 2,
            max_batch_ops: 10,
        });
        let mut tx = Transaction::new(&store);
        tx.put(entity("1")).unwrap();

        let keys = vec![entity("2").key, entity("3").key];
        assert!(tx.delete_multi(&keys).is_err());
        assert_eq!(tx.len(), 1);
    }

    #[tokio::test]
    async fn test_nothing_visible_before_commit() {
        let store = MemoryStore::new();
        let mut tx = Transaction::new(&store);
        tx.put(entity("1")).unwrap();

        assert!(store.get(&entity("1").key).await.unwrap().is_none());

        tx.commit().await.unwrap();
        assert!(store.get(&entity("1").key).await.unwrap().is_some());
    }
}
