/// Document store module
///
/// This module defines the keyed document store contract the reconciler
/// works against and provides its SQLite implementation. Entities are JSON
/// bodies addressed by hierarchical [`Key`]s; queries are scoped by kind,
/// optionally by ancestor, and by simple field filters evaluated with
/// `json_extract`. Writes happen either through non-transactional batch
/// calls bounded by `max_batch_ops` or through an atomic commit of a
/// buffered [`Transaction`] bounded by `max_transaction_ops`.
use async_trait::async_trait;
use sdk::errors::{StoreError, StoreResult};
use sdk::key::Key;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{ConnectOptions, QueryBuilder, Row, Sqlite};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::StoreConfig;

pub mod memory;
pub mod query;
pub mod transaction;

// Re-export commonly used types
pub use memory::MemoryStore;
pub use query::{Filter, FilterOp, Query};
pub use transaction::{Mutation, Transaction};

/// Keys per `IN (...)` lookup, well under SQLite's bound-variable limit
const LOOKUP_CHUNK: usize = 500;

/// Operation ceilings of a store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreLimits {
    /// Maximum mutations in one atomic commit
    pub max_transaction_ops: usize,
    /// Maximum items in one multi-put or multi-delete call
    pub max_batch_ops: usize,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            max_transaction_ops: 500,
            max_batch_ops: 500,
        }
    }
}

impl From<&StoreConfig> for StoreLimits {
    fn from(config: &StoreConfig) -> Self {
        Self {
            max_transaction_ops: config.max_transaction_ops,
            max_batch_ops: config.max_batch_ops,
        }
    }
}

/// Keyed JSON document
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub key: Key,
    pub properties: Value,
}

impl Entity {
    /// Serialize a record as the body stored under `key`
    pub fn from_record<R: Serialize>(key: Key, record: &R) -> StoreResult<Self> {
        let properties = serde_json::to_value(record).map_err(|e| StoreError::Codec {
            key: key.encode(),
            reason: e.to_string(),
        })?;
        Ok(Self { key, properties })
    }

    /// Decode the stored body into a record
    pub fn to_record<R: DeserializeOwned>(&self) -> StoreResult<R> {
        serde_json::from_value(self.properties.clone()).map_err(|e| StoreError::Codec {
            key: self.key.encode(),
            reason: e.to_string(),
        })
    }
}

/// Keyed document store with ancestor queries and bounded transactions
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Operation ceilings of this store
    fn limits(&self) -> StoreLimits;

    /// Fetch one entity; a missing key is `Ok(None)`
    async fn get(&self, key: &Key) -> StoreResult<Option<Entity>>;

    /// Fetch many entities in input order, skipping keys that do not exist
    async fn get_multi(&self, keys: &[Key]) -> StoreResult<Vec<Entity>>;

    /// Keys-only query, ordered by encoded key
    async fn run_keys(&self, query: &Query) -> StoreResult<Vec<Key>>;

    /// Full query, ordered by encoded key
    async fn run(&self, query: &Query) -> StoreResult<Vec<Entity>>;

    /// Non-transactional multi-put bounded by `max_batch_ops`
    async fn put_multi(&self, entities: Vec<Entity>) -> StoreResult<()>;

    /// Non-transactional multi-delete bounded by `max_batch_ops`
    async fn delete_multi(&self, keys: &[Key]) -> StoreResult<()>;

    /// Apply buffered mutations atomically, bounded by `max_transaction_ops`
    async fn commit(&self, mutations: Vec<Mutation>) -> StoreResult<()>;
}

pub(crate) fn check_batch(attempted: usize, limit: usize) -> StoreResult<()> {
    if attempted > limit {
        return Err(StoreError::BatchLimit { attempted, limit });
    }
    Ok(())
}

pub(crate) fn check_transaction(attempted: usize, limit: usize) -> StoreResult<()> {
    if attempted > limit {
        return Err(StoreError::TransactionLimit { attempted, limit });
    }
    Ok(())
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// SQLite-backed document store
pub struct Database {
    pool: SqlitePool,
    limits: StoreLimits,
}

impl Database {
    /// Open (and create if missing) the database at `db_path`
    ///
    /// Enables WAL mode and runs the embedded migration. SQLite recovers
    /// any committed WAL content left by an unclean shutdown on open.
    pub async fn new(db_path: &Path, config: &StoreConfig) -> StoreResult<Self> {
        info!("Initializing document store at: {}", db_path.display());

        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Backend(format!("Failed to create database directory: {}", e)))?;
        }

        let connection_string = format!("sqlite:{}", db_path.display());
        let options = SqliteConnectOptions::from_str(&connection_string)
            .map_err(backend)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(config.busy_timeout_secs))
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(backend)?;

        debug!("Database connection established");

        let db = Self {
            pool,
            limits: StoreLimits::from(config),
        };

        db.run_migrations().await?;

        Ok(db)
    }

    async fn run_migrations(&self) -> StoreResult<()> {
        info!("Running database migrations");

        sqlx::raw_sql(include_str!("../../migrations/001_initial.sql"))
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to execute migration 001_initial.sql: {}", e)))?;

        Ok(())
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Number of stored entities per kind
    pub async fn count_by_kind(&self) -> StoreResult<Vec<(String, i64)>> {
        let rows = sqlx::query("SELECT kind, COUNT(*) AS n FROM entities GROUP BY kind ORDER BY kind")
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

        Ok(rows
            .into_iter()
            .map(|r| (r.get("kind"), r.get("n")))
            .collect())
    }

    /// Flush the WAL to disk
    pub async fn flush_wal(&self) -> StoreResult<()> {
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        debug!("WAL flushed successfully");
        Ok(())
    }

    /// Flush the WAL and close all connections
    pub async fn close(self) -> StoreResult<()> {
        self.flush_wal().await?;
        self.pool.close().await;

        info!("Document store closed");
        Ok(())
    }

    fn build_select<'q>(columns: &str, query: &'q Query) -> StoreResult<QueryBuilder<'q, Sqlite>> {
        query.validate()?;

        let mut builder = QueryBuilder::new(format!("SELECT {} FROM entities WHERE kind = ", columns));
        builder.push_bind(query.kind.as_str());

        if let Some(ancestor) = &query.ancestor {
            let encoded = ancestor.encode();
            let prefix = format!("{}/", encoded);
            builder.push(" AND (key = ");
            builder.push_bind(encoded);
            builder.push(" OR substr(key, 1, ");
            builder.push_bind(prefix.len() as i64);
            builder.push(") = ");
            builder.push_bind(prefix);
            builder.push(")");
        }

        for filter in &query.filters {
            builder.push(" AND json_extract(body, ");
            builder.push_bind(format!("$.{}", filter.field));
            builder.push(")");

            match &filter.value {
                Value::Null => match filter.op {
                    FilterOp::Eq => {
                        builder.push(" IS NULL");
                    }
                    FilterOp::Gt => {
                        return Err(StoreError::InvalidQuery(format!(
                            "'>' against null on '{}'",
                            filter.field
                        )))
                    }
                },
                value => {
                    builder.push(" ");
                    builder.push(filter.op.as_sql());
                    builder.push(" ");
                    match value {
                        Value::Number(n) => {
                            if let Some(i) = n.as_i64() {
                                builder.push_bind(i);
                            } else {
                                builder.push_bind(n.as_f64().unwrap_or_default());
                            }
                        }
                        Value::String(s) => {
                            builder.push_bind(s.as_str());
                        }
                        Value::Bool(b) => {
                            builder.push_bind(*b as i64);
                        }
                        _ => {
                            return Err(StoreError::InvalidQuery(format!(
                                "non-scalar filter on '{}'",
                                filter.field
                            )))
                        }
                    }
                }
            }
        }

        builder.push(" ORDER BY key");
        Ok(builder)
    }

    fn entity_from_row(row: &SqliteRow) -> StoreResult<Entity> {
        let encoded: String = row.try_get("key").map_err(backend)?;
        let body: String = row.try_get("body").map_err(backend)?;

        let key = Key::decode(&encoded)?;
        let properties = serde_json::from_str(&body).map_err(|e| StoreError::Codec {
            key: encoded,
            reason: e.to_string(),
        })?;

        Ok(Entity { key, properties })
    }

    async fn upsert<'c, E>(executor: E, entity: &Entity, now: i64) -> StoreResult<()>
    where
        E: sqlx::Executor<'c, Database = Sqlite>,
    {
        let body = serde_json::to_string(&entity.properties).map_err(|e| StoreError::Codec {
            key: entity.key.encode(),
            reason: e.to_string(),
        })?;

        sqlx::query(
            "INSERT INTO entities (key, kind, parent_key, body, updated_at) VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(key) DO UPDATE SET kind = excluded.kind, parent_key = excluded.parent_key, \
             body = excluded.body, updated_at = excluded.updated_at",
        )
        .bind(entity.key.encode())
        .bind(entity.key.kind())
        .bind(entity.key.parent().map(Key::encode))
        .bind(body)
        .bind(now)
        .execute(executor)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn remove<'c, E>(executor: E, key: &Key) -> StoreResult<()>
    where
        E: sqlx::Executor<'c, Database = Sqlite>,
    {
        sqlx::query("DELETE FROM entities WHERE key = ?")
            .bind(key.encode())
            .execute(executor)
            .await
            .map_err(backend)?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for Database {
    fn limits(&self) -> StoreLimits {
        self.limits
    }

    async fn get(&self, key: &Key) -> StoreResult<Option<Entity>> {
        let row = sqlx::query("SELECT key, body FROM entities WHERE key = ?")
            .bind(key.encode())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        row.as_ref().map(Self::entity_from_row).transpose()
    }

    async fn get_multi(&self, keys: &[Key]) -> StoreResult<Vec<Entity>> {
        let mut found: HashMap<String, Entity> = HashMap::with_capacity(keys.len());

        for chunk in keys.chunks(LOOKUP_CHUNK) {
            let mut builder = QueryBuilder::<Sqlite>::new("SELECT key, body FROM entities WHERE key IN (");
            let mut separated = builder.separated(", ");
            for key in chunk {
                separated.push_bind(key.encode());
            }
            separated.push_unseparated(")");

            let rows = builder.build().fetch_all(&self.pool).await.map_err(backend)?;
            for row in &rows {
                let entity = Self::entity_from_row(row)?;
                found.insert(entity.key.encode(), entity);
            }
        }

        Ok(keys
            .iter()
            .filter_map(|k| found.remove(&k.encode()))
            .collect())
    }

    async fn run_keys(&self, query: &Query) -> StoreResult<Vec<Key>> {
        let mut builder = Self::build_select("key", query)?;
        let rows = builder.build().fetch_all(&self.pool).await.map_err(backend)?;

        rows.iter()
            .map(|row| {
                let encoded: String = row.try_get("key").map_err(backend)?;
                Ok(Key::decode(&encoded)?)
            })
            .collect()
    }

    async fn run(&self, query: &Query) -> StoreResult<Vec<Entity>> {
        let mut builder = Self::build_select("key, body", query)?;
        let rows = builder.build().fetch_all(&self.pool).await.map_err(backend)?;

        rows.iter().map(Self::entity_from_row).collect()
    }

    async fn put_multi(&self, entities: Vec<Entity>) -> StoreResult<()> {
        check_batch(entities.len(), self.limits.max_batch_ops)?;
        let now = chrono::Utc::now().timestamp();

        let mut tx = self.pool.begin().await.map_err(backend)?;
        for entity in &entities {
            Self::upsert(&mut *tx, entity, now).await?;
        }
        tx.commit().await.map_err(backend)?;

        debug!("Put {} entities", entities.len());
        Ok(())
    }

    async fn delete_multi(&self, keys: &[Key]) -> StoreResult<()> {
        check_batch(keys.len(), self.limits.max_batch_ops)?;

        let mut tx = self.pool.begin().await.map_err(backend)?;
        for key in keys {
            Self::remove(&mut *tx, key).await?;
        }
        tx.commit().await.map_err(backend)?;

        debug!("Deleted {} entities", keys.len());
        Ok(())
    }

    async fn commit(&self, mutations: Vec<Mutation>) -> StoreResult<()> {
        check_transaction(mutations.len(), self.limits.max_transaction_ops)?;
        let now = chrono::Utc::now().timestamp();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Commit(e.to_string()))?;

        for mutation in &mutations {
            match mutation {
                Mutation::Put(entity) => Self::upsert(&mut *tx, entity, now).await?,
                Mutation::Delete(key) => Self::remove(&mut *tx, key).await?,
            }
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Commit(e.to_string()))
    }
}
