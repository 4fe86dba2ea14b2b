/// Integration tests for the flat appointment sync
///
/// Covers:
/// - Stale appointments inside the window are deleted, fresh ones upserted
/// - Appointments before the cutoff are never touched
/// - An empty extraction is an error and writes nothing
/// - Chunking and fail-fast behaviour against the in-memory and SQLite stores
use chrono::{DateTime, Duration, TimeZone, Utc};
use council_engine::batch::FlatCollectionSyncer;
use council_engine::config::{EntityKinds, StoreConfig};
use council_engine::db::memory::BatchCall;
use council_engine::db::{Database, DocumentStore, Entity, MemoryStore, Query, StoreLimits};
use council_engine::resolver::KeyResolver;
use sdk::errors::SyncError;
use sdk::types::Appointment;
use tempfile::TempDir;

fn resolver() -> KeyResolver {
    KeyResolver::new(EntityKinds::default(), "%Y-%m-%d-%H-%M")
}

fn cutoff() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
}

fn appointment(committee: &str, start: DateTime<Utc>) -> Appointment {
    Appointment {
        committee: committee.to_string(),
        meeting_id: start.timestamp() % 1000,
        start,
        end: start + Duration::hours(2),
        ..Default::default()
    }
}

async fn seed(store: &dyn DocumentStore, resolver: &KeyResolver, appointments: &[Appointment]) {
    let entities = appointments
        .iter()
        .map(|a| Entity::from_record(resolver.appointment_key(a).unwrap(), a).unwrap())
        .collect();
    store.put_multi(entities).await.unwrap();
}

#[tokio::test]
async fn test_missing_appointment_deleted_present_one_upserted() {
    let store = MemoryStore::new();
    let resolver = resolver();
    let t1 = appointment("CommitteeX", cutoff() + Duration::days(1));
    let t2 = appointment("CommitteeX", cutoff() + Duration::days(2));
    seed(&store, &resolver, &[t1.clone(), t2.clone()]).await;

    let mut fresh_t1 = t1.clone();
    fresh_t1.meeting_id = 4711;

    let report = FlatCollectionSyncer::new(&store, &resolver, 500)
        .sync(vec![fresh_t1], cutoff())
        .await
        .unwrap();

    assert_eq!(report.deleted, 1);
    assert_eq!(report.upserted, 1);

    let t1_key = resolver.appointment_key(&t1).unwrap();
    let stored: Appointment = store.get(&t1_key).await.unwrap().unwrap().to_record().unwrap();
    assert_eq!(stored.meeting_id, 4711);

    let t2_key = resolver.appointment_key(&t2).unwrap();
    assert!(store.get(&t2_key).await.unwrap().is_none());
}

#[tokio::test]
async fn test_appointments_before_cutoff_are_kept() {
    let store = MemoryStore::new();
    let resolver = resolver();
    let old = appointment("Rat", cutoff() - Duration::days(10));
    let at_cutoff = appointment("Rat", cutoff());
    seed(&store, &resolver, &[old.clone(), at_cutoff.clone()]).await;

    FlatCollectionSyncer::new(&store, &resolver, 500)
        .sync(vec![appointment("Rat", cutoff() + Duration::days(1))], cutoff())
        .await
        .unwrap();

    assert!(store
        .get(&resolver.appointment_key(&old).unwrap())
        .await
        .unwrap()
        .is_some());
    assert!(store
        .get(&resolver.appointment_key(&at_cutoff).unwrap())
        .await
        .unwrap()
        .is_some());
    assert_eq!(store.len().await, 3);
}

#[tokio::test]
async fn test_empty_extraction_is_error_without_mutation() {
    let store = MemoryStore::new();
    let resolver = resolver();
    seed(
        &store,
        &resolver,
        &[appointment("Rat", cutoff() + Duration::days(1))],
    )
    .await;
    let calls_before = store.batch_calls().await.len();

    let err = FlatCollectionSyncer::new(&store, &resolver, 500)
        .sync(Vec::<Appointment>::new(), cutoff())
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::DataAnomaly(ref m) if m == "empty result set"));
    assert_eq!(store.batch_calls().await.len(), calls_before);
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn test_deletes_run_before_upserts_in_chunks() {
    let store = MemoryStore::new();
    let resolver = resolver();
    let stale: Vec<Appointment> = (1..=3)
        .map(|h| appointment("Alt", cutoff() + Duration::hours(h)))
        .collect();
    seed(&store, &resolver, &stale).await;

    let fresh: Vec<Appointment> = (1..=5)
        .map(|d| appointment("Neu", cutoff() + Duration::days(d)))
        .collect();

    FlatCollectionSyncer::new(&store, &resolver, 2)
        .sync(fresh, cutoff())
        .await
        .unwrap();

    let calls = store.batch_calls().await;
    assert_eq!(
        &calls[1..],
        &[
            BatchCall::Delete(2),
            BatchCall::Delete(1),
            BatchCall::Put(2),
            BatchCall::Put(2),
            BatchCall::Put(1),
        ]
    );
}

#[tokio::test]
async fn test_failed_chunk_stops_sync_and_keeps_earlier_chunks() {
    let store = MemoryStore::with_limits(StoreLimits {
        max_transaction_ops: 500,
        max_batch_ops: 2,
    });
    let resolver = resolver();
    store.fail_batches_after(1);

    let fresh: Vec<Appointment> = (1..=5)
        .map(|d| appointment("Rat", cutoff() + Duration::days(d)))
        .collect();

    let err = FlatCollectionSyncer::new(&store, &resolver, 500)
        .sync(fresh, cutoff())
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Store { .. }));
    assert_eq!(store.len().await, 2);
    assert_eq!(store.batch_calls().await.len(), 2);
}

#[tokio::test]
async fn test_window_replaced_in_sqlite_store() {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::new(&temp_dir.path().join("council.db"), &StoreConfig::default())
        .await
        .unwrap();
    let resolver = resolver();

    let kept_past = appointment("Bauausschuss", cutoff() - Duration::days(3));
    let stale = appointment("Bauausschuss", cutoff() + Duration::days(3));
    seed(&db, &resolver, &[kept_past.clone(), stale.clone()]).await;

    let fresh = vec![
        appointment("Bauausschuss", cutoff() + Duration::days(4)),
        appointment("Rat", cutoff() + Duration::days(5)),
    ];

    let report = FlatCollectionSyncer::new(&db, &resolver, 500)
        .sync(fresh, cutoff())
        .await
        .unwrap();

    assert_eq!(report.deleted, 1);
    assert_eq!(report.upserted, 2);

    let after_cutoff = db
        .run_keys(&Query::new("Appointment").filter_gt("start", cutoff().timestamp()))
        .await
        .unwrap();
    assert_eq!(after_cutoff.len(), 2);
    assert!(db
        .get(&resolver.appointment_key(&kept_past).unwrap())
        .await
        .unwrap()
        .is_some());

    db.close().await.unwrap();
}
