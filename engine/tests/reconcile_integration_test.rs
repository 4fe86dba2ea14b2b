/// Integration tests for child-set reconciliation
///
/// Covers:
/// - Merge of stored and fresh agenda items under a meeting
/// - Idempotent re-runs
/// - Final child key set equals the fresh key set
/// - Best-effort deletes versus hard put and commit failures
/// - Filter-scoped children (proposal referrals)
use council_engine::config::EntityKinds;
use council_engine::db::{DocumentStore, Entity, MemoryStore, Query, StoreLimits};
use council_engine::reconcile::{merge, ChildSet, Reconciler};
use council_engine::resolver::KeyResolver;
use sdk::errors::SyncError;
use sdk::key::Key;
use sdk::types::AgendaItem;
use std::collections::BTreeSet;

fn resolver() -> KeyResolver {
    KeyResolver::new(EntityKinds::default(), "%Y-%m-%d-%H-%M")
}

fn item(meeting_id: i64, item_id: i64) -> AgendaItem {
    AgendaItem {
        meeting_id,
        item_id,
        ..Default::default()
    }
}

async fn seed_items(store: &MemoryStore, resolver: &KeyResolver, items: &[AgendaItem]) {
    let entities = items.iter().map(|i| {
        Entity::from_record(resolver.agenda_item_key(i.meeting_id, i.item_id).unwrap(), i).unwrap()
    });
    store.seed(entities).await;
}

async fn load(store: &MemoryStore, key: &Key) -> AgendaItem {
    store.get(key).await.unwrap().unwrap().to_record().unwrap()
}

async fn reconcile_meeting(
    store: &MemoryStore,
    resolver: &KeyResolver,
    meeting_id: i64,
    records: &[AgendaItem],
) -> Result<council_engine::reconcile::ReconcileReport, SyncError> {
    let parent = resolver.meeting_key(meeting_id).unwrap();
    Reconciler::new(store, resolver)
        .reconcile(
            ChildSet {
                parent: &parent,
                records,
                query: Query::new("AgendaItem").ancestor(&parent),
            },
            merge::agenda_item_in_meeting,
        )
        .await
}

async fn stored_keys(store: &MemoryStore, parent: &Key) -> BTreeSet<String> {
    store
        .run_keys(&Query::new("AgendaItem").ancestor(parent))
        .await
        .unwrap()
        .iter()
        .map(Key::encode)
        .collect()
}

#[tokio::test]
async fn test_blank_status_kept_subject_gained_new_item_inserted() {
    let store = MemoryStore::new();
    let resolver = resolver();

    let mut a1 = item(1, 1);
    a1.status = "open".to_string();
    seed_items(&store, &resolver, &[a1]).await;

    let mut fresh_a1 = item(1, 1);
    fresh_a1.status = String::new();
    fresh_a1.subject = "Budget".to_string();
    let mut fresh_a2 = item(1, 2);
    fresh_a2.subject = "New Item".to_string();

    let report = reconcile_meeting(&store, &resolver, 1, &[fresh_a1, fresh_a2])
        .await
        .unwrap();

    assert_eq!(report.updated, 1);
    assert_eq!(report.inserted, 1);
    assert_eq!(report.deleted, 0);
    assert!(report.failed_deletes.is_empty());

    let a1 = load(&store, &resolver.agenda_item_key(1, 1).unwrap()).await;
    assert_eq!(a1.status, "open");
    assert_eq!(a1.subject, "Budget");

    let a2 = load(&store, &resolver.agenda_item_key(1, 2).unwrap()).await;
    assert_eq!(a2.subject, "New Item");
}

#[tokio::test]
async fn test_second_run_is_a_no_op_merge() {
    let store = MemoryStore::new();
    let resolver = resolver();

    let mut records = vec![item(5, 1), item(5, 2), item(5, 3)];
    for (i, r) in records.iter_mut().enumerate() {
        r.subject = format!("Punkt {}", i);
        r.index_in_meeting = i as i32;
    }

    reconcile_meeting(&store, &resolver, 5, &records).await.unwrap();
    let after_first: Vec<Entity> = store
        .run(&Query::new("AgendaItem"))
        .await
        .unwrap();

    let report = reconcile_meeting(&store, &resolver, 5, &records).await.unwrap();
    let after_second: Vec<Entity> = store
        .run(&Query::new("AgendaItem"))
        .await
        .unwrap();

    assert_eq!(report.inserted, 0);
    assert_eq!(report.updated, 3);
    assert_eq!(report.deleted, 0);
    assert_eq!(after_first, after_second);
}

#[tokio::test]
async fn test_stale_children_deleted_and_key_set_matches_fresh() {
    let store = MemoryStore::new();
    let resolver = resolver();
    seed_items(&store, &resolver, &[item(2, 1), item(2, 2), item(2, 3)]).await;
    // Another meeting's items are out of scope
    seed_items(&store, &resolver, &[item(20, 1)]).await;

    let fresh = vec![item(2, 2), item(2, 4)];
    let report = reconcile_meeting(&store, &resolver, 2, &fresh).await.unwrap();

    assert_eq!(report.deleted, 2);
    assert_eq!(report.updated, 1);
    assert_eq!(report.inserted, 1);

    let parent = resolver.meeting_key(2).unwrap();
    let expected: BTreeSet<String> = fresh
        .iter()
        .map(|i| resolver.agenda_item_key(i.meeting_id, i.item_id).unwrap().encode())
        .collect();
    assert_eq!(stored_keys(&store, &parent).await, expected);

    let other = resolver.agenda_item_key(20, 1).unwrap();
    assert!(store.get(&other).await.unwrap().is_some());
}

#[tokio::test]
async fn test_delete_over_limit_is_logged_and_reported() {
    // Room for the two updates plus one of the two deletes; stored keys
    // are visited in key order, so the updates are buffered first
    let store = MemoryStore::with_limits(StoreLimits {
        max_transaction_ops: 3,
        max_batch_ops: 500,
    });
    let resolver = resolver();
    seed_items(
        &store,
        &resolver,
        &[item(3, 1), item(3, 2), item(3, 3), item(3, 4)],
    )
    .await;

    let fresh = vec![item(3, 1), item(3, 2)];
    let report = reconcile_meeting(&store, &resolver, 3, &fresh).await.unwrap();

    assert_eq!(report.updated, 2);
    assert_eq!(report.deleted, 1);
    assert_eq!(
        report.failed_deletes,
        vec![resolver.agenda_item_key(3, 4).unwrap()]
    );

    // The key set equals the fresh set plus exactly the reported failures
    let parent = resolver.meeting_key(3).unwrap();
    let mut expected: BTreeSet<String> = fresh
        .iter()
        .map(|i| resolver.agenda_item_key(i.meeting_id, i.item_id).unwrap().encode())
        .collect();
    expected.extend(report.failed_deletes.iter().map(Key::encode));
    assert_eq!(stored_keys(&store, &parent).await, expected);
}

#[tokio::test]
async fn test_put_over_limit_fails_without_partial_writes() {
    let store = MemoryStore::with_limits(StoreLimits {
        max_transaction_ops: 2,
        max_batch_ops: 500,
    });
    let resolver = resolver();
    seed_items(&store, &resolver, &[item(4, 1)]).await;

    let fresh = vec![item(4, 1), item(4, 2), item(4, 3)];
    let err = reconcile_meeting(&store, &resolver, 4, &fresh).await.unwrap_err();

    assert!(matches!(err, SyncError::Store { .. }));
    assert_eq!(store.len().await, 1);
    assert_eq!(store.commit_count(), 0);
}

#[tokio::test]
async fn test_commit_failure_leaves_store_untouched() {
    let store = MemoryStore::new();
    let resolver = resolver();
    seed_items(&store, &resolver, &[item(6, 1), item(6, 2)]).await;
    store.fail_commits(true);

    let err = reconcile_meeting(&store, &resolver, 6, &[item(6, 3)])
        .await
        .unwrap_err();

    assert!(err.to_string().contains("commit children of Meeting:6"));
    let parent = resolver.meeting_key(6).unwrap();
    assert_eq!(stored_keys(&store, &parent).await.len(), 2);
}

#[tokio::test]
async fn test_referrals_selected_by_proposal_id() {
    let store = MemoryStore::new();
    let resolver = resolver();

    let mut referral = item(7, 1);
    referral.proposal_id = 99;
    referral.index_in_meeting = 12;
    referral.resolution_status = "angenommen".to_string();
    let mut unrelated = item(7, 2);
    unrelated.proposal_id = 98;
    let mut dropped = item(8, 1);
    dropped.proposal_id = 99;
    seed_items(&store, &resolver, &[referral, unrelated, dropped]).await;

    let mut fresh = item(7, 1);
    fresh.proposal_id = 99;
    fresh.index_in_referral = 2;
    fresh.resolution_status = "  ".to_string();

    let parent = resolver.proposal_key(99).unwrap();
    let records = vec![fresh];
    let report = Reconciler::new(&store, &resolver)
        .reconcile(
            ChildSet {
                parent: &parent,
                records: &records,
                query: Query::new("AgendaItem").filter_eq("proposal_id", 99),
            },
            merge::agenda_item_in_referral,
        )
        .await
        .unwrap();

    assert_eq!(report.updated, 1);
    assert_eq!(report.deleted, 1);

    let merged = load(&store, &resolver.agenda_item_key(7, 1).unwrap()).await;
    assert_eq!(merged.index_in_referral, 2);
    assert_eq!(merged.index_in_meeting, 12);
    assert_eq!(merged.resolution_status, "angenommen");

    assert!(store
        .get(&resolver.agenda_item_key(7, 2).unwrap())
        .await
        .unwrap()
        .is_some());
    assert!(store
        .get(&resolver.agenda_item_key(8, 1).unwrap())
        .await
        .unwrap()
        .is_none());
}
