use proptest::prelude::*;
use sdk::errors::{StoreError, SyncError, SyncErrorExt};
use sdk::key::{sanitize_name, Key};

// Every error variant yields a static, non-empty hint regardless of payload
proptest! {
    #[test]
    fn test_error_user_hint_completeness(error_str in "\\PC*") {
        let errs = vec![
            SyncError::NotFound(error_str.clone()),
            SyncError::Parse(error_str.clone()),
            SyncError::DataAnomaly(error_str.clone()),
            SyncError::Config(error_str.clone()),
            SyncError::store(error_str.clone(), StoreError::Backend(error_str.clone())),
            SyncError::store(error_str.clone(), StoreError::Commit(error_str.clone())),
        ];

        for err in errs {
            let hint = err.user_hint();
            prop_assert!(!hint.is_empty());
        }
    }
}

// Equal business fields always give the same encoded key
proptest! {
    #[test]
    fn test_key_identity_stable(
        meeting_id in 0..1_000_000i64,
        item_id in 0..1_000_000i64,
        title in "\\PC{0,40}",
    ) {
        let build = || {
            let meeting = Key::new("Meeting", meeting_id.to_string(), None).unwrap();
            let item = Key::new("AgendaItem", item_id.to_string(), Some(&meeting)).unwrap();
            Key::new("Attachment", format!("0_{}_{}_0_{}", meeting_id, item_id, title), Some(&item))
                .unwrap()
        };

        let first = build();
        let second = build();
        prop_assert_eq!(first.encode(), second.encode());
        prop_assert_eq!(&first, &second);
    }

    #[test]
    fn test_encoded_key_decodes_to_same_key(
        name in "\\PC{0,40}",
        parent_id in 1..10_000i64,
    ) {
        let parent = Key::new("Proposal", parent_id.to_string(), None).unwrap();
        let key = Key::new("Attachment", &name, Some(&parent)).unwrap();

        let decoded = Key::decode(&key.encode()).unwrap();
        prop_assert_eq!(decoded, key);
    }

    #[test]
    fn test_sanitize_is_idempotent(raw in "\\PC{0,60}") {
        let once = sanitize_name(&raw);
        prop_assert_eq!(sanitize_name(&once), once.clone());
        prop_assert!(once.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')));
    }
}
