//! Retention sweep: age-based deletion plus the per-user cap.

use std::sync::Arc;

use parcelwatch_model::QueueSettings;

use crate::database::ports::settings::SettingsStore;
use crate::processing::RetentionSweeper;
use crate::tests::fixtures::MemoryStore;

#[tokio::test]
async fn items_older_than_the_age_limit_are_removed() {
    let store = MemoryStore::new();
    let user = store.seed_user("jordan");

    let old = store.seed_queue_item(user.id, "<old>");
    store.seed_queue_item(user.id, "<fresh>");
    store.backdate_queue_item(old.id, 10);

    let sweeper = RetentionSweeper::new(store.clone(), store.clone());
    sweeper.run().await.unwrap();

    let remaining = store.queue_items();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].raw_data.message_id, "<fresh>");
}

#[tokio::test]
async fn per_user_overflow_drops_oldest_items_first() {
    let store = MemoryStore::new();
    let user = store.seed_user("jordan");
    let other = store.seed_user("casey");

    store
        .update_queue_settings(&QueueSettings {
            max_age_days: 7,
            max_per_user: 2,
        })
        .await
        .unwrap();

    for i in 0..4 {
        store.seed_queue_item(user.id, &format!("<u-{i}>"));
    }
    store.seed_queue_item(other.id, "<other>");

    let sweeper = RetentionSweeper::new(store.clone(), store.clone());
    sweeper.run().await.unwrap();

    let mine: Vec<String> = store
        .queue_items()
        .iter()
        .filter(|item| item.user_id == user.id)
        .map(|item| item.raw_data.message_id.clone())
        .collect();
    assert_eq!(mine, vec!["<u-2>".to_string(), "<u-3>".to_string()]);

    // The other user's single item is untouched by the cap.
    assert_eq!(
        store
            .queue_items()
            .iter()
            .filter(|item| item.user_id == other.id)
            .count(),
        1
    );
}

#[tokio::test]
async fn limits_below_one_are_clamped() {
    let store: Arc<MemoryStore> = MemoryStore::new();
    store
        .update_queue_settings(&QueueSettings {
            max_age_days: 0,
            max_per_user: 0,
        })
        .await
        .unwrap();

    let settings = store.queue_settings().await.unwrap();
    assert_eq!(settings.max_age_days, 1);
    assert_eq!(settings.max_per_user, 1);
}
