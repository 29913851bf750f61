//! Queue-store contract: exactly-once enqueue, FIFO claims, and
//! clone-based retries. The in-memory store mirrors the SQL semantics.

use parcelwatch_model::{QueueStatus, UserId};

use crate::database::ports::queue::{EnqueueOutcome, EnqueueRequest, MessageSource, QueueStore};
use crate::tests::fixtures::{MemoryStore, raw_email};

fn request(user_id: UserId, stable_message_id: &str) -> EnqueueRequest {
    EnqueueRequest {
        user_id,
        source: MessageSource::UserMailbox,
        source_info: "jordan@example.com / INBOX".into(),
        mailbox_id: None,
        folder_path: "INBOX".into(),
        stable_message_id: stable_message_id.to_string(),
        raw: raw_email(stable_message_id, 1),
    }
}

#[tokio::test]
async fn enqueueing_the_same_message_twice_yields_one_item() {
    let store = MemoryStore::new();
    let user = store.seed_user("jordan");

    let first = store.enqueue_if_unseen(request(user.id, "<dup>")).await.unwrap();
    let second = store.enqueue_if_unseen(request(user.id, "<dup>")).await.unwrap();

    assert!(matches!(first, EnqueueOutcome::Enqueued(_)));
    assert_eq!(second, EnqueueOutcome::AlreadySeen);
    assert_eq!(store.queue_items().len(), 1);
    assert_eq!(store.seen_ids().len(), 1);
}

#[tokio::test]
async fn claims_are_fifo_and_flip_to_processing() {
    let store = MemoryStore::new();
    let user = store.seed_user("jordan");
    let first = store.seed_queue_item(user.id, "<a>");
    let second = store.seed_queue_item(user.id, "<b>");

    let claimed = store.claim_next().await.unwrap().unwrap();
    assert_eq!(claimed.id, first.id);
    assert_eq!(claimed.status, QueueStatus::Processing);

    let claimed = store.claim_next().await.unwrap().unwrap();
    assert_eq!(claimed.id, second.id);

    // Nothing queued is left to claim.
    assert!(store.claim_next().await.unwrap().is_none());
}

#[tokio::test]
async fn retry_clones_the_failed_item_instead_of_requeueing_it() {
    let store = MemoryStore::new();
    let user = store.seed_user("jordan");
    let item = store.seed_queue_item(user.id, "<retry-me>");

    let claimed = store.claim_next().await.unwrap().unwrap();
    store.mark_failed(claimed.id, "analyzer blew up").await.unwrap();

    let clone = store.clone_for_retry(item.id).await.unwrap();

    let items = store.queue_items();
    assert_eq!(items.len(), 2);

    let original = items.iter().find(|i| i.id == item.id).unwrap();
    assert_eq!(original.status, QueueStatus::Failed);
    assert_eq!(original.error_message.as_deref(), Some("analyzer blew up"));

    assert_eq!(clone.status, QueueStatus::Queued);
    assert_eq!(clone.cloned_from, Some(item.id));
    assert_eq!(clone.raw_data, original.raw_data);
    assert!(clone.error_message.is_none());
}

#[tokio::test]
async fn terminal_items_keep_updated_at_after_created_at() {
    let store = MemoryStore::new();
    let user = store.seed_user("jordan");
    store.seed_queue_item(user.id, "<done>");

    let claimed = store.claim_next().await.unwrap().unwrap();
    store
        .mark_completed(claimed.id, Some(serde_json::json!({"ok": true})), None)
        .await
        .unwrap();

    let item = store.queue_items()[0].clone();
    assert!(item.status.is_terminal());
    assert!(item.updated_at >= item.created_at);
}
