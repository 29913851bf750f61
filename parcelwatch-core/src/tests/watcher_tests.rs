//! Watcher scenarios: drain, dedup, UID cursor behavior, routing.

use std::sync::Arc;
use std::time::Duration;

use parcelwatch_model::QueueStatus;

use crate::crypto::SecretCipher;
use crate::database::ports::queue::QueueStore;
use crate::providers::{GlobalWatchProvider, UserFolderProvider};
use crate::tests::fixtures::{MemoryStore, ScriptedConnector, ScriptedMailbox, rfc822};
use crate::watcher::supervisor::{WatchTarget, WatcherSupervisor};

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..2000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}

struct UserWatch {
    store: Arc<MemoryStore>,
    mailbox: Arc<ScriptedMailbox>,
    supervisor: WatcherSupervisor,
    target: WatchTarget,
    folder_id: parcelwatch_model::FolderId,
}

fn user_watch(last_uid: u32, uid_validity: Option<u32>) -> UserWatch {
    let store = MemoryStore::new();
    let user = store.seed_user("jordan");
    let mailbox_row = store.seed_mailbox(user.id);
    let folder = store.seed_folder_with(mailbox_row.id, last_uid, uid_validity);

    let mailbox = ScriptedMailbox::new(uid_validity);
    let connector = ScriptedConnector::new(Arc::clone(&mailbox));

    let provider = Arc::new(UserFolderProvider::new(
        mailbox_row.id,
        folder.id,
        store.clone(),
        store.clone(),
        connector,
        SecretCipher::new("test-key"),
    ));

    let supervisor = WatcherSupervisor::new(store.clone() as Arc<dyn QueueStore>);
    let target = WatchTarget::UserFolder(folder.id);
    supervisor.start(target, provider);

    UserWatch {
        store,
        mailbox,
        supervisor,
        target,
        folder_id: folder.id,
    }
}

#[tokio::test(start_paused = true)]
async fn drain_captures_messages_in_uid_order_and_advances_the_cursor() {
    let watch = user_watch(0, Some(7));
    watch.mailbox.add_message(
        3,
        rfc822("orders@amazon.com", "Order one", Some("msg-3"), "ORD-1"),
    );
    watch.mailbox.add_message(
        5,
        rfc822("orders@amazon.com", "Order two", Some("msg-5"), "ORD-2"),
    );

    wait_until(|| watch.store.queue_items().len() == 2).await;
    wait_until(|| watch.store.folder(watch.folder_id).last_uid == 5).await;
    watch.supervisor.stop(&watch.target).await;

    let items = watch.store.queue_items();
    assert!(items.iter().all(|item| item.status == QueueStatus::Queued));
    // Ascending UID order is preserved into the queue.
    assert_eq!(items[0].raw_data.email_uid, 3);
    assert_eq!(items[1].raw_data.email_uid, 5);
    assert_eq!(items[0].raw_data.message_id, "<msg-3>");

    let seen = watch.store.seen_ids();
    assert_eq!(seen.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn second_drain_of_an_unchanged_mailbox_captures_nothing() {
    let watch = user_watch(0, Some(7));
    watch.mailbox.add_message(
        1,
        rfc822("orders@amazon.com", "Order", Some("msg-1"), "ORD-1"),
    );

    wait_until(|| watch.store.queue_items().len() == 1).await;
    watch.supervisor.stop(&watch.target).await;
    let seen_after_first = watch.store.seen_ids().len();

    // Restart and let at least one more full drain happen.
    let provider = Arc::new(UserFolderProvider::new(
        watch.store.folder(watch.folder_id).mailbox_id,
        watch.folder_id,
        watch.store.clone(),
        watch.store.clone(),
        ScriptedConnector::new(Arc::clone(&watch.mailbox)),
        SecretCipher::new("test-key"),
    ));
    let searches_before = watch.mailbox.search_count();
    watch.supervisor.start(watch.target, provider);
    wait_until(|| watch.mailbox.search_count() > searches_before).await;
    watch.supervisor.stop(&watch.target).await;

    assert_eq!(watch.store.seen_ids().len(), seen_after_first);
    assert_eq!(watch.store.queue_items().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn duplicate_message_ids_yield_a_single_queue_item() {
    let watch = user_watch(0, Some(7));
    // The same logical message observed under two UIDs.
    watch.mailbox.add_message(
        1,
        rfc822("orders@amazon.com", "Order", Some("same-id"), "ORD-1"),
    );
    watch.mailbox.add_message(
        2,
        rfc822("orders@amazon.com", "Order (copy)", Some("same-id"), "ORD-1"),
    );

    wait_until(|| watch.store.folder(watch.folder_id).last_uid == 2).await;
    watch.supervisor.stop(&watch.target).await;

    // One capture; the duplicate still advanced the cursor.
    assert_eq!(watch.store.queue_items().len(), 1);
    assert_eq!(watch.store.seen_ids(), vec!["<same-id>".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn uid_validity_change_resets_the_cursor_and_redrains() {
    let watch = user_watch(100, Some(42));
    watch.mailbox.set_uid_validity(43);
    watch.mailbox.add_message(
        1,
        rfc822("orders@amazon.com", "Order", Some("msg-1"), "ORD-1"),
    );
    watch.mailbox.add_message(
        2,
        rfc822("orders@amazon.com", "Order", Some("msg-2"), "ORD-2"),
    );

    wait_until(|| watch.store.queue_items().len() == 2).await;
    watch.supervisor.stop(&watch.target).await;

    let folder = watch.store.folder(watch.folder_id);
    assert_eq!(folder.uid_validity, Some(43));
    // Cursor was reset to zero, then advanced through the full re-drain.
    assert_eq!(folder.last_uid, 2);
}

#[tokio::test(start_paused = true)]
async fn messages_without_a_message_id_get_the_deterministic_fallback() {
    let watch = user_watch(0, Some(9));
    watch
        .mailbox
        .add_message(4, rfc822("orders@amazon.com", "Order", None, "ORD-1"));

    wait_until(|| watch.store.queue_items().len() == 1).await;
    watch.supervisor.stop(&watch.target).await;

    let seen = watch.store.seen_ids();
    let folder = watch.store.folder(watch.folder_id);
    let expected = crate::mail::message::fallback_message_id(
        Some(folder.mailbox_id),
        "INBOX",
        Some(9),
        4,
    );
    assert_eq!(seen, vec![expected]);
}

#[tokio::test(start_paused = true)]
async fn global_mailbox_discards_unbound_senders_but_advances_the_cursor() {
    let store = MemoryStore::new();
    let user = store.seed_user("jordan");
    store.seed_global(0);
    store.seed_binding(user.id, "orders@amazon.com");
    store.seed_module_enabled("mail-global");

    let mailbox = ScriptedMailbox::new(Some(1));
    mailbox.add_message(
        1,
        rfc822("random@nowhere.com", "Spam", Some("spam-1"), "hello"),
    );

    let provider = Arc::new(GlobalWatchProvider::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        ScriptedConnector::new(Arc::clone(&mailbox)),
        SecretCipher::new("test-key"),
    ));

    let supervisor = WatcherSupervisor::new(store.clone() as Arc<dyn QueueStore>);
    supervisor.start(WatchTarget::Global, provider);

    wait_until(|| store.global_mailbox().last_uid == 1).await;
    supervisor.stop(&WatchTarget::Global).await;

    assert!(store.queue_items().is_empty());
    assert!(store.seen_ids().is_empty());
}

#[tokio::test(start_paused = true)]
async fn global_mailbox_routes_bound_senders_to_their_user() {
    let store = MemoryStore::new();
    let user = store.seed_user("jordan");
    store.seed_global(0);
    store.seed_binding(user.id, "orders@amazon.com");
    store.seed_module_enabled("mail-global");

    let mailbox = ScriptedMailbox::new(Some(1));
    mailbox.add_message(
        1,
        // Display-name form; routing uses the lowercased bare address.
        rfc822("Amazon <Orders@Amazon.com>", "Order", Some("msg-1"), "ORD-1"),
    );

    let provider = Arc::new(GlobalWatchProvider::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        ScriptedConnector::new(Arc::clone(&mailbox)),
        SecretCipher::new("test-key"),
    ));

    let supervisor = WatcherSupervisor::new(store.clone() as Arc<dyn QueueStore>);
    supervisor.start(WatchTarget::Global, provider);

    wait_until(|| store.queue_items().len() == 1).await;
    supervisor.stop(&WatchTarget::Global).await;

    let item = &store.queue_items()[0];
    assert_eq!(item.user_id, user.id);
    assert_eq!(item.source_info, "global / INBOX");
}

#[tokio::test(start_paused = true)]
async fn starting_a_running_watcher_is_idempotent() {
    let watch = user_watch(0, Some(7));
    watch.mailbox.add_message(
        1,
        rfc822("orders@amazon.com", "Order", Some("msg-1"), "ORD-1"),
    );
    wait_until(|| watch.store.queue_items().len() == 1).await;

    let connects_before = watch.mailbox.connect_count();
    let provider = Arc::new(UserFolderProvider::new(
        watch.store.folder(watch.folder_id).mailbox_id,
        watch.folder_id,
        watch.store.clone(),
        watch.store.clone(),
        ScriptedConnector::new(Arc::clone(&watch.mailbox)),
        SecretCipher::new("test-key"),
    ));
    watch.supervisor.start(watch.target, provider);

    // No new task, so no reconnect burst beyond the poll cycle.
    assert!(watch.supervisor.is_running(&watch.target));
    assert!(watch.mailbox.connect_count() >= connects_before);
    watch.supervisor.stop(&watch.target).await;
    assert!(!watch.supervisor.is_running(&watch.target));
}
