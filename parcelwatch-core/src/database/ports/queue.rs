use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parcelwatch_model::{MailboxId, OrderId, QueueItem, QueueItemId, RawEmail, UserId};

use crate::error::Result;

/// Which kind of mailbox captured a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSource {
    UserMailbox,
    GlobalMailbox,
}

impl MessageSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageSource::UserMailbox => "user_mailbox",
            MessageSource::GlobalMailbox => "global_mailbox",
        }
    }
}

/// Everything the watcher hands over when capturing one message.
#[derive(Debug, Clone)]
pub struct EnqueueRequest {
    pub user_id: UserId,
    pub source: MessageSource,
    /// Human-readable origin, e.g. `jordan@example.com / INBOX`.
    pub source_info: String,
    pub mailbox_id: Option<MailboxId>,
    pub folder_path: String,
    /// `Message-ID` or the deterministic fallback; the dedup key.
    pub stable_message_id: String,
    pub raw: RawEmail,
}

/// Result of a dedup-checked enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued(QueueItemId),
    AlreadySeen,
}

/// Captured-message queue with exactly-once enqueue per stable id.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Insert a queue item plus its seen-message marker in one
    /// transaction. A concurrent insert racing on the unique message id
    /// resolves to [`EnqueueOutcome::AlreadySeen`], never an error.
    async fn enqueue_if_unseen(&self, request: EnqueueRequest) -> Result<EnqueueOutcome>;

    /// Claim the oldest queued item, flipping it to `processing` in the
    /// claiming transaction. Concurrent claimers skip locked rows.
    async fn claim_next(&self) -> Result<Option<QueueItem>>;

    async fn mark_completed(
        &self,
        id: QueueItemId,
        extracted_data: Option<serde_json::Value>,
        order_id: Option<OrderId>,
    ) -> Result<()>;

    async fn mark_failed(&self, id: QueueItemId, error: &str) -> Result<()>;

    /// Retry = a fresh queued row with copied raw data and `cloned_from`
    /// set; the failed original stays failed.
    async fn clone_for_retry(&self, id: QueueItemId) -> Result<QueueItem>;

    async fn get(&self, id: QueueItemId) -> Result<Option<QueueItem>>;

    async fn list_for_user(&self, user_id: UserId, limit: i64) -> Result<Vec<QueueItem>>;

    async fn queued_count(&self) -> Result<i64>;

    /// Retention: drop items created before the cutoff.
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Retention: per-user cap, deleting oldest-first overflow.
    async fn delete_user_overflow(&self, max_per_user: i64) -> Result<u64>;
}
