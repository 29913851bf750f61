use async_trait::async_trait;
use parcelwatch_model::{SenderBinding, UserId};
use uuid::Uuid;

use crate::error::Result;

/// Sender-address routing for the global mailbox.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BindingStore: Send + Sync {
    /// Lookup by lowercased bare address.
    async fn find_by_address(&self, email_address: &str) -> Result<Option<SenderBinding>>;

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<SenderBinding>>;

    /// Stores the address lowercased; duplicates are a conflict.
    async fn insert(&self, user_id: UserId, email_address: &str) -> Result<SenderBinding>;

    async fn delete(&self, user_id: UserId, id: Uuid) -> Result<bool>;
}
