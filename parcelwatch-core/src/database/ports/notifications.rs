use async_trait::async_trait;
use parcelwatch_model::{NotificationConfig, UserId};

use crate::error::Result;

/// Per-user notifier delivery settings.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn configs_for_user(&self, user_id: UserId) -> Result<Vec<NotificationConfig>>;

    /// Keyed on `(user_id, module_key)`.
    async fn upsert(&self, config: &NotificationConfig) -> Result<()>;
}
