use async_trait::async_trait;
use parcelwatch_model::{ImapSettings, LlmConfig, QueueSettings, SmtpConfig};

use crate::error::Result;

/// Singleton configuration rows. Reads fall back to defaults when the
/// row has never been written.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn imap_settings(&self) -> Result<ImapSettings>;

    async fn update_imap_settings(&self, settings: &ImapSettings) -> Result<()>;

    async fn queue_settings(&self) -> Result<QueueSettings>;

    async fn update_queue_settings(&self, settings: &QueueSettings) -> Result<()>;

    async fn llm_config(&self) -> Result<Option<LlmConfig>>;

    async fn upsert_llm_config(&self, config: &LlmConfig) -> Result<()>;

    async fn smtp_config(&self) -> Result<Option<SmtpConfig>>;

    async fn upsert_smtp_config(&self, config: &SmtpConfig) -> Result<()>;
}
