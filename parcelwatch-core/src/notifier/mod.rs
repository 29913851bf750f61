//! Notifier modules and the best-effort fan-out that drives them.

pub mod webhook;

use std::sync::Arc;

use async_trait::async_trait;
use parcelwatch_model::{NotificationEvent, UserId};
use tracing::{error, info};

use crate::database::ports::modules::ModuleStore;
use crate::database::ports::notifications::NotificationStore;
use crate::error::Result;
use crate::modules::ModuleRegistry;

pub use webhook::WebhookNotifier;

/// A pluggable notification channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one event. `config` is the user's per-module settings.
    async fn notify(
        &self,
        user_id: UserId,
        event: NotificationEvent,
        event_data: &serde_json::Value,
        config: Option<&serde_json::Value>,
    ) -> Result<()>;
}

/// Fans an event out to every enabled notifier the user subscribed to.
///
/// Delivery is best-effort: failures are logged and never propagate into
/// the queue processor.
pub struct NotificationDispatcher {
    registry: Arc<ModuleRegistry>,
    modules: Arc<dyn ModuleStore>,
    store: Arc<dyn NotificationStore>,
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher").finish_non_exhaustive()
    }
}

impl NotificationDispatcher {
    pub fn new(
        registry: Arc<ModuleRegistry>,
        modules: Arc<dyn ModuleStore>,
        store: Arc<dyn NotificationStore>,
    ) -> Self {
        Self {
            registry,
            modules,
            store,
        }
    }

    pub async fn notify_user(
        &self,
        user_id: UserId,
        event: NotificationEvent,
        event_data: serde_json::Value,
    ) {
        let notifiers = self.registry.notifiers();
        if notifiers.is_empty() {
            return;
        }

        let configs = match self.store.configs_for_user(user_id).await {
            Ok(configs) => configs,
            Err(e) => {
                error!("failed to load notification configs for user {user_id}: {e}");
                return;
            }
        };

        for config in configs {
            if !config.enabled || !config.subscribes_to(event) {
                continue;
            }
            let Some(notifier) = notifiers
                .iter()
                .find(|(key, _)| *key == config.module_key)
                .map(|(_, notifier)| notifier)
            else {
                continue;
            };

            let module_enabled = match self.modules.get(&config.module_key).await {
                Ok(record) => record.map(|r| r.enabled).unwrap_or(false),
                Err(e) => {
                    error!("failed to check module {}: {e}", config.module_key);
                    continue;
                }
            };
            if !module_enabled {
                continue;
            }

            match notifier
                .notify(user_id, event, &event_data, config.config.as_ref())
                .await
            {
                Ok(()) => info!(
                    "notification sent via {} to user {user_id} for {}",
                    config.module_key,
                    event.as_str()
                ),
                Err(e) => error!(
                    "failed to send notification via {} to user {user_id}: {e}",
                    config.module_key
                ),
            }
        }
    }
}
