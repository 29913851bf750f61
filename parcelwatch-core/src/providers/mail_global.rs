//! Watcher provider for the global shared mailbox, routed by sender
//! address bindings.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use crate::crypto::SecretCipher;
use crate::database::ports::bindings::BindingStore;
use crate::database::ports::mailboxes::MailboxStore;
use crate::database::ports::modules::ModuleStore;
use crate::database::ports::queue::MessageSource;
use crate::database::ports::settings::SettingsStore;
use crate::error::Result;
use crate::mail::message::extract_bare_address;
use crate::mail::transport::{MailConnector, MailboxEndpoint};
use crate::modules::ModuleHooks;
use crate::watcher::provider::{ConnectOutcome, FetchContext, RouteOutcome, WatchProvider};
use crate::watcher::supervisor::{WatchTarget, WatcherSupervisor};

pub const MODULE_KEY: &str = "mail-global";

/// [`WatchProvider`] for the singleton shared mailbox.
pub struct GlobalWatchProvider {
    mailboxes: Arc<dyn MailboxStore>,
    bindings: Arc<dyn BindingStore>,
    settings: Arc<dyn SettingsStore>,
    modules: Arc<dyn ModuleStore>,
    connector: Arc<dyn MailConnector>,
    cipher: SecretCipher,
}

impl GlobalWatchProvider {
    pub fn new(
        mailboxes: Arc<dyn MailboxStore>,
        bindings: Arc<dyn BindingStore>,
        settings: Arc<dyn SettingsStore>,
        modules: Arc<dyn ModuleStore>,
        connector: Arc<dyn MailConnector>,
        cipher: SecretCipher,
    ) -> Self {
        Self {
            mailboxes,
            bindings,
            settings,
            modules,
            connector,
            cipher,
        }
    }
}

#[async_trait]
impl WatchProvider for GlobalWatchProvider {
    fn label(&self) -> String {
        "global mailbox".to_string()
    }

    async fn connect(&self) -> Result<Option<ConnectOutcome>> {
        // The watcher stops itself when an admin disables the module.
        let enabled = self
            .modules
            .get(MODULE_KEY)
            .await?
            .map(|record| record.enabled)
            .unwrap_or(false);
        if !enabled {
            info!("global mailbox watcher stopping: module disabled");
            return Ok(None);
        }

        let Some(global) = self.mailboxes.global().await? else {
            return Ok(None);
        };

        let password = self.cipher.decrypt(&global.password_encrypted)?;
        let mut session = self
            .connector
            .connect(&MailboxEndpoint {
                host: global.host.clone(),
                port: global.port,
                username: global.username.clone(),
                password,
                security: global.security,
            })
            .await?;

        let push_supported = session.supports_idle();
        let mut prefer_polling = global.prefer_polling;
        if global.idle_supported != Some(push_supported) {
            self.mailboxes
                .set_global_idle_supported(push_supported)
                .await?;
            if !push_supported && !prefer_polling {
                self.mailboxes.set_global_prefer_polling(true).await?;
                prefer_polling = true;
                info!("global mailbox: push not supported, forcing polling mode");
            }
        }

        let folder_info = session.select(&global.watched_folder).await?;

        let imap_settings = self.settings.imap_settings().await?;
        if imap_settings.check_uidvalidity {
            if let Some(current) = folder_info.uid_validity {
                match global.uid_validity {
                    None => {
                        self.mailboxes.set_global_validity(current, false).await?;
                    }
                    Some(stored) if stored != current => {
                        warn!(
                            "UIDVALIDITY changed for global mailbox: {stored} -> {current}, resetting scan cursor"
                        );
                        self.mailboxes.set_global_validity(current, true).await?;
                    }
                    Some(_) => {}
                }
            }
        }

        Ok(Some(ConnectOutcome {
            session,
            push_supported,
            force_polling: prefer_polling,
            poll_interval: Duration::from_secs(global.poll_interval_secs as u64),
        }))
    }

    async fn fetch_context(&self) -> Result<Option<FetchContext>> {
        let Some(global) = self.mailboxes.global().await? else {
            return Ok(None);
        };

        let imap_settings = self.settings.imap_settings().await?;

        Ok(Some(FetchContext {
            last_uid: global.last_uid,
            folder_path: global.watched_folder.clone(),
            uid_validity: global.uid_validity,
            max_age_days: imap_settings.max_email_age_days,
            source_info: format!("global / {}", global.watched_folder),
            mailbox_id: None,
        }))
    }

    async fn route(&self, sender: &str) -> Result<RouteOutcome> {
        let address = extract_bare_address(sender);
        match self.bindings.find_by_address(&address).await? {
            Some(binding) => Ok(RouteOutcome::Deliver {
                user_id: binding.user_id,
                source: MessageSource::GlobalMailbox,
            }),
            None => {
                info!("global mailbox: discarding message from unbound sender {address}");
                Ok(RouteOutcome::Skip)
            }
        }
    }

    async fn save_uid(&self, uid: u32) -> Result<()> {
        self.mailboxes.save_global_uid(uid).await
    }
}

/// Module-level service for the global watcher lifecycle and status.
pub struct MailGlobalModule {
    supervisor: Arc<WatcherSupervisor>,
    mailboxes: Arc<dyn MailboxStore>,
    bindings: Arc<dyn BindingStore>,
    settings: Arc<dyn SettingsStore>,
    modules: Arc<dyn ModuleStore>,
    connector: Arc<dyn MailConnector>,
    cipher: SecretCipher,
}

impl std::fmt::Debug for MailGlobalModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailGlobalModule").finish_non_exhaustive()
    }
}

impl MailGlobalModule {
    pub fn new(
        supervisor: Arc<WatcherSupervisor>,
        mailboxes: Arc<dyn MailboxStore>,
        bindings: Arc<dyn BindingStore>,
        settings: Arc<dyn SettingsStore>,
        modules: Arc<dyn ModuleStore>,
        connector: Arc<dyn MailConnector>,
        cipher: SecretCipher,
    ) -> Self {
        Self {
            supervisor,
            mailboxes,
            bindings,
            settings,
            modules,
            connector,
            cipher,
        }
    }

    fn provider(&self) -> Arc<dyn WatchProvider> {
        Arc::new(GlobalWatchProvider::new(
            Arc::clone(&self.mailboxes),
            Arc::clone(&self.bindings),
            Arc::clone(&self.settings),
            Arc::clone(&self.modules),
            Arc::clone(&self.connector),
            self.cipher.clone(),
        ))
    }

    /// Start the watcher when a global mailbox is configured.
    pub async fn start(&self) -> Result<()> {
        if self.mailboxes.global().await?.is_some() {
            self.supervisor.start(WatchTarget::Global, self.provider());
        }
        Ok(())
    }

    pub async fn stop(&self) {
        self.supervisor.stop(&WatchTarget::Global).await;
    }

    pub async fn restart(&self) -> Result<()> {
        self.stop().await;
        self.start().await
    }

    pub async fn status_json(&self) -> Result<Option<serde_json::Value>> {
        let Some(global) = self.mailboxes.global().await? else {
            return Ok(None);
        };

        let running = self.supervisor.is_running(&WatchTarget::Global);
        let status = self.supervisor.status(&WatchTarget::Global);

        Ok(Some(json!({
            "watching": global.watched_folder,
            "running": running,
            "state": status,
        })))
    }
}

#[async_trait]
impl ModuleHooks for MailGlobalModule {
    async fn startup(&self) -> Result<()> {
        self.start().await
    }

    async fn shutdown(&self) -> Result<()> {
        self.stop().await;
        Ok(())
    }

    async fn status(&self) -> Result<Option<serde_json::Value>> {
        self.status_json().await
    }
}
