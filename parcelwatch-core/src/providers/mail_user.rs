//! Watcher provider for user-owned mailboxes, one watcher per folder.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parcelwatch_model::{FolderId, Mailbox, MailboxId, WatchedFolder};
use serde_json::json;
use tracing::{info, warn};

use crate::crypto::SecretCipher;
use crate::database::ports::mailboxes::MailboxStore;
use crate::database::ports::queue::MessageSource;
use crate::database::ports::settings::SettingsStore;
use crate::error::{CoreError, Result};
use crate::mail::transport::{MailConnector, MailboxEndpoint};
use crate::modules::ModuleHooks;
use crate::watcher::provider::{ConnectOutcome, FetchContext, RouteOutcome, WatchProvider};
use crate::watcher::supervisor::{WatchTarget, WatcherSupervisor};

pub const MODULE_KEY: &str = "mail-user";

/// [`WatchProvider`] bound to one watched folder of one user mailbox.
pub struct UserFolderProvider {
    mailbox_id: MailboxId,
    folder_id: FolderId,
    mailboxes: Arc<dyn MailboxStore>,
    settings: Arc<dyn SettingsStore>,
    connector: Arc<dyn MailConnector>,
    cipher: SecretCipher,
}

impl UserFolderProvider {
    pub fn new(
        mailbox_id: MailboxId,
        folder_id: FolderId,
        mailboxes: Arc<dyn MailboxStore>,
        settings: Arc<dyn SettingsStore>,
        connector: Arc<dyn MailConnector>,
        cipher: SecretCipher,
    ) -> Self {
        Self {
            mailbox_id,
            folder_id,
            mailboxes,
            settings,
            connector,
            cipher,
        }
    }

    async fn load(&self) -> Result<Option<(Mailbox, WatchedFolder)>> {
        let Some(mailbox) = self.mailboxes.get_mailbox(self.mailbox_id).await? else {
            return Ok(None);
        };
        let Some(folder) = self.mailboxes.get_folder(self.folder_id).await? else {
            return Ok(None);
        };
        if !mailbox.is_active {
            return Ok(None);
        }
        Ok(Some((mailbox, folder)))
    }
}

#[async_trait]
impl WatchProvider for UserFolderProvider {
    fn label(&self) -> String {
        format!("folder {}", self.folder_id)
    }

    async fn connect(&self) -> Result<Option<ConnectOutcome>> {
        let Some((mailbox, folder)) = self.load().await? else {
            return Ok(None);
        };

        let password = self.cipher.decrypt(&mailbox.password_encrypted)?;
        let mut session = self
            .connector
            .connect(&MailboxEndpoint {
                host: mailbox.host.clone(),
                port: mailbox.port,
                username: mailbox.username.clone(),
                password,
                security: mailbox.security,
            })
            .await?;

        // Persist the detected capability; a server without push forces
        // polling permanently.
        let push_supported = session.supports_idle();
        let mut prefer_polling = mailbox.prefer_polling;
        if mailbox.idle_supported != Some(push_supported) {
            self.mailboxes
                .set_idle_supported(self.mailbox_id, push_supported)
                .await?;
            if !push_supported && !prefer_polling {
                self.mailboxes
                    .set_prefer_polling(self.mailbox_id, true)
                    .await?;
                prefer_polling = true;
                info!(
                    "mailbox {}: push not supported, forcing polling mode",
                    self.mailbox_id
                );
            }
        }

        let folder_info = session.select(&folder.path).await?;

        let imap_settings = self.settings.imap_settings().await?;
        if imap_settings.check_uidvalidity {
            if let Some(current) = folder_info.uid_validity {
                match folder.uid_validity {
                    None => {
                        self.mailboxes
                            .set_folder_validity(self.folder_id, current, false)
                            .await?;
                    }
                    Some(stored) if stored != current => {
                        warn!(
                            "UIDVALIDITY changed for folder {}: {stored} -> {current}, resetting scan cursor",
                            self.folder_id
                        );
                        self.mailboxes
                            .set_folder_validity(self.folder_id, current, true)
                            .await?;
                    }
                    Some(_) => {}
                }
            }
        }

        Ok(Some(ConnectOutcome {
            session,
            push_supported,
            force_polling: prefer_polling,
            poll_interval: Duration::from_secs(mailbox.poll_interval_secs as u64),
        }))
    }

    async fn fetch_context(&self) -> Result<Option<FetchContext>> {
        let Some((mailbox, folder)) = self.load().await? else {
            return Ok(None);
        };

        let imap_settings = self.settings.imap_settings().await?;
        let max_age_days = folder
            .max_age_days
            .unwrap_or(imap_settings.max_email_age_days);

        Ok(Some(FetchContext {
            last_uid: folder.last_uid,
            folder_path: folder.path.clone(),
            uid_validity: folder.uid_validity,
            max_age_days,
            source_info: format!("{} / {}", mailbox.username, folder.path),
            mailbox_id: Some(self.mailbox_id),
        }))
    }

    async fn route(&self, _sender: &str) -> Result<RouteOutcome> {
        match self.mailboxes.get_mailbox(self.mailbox_id).await? {
            Some(mailbox) => Ok(RouteOutcome::Deliver {
                user_id: mailbox.user_id,
                source: MessageSource::UserMailbox,
            }),
            None => Ok(RouteOutcome::Skip),
        }
    }

    async fn save_uid(&self, uid: u32) -> Result<()> {
        self.mailboxes.save_folder_uid(self.folder_id, uid).await
    }
}

/// Module-level service: starts one watcher per active watched folder and
/// reports per-folder worker state.
pub struct MailUserModule {
    supervisor: Arc<WatcherSupervisor>,
    mailboxes: Arc<dyn MailboxStore>,
    settings: Arc<dyn SettingsStore>,
    connector: Arc<dyn MailConnector>,
    cipher: SecretCipher,
}

impl std::fmt::Debug for MailUserModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailUserModule").finish_non_exhaustive()
    }
}

impl MailUserModule {
    pub fn new(
        supervisor: Arc<WatcherSupervisor>,
        mailboxes: Arc<dyn MailboxStore>,
        settings: Arc<dyn SettingsStore>,
        connector: Arc<dyn MailConnector>,
        cipher: SecretCipher,
    ) -> Self {
        Self {
            supervisor,
            mailboxes,
            settings,
            connector,
            cipher,
        }
    }

    fn provider_for(&self, mailbox_id: MailboxId, folder_id: FolderId) -> Arc<dyn WatchProvider> {
        Arc::new(UserFolderProvider::new(
            mailbox_id,
            folder_id,
            Arc::clone(&self.mailboxes),
            Arc::clone(&self.settings),
            Arc::clone(&self.connector),
            self.cipher.clone(),
        ))
    }

    /// Start watchers for every folder of every active mailbox.
    pub async fn start_all(&self) -> Result<()> {
        for (mailbox, folder) in self.mailboxes.list_active_folders().await? {
            self.supervisor.start(
                WatchTarget::UserFolder(folder.id),
                self.provider_for(mailbox.id, folder.id),
            );
        }
        Ok(())
    }

    pub async fn stop_all(&self) {
        for target in self.supervisor.running_targets() {
            if matches!(target, WatchTarget::UserFolder(_)) {
                self.supervisor.stop(&target).await;
            }
        }
    }

    /// Restart one folder watcher, used for manual "scan now".
    pub async fn restart_folder(&self, folder_id: FolderId) -> Result<()> {
        let folder = self
            .mailboxes
            .get_folder(folder_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("folder {folder_id}")))?;

        self.supervisor
            .restart(
                WatchTarget::UserFolder(folder_id),
                self.provider_for(folder.mailbox_id, folder_id),
            )
            .await;
        Ok(())
    }

    pub fn is_scanning(&self, folder_id: FolderId) -> bool {
        self.supervisor
            .is_scanning(&WatchTarget::UserFolder(folder_id))
    }

    pub async fn status_json(&self) -> Result<serde_json::Value> {
        let mut folders = Vec::new();
        let mut running_count = 0usize;
        let mut error_count = 0usize;

        for (mailbox, folder) in self.mailboxes.list_active_folders().await? {
            let target = WatchTarget::UserFolder(folder.id);
            let running = self.supervisor.is_running(&target);
            let status = self.supervisor.status(&target);

            if running {
                running_count += 1;
            }
            if status.as_ref().is_some_and(|s| s.error.is_some()) {
                error_count += 1;
            }

            folders.push(json!({
                "folder_id": folder.id,
                "mailbox_id": mailbox.id,
                "mailbox_name": mailbox.name,
                "folder_path": folder.path,
                "running": running,
                "state": status,
            }));
        }

        Ok(json!({
            "total_folders": folders.len(),
            "running": running_count,
            "errors": error_count,
            "folders": folders,
        }))
    }
}

#[async_trait]
impl ModuleHooks for MailUserModule {
    async fn startup(&self) -> Result<()> {
        self.start_all().await
    }

    async fn shutdown(&self) -> Result<()> {
        self.stop_all().await;
        Ok(())
    }

    async fn status(&self) -> Result<Option<serde_json::Value>> {
        self.status_json().await.map(Some)
    }
}
