use async_trait::async_trait;
use parcelwatch_model::{FolderId, GlobalMailbox, Mailbox, MailboxId, UserId, WatchedFolder};

use crate::error::Result;

/// User mailboxes, their watched folders, and the global singleton.
///
/// UID cursor writes (`save_*_uid`, `set_*_validity`) are only ever
/// issued by the owning watcher.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailboxStore: Send + Sync {
    async fn insert_mailbox(&self, mailbox: &Mailbox) -> Result<()>;

    async fn update_mailbox(&self, mailbox: &Mailbox) -> Result<()>;

    async fn delete_mailbox(&self, user_id: UserId, id: MailboxId) -> Result<bool>;

    async fn get_mailbox(&self, id: MailboxId) -> Result<Option<Mailbox>>;

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Mailbox>>;

    async fn insert_folder(&self, folder: &WatchedFolder) -> Result<()>;

    async fn delete_folder(&self, id: FolderId) -> Result<bool>;

    async fn get_folder(&self, id: FolderId) -> Result<Option<WatchedFolder>>;

    async fn folders_for_mailbox(&self, mailbox_id: MailboxId) -> Result<Vec<WatchedFolder>>;

    /// Every watched folder whose mailbox is active, for watcher startup.
    async fn list_active_folders(&self) -> Result<Vec<(Mailbox, WatchedFolder)>>;

    /// Advance the folder's UID cursor. Monotonic per uid_validity.
    async fn save_folder_uid(&self, id: FolderId, uid: u32) -> Result<()>;

    /// Record the server-reported validity; with `reset_last_uid` the
    /// cursor drops to zero (validity change forces a full re-scan).
    async fn set_folder_validity(
        &self,
        id: FolderId,
        uid_validity: u32,
        reset_last_uid: bool,
    ) -> Result<()>;

    async fn set_idle_supported(&self, id: MailboxId, supported: bool) -> Result<()>;

    async fn set_prefer_polling(&self, id: MailboxId, prefer: bool) -> Result<()>;

    async fn global(&self) -> Result<Option<GlobalMailbox>>;

    async fn upsert_global(&self, global: &GlobalMailbox) -> Result<()>;

    async fn delete_global(&self) -> Result<bool>;

    async fn save_global_uid(&self, uid: u32) -> Result<()>;

    async fn set_global_validity(&self, uid_validity: u32, reset_last_uid: bool) -> Result<()>;

    async fn set_global_idle_supported(&self, supported: bool) -> Result<()>;

    async fn set_global_prefer_polling(&self, prefer: bool) -> Result<()>;
}
