//! Shared test fixtures: an in-memory implementation of every store
//! port, a scripted mail server, and stub analyzer/notifier modules.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parcelwatch_model::{
    EmailAnalysis, FolderId, GlobalMailbox, ImapSettings, LlmConfig, Mailbox, MailboxId,
    MailboxSecurity, ModuleConfigRecord, NotificationConfig, NotificationEvent, Order, OrderId,
    OrderState, OrderStatus, QueueItem, QueueItemId, QueueSettings, QueueStatus, RawEmail,
    SenderBinding, SmtpConfig, User, UserId, WatchedFolder,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::analyzer::Analyzer;
use crate::database::ports::bindings::BindingStore;
use crate::database::ports::mailboxes::MailboxStore;
use crate::database::ports::modules::ModuleStore;
use crate::database::ports::notifications::NotificationStore;
use crate::database::ports::orders::OrderStore;
use crate::database::ports::queue::{EnqueueOutcome, EnqueueRequest, QueueStore};
use crate::database::ports::settings::SettingsStore;
use crate::database::ports::users::UserStore;
use crate::error::{CoreError, Result};
use crate::mail::transport::{
    FolderInfo, MailConnector, MailSession, MailboxEndpoint, PushOutcome,
};
use crate::notifier::Notifier;

// ---------------------------------------------------------------------
// In-memory stores
// ---------------------------------------------------------------------

#[derive(Default)]
struct MemoryState {
    users: Vec<User>,
    mailboxes: Vec<Mailbox>,
    folders: Vec<WatchedFolder>,
    global: Option<GlobalMailbox>,
    bindings: Vec<SenderBinding>,
    queue: Vec<QueueItem>,
    seen: Vec<SeenRecord>,
    orders: Vec<Order>,
    states: Vec<OrderState>,
    module_configs: Vec<ModuleConfigRecord>,
    imap_settings: Option<ImapSettings>,
    queue_settings: Option<QueueSettings>,
    llm_config: Option<LlmConfig>,
    smtp_config: Option<SmtpConfig>,
    notification_configs: Vec<NotificationConfig>,
    sequence: u64,
}

#[derive(Clone)]
struct SeenRecord {
    stable_message_id: String,
    #[allow(dead_code)]
    queue_item_id: QueueItemId,
}

/// One shared in-memory backing store implementing every port trait,
/// mirroring the Postgres repositories' semantics.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().expect("memory store poisoned")
    }

    /// Strictly increasing timestamps so FIFO ordering is unambiguous
    /// even when rows are created within the same instant.
    fn next_created_at(state: &mut MemoryState) -> DateTime<Utc> {
        state.sequence += 1;
        Utc::now() + chrono::Duration::microseconds(state.sequence as i64)
    }

    pub fn seed_user(&self, username: &str) -> User {
        let user = User {
            id: UserId::new(),
            username: username.to_string(),
            password_hash: "argon2-test-hash".to_string(),
            is_admin: false,
            created_at: Utc::now(),
        };
        self.lock().users.push(user.clone());
        user
    }

    pub fn seed_mailbox(&self, user_id: UserId) -> Mailbox {
        let mailbox = Mailbox {
            id: MailboxId::new(),
            user_id,
            name: "Test Mailbox".into(),
            host: "imap.example.com".into(),
            port: 993,
            username: "jordan@example.com".into(),
            password_encrypted: crate::crypto::SecretCipher::new("test-key")
                .encrypt("password")
                .unwrap(),
            security: MailboxSecurity::Ssl,
            poll_interval_secs: 300,
            prefer_polling: true,
            idle_supported: None,
            is_active: true,
            created_at: Utc::now(),
        };
        self.lock().mailboxes.push(mailbox.clone());
        mailbox
    }

    pub fn seed_folder_with(
        &self,
        mailbox_id: MailboxId,
        last_uid: u32,
        uid_validity: Option<u32>,
    ) -> WatchedFolder {
        let folder = WatchedFolder {
            id: FolderId::new(),
            mailbox_id,
            path: "INBOX".into(),
            last_uid,
            uid_validity,
            max_age_days: None,
        };
        self.lock().folders.push(folder.clone());
        folder
    }

    pub fn seed_global(&self, last_uid: u32) -> GlobalMailbox {
        let global = GlobalMailbox {
            host: "imap.example.com".into(),
            port: 993,
            username: "shared@example.com".into(),
            password_encrypted: crate::crypto::SecretCipher::new("test-key")
                .encrypt("password")
                .unwrap(),
            security: MailboxSecurity::Ssl,
            poll_interval_secs: 300,
            prefer_polling: true,
            idle_supported: None,
            watched_folder: "INBOX".into(),
            last_uid,
            uid_validity: None,
        };
        self.lock().global = Some(global.clone());
        global
    }

    pub fn seed_order(&self, user_id: UserId, order_number: &str) -> Order {
        let order = Order {
            id: OrderId::new(),
            user_id,
            order_number: Some(order_number.to_string()),
            tracking_number: None,
            carrier: None,
            vendor_name: None,
            vendor_domain: None,
            status: OrderStatus::Ordered,
            order_date: None,
            total_amount: None,
            currency: None,
            items: None,
            estimated_delivery: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let mut state = self.lock();
        state.orders.push(order.clone());
        state.states.push(OrderState {
            id: Uuid::now_v7(),
            order_id: order.id,
            status: order.status,
            source_type: Some("email".into()),
            source_info: Some("seed".into()),
            created_at: Utc::now(),
        });
        drop(state);
        order
    }

    pub fn seed_queue_item(&self, user_id: UserId, message_id: &str) -> QueueItem {
        let mut state = self.lock();
        let created_at = Self::next_created_at(&mut state);
        let item = QueueItem {
            id: QueueItemId::new(),
            user_id,
            status: QueueStatus::Queued,
            source_type: "email".into(),
            source_info: "seed / INBOX".into(),
            raw_data: raw_email(message_id, 1),
            extracted_data: None,
            error_message: None,
            order_id: None,
            cloned_from: None,
            created_at,
            updated_at: created_at,
        };
        state.queue.push(item.clone());
        item
    }

    pub fn seed_module_enabled(&self, key: &str) {
        let mut state = self.lock();
        if let Some(config) = state
            .module_configs
            .iter_mut()
            .find(|m| m.module_key == key)
        {
            config.enabled = true;
            return;
        }
        state.module_configs.push(ModuleConfigRecord {
            module_key: key.to_string(),
            enabled: true,
            priority: 0,
        });
    }

    pub fn seed_module_disabled(&self, key: &str) {
        let mut state = self.lock();
        if let Some(config) = state
            .module_configs
            .iter_mut()
            .find(|m| m.module_key == key)
        {
            config.enabled = false;
            return;
        }
        state.module_configs.push(ModuleConfigRecord {
            module_key: key.to_string(),
            enabled: false,
            priority: 0,
        });
    }

    pub fn seed_notification_config(&self, config: NotificationConfig) {
        self.lock().notification_configs.push(config);
    }

    /// Shift an item's creation time into the past, for retention tests.
    pub fn backdate_queue_item(&self, id: QueueItemId, days: i64) {
        let mut state = self.lock();
        if let Some(item) = state.queue.iter_mut().find(|item| item.id == id) {
            item.created_at -= chrono::Duration::days(days);
            item.updated_at = item.created_at;
        }
    }

    pub fn seed_binding(&self, user_id: UserId, address: &str) {
        self.lock().bindings.push(SenderBinding {
            id: Uuid::now_v7(),
            user_id,
            email_address: address.to_lowercase(),
            created_at: Utc::now(),
        });
    }

    pub fn queue_items(&self) -> Vec<QueueItem> {
        self.lock().queue.clone()
    }

    pub fn seen_ids(&self) -> Vec<String> {
        self.lock()
            .seen
            .iter()
            .map(|record| record.stable_message_id.clone())
            .collect()
    }

    pub fn orders(&self) -> Vec<Order> {
        self.lock().orders.clone()
    }

    pub fn states(&self) -> Vec<OrderState> {
        self.lock().states.clone()
    }

    pub fn folder(&self, id: FolderId) -> WatchedFolder {
        self.lock()
            .folders
            .iter()
            .find(|f| f.id == id)
            .cloned()
            .expect("folder not seeded")
    }

    pub fn global_mailbox(&self) -> GlobalMailbox {
        self.lock().global.clone().expect("global not seeded")
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert(&self, user: &User) -> Result<()> {
        let mut state = self.lock();
        if state.users.iter().any(|u| u.username == user.username) {
            return Err(CoreError::Conflict(format!(
                "username {} already exists",
                user.username
            )));
        }
        state.users.push(user.clone());
        Ok(())
    }

    async fn get(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.lock().users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .lock()
            .users
            .iter()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<User>> {
        Ok(self.lock().users.clone())
    }

    async fn delete(&self, id: UserId) -> Result<bool> {
        let mut state = self.lock();
        let before = state.users.len();
        state.users.retain(|u| u.id != id);
        Ok(state.users.len() < before)
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn enqueue_if_unseen(&self, request: EnqueueRequest) -> Result<EnqueueOutcome> {
        let mut state = self.lock();
        if state
            .seen
            .iter()
            .any(|record| record.stable_message_id == request.stable_message_id)
        {
            return Ok(EnqueueOutcome::AlreadySeen);
        }

        let created_at = Self::next_created_at(&mut state);
        let item = QueueItem {
            id: QueueItemId::new(),
            user_id: request.user_id,
            status: QueueStatus::Queued,
            source_type: "email".into(),
            source_info: request.source_info,
            raw_data: request.raw,
            extracted_data: None,
            error_message: None,
            order_id: None,
            cloned_from: None,
            created_at,
            updated_at: created_at,
        };
        let item_id = item.id;
        state.queue.push(item);
        state.seen.push(SeenRecord {
            stable_message_id: request.stable_message_id,
            queue_item_id: item_id,
        });
        Ok(EnqueueOutcome::Enqueued(item_id))
    }

    async fn claim_next(&self) -> Result<Option<QueueItem>> {
        let mut state = self.lock();
        let mut queued: Vec<&mut QueueItem> = state
            .queue
            .iter_mut()
            .filter(|item| item.status == QueueStatus::Queued)
            .collect();
        queued.sort_by_key(|item| item.created_at);

        Ok(queued.into_iter().next().map(|item| {
            item.status = QueueStatus::Processing;
            item.updated_at = Utc::now();
            item.clone()
        }))
    }

    async fn mark_completed(
        &self,
        id: QueueItemId,
        extracted_data: Option<serde_json::Value>,
        order_id: Option<OrderId>,
    ) -> Result<()> {
        let mut state = self.lock();
        if let Some(item) = state.queue.iter_mut().find(|item| item.id == id) {
            item.status = QueueStatus::Completed;
            if extracted_data.is_some() {
                item.extracted_data = extracted_data;
            }
            if order_id.is_some() {
                item.order_id = order_id;
            }
            item.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn mark_failed(&self, id: QueueItemId, error: &str) -> Result<()> {
        let mut state = self.lock();
        if let Some(item) = state.queue.iter_mut().find(|item| item.id == id) {
            item.status = QueueStatus::Failed;
            item.error_message = Some(error.to_string());
            item.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn clone_for_retry(&self, id: QueueItemId) -> Result<QueueItem> {
        let mut state = self.lock();
        let original = state
            .queue
            .iter()
            .find(|item| item.id == id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("queue item {id}")))?;

        let created_at = Self::next_created_at(&mut state);
        let clone = QueueItem {
            id: QueueItemId::new(),
            status: QueueStatus::Queued,
            extracted_data: None,
            error_message: None,
            order_id: None,
            cloned_from: Some(original.id),
            created_at,
            updated_at: created_at,
            ..original
        };
        state.queue.push(clone.clone());
        Ok(clone)
    }

    async fn get(&self, id: QueueItemId) -> Result<Option<QueueItem>> {
        Ok(self.lock().queue.iter().find(|item| item.id == id).cloned())
    }

    async fn list_for_user(&self, user_id: UserId, limit: i64) -> Result<Vec<QueueItem>> {
        let mut items: Vec<QueueItem> = self
            .lock()
            .queue
            .iter()
            .filter(|item| item.user_id == user_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        items.truncate(limit as usize);
        Ok(items)
    }

    async fn queued_count(&self) -> Result<i64> {
        Ok(self
            .lock()
            .queue
            .iter()
            .filter(|item| item.status == QueueStatus::Queued)
            .count() as i64)
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut state = self.lock();
        let before = state.queue.len();
        state.queue.retain(|item| item.created_at >= cutoff);
        Ok((before - state.queue.len()) as u64)
    }

    async fn delete_user_overflow(&self, max_per_user: i64) -> Result<u64> {
        let mut state = self.lock();
        let mut removed = 0u64;

        let user_ids: Vec<UserId> = state.queue.iter().map(|item| item.user_id).collect();
        let unique: Vec<UserId> = {
            let mut seen = Vec::new();
            for id in user_ids {
                if !seen.contains(&id) {
                    seen.push(id);
                }
            }
            seen
        };

        for user_id in unique {
            let mut owned: Vec<(QueueItemId, DateTime<Utc>)> = state
                .queue
                .iter()
                .filter(|item| item.user_id == user_id)
                .map(|item| (item.id, item.created_at))
                .collect();
            let overflow = owned.len() as i64 - max_per_user;
            if overflow <= 0 {
                continue;
            }
            owned.sort_by_key(|(_, created_at)| *created_at);
            let doomed: Vec<QueueItemId> = owned
                .into_iter()
                .take(overflow as usize)
                .map(|(id, _)| id)
                .collect();
            state.queue.retain(|item| !doomed.contains(&item.id));
            removed += doomed.len() as u64;
        }

        Ok(removed)
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert_with_state(&self, order: &Order, initial_state: &OrderState) -> Result<()> {
        // One lock, so order and state land together like the SQL
        // transaction does.
        let mut state = self.lock();
        state.orders.push(order.clone());
        state.states.push(initial_state.clone());
        Ok(())
    }

    async fn update_with_state<'a>(
        &self,
        order: &'a Order,
        order_state: Option<&'a OrderState>,
    ) -> Result<()> {
        let mut state = self.lock();
        if let Some(existing) = state.orders.iter_mut().find(|o| o.id == order.id) {
            *existing = order.clone();
        }
        if let Some(order_state) = order_state {
            state.states.push(order_state.clone());
        }
        Ok(())
    }

    async fn get(&self, user_id: UserId, id: OrderId) -> Result<Option<Order>> {
        Ok(self
            .lock()
            .orders
            .iter()
            .find(|o| o.user_id == user_id && o.id == id)
            .cloned())
    }

    async fn find_by_order_number(
        &self,
        user_id: UserId,
        order_number: &str,
    ) -> Result<Option<Order>> {
        Ok(self
            .lock()
            .orders
            .iter()
            .find(|o| o.user_id == user_id && o.order_number.as_deref() == Some(order_number))
            .cloned())
    }

    async fn find_by_tracking_number(
        &self,
        user_id: UserId,
        tracking_number: &str,
    ) -> Result<Option<Order>> {
        Ok(self
            .lock()
            .orders
            .iter()
            .find(|o| o.user_id == user_id && o.tracking_number.as_deref() == Some(tracking_number))
            .cloned())
    }

    async fn recent_by_vendor_domain(
        &self,
        user_id: UserId,
        vendor_domain: &str,
        limit: i64,
    ) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .lock()
            .orders
            .iter()
            .filter(|o| o.user_id == user_id && o.vendor_domain.as_deref() == Some(vendor_domain))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders.truncate(limit as usize);
        Ok(orders)
    }

    async fn list_for_user(&self, user_id: UserId, limit: i64, offset: i64) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .lock()
            .orders
            .iter()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn count_for_user(&self, user_id: UserId) -> Result<i64> {
        Ok(self
            .lock()
            .orders
            .iter()
            .filter(|o| o.user_id == user_id)
            .count() as i64)
    }

    async fn counts_by_status(&self, user_id: UserId) -> Result<Vec<(OrderStatus, i64)>> {
        let state = self.lock();
        let mut counts: BTreeMap<&'static str, (OrderStatus, i64)> = BTreeMap::new();
        for order in state.orders.iter().filter(|o| o.user_id == user_id) {
            counts
                .entry(order.status.as_str())
                .or_insert((order.status, 0))
                .1 += 1;
        }
        Ok(counts.into_values().collect())
    }

    async fn states_for(&self, order_id: OrderId) -> Result<Vec<OrderState>> {
        Ok(self
            .lock()
            .states
            .iter()
            .filter(|state| state.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn merge_orders(
        &self,
        user_id: UserId,
        source: OrderId,
        target: OrderId,
    ) -> Result<Order> {
        let mut state = self.lock();

        let target_order = state
            .orders
            .iter()
            .find(|o| o.user_id == user_id && o.id == target)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("order {target}")))?;

        let merged = {
            let source_order = state
                .orders
                .iter_mut()
                .find(|o| o.user_id == user_id && o.id == source)
                .ok_or_else(|| CoreError::NotFound(format!("order {source}")))?;

            if source_order.tracking_number.is_none() {
                source_order.tracking_number = target_order.tracking_number.clone();
            }
            if source_order.carrier.is_none() {
                source_order.carrier = target_order.carrier.clone();
            }
            if !target_order.status.is_initial() {
                source_order.status = target_order.status;
            }
            source_order.updated_at = Utc::now();
            source_order.clone()
        };

        for order_state in state.states.iter_mut() {
            if order_state.order_id == target {
                order_state.order_id = source;
            }
        }
        state.orders.retain(|o| o.id != target);

        Ok(merged)
    }

    async fn delete(&self, user_id: UserId, id: OrderId) -> Result<bool> {
        let mut state = self.lock();
        let before = state.orders.len();
        state.orders.retain(|o| !(o.user_id == user_id && o.id == id));
        Ok(state.orders.len() < before)
    }
}

#[async_trait]
impl MailboxStore for MemoryStore {
    async fn insert_mailbox(&self, mailbox: &Mailbox) -> Result<()> {
        self.lock().mailboxes.push(mailbox.clone());
        Ok(())
    }

    async fn update_mailbox(&self, mailbox: &Mailbox) -> Result<()> {
        let mut state = self.lock();
        if let Some(existing) = state.mailboxes.iter_mut().find(|m| m.id == mailbox.id) {
            *existing = mailbox.clone();
        }
        Ok(())
    }

    async fn delete_mailbox(&self, user_id: UserId, id: MailboxId) -> Result<bool> {
        let mut state = self.lock();
        let before = state.mailboxes.len();
        state
            .mailboxes
            .retain(|m| !(m.id == id && m.user_id == user_id));
        Ok(state.mailboxes.len() < before)
    }

    async fn get_mailbox(&self, id: MailboxId) -> Result<Option<Mailbox>> {
        Ok(self.lock().mailboxes.iter().find(|m| m.id == id).cloned())
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Mailbox>> {
        Ok(self
            .lock()
            .mailboxes
            .iter()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn insert_folder(&self, folder: &WatchedFolder) -> Result<()> {
        self.lock().folders.push(folder.clone());
        Ok(())
    }

    async fn delete_folder(&self, id: FolderId) -> Result<bool> {
        let mut state = self.lock();
        let before = state.folders.len();
        state.folders.retain(|f| f.id != id);
        Ok(state.folders.len() < before)
    }

    async fn get_folder(&self, id: FolderId) -> Result<Option<WatchedFolder>> {
        Ok(self.lock().folders.iter().find(|f| f.id == id).cloned())
    }

    async fn folders_for_mailbox(&self, mailbox_id: MailboxId) -> Result<Vec<WatchedFolder>> {
        Ok(self
            .lock()
            .folders
            .iter()
            .filter(|f| f.mailbox_id == mailbox_id)
            .cloned()
            .collect())
    }

    async fn list_active_folders(&self) -> Result<Vec<(Mailbox, WatchedFolder)>> {
        let state = self.lock();
        let mut out = Vec::new();
        for folder in &state.folders {
            if let Some(mailbox) = state
                .mailboxes
                .iter()
                .find(|m| m.id == folder.mailbox_id && m.is_active)
            {
                out.push((mailbox.clone(), folder.clone()));
            }
        }
        Ok(out)
    }

    async fn save_folder_uid(&self, id: FolderId, uid: u32) -> Result<()> {
        let mut state = self.lock();
        if let Some(folder) = state.folders.iter_mut().find(|f| f.id == id) {
            folder.last_uid = uid;
        }
        Ok(())
    }

    async fn set_folder_validity(
        &self,
        id: FolderId,
        uid_validity: u32,
        reset_last_uid: bool,
    ) -> Result<()> {
        let mut state = self.lock();
        if let Some(folder) = state.folders.iter_mut().find(|f| f.id == id) {
            folder.uid_validity = Some(uid_validity);
            if reset_last_uid {
                folder.last_uid = 0;
            }
        }
        Ok(())
    }

    async fn set_idle_supported(&self, id: MailboxId, supported: bool) -> Result<()> {
        let mut state = self.lock();
        if let Some(mailbox) = state.mailboxes.iter_mut().find(|m| m.id == id) {
            mailbox.idle_supported = Some(supported);
        }
        Ok(())
    }

    async fn set_prefer_polling(&self, id: MailboxId, prefer: bool) -> Result<()> {
        let mut state = self.lock();
        if let Some(mailbox) = state.mailboxes.iter_mut().find(|m| m.id == id) {
            mailbox.prefer_polling = prefer;
        }
        Ok(())
    }

    async fn global(&self) -> Result<Option<GlobalMailbox>> {
        Ok(self.lock().global.clone())
    }

    async fn upsert_global(&self, global: &GlobalMailbox) -> Result<()> {
        self.lock().global = Some(global.clone());
        Ok(())
    }

    async fn delete_global(&self) -> Result<bool> {
        Ok(self.lock().global.take().is_some())
    }

    async fn save_global_uid(&self, uid: u32) -> Result<()> {
        let mut state = self.lock();
        if let Some(global) = state.global.as_mut() {
            global.last_uid = uid;
        }
        Ok(())
    }

    async fn set_global_validity(&self, uid_validity: u32, reset_last_uid: bool) -> Result<()> {
        let mut state = self.lock();
        if let Some(global) = state.global.as_mut() {
            global.uid_validity = Some(uid_validity);
            if reset_last_uid {
                global.last_uid = 0;
            }
        }
        Ok(())
    }

    async fn set_global_idle_supported(&self, supported: bool) -> Result<()> {
        let mut state = self.lock();
        if let Some(global) = state.global.as_mut() {
            global.idle_supported = Some(supported);
        }
        Ok(())
    }

    async fn set_global_prefer_polling(&self, prefer: bool) -> Result<()> {
        let mut state = self.lock();
        if let Some(global) = state.global.as_mut() {
            global.prefer_polling = prefer;
        }
        Ok(())
    }
}

#[async_trait]
impl BindingStore for MemoryStore {
    async fn find_by_address(&self, email_address: &str) -> Result<Option<SenderBinding>> {
        Ok(self
            .lock()
            .bindings
            .iter()
            .find(|b| b.email_address == email_address.to_lowercase())
            .cloned())
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<SenderBinding>> {
        Ok(self
            .lock()
            .bindings
            .iter()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn insert(&self, user_id: UserId, email_address: &str) -> Result<SenderBinding> {
        let address = email_address.trim().to_lowercase();
        let mut state = self.lock();
        if state.bindings.iter().any(|b| b.email_address == address) {
            return Err(CoreError::Conflict(format!(
                "sender address {address} is already bound"
            )));
        }
        let binding = SenderBinding {
            id: Uuid::now_v7(),
            user_id,
            email_address: address,
            created_at: Utc::now(),
        };
        state.bindings.push(binding.clone());
        Ok(binding)
    }

    async fn delete(&self, user_id: UserId, id: Uuid) -> Result<bool> {
        let mut state = self.lock();
        let before = state.bindings.len();
        state
            .bindings
            .retain(|b| !(b.id == id && b.user_id == user_id));
        Ok(state.bindings.len() < before)
    }
}

#[async_trait]
impl ModuleStore for MemoryStore {
    async fn ensure_exists(&self, module_key: &str, default_enabled: bool) -> Result<()> {
        let mut state = self.lock();
        if !state
            .module_configs
            .iter()
            .any(|m| m.module_key == module_key)
        {
            state.module_configs.push(ModuleConfigRecord {
                module_key: module_key.to_string(),
                enabled: default_enabled,
                priority: 0,
            });
        }
        Ok(())
    }

    async fn get(&self, module_key: &str) -> Result<Option<ModuleConfigRecord>> {
        Ok(self
            .lock()
            .module_configs
            .iter()
            .find(|m| m.module_key == module_key)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<ModuleConfigRecord>> {
        let mut configs = self.lock().module_configs.clone();
        configs.sort_by(|a, b| (a.priority, &a.module_key).cmp(&(b.priority, &b.module_key)));
        Ok(configs)
    }

    async fn set_enabled(&self, module_key: &str, enabled: bool) -> Result<ModuleConfigRecord> {
        let mut state = self.lock();
        let config = state
            .module_configs
            .iter_mut()
            .find(|m| m.module_key == module_key)
            .ok_or_else(|| CoreError::NotFound(format!("module {module_key}")))?;
        config.enabled = enabled;
        Ok(config.clone())
    }

    async fn set_priority(&self, module_key: &str, priority: i32) -> Result<ModuleConfigRecord> {
        let mut state = self.lock();
        let config = state
            .module_configs
            .iter_mut()
            .find(|m| m.module_key == module_key)
            .ok_or_else(|| CoreError::NotFound(format!("module {module_key}")))?;
        config.priority = priority;
        Ok(config.clone())
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn imap_settings(&self) -> Result<ImapSettings> {
        Ok(self.lock().imap_settings.clone().unwrap_or_default())
    }

    async fn update_imap_settings(&self, settings: &ImapSettings) -> Result<()> {
        self.lock().imap_settings = Some(settings.clone());
        Ok(())
    }

    async fn queue_settings(&self) -> Result<QueueSettings> {
        Ok(self
            .lock()
            .queue_settings
            .clone()
            .unwrap_or_default()
            .clamped())
    }

    async fn update_queue_settings(&self, settings: &QueueSettings) -> Result<()> {
        self.lock().queue_settings = Some(settings.clone().clamped());
        Ok(())
    }

    async fn llm_config(&self) -> Result<Option<LlmConfig>> {
        Ok(self.lock().llm_config.clone())
    }

    async fn upsert_llm_config(&self, config: &LlmConfig) -> Result<()> {
        self.lock().llm_config = Some(config.clone());
        Ok(())
    }

    async fn smtp_config(&self) -> Result<Option<SmtpConfig>> {
        Ok(self.lock().smtp_config.clone())
    }

    async fn upsert_smtp_config(&self, config: &SmtpConfig) -> Result<()> {
        self.lock().smtp_config = Some(config.clone());
        Ok(())
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn configs_for_user(&self, user_id: UserId) -> Result<Vec<NotificationConfig>> {
        Ok(self
            .lock()
            .notification_configs
            .iter()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn upsert(&self, config: &NotificationConfig) -> Result<()> {
        let mut state = self.lock();
        state
            .notification_configs
            .retain(|c| !(c.user_id == config.user_id && c.module_key == config.module_key));
        state.notification_configs.push(config.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------
// Scripted mail server
// ---------------------------------------------------------------------

/// A fake mailbox the watcher connects to: UID-keyed raw messages plus a
/// server-reported uid_validity.
pub struct ScriptedMailbox {
    messages: Mutex<BTreeMap<u32, Vec<u8>>>,
    uid_validity: Mutex<Option<u32>>,
    supports_idle: bool,
    connects: AtomicUsize,
    searches: AtomicUsize,
}

impl std::fmt::Debug for ScriptedMailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedMailbox").finish_non_exhaustive()
    }
}

impl ScriptedMailbox {
    pub fn new(uid_validity: Option<u32>) -> Arc<Self> {
        Arc::new(Self {
            messages: Mutex::new(BTreeMap::new()),
            uid_validity: Mutex::new(uid_validity),
            supports_idle: false,
            connects: AtomicUsize::new(0),
            searches: AtomicUsize::new(0),
        })
    }

    pub fn add_message(&self, uid: u32, raw: impl Into<Vec<u8>>) {
        self.messages.lock().unwrap().insert(uid, raw.into());
    }

    pub fn set_uid_validity(&self, value: u32) {
        *self.uid_validity.lock().unwrap() = Some(value);
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn search_count(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

/// Hands out sessions against one [`ScriptedMailbox`].
#[derive(Debug)]
pub struct ScriptedConnector {
    mailbox: Arc<ScriptedMailbox>,
}

impl ScriptedConnector {
    pub fn new(mailbox: Arc<ScriptedMailbox>) -> Arc<Self> {
        Arc::new(Self { mailbox })
    }
}

#[async_trait]
impl MailConnector for ScriptedConnector {
    async fn connect(&self, _endpoint: &MailboxEndpoint) -> Result<Box<dyn MailSession>> {
        self.mailbox.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            mailbox: Arc::clone(&self.mailbox),
        }))
    }
}

struct ScriptedSession {
    mailbox: Arc<ScriptedMailbox>,
}

#[async_trait]
impl MailSession for ScriptedSession {
    fn supports_idle(&self) -> bool {
        self.mailbox.supports_idle
    }

    async fn select(&mut self, _folder: &str) -> Result<FolderInfo> {
        Ok(FolderInfo {
            uid_validity: *self.mailbox.uid_validity.lock().unwrap(),
        })
    }

    async fn list_folders(&mut self) -> Result<Vec<String>> {
        Ok(vec!["INBOX".to_string()])
    }

    async fn uid_search_since(&mut self, first_uid: u32, _since: NaiveDate) -> Result<Vec<u32>> {
        self.mailbox.searches.fetch_add(1, Ordering::SeqCst);
        let messages = self.mailbox.messages.lock().unwrap();
        let mut uids: Vec<u32> = messages.keys().copied().filter(|&u| u >= first_uid).collect();
        // Mimic the open-ended `N:*` quirk: the newest UID always comes
        // back, even when it is below the requested start.
        if uids.is_empty() {
            if let Some(&newest) = messages.keys().next_back() {
                uids.push(newest);
            }
        }
        Ok(uids)
    }

    async fn uid_fetch(&mut self, uid: u32) -> Result<Option<Vec<u8>>> {
        Ok(self.mailbox.messages.lock().unwrap().get(&uid).cloned())
    }

    async fn idle_wait(
        &mut self,
        _timeout: Duration,
        token: &CancellationToken,
    ) -> Result<PushOutcome> {
        token.cancelled().await;
        Ok(PushOutcome::Cancelled)
    }

    async fn logout(&mut self) -> Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------
// Stub analyzer / recording notifier
// ---------------------------------------------------------------------

/// Analyzer returning a programmed response for every item.
pub struct StubAnalyzer {
    response: Mutex<Option<EmailAnalysis>>,
    fail_with: Mutex<Option<String>>,
}

impl std::fmt::Debug for StubAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StubAnalyzer").finish_non_exhaustive()
    }
}

impl StubAnalyzer {
    pub fn returning(analysis: Option<EmailAnalysis>) -> Arc<Self> {
        Arc::new(Self {
            response: Mutex::new(analysis),
            fail_with: Mutex::new(None),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            response: Mutex::new(None),
            fail_with: Mutex::new(Some(message.to_string())),
        })
    }
}

#[async_trait]
impl Analyzer for StubAnalyzer {
    async fn analyze(&self, _raw: &RawEmail) -> Result<(Option<EmailAnalysis>, serde_json::Value)> {
        if let Some(message) = self.fail_with.lock().unwrap().clone() {
            return Err(CoreError::Analyzer(message));
        }
        let analysis = self.response.lock().unwrap().clone();
        let raw_value = analysis
            .as_ref()
            .map(|a| serde_json::to_value(a).unwrap())
            .unwrap_or_else(|| serde_json::json!({"is_relevant": false}));
        Ok((analysis, raw_value))
    }
}

/// Notifier that records every delivery instead of sending anything.
#[derive(Default)]
pub struct RecordingNotifier {
    pub deliveries: Mutex<Vec<(UserId, NotificationEvent, serde_json::Value)>>,
}

impl std::fmt::Debug for RecordingNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingNotifier").finish_non_exhaustive()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        user_id: UserId,
        event: NotificationEvent,
        event_data: &serde_json::Value,
        _config: Option<&serde_json::Value>,
    ) -> Result<()> {
        self.deliveries
            .lock()
            .unwrap()
            .push((user_id, event, event_data.clone()));
        Ok(())
    }
}

// ---------------------------------------------------------------------
// Message builders
// ---------------------------------------------------------------------

pub fn raw_email(message_id: &str, uid: u32) -> RawEmail {
    RawEmail {
        subject: "Order Confirmation".into(),
        sender: "orders@amazon.com".into(),
        body: "Your order ORD-500 has been received.".into(),
        message_id: message_id.to_string(),
        email_uid: uid,
        email_date: None,
    }
}

/// A minimal RFC 822 message for the scripted mailbox.
pub fn rfc822(from: &str, subject: &str, message_id: Option<&str>, body: &str) -> Vec<u8> {
    let mut out = String::new();
    out.push_str(&format!("From: {from}\r\n"));
    out.push_str("To: jordan@example.com\r\n");
    out.push_str(&format!("Subject: {subject}\r\n"));
    if let Some(id) = message_id {
        out.push_str(&format!("Message-ID: <{id}>\r\n"));
    }
    out.push_str("Date: Tue, 1 Jul 2026 10:00:00 +0000\r\n");
    out.push_str("Content-Type: text/plain; charset=utf-8\r\n");
    out.push_str("\r\n");
    out.push_str(body);
    out.push_str("\r\n");
    out.into_bytes()
}
