//! PostgreSQL implementations of the store ports.

pub mod bindings;
pub mod mailboxes;
pub mod modules;
pub mod notifications;
pub mod orders;
pub mod queue;
pub mod settings;
pub mod users;

use std::fmt;
use std::sync::Arc;

use sqlx::PgPool;

use crate::database::ports::bindings::BindingStore;
use crate::database::ports::mailboxes::MailboxStore;
use crate::database::ports::modules::ModuleStore;
use crate::database::ports::notifications::NotificationStore;
use crate::database::ports::orders::OrderStore;
use crate::database::ports::queue::QueueStore;
use crate::database::ports::settings::SettingsStore;
use crate::database::ports::users::UserStore;

pub use bindings::PostgresBindingRepository;
pub use mailboxes::PostgresMailboxRepository;
pub use modules::PostgresModuleRepository;
pub use notifications::PostgresNotificationRepository;
pub use orders::PostgresOrderRepository;
pub use queue::PostgresQueueRepository;
pub use settings::PostgresSettingsRepository;
pub use users::PostgresUserRepository;

/// The full set of stores the pipeline and API share.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserStore>,
    pub mailboxes: Arc<dyn MailboxStore>,
    pub queue: Arc<dyn QueueStore>,
    pub orders: Arc<dyn OrderStore>,
    pub modules: Arc<dyn ModuleStore>,
    pub bindings: Arc<dyn BindingStore>,
    pub settings: Arc<dyn SettingsStore>,
    pub notifications: Arc<dyn NotificationStore>,
}

impl Repositories {
    pub fn postgres(pool: &PgPool) -> Self {
        Self {
            users: Arc::new(PostgresUserRepository::new(pool.clone())),
            mailboxes: Arc::new(PostgresMailboxRepository::new(pool.clone())),
            queue: Arc::new(PostgresQueueRepository::new(pool.clone())),
            orders: Arc::new(PostgresOrderRepository::new(pool.clone())),
            modules: Arc::new(PostgresModuleRepository::new(pool.clone())),
            bindings: Arc::new(PostgresBindingRepository::new(pool.clone())),
            settings: Arc::new(PostgresSettingsRepository::new(pool.clone())),
            notifications: Arc::new(PostgresNotificationRepository::new(pool.clone())),
        }
    }
}

impl fmt::Debug for Repositories {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repositories").finish_non_exhaustive()
    }
}
