//! Persistence: port traits the pipeline is generic over, plus their
//! PostgreSQL implementations.

pub mod ports;
pub mod repositories;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::error::Result;

pub use ports::bindings::BindingStore;
pub use ports::mailboxes::MailboxStore;
pub use ports::modules::ModuleStore;
pub use ports::notifications::NotificationStore;
pub use ports::orders::OrderStore;
pub use ports::queue::{EnqueueOutcome, EnqueueRequest, MessageSource, QueueStore};
pub use ports::settings::SettingsStore;
pub use ports::users::UserStore;
pub use repositories::Repositories;

/// Embedded schema migrations, applied at startup.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Open the connection pool the whole process shares.
pub async fn connect_pool(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    Ok(pool)
}
