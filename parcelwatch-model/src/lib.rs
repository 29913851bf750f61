//! Core data model definitions shared across parcelwatch crates.
#![allow(missing_docs)]

pub mod analysis;
pub mod error;
pub mod ids;
pub mod mailbox;
pub mod module;
pub mod notify;
pub mod order;
pub mod queue;
pub mod settings;
pub mod user;
pub mod watch;

// Intentionally curated re-exports for downstream consumers.
pub use analysis::{AnalyzedItem, EmailAnalysis, EmailType};
pub use error::{ModelError, Result as ModelResult};
pub use ids::{FolderId, MailboxId, OrderId, QueueItemId, UserId};
pub use mailbox::{GlobalMailbox, Mailbox, MailboxSecurity, SenderBinding, WatchedFolder};
pub use module::{ModuleConfigRecord, ModuleKind};
pub use notify::{NotificationConfig, NotificationEvent};
pub use order::{Order, OrderItem, OrderState, OrderStatus};
pub use queue::{QueueItem, QueueStatus, RawEmail};
pub use settings::{ImapSettings, LlmConfig, QueueSettings, SmtpConfig};
pub use user::User;
pub use watch::{WatcherMode, WatcherStatus};
