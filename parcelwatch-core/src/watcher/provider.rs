use std::time::Duration;

use async_trait::async_trait;
use parcelwatch_model::{MailboxId, UserId};

use crate::database::ports::queue::MessageSource;
use crate::error::Result;
use crate::mail::transport::MailSession;

/// A live connection plus the facts the loop needs to pick its wait mode.
pub struct ConnectOutcome {
    pub session: Box<dyn MailSession>,
    /// Push capability detected after authentication.
    pub push_supported: bool,
    /// Polling forced by configuration or missing push support.
    pub force_polling: bool,
    pub poll_interval: Duration,
}

impl std::fmt::Debug for ConnectOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectOutcome")
            .field("push_supported", &self.push_supported)
            .field("force_polling", &self.force_polling)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

/// Per-cycle scan facts, loaded fresh so config edits take effect on the
/// next cycle.
#[derive(Debug, Clone)]
pub struct FetchContext {
    pub last_uid: u32,
    pub folder_path: String,
    pub uid_validity: Option<u32>,
    pub max_age_days: i32,
    /// Human-readable origin recorded on captured items.
    pub source_info: String,
    pub mailbox_id: Option<MailboxId>,
}

/// Where a message goes after routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    Deliver {
        user_id: UserId,
        source: MessageSource,
    },
    /// Discard the message; the UID cursor still advances.
    Skip,
}

/// Provider-specific behavior injected into the generic watch loop.
///
/// One implementation exists per mailbox source: user-owned folders and
/// the global shared mailbox.
#[async_trait]
pub trait WatchProvider: Send + Sync {
    /// Human-readable label for log messages, e.g. `folder INBOX/Shipping`.
    fn label(&self) -> String;

    /// Open and authenticate a connection, select the folder, reconcile
    /// uid_validity, and persist detected capabilities. `None` means the
    /// watch target is gone or inactive and the watcher should stop.
    async fn connect(&self) -> Result<Option<ConnectOutcome>>;

    /// Load the current scan cursor and limits. `None` stops the watcher.
    async fn fetch_context(&self) -> Result<Option<FetchContext>>;

    /// Decide who owns a message, from the raw `From:` header value.
    async fn route(&self, sender: &str) -> Result<RouteOutcome>;

    /// Persist the UID cursor after a message is fully handled.
    async fn save_uid(&self, uid: u32) -> Result<()>;
}
