//! Transport seam between the watch loop and the mail protocol.
//!
//! The watch loop only sees these traits; the real IMAP implementation
//! lives in [`crate::mail::imap`], and tests drive the loop with scripted
//! sessions.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use parcelwatch_model::MailboxSecurity;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Everything needed to open one authenticated connection.
#[derive(Debug, Clone)]
pub struct MailboxEndpoint {
    pub host: String,
    pub port: u16,
    pub username: String,
    /// Decrypted password; lives only as long as the connection attempt.
    pub password: String,
    pub security: MailboxSecurity,
}

/// Folder facts reported by a `SELECT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FolderInfo {
    pub uid_validity: Option<u32>,
}

/// How a push wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The server signalled new messages; re-enter the drain.
    NewMail,
    /// The protocol timeout elapsed; re-issue the wait.
    Timeout,
    /// The watcher was cancelled while waiting.
    Cancelled,
}

/// One authenticated, folder-selectable connection.
#[async_trait]
pub trait MailSession: Send {
    /// Whether the server advertised push support after authentication.
    fn supports_idle(&self) -> bool;

    async fn select(&mut self, folder: &str) -> Result<FolderInfo>;

    /// Selectable folder paths on the server.
    async fn list_folders(&mut self) -> Result<Vec<String>>;

    /// `UID <first_uid>:*` intersected with `SINCE <since>`, ascending.
    async fn uid_search_since(&mut self, first_uid: u32, since: NaiveDate) -> Result<Vec<u32>>;

    /// Fetch one message body (RFC 822). `None` when the server returns
    /// nothing for the UID.
    async fn uid_fetch(&mut self, uid: u32) -> Result<Option<Vec<u8>>>;

    /// Block on the connection until the server pushes a new-message
    /// notification, the timeout elapses, or the token fires. A timeout is
    /// not an error.
    async fn idle_wait(&mut self, timeout: Duration, token: &CancellationToken)
    -> Result<PushOutcome>;

    async fn logout(&mut self) -> Result<()>;
}

/// Opens sessions; the only place that knows about sockets and TLS.
#[async_trait]
pub trait MailConnector: Send + Sync {
    async fn connect(&self, endpoint: &MailboxEndpoint) -> Result<Box<dyn MailSession>>;
}
