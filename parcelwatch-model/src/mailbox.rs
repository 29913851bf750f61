use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ModelError;
use crate::ids::{FolderId, MailboxId, UserId};

/// Transport security for the mail server connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailboxSecurity {
    Ssl,
    Starttls,
    None,
}

impl MailboxSecurity {
    pub fn as_str(&self) -> &'static str {
        match self {
            MailboxSecurity::Ssl => "ssl",
            MailboxSecurity::Starttls => "starttls",
            MailboxSecurity::None => "none",
        }
    }
}

impl std::str::FromStr for MailboxSecurity {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ssl" => Ok(MailboxSecurity::Ssl),
            "starttls" => Ok(MailboxSecurity::Starttls),
            "none" => Ok(MailboxSecurity::None),
            other => Err(ModelError::InvalidMailboxSecurity(other.to_string())),
        }
    }
}

/// A user-owned mail account watched by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mailbox {
    pub id: MailboxId,
    pub user_id: UserId,
    /// Display name chosen by the user, e.g. "Personal GMail".
    pub name: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_encrypted: String,
    pub security: MailboxSecurity,
    pub poll_interval_secs: u32,
    /// Forces polling even when the server advertises push support.
    pub prefer_polling: bool,
    /// Detected push capability; `None` until the first connection.
    pub idle_supported: Option<bool>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// A selectable folder within a user mailbox, with per-folder scan cursor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchedFolder {
    pub id: FolderId,
    pub mailbox_id: MailboxId,
    pub path: String,
    /// Highest UID already captured for the current `uid_validity`.
    pub last_uid: u32,
    /// Server-reported folder generation; a change resets `last_uid`.
    pub uid_validity: Option<u32>,
    /// Overrides the global max email age when set.
    pub max_age_days: Option<i32>,
}

/// The singleton shared mailbox routed by sender address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalMailbox {
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_encrypted: String,
    pub security: MailboxSecurity,
    pub poll_interval_secs: u32,
    pub prefer_polling: bool,
    pub idle_supported: Option<bool>,
    pub watched_folder: String,
    pub last_uid: u32,
    pub uid_validity: Option<u32>,
}

/// Routes global-mailbox messages to a user by their sender address.
///
/// Addresses are stored lowercased and are globally unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderBinding {
    pub id: Uuid,
    pub user_id: UserId,
    pub email_address: String,
    pub created_at: DateTime<Utc>,
}
