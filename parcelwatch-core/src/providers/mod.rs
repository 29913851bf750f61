//! Mailbox source modules: per-user IMAP folders and the global shared
//! inbox.

pub mod mail_global;
pub mod mail_user;

pub use mail_global::{GlobalWatchProvider, MailGlobalModule};
pub use mail_user::{MailUserModule, UserFolderProvider};
