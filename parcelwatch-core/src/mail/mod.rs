//! Mail access: MIME parsing plus the IMAP transport behind the
//! [`MailConnector`]/[`MailSession`] seam the watch loop is generic over.

pub mod imap;
pub mod message;
pub mod transport;

pub use imap::ImapConnector;
pub use message::{ParsedEmail, extract_bare_address, fallback_message_id, parse_email};
pub use transport::{FolderInfo, MailConnector, MailSession, MailboxEndpoint, PushOutcome};
