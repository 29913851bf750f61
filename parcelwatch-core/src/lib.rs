//! Core pipeline for parcelwatch: mailbox watching, deduplicated capture,
//! analyzer-driven queue processing, order matching, and module lifecycle.
#![allow(missing_docs)]

pub mod analyzer;
pub mod crypto;
pub mod database;
pub mod error;
pub mod mail;
pub mod modules;
pub mod notifier;
pub mod orders;
pub mod processing;
pub mod providers;
pub mod scheduler;
pub mod watcher;

#[cfg(test)]
mod tests;

pub use analyzer::{Analyzer, LlmAnalyzer};
pub use crypto::SecretCipher;
pub use error::{CoreError, Result};
pub use modules::{Module, ModuleRegistry};
pub use notifier::{NotificationDispatcher, Notifier, WebhookNotifier};
pub use orders::{DefaultOrderMatcher, OrderMatcher, create_or_update_order};
pub use processing::{QueueProcessor, RetentionSweeper};
pub use scheduler::Scheduler;
pub use watcher::{WatchProvider, WatcherSupervisor, watch_loop};
