use std::sync::Arc;

use parcelwatch_core::database::Repositories;
use parcelwatch_core::mail::transport::MailConnector;
use parcelwatch_core::modules::ModuleRegistry;
use parcelwatch_core::providers::{MailGlobalModule, MailUserModule};
use parcelwatch_core::scheduler::Scheduler;
use parcelwatch_core::watcher::WatcherSupervisor;
use parcelwatch_core::SecretCipher;

use crate::auth::AuthService;
use crate::infra::config::Config;

/// Server application state shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub repos: Repositories,
    pub registry: Arc<ModuleRegistry>,
    pub supervisor: Arc<WatcherSupervisor>,
    pub mail_user: Arc<MailUserModule>,
    pub mail_global: Arc<MailGlobalModule>,
    pub scheduler: Arc<Scheduler>,
    pub cipher: SecretCipher,
    pub connector: Arc<dyn MailConnector>,
    pub auth: Arc<AuthService>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}
