//! Module registry: discovery, persisted enable/disable, lifecycle hooks,
//! and capability lookup for the pipeline.

pub mod builtin;

pub use builtin::builtin_registry;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parcelwatch_model::{ModuleConfigRecord, ModuleKind};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::analyzer::Analyzer;
use crate::database::ports::modules::ModuleStore;
use crate::error::Result;
use crate::notifier::Notifier;

/// Static facts a module declares about itself.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleManifest {
    pub key: &'static str,
    pub name: &'static str,
    pub kind: ModuleKind,
    pub version: &'static str,
    pub description: &'static str,
    /// Whether a fresh deployment starts with the module enabled.
    #[serde(skip)]
    pub enabled_by_default: bool,
}

/// Optional lifecycle and introspection hooks, typed instead of
/// duck-typed: a module overrides only what it needs.
#[async_trait]
pub trait ModuleHooks: Send + Sync {
    async fn startup(&self) -> Result<()> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    /// Whether the module has everything it needs to run (credentials,
    /// backend config). Defaults to true for modules without setup.
    async fn is_configured(&self) -> Result<bool> {
        Ok(true)
    }

    /// Module-specific status payload for the system status API.
    async fn status(&self) -> Result<Option<serde_json::Value>> {
        Ok(None)
    }
}

/// No-op hooks for modules with nothing to start or report.
#[derive(Debug, Default)]
pub struct NoHooks;

#[async_trait]
impl ModuleHooks for NoHooks {}

/// A registered module: manifest, hooks, and its capability set.
pub struct Module {
    pub manifest: ModuleManifest,
    pub hooks: Arc<dyn ModuleHooks>,
    pub analyzer: Option<Arc<dyn Analyzer>>,
    pub notifier: Option<Arc<dyn Notifier>>,
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("manifest", &self.manifest)
            .field("has_analyzer", &self.analyzer.is_some())
            .field("has_notifier", &self.notifier.is_some())
            .finish_non_exhaustive()
    }
}

impl Module {
    pub fn new(manifest: ModuleManifest, hooks: Arc<dyn ModuleHooks>) -> Self {
        Self {
            manifest,
            hooks,
            analyzer: None,
            notifier: None,
        }
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }
}

/// One module's combined static + persisted + live state, for the API.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleOverview {
    pub key: String,
    pub name: String,
    pub kind: ModuleKind,
    pub version: String,
    pub description: String,
    pub enabled: bool,
    pub priority: i32,
    pub configured: bool,
    pub status: Option<serde_json::Value>,
}

/// In-memory map of registered modules plus their persisted toggles.
pub struct ModuleRegistry {
    modules: BTreeMap<&'static str, Module>,
    store: Arc<dyn ModuleStore>,
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("keys", &self.modules.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl ModuleRegistry {
    pub fn new(store: Arc<dyn ModuleStore>) -> Self {
        Self {
            modules: BTreeMap::new(),
            store,
        }
    }

    pub fn register(&mut self, module: Module) {
        let key = module.manifest.key;
        if self.modules.insert(key, module).is_some() {
            warn!("module {key} registered twice, replacing");
        } else {
            info!("discovered module: {key}");
        }
    }

    pub fn module(&self, key: &str) -> Option<&Module> {
        self.modules.get(key)
    }

    pub fn all(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    pub fn of_kind(&self, kind: ModuleKind) -> Vec<&Module> {
        self.modules
            .values()
            .filter(|module| module.manifest.kind == kind)
            .collect()
    }

    /// Every notifier capability, keyed for config lookup.
    pub fn notifiers(&self) -> Vec<(&'static str, Arc<dyn Notifier>)> {
        self.modules
            .values()
            .filter_map(|module| {
                module
                    .notifier
                    .as_ref()
                    .map(|notifier| (module.manifest.key, Arc::clone(notifier)))
            })
            .collect()
    }

    /// Ensure a persisted config row exists for every registered module.
    pub async fn sync_configs(&self) -> Result<()> {
        for module in self.modules.values() {
            self.store
                .ensure_exists(module.manifest.key, module.manifest.enabled_by_default)
                .await?;
        }
        Ok(())
    }

    pub async fn is_enabled(&self, key: &str) -> Result<bool> {
        Ok(self
            .store
            .get(key)
            .await?
            .map(|record| record.enabled)
            .unwrap_or(false))
    }

    /// Run startup hooks for every enabled module.
    pub async fn startup_enabled(&self) -> Result<()> {
        for module in self.modules.values() {
            let key = module.manifest.key;
            if !self.is_enabled(key).await? {
                continue;
            }
            match module.hooks.startup().await {
                Ok(()) => info!("module {key} started"),
                Err(e) => error!("failed to start module {key}: {e}"),
            }
        }
        Ok(())
    }

    /// Run every shutdown hook, regardless of enablement.
    pub async fn shutdown_all(&self) {
        for module in self.modules.values() {
            let key = module.manifest.key;
            if let Err(e) = module.hooks.shutdown().await {
                error!("failed to stop module {key}: {e}");
            } else {
                info!("module {key} stopped");
            }
        }
    }

    /// Persist the toggle, then run the matching hook. Hook failures are
    /// logged but do not revert the toggle.
    pub async fn set_enabled(&self, key: &str, enabled: bool) -> Result<ModuleConfigRecord> {
        let record = self.store.set_enabled(key, enabled).await?;

        if let Some(module) = self.modules.get(key) {
            let result = if enabled {
                module.hooks.startup().await
            } else {
                module.hooks.shutdown().await
            };
            if let Err(e) = result {
                error!(
                    "module {key} {} hook failed: {e}",
                    if enabled { "startup" } else { "shutdown" }
                );
            }
        }

        Ok(record)
    }

    /// Whether any analyzer module is enabled and fully configured.
    pub async fn has_available_analyzer(&self) -> Result<bool> {
        Ok(self.active_analyzer().await?.is_some())
    }

    /// The analyzer the processor should use: enabled modules with an
    /// analyzer capability, lowest persisted priority first, first one
    /// that reports itself configured.
    pub async fn active_analyzer(&self) -> Result<Option<Arc<dyn Analyzer>>> {
        let records = self.store.list().await?;

        for record in records {
            if !record.enabled {
                continue;
            }
            let Some(module) = self.modules.get(record.module_key.as_str()) else {
                continue;
            };
            let Some(analyzer) = &module.analyzer else {
                continue;
            };
            if module.hooks.is_configured().await? {
                return Ok(Some(Arc::clone(analyzer)));
            }
        }

        Ok(None)
    }

    /// Combined view for the modules API and system status.
    pub async fn overview(&self) -> Result<Vec<ModuleOverview>> {
        let mut out = Vec::with_capacity(self.modules.len());

        for module in self.modules.values() {
            let record = self.store.get(module.manifest.key).await?;
            let configured = module.hooks.is_configured().await.unwrap_or(false);
            let status = match module.hooks.status().await {
                Ok(status) => status,
                Err(e) => {
                    warn!("status hook failed for {}: {e}", module.manifest.key);
                    None
                }
            };

            out.push(ModuleOverview {
                key: module.manifest.key.to_string(),
                name: module.manifest.name.to_string(),
                kind: module.manifest.kind,
                version: module.manifest.version.to_string(),
                description: module.manifest.description.to_string(),
                enabled: record.as_ref().map(|r| r.enabled).unwrap_or(false),
                priority: record.map(|r| r.priority).unwrap_or(0),
                configured,
                status,
            });
        }

        Ok(out)
    }
}
