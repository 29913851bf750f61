use async_trait::async_trait;
use parcelwatch_model::ModuleConfigRecord;

use crate::error::Result;

/// Persisted admin toggles for discovered modules.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModuleStore: Send + Sync {
    /// Create the row if missing; existing rows are left untouched.
    async fn ensure_exists(&self, module_key: &str, default_enabled: bool) -> Result<()>;

    async fn get(&self, module_key: &str) -> Result<Option<ModuleConfigRecord>>;

    async fn list(&self) -> Result<Vec<ModuleConfigRecord>>;

    async fn set_enabled(&self, module_key: &str, enabled: bool) -> Result<ModuleConfigRecord>;

    async fn set_priority(&self, module_key: &str, priority: i32) -> Result<ModuleConfigRecord>;
}
