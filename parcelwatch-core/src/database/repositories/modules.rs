use async_trait::async_trait;
use parcelwatch_model::ModuleConfigRecord;
use sqlx::PgPool;

use crate::database::ports::modules::ModuleStore;
use crate::error::{CoreError, Result};

#[derive(Debug, Clone)]
pub struct PostgresModuleRepository {
    pool: PgPool,
}

impl PostgresModuleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ModuleStore for PostgresModuleRepository {
    async fn ensure_exists(&self, module_key: &str, default_enabled: bool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO module_config (module_key, enabled)
            VALUES ($1, $2)
            ON CONFLICT (module_key) DO NOTHING
            "#,
        )
        .bind(module_key)
        .bind(default_enabled)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    async fn get(&self, module_key: &str) -> Result<Option<ModuleConfigRecord>> {
        let row = sqlx::query_as::<_, ModuleConfigRow>(
            "SELECT module_key, enabled, priority FROM module_config WHERE module_key = $1",
        )
        .bind(module_key)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(Into::into))
    }

    async fn list(&self) -> Result<Vec<ModuleConfigRecord>> {
        let rows = sqlx::query_as::<_, ModuleConfigRow>(
            "SELECT module_key, enabled, priority FROM module_config ORDER BY priority, module_key",
        )
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn set_enabled(&self, module_key: &str, enabled: bool) -> Result<ModuleConfigRecord> {
        let row = sqlx::query_as::<_, ModuleConfigRow>(
            r#"
            UPDATE module_config
            SET enabled = $1
            WHERE module_key = $2
            RETURNING module_key, enabled, priority
            "#,
        )
        .bind(enabled)
        .bind(module_key)
        .fetch_optional(self.pool())
        .await?;

        row.map(Into::into)
            .ok_or_else(|| CoreError::NotFound(format!("module {module_key}")))
    }

    async fn set_priority(&self, module_key: &str, priority: i32) -> Result<ModuleConfigRecord> {
        let row = sqlx::query_as::<_, ModuleConfigRow>(
            r#"
            UPDATE module_config
            SET priority = $1
            WHERE module_key = $2
            RETURNING module_key, enabled, priority
            "#,
        )
        .bind(priority)
        .bind(module_key)
        .fetch_optional(self.pool())
        .await?;

        row.map(Into::into)
            .ok_or_else(|| CoreError::NotFound(format!("module {module_key}")))
    }
}

#[derive(sqlx::FromRow)]
struct ModuleConfigRow {
    module_key: String,
    enabled: bool,
    priority: i32,
}

impl From<ModuleConfigRow> for ModuleConfigRecord {
    fn from(row: ModuleConfigRow) -> Self {
        ModuleConfigRecord {
            module_key: row.module_key,
            enabled: row.enabled,
            priority: row.priority,
        }
    }
}
