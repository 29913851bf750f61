use async_trait::async_trait;
use parcelwatch_model::{NotificationConfig, NotificationEvent, UserId};
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::ports::notifications::NotificationStore;
use crate::error::{CoreError, Result};

#[derive(Debug, Clone)]
pub struct PostgresNotificationRepository {
    pool: PgPool,
}

impl PostgresNotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl NotificationStore for PostgresNotificationRepository {
    async fn configs_for_user(&self, user_id: UserId) -> Result<Vec<NotificationConfig>> {
        let rows = sqlx::query_as::<_, NotificationConfigRow>(
            r#"
            SELECT user_id, module_key, enabled, events, config
            FROM notification_config
            WHERE user_id = $1
            ORDER BY module_key
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(NotificationConfig::try_from).collect()
    }

    async fn upsert(&self, config: &NotificationConfig) -> Result<()> {
        let events = config
            .events
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO notification_config (user_id, module_key, enabled, events, config)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, module_key) DO UPDATE SET
                enabled = EXCLUDED.enabled,
                events = EXCLUDED.events,
                config = EXCLUDED.config
            "#,
        )
        .bind(config.user_id.as_uuid())
        .bind(&config.module_key)
        .bind(config.enabled)
        .bind(events)
        .bind(&config.config)
        .execute(self.pool())
        .await?;

        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct NotificationConfigRow {
    user_id: Uuid,
    module_key: String,
    enabled: bool,
    events: Option<serde_json::Value>,
    config: Option<serde_json::Value>,
}

impl TryFrom<NotificationConfigRow> for NotificationConfig {
    type Error = CoreError;

    fn try_from(row: NotificationConfigRow) -> Result<Self> {
        let events: Option<Vec<NotificationEvent>> =
            row.events.map(serde_json::from_value).transpose()?;

        Ok(NotificationConfig {
            user_id: UserId(row.user_id),
            module_key: row.module_key,
            enabled: row.enabled,
            events,
            config: row.config,
        })
    }
}
