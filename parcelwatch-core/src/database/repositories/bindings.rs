use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parcelwatch_model::{SenderBinding, UserId};
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::ports::bindings::BindingStore;
use crate::error::{CoreError, Result};

#[derive(Debug, Clone)]
pub struct PostgresBindingRepository {
    pool: PgPool,
}

impl PostgresBindingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl BindingStore for PostgresBindingRepository {
    async fn find_by_address(&self, email_address: &str) -> Result<Option<SenderBinding>> {
        let row = sqlx::query_as::<_, BindingRow>(
            r#"
            SELECT id, user_id, email_address, created_at
            FROM sender_bindings
            WHERE email_address = $1
            "#,
        )
        .bind(email_address.to_lowercase())
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(Into::into))
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<SenderBinding>> {
        let rows = sqlx::query_as::<_, BindingRow>(
            r#"
            SELECT id, user_id, email_address, created_at
            FROM sender_bindings
            WHERE user_id = $1
            ORDER BY email_address
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn insert(&self, user_id: UserId, email_address: &str) -> Result<SenderBinding> {
        let address = email_address.trim().to_lowercase();
        let row = sqlx::query_as::<_, BindingRow>(
            r#"
            INSERT INTO sender_bindings (id, user_id, email_address)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, email_address, created_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(user_id.as_uuid())
        .bind(&address)
        .fetch_one(self.pool())
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                CoreError::Conflict(format!("sender address {address} is already bound"))
            }
            _ => CoreError::Database(e),
        })?;

        Ok(row.into())
    }

    async fn delete(&self, user_id: UserId, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sender_bindings WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id.as_uuid())
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(sqlx::FromRow)]
struct BindingRow {
    id: Uuid,
    user_id: Uuid,
    email_address: String,
    created_at: DateTime<Utc>,
}

impl From<BindingRow> for SenderBinding {
    fn from(row: BindingRow) -> Self {
        SenderBinding {
            id: row.id,
            user_id: UserId(row.user_id),
            email_address: row.email_address,
            created_at: row.created_at,
        }
    }
}
