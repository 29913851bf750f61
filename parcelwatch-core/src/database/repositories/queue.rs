use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parcelwatch_model::{OrderId, QueueItem, QueueItemId, QueueStatus, RawEmail, UserId};
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::ports::queue::{EnqueueOutcome, EnqueueRequest, QueueStore};
use crate::error::{CoreError, Result};

#[derive(Debug, Clone)]
pub struct PostgresQueueRepository {
    pool: PgPool,
}

impl PostgresQueueRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }
}

const ITEM_COLUMNS: &str = r#"
    id, user_id, status, source_type, source_info, raw_data, extracted_data,
    error_message, order_id, cloned_from, created_at, updated_at
"#;

#[async_trait]
impl QueueStore for PostgresQueueRepository {
    async fn enqueue_if_unseen(&self, request: EnqueueRequest) -> Result<EnqueueOutcome> {
        let mut tx = self.pool().begin().await?;

        let seen: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM seen_messages WHERE stable_message_id = $1")
                .bind(&request.stable_message_id)
                .fetch_optional(&mut *tx)
                .await?;
        if seen.is_some() {
            return Ok(EnqueueOutcome::AlreadySeen);
        }

        let item_id = QueueItemId::new();
        let raw_data = serde_json::to_value(&request.raw)?;

        let insert_result = sqlx::query(
            r#"
            INSERT INTO queue_items (id, user_id, status, source_type, source_info, raw_data)
            VALUES ($1, $2, 'queued', 'email', $3, $4)
            "#,
        )
        .bind(item_id.as_uuid())
        .bind(request.user_id.as_uuid())
        .bind(&request.source_info)
        .bind(&raw_data)
        .execute(&mut *tx)
        .await;

        if let Err(e) = insert_result {
            return map_unique_violation(e);
        }

        let marker_result = sqlx::query(
            r#"
            INSERT INTO seen_messages (
                id, mailbox_id, source, folder_path, source_uid,
                stable_message_id, queue_item_id
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(request.mailbox_id.map(|id| id.to_uuid()))
        .bind(request.source.as_str())
        .bind(&request.folder_path)
        .bind(request.raw.email_uid as i64)
        .bind(&request.stable_message_id)
        .bind(item_id.as_uuid())
        .execute(&mut *tx)
        .await;

        // A concurrent watcher may have raced us to the unique index; the
        // transaction rolls back and the message counts as seen.
        if let Err(e) = marker_result {
            return map_unique_violation(e);
        }

        tx.commit().await?;
        Ok(EnqueueOutcome::Enqueued(item_id))
    }

    async fn claim_next(&self) -> Result<Option<QueueItem>> {
        let mut tx = self.pool().begin().await?;

        let row = sqlx::query_as::<_, QueueItemRow>(&format!(
            r#"
            SELECT {ITEM_COLUMNS}
            FROM queue_items
            WHERE status = 'queued'
            ORDER BY created_at ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#
        ))
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        sqlx::query("UPDATE queue_items SET status = 'processing', updated_at = NOW() WHERE id = $1")
            .bind(row.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let mut item = QueueItem::try_from(row)?;
        item.status = QueueStatus::Processing;
        Ok(Some(item))
    }

    async fn mark_completed(
        &self,
        id: QueueItemId,
        extracted_data: Option<serde_json::Value>,
        order_id: Option<OrderId>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE queue_items
            SET status = 'completed',
                extracted_data = COALESCE($1, extracted_data),
                order_id = COALESCE($2, order_id),
                updated_at = NOW()
            WHERE id = $3
            "#,
        )
        .bind(extracted_data)
        .bind(order_id.map(|o| o.to_uuid()))
        .bind(id.as_uuid())
        .execute(self.pool())
        .await?;

        Ok(())
    }

    async fn mark_failed(&self, id: QueueItemId, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE queue_items
            SET status = 'failed', error_message = $1, updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(error)
        .bind(id.as_uuid())
        .execute(self.pool())
        .await?;

        Ok(())
    }

    async fn clone_for_retry(&self, id: QueueItemId) -> Result<QueueItem> {
        let new_id = QueueItemId::new();
        let row = sqlx::query_as::<_, QueueItemRow>(&format!(
            r#"
            INSERT INTO queue_items (id, user_id, status, source_type, source_info, raw_data, cloned_from)
            SELECT $1, user_id, 'queued', source_type, source_info, raw_data, id
            FROM queue_items
            WHERE id = $2
            RETURNING {ITEM_COLUMNS}
            "#
        ))
        .bind(new_id.as_uuid())
        .bind(id.as_uuid())
        .fetch_optional(self.pool())
        .await?;

        row.map(QueueItem::try_from)
            .transpose()?
            .ok_or_else(|| CoreError::NotFound(format!("queue item {id}")))
    }

    async fn get(&self, id: QueueItemId) -> Result<Option<QueueItem>> {
        let row = sqlx::query_as::<_, QueueItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM queue_items WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(self.pool())
        .await?;

        row.map(QueueItem::try_from).transpose()
    }

    async fn list_for_user(&self, user_id: UserId, limit: i64) -> Result<Vec<QueueItem>> {
        let rows = sqlx::query_as::<_, QueueItemRow>(&format!(
            r#"
            SELECT {ITEM_COLUMNS}
            FROM queue_items
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#
        ))
        .bind(user_id.as_uuid())
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(QueueItem::try_from).collect()
    }

    async fn queued_count(&self) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM queue_items WHERE status = 'queued'")
                .fetch_one(self.pool())
                .await?;

        Ok(count)
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM queue_items WHERE created_at < $1")
            .bind(cutoff)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected())
    }

    async fn delete_user_overflow(&self, max_per_user: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            WITH ranked AS (
                SELECT id,
                       ROW_NUMBER() OVER (
                           PARTITION BY user_id ORDER BY created_at DESC
                       ) AS newest_rank
                FROM queue_items
            )
            DELETE FROM queue_items
            WHERE id IN (SELECT id FROM ranked WHERE newest_rank > $1)
            "#,
        )
        .bind(max_per_user)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected())
    }
}

fn map_unique_violation(e: sqlx::Error) -> Result<EnqueueOutcome> {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => Ok(EnqueueOutcome::AlreadySeen),
        _ => Err(CoreError::Database(e)),
    }
}

#[derive(sqlx::FromRow)]
struct QueueItemRow {
    id: Uuid,
    user_id: Uuid,
    status: String,
    source_type: String,
    source_info: String,
    raw_data: serde_json::Value,
    extracted_data: Option<serde_json::Value>,
    error_message: Option<String>,
    order_id: Option<Uuid>,
    cloned_from: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<QueueItemRow> for QueueItem {
    type Error = CoreError;

    fn try_from(row: QueueItemRow) -> Result<Self> {
        let status = row
            .status
            .parse()
            .map_err(|_| CoreError::Internal(format!("invalid queue status: {}", row.status)))?;
        let raw_data: RawEmail = serde_json::from_value(row.raw_data)?;

        Ok(QueueItem {
            id: QueueItemId(row.id),
            user_id: UserId(row.user_id),
            status,
            source_type: row.source_type,
            source_info: row.source_info,
            raw_data,
            extracted_data: row.extracted_data,
            error_message: row.error_message,
            order_id: row.order_id.map(OrderId),
            cloned_from: row.cloned_from.map(QueueItemId),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
