use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parcelwatch_model::{Order, OrderId, OrderItem, OrderState, OrderStatus, UserId};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::database::ports::orders::OrderStore;
use crate::error::{CoreError, Result};

#[derive(Debug, Clone)]
pub struct PostgresOrderRepository {
    pool: PgPool,
}

impl PostgresOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn find_one(&self, query: &str, user_id: UserId, value: &str) -> Result<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(query)
            .bind(user_id.as_uuid())
            .bind(value)
            .fetch_optional(self.pool())
            .await?;

        row.map(Order::try_from).transpose()
    }
}

const ORDER_COLUMNS: &str = r#"
    id, user_id, order_number, tracking_number, carrier, vendor_name,
    vendor_domain, status, order_date, total_amount, currency, items,
    estimated_delivery, created_at, updated_at
"#;

/// Single-statement pieces shared by the transactional writes.
async fn insert_order(conn: &mut PgConnection, order: &Order) -> Result<()> {
    let items = order
        .items
        .as_ref()
        .map(serde_json::to_value)
        .transpose()?;

    sqlx::query(
        r#"
        INSERT INTO orders (
            id, user_id, order_number, tracking_number, carrier,
            vendor_name, vendor_domain, status, order_date, total_amount,
            currency, items, estimated_delivery, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        "#,
    )
    .bind(order.id.as_uuid())
    .bind(order.user_id.as_uuid())
    .bind(&order.order_number)
    .bind(&order.tracking_number)
    .bind(&order.carrier)
    .bind(&order.vendor_name)
    .bind(&order.vendor_domain)
    .bind(order.status.as_str())
    .bind(order.order_date)
    .bind(order.total_amount)
    .bind(&order.currency)
    .bind(items)
    .bind(order.estimated_delivery)
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn update_order(conn: &mut PgConnection, order: &Order) -> Result<()> {
    let items = order
        .items
        .as_ref()
        .map(serde_json::to_value)
        .transpose()?;

    sqlx::query(
        r#"
        UPDATE orders
        SET order_number = $1,
            tracking_number = $2,
            carrier = $3,
            vendor_name = $4,
            vendor_domain = $5,
            status = $6,
            order_date = $7,
            total_amount = $8,
            currency = $9,
            items = $10,
            estimated_delivery = $11,
            updated_at = NOW()
        WHERE id = $12 AND user_id = $13
        "#,
    )
    .bind(&order.order_number)
    .bind(&order.tracking_number)
    .bind(&order.carrier)
    .bind(&order.vendor_name)
    .bind(&order.vendor_domain)
    .bind(order.status.as_str())
    .bind(order.order_date)
    .bind(order.total_amount)
    .bind(&order.currency)
    .bind(items)
    .bind(order.estimated_delivery)
    .bind(order.id.as_uuid())
    .bind(order.user_id.as_uuid())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn insert_state(conn: &mut PgConnection, state: &OrderState) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO order_states (id, order_id, status, source_type, source_info, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(state.id)
    .bind(state.order_id.as_uuid())
    .bind(state.status.as_str())
    .bind(&state.source_type)
    .bind(&state.source_info)
    .bind(state.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

#[async_trait]
impl OrderStore for PostgresOrderRepository {
    async fn insert_with_state(&self, order: &Order, initial_state: &OrderState) -> Result<()> {
        let mut tx = self.pool().begin().await?;
        insert_order(&mut tx, order).await?;
        insert_state(&mut tx, initial_state).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update_with_state<'a>(
        &self,
        order: &'a Order,
        state: Option<&'a OrderState>,
    ) -> Result<()> {
        let mut tx = self.pool().begin().await?;
        update_order(&mut tx, order).await?;
        if let Some(state) = state {
            insert_state(&mut tx, state).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, user_id: UserId, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 AND id = $2"
        ))
        .bind(user_id.as_uuid())
        .bind(id.as_uuid())
        .fetch_optional(self.pool())
        .await?;

        row.map(Order::try_from).transpose()
    }

    async fn find_by_order_number(
        &self,
        user_id: UserId,
        order_number: &str,
    ) -> Result<Option<Order>> {
        self.find_one(
            &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 AND order_number = $2"),
            user_id,
            order_number,
        )
        .await
    }

    async fn find_by_tracking_number(
        &self,
        user_id: UserId,
        tracking_number: &str,
    ) -> Result<Option<Order>> {
        self.find_one(
            &format!(
                "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 AND tracking_number = $2"
            ),
            user_id,
            tracking_number,
        )
        .await
    }

    async fn recent_by_vendor_domain(
        &self,
        user_id: UserId,
        vendor_domain: &str,
        limit: i64,
    ) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM orders
            WHERE user_id = $1 AND vendor_domain = $2
            ORDER BY created_at DESC
            LIMIT $3
            "#
        ))
        .bind(user_id.as_uuid())
        .bind(vendor_domain)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(Order::try_from).collect()
    }

    async fn list_for_user(&self, user_id: UserId, limit: i64, offset: i64) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM orders
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(user_id.as_uuid())
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(Order::try_from).collect()
    }

    async fn count_for_user(&self, user_id: UserId) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .fetch_one(self.pool())
            .await?;

        Ok(count)
    }

    async fn counts_by_status(&self, user_id: UserId) -> Result<Vec<(OrderStatus, i64)>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT status, COUNT(*)
            FROM orders
            WHERE user_id = $1
            GROUP BY status
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(|(status, count)| {
                let status = status
                    .parse()
                    .map_err(|_| CoreError::Internal(format!("invalid order status: {status}")))?;
                Ok((status, count))
            })
            .collect()
    }

    async fn states_for(&self, order_id: OrderId) -> Result<Vec<OrderState>> {
        let rows = sqlx::query_as::<_, OrderStateRow>(
            r#"
            SELECT id, order_id, status, source_type, source_info, created_at
            FROM order_states
            WHERE order_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(OrderState::try_from).collect()
    }

    async fn merge_orders(
        &self,
        user_id: UserId,
        source: OrderId,
        target: OrderId,
    ) -> Result<Order> {
        let mut tx = self.pool().begin().await?;

        let lock_query = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 AND id = $2 FOR UPDATE"
        );

        let source_row = sqlx::query_as::<_, OrderRow>(&lock_query)
            .bind(user_id.as_uuid())
            .bind(source.as_uuid())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("order {source}")))?;
        let target_row = sqlx::query_as::<_, OrderRow>(&lock_query)
            .bind(user_id.as_uuid())
            .bind(target.as_uuid())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("order {target}")))?;

        let mut merged = Order::try_from(source_row)?;
        let target_order = Order::try_from(target_row)?;

        if merged.tracking_number.is_none() {
            merged.tracking_number = target_order.tracking_number.clone();
        }
        if merged.carrier.is_none() {
            merged.carrier = target_order.carrier.clone();
        }
        if !target_order.status.is_initial() {
            merged.status = target_order.status;
        }

        sqlx::query(
            r#"
            UPDATE orders
            SET tracking_number = $1, carrier = $2, status = $3, updated_at = NOW()
            WHERE id = $4
            "#,
        )
        .bind(&merged.tracking_number)
        .bind(&merged.carrier)
        .bind(merged.status.as_str())
        .bind(merged.id.as_uuid())
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE order_states SET order_id = $1 WHERE order_id = $2")
            .bind(source.as_uuid())
            .bind(target.as_uuid())
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(target.as_uuid())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(merged)
    }

    async fn delete(&self, user_id: UserId, id: OrderId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1 AND user_id = $2")
            .bind(id.as_uuid())
            .bind(user_id.as_uuid())
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: Uuid,
    order_number: Option<String>,
    tracking_number: Option<String>,
    carrier: Option<String>,
    vendor_name: Option<String>,
    vendor_domain: Option<String>,
    status: String,
    order_date: Option<NaiveDate>,
    total_amount: Option<f64>,
    currency: Option<String>,
    items: Option<serde_json::Value>,
    estimated_delivery: Option<NaiveDate>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = CoreError;

    fn try_from(row: OrderRow) -> Result<Self> {
        let status = row
            .status
            .parse()
            .map_err(|_| CoreError::Internal(format!("invalid order status: {}", row.status)))?;
        let items: Option<Vec<OrderItem>> =
            row.items.map(serde_json::from_value).transpose()?;

        Ok(Order {
            id: OrderId(row.id),
            user_id: UserId(row.user_id),
            order_number: row.order_number,
            tracking_number: row.tracking_number,
            carrier: row.carrier,
            vendor_name: row.vendor_name,
            vendor_domain: row.vendor_domain,
            status,
            order_date: row.order_date,
            total_amount: row.total_amount,
            currency: row.currency,
            items,
            estimated_delivery: row.estimated_delivery,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderStateRow {
    id: Uuid,
    order_id: Uuid,
    status: String,
    source_type: Option<String>,
    source_info: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<OrderStateRow> for OrderState {
    type Error = CoreError;

    fn try_from(row: OrderStateRow) -> Result<Self> {
        let status = row
            .status
            .parse()
            .map_err(|_| CoreError::Internal(format!("invalid order status: {}", row.status)))?;

        Ok(OrderState {
            id: row.id,
            order_id: OrderId(row.order_id),
            status,
            source_type: row.source_type,
            source_info: row.source_info,
            created_at: row.created_at,
        })
    }
}
