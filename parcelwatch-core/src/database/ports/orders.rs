use async_trait::async_trait;
use parcelwatch_model::{Order, OrderId, OrderState, OrderStatus, UserId};

use crate::error::Result;

/// Order ledger plus its append-only state history.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert a new order together with its initial audit row, in one
    /// transaction: either both land or neither does.
    async fn insert_with_state(&self, order: &Order, initial_state: &OrderState) -> Result<()>;

    /// Update an order and, when a state row is given (the status
    /// changed), append it in the same transaction.
    async fn update_with_state<'a>(
        &self,
        order: &'a Order,
        state: Option<&'a OrderState>,
    ) -> Result<()>;

    async fn get(&self, user_id: UserId, id: OrderId) -> Result<Option<Order>>;

    async fn find_by_order_number(
        &self,
        user_id: UserId,
        order_number: &str,
    ) -> Result<Option<Order>>;

    async fn find_by_tracking_number(
        &self,
        user_id: UserId,
        tracking_number: &str,
    ) -> Result<Option<Order>>;

    /// Most recent orders for a vendor domain, newest first.
    async fn recent_by_vendor_domain(
        &self,
        user_id: UserId,
        vendor_domain: &str,
        limit: i64,
    ) -> Result<Vec<Order>>;

    async fn list_for_user(&self, user_id: UserId, limit: i64, offset: i64) -> Result<Vec<Order>>;

    async fn count_for_user(&self, user_id: UserId) -> Result<i64>;

    async fn counts_by_status(&self, user_id: UserId) -> Result<Vec<(OrderStatus, i64)>>;

    /// States in insertion order.
    async fn states_for(&self, order_id: OrderId) -> Result<Vec<OrderState>>;

    /// Merge `target` into `source` (both owned by the user) in one
    /// transaction: fill source's blank tracking number and carrier from
    /// target, adopt target's status when it is past `ordered`, reparent
    /// target's states onto source, delete target. Returns the merged
    /// source order.
    async fn merge_orders(
        &self,
        user_id: UserId,
        source: OrderId,
        target: OrderId,
    ) -> Result<Order>;

    async fn delete(&self, user_id: UserId, id: OrderId) -> Result<bool>;
}
