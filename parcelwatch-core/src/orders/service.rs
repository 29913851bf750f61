//! Applying analyzer output to the order ledger.

use std::sync::Arc;

use chrono::Utc;
use parcelwatch_model::{
    EmailAnalysis, Order, OrderId, OrderItem, OrderState, OrderStatus, UserId,
};
use uuid::Uuid;

use crate::database::ports::orders::OrderStore;
use crate::error::{CoreError, Result};

/// What a ledger write did, for notification-event selection.
#[derive(Debug, Clone)]
pub struct OrderWriteOutcome {
    pub order: Order,
    pub created: bool,
    pub status_changed: bool,
}

fn analyzed_items(analysis: &EmailAnalysis) -> Option<Vec<OrderItem>> {
    analysis.items.as_ref().map(|items| {
        items
            .iter()
            .map(|item| OrderItem {
                name: item.name.clone(),
                quantity: item.quantity,
                price: item.price,
            })
            .collect()
    })
}

/// Create a new order from the analysis, or update the matched one.
///
/// Updates fill blanks only (a set tracking number or carrier is never
/// overwritten), always accept a newer estimated delivery, and take the
/// analyzer's status when provided. An [`OrderState`] is appended only
/// when the status actually changed, and the order row and its state
/// row land in one store transaction.
pub async fn create_or_update_order(
    orders: &Arc<dyn OrderStore>,
    analysis: &EmailAnalysis,
    user_id: UserId,
    existing: Option<Order>,
    source_type: &str,
    source_info: &str,
) -> Result<OrderWriteOutcome> {
    match existing {
        Some(mut order) => {
            let old_status = order.status;

            if order.tracking_number.is_none() {
                order.tracking_number = analysis.tracking_number.clone();
            }
            if order.carrier.is_none() {
                order.carrier = analysis.carrier.clone();
            }
            if let Some(estimated) = analysis.estimated_delivery_parsed() {
                order.estimated_delivery = Some(estimated);
            }
            if let Some(status) = analysis.status {
                order.status = status;
            }
            order.updated_at = Utc::now();

            let status_changed = order.status != old_status;
            let state = status_changed.then(|| OrderState {
                id: Uuid::now_v7(),
                order_id: order.id,
                status: order.status,
                source_type: Some(source_type.to_string()),
                source_info: Some(source_info.to_string()),
                created_at: Utc::now(),
            });

            orders.update_with_state(&order, state.as_ref()).await?;

            Ok(OrderWriteOutcome {
                order,
                created: false,
                status_changed,
            })
        }
        None => {
            let now = Utc::now();
            let status = analysis.status.unwrap_or(OrderStatus::Ordered);
            let order = Order {
                id: OrderId::new(),
                user_id,
                order_number: analysis.order_number.clone(),
                tracking_number: analysis.tracking_number.clone(),
                carrier: analysis.carrier.clone(),
                vendor_name: analysis.vendor_name.clone(),
                vendor_domain: analysis.vendor_domain.clone(),
                status,
                order_date: analysis.order_date_parsed(),
                total_amount: analysis.total_amount,
                currency: analysis.currency.clone(),
                items: analyzed_items(analysis),
                estimated_delivery: analysis.estimated_delivery_parsed(),
                created_at: now,
                updated_at: now,
            };
            let initial_state = OrderState {
                id: Uuid::now_v7(),
                order_id: order.id,
                status,
                source_type: Some(source_type.to_string()),
                source_info: Some(source_info.to_string()),
                created_at: now,
            };

            orders.insert_with_state(&order, &initial_state).await?;

            Ok(OrderWriteOutcome {
                order,
                created: true,
                status_changed: true,
            })
        }
    }
}

/// Merge `target` into `source` for the same user. See
/// [`OrderStore::merge_orders`] for the exact transfer rules.
pub async fn link_orders(
    orders: &Arc<dyn OrderStore>,
    user_id: UserId,
    source: OrderId,
    target: OrderId,
) -> Result<Order> {
    if source == target {
        return Err(CoreError::Validation(
            "cannot link an order with itself".into(),
        ));
    }
    orders.merge_orders(user_id, source, target).await
}
