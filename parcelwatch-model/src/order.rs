use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ModelError;
use crate::ids::{OrderId, UserId};

/// Lifecycle of an order as observed from mail traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Ordered,
    ShipmentPreparing,
    Shipped,
    InTransit,
    OutForDelivery,
    Delivered,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Ordered,
        OrderStatus::ShipmentPreparing,
        OrderStatus::Shipped,
        OrderStatus::InTransit,
        OrderStatus::OutForDelivery,
        OrderStatus::Delivered,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Ordered => "ordered",
            OrderStatus::ShipmentPreparing => "shipment_preparing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::InTransit => "in_transit",
            OrderStatus::OutForDelivery => "out_for_delivery",
            OrderStatus::Delivered => "delivered",
        }
    }

    /// The state a fresh order starts in when the analyzer supplies none.
    pub fn is_initial(&self) -> bool {
        matches!(self, OrderStatus::Ordered)
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ordered" => Ok(OrderStatus::Ordered),
            "shipment_preparing" => Ok(OrderStatus::ShipmentPreparing),
            "shipped" => Ok(OrderStatus::Shipped),
            "in_transit" => Ok(OrderStatus::InTransit),
            "out_for_delivery" => Ok(OrderStatus::OutForDelivery),
            "delivered" => Ok(OrderStatus::Delivered),
            other => Err(ModelError::InvalidOrderStatus(other.to_string())),
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single line item attached to an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub name: String,
    pub quantity: i32,
    pub price: Option<f64>,
}

/// One tracked purchase, owned by a single user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub order_number: Option<String>,
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    pub vendor_name: Option<String>,
    pub vendor_domain: Option<String>,
    pub status: OrderStatus,
    pub order_date: Option<NaiveDate>,
    pub total_amount: Option<f64>,
    pub currency: Option<String>,
    pub items: Option<Vec<OrderItem>>,
    pub estimated_delivery: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only audit entry recording a status an order has held.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderState {
    pub id: Uuid,
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub source_type: Option<String>,
    pub source_info: Option<String>,
    pub created_at: DateTime<Utc>,
}
