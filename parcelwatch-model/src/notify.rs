use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::ids::UserId;

/// Events notifier modules can deliver to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEvent {
    NewOrder,
    TrackingUpdate,
    PackageDelivered,
}

impl NotificationEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationEvent::NewOrder => "new_order",
            NotificationEvent::TrackingUpdate => "tracking_update",
            NotificationEvent::PackageDelivered => "package_delivered",
        }
    }
}

impl std::str::FromStr for NotificationEvent {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new_order" => Ok(NotificationEvent::NewOrder),
            "tracking_update" => Ok(NotificationEvent::TrackingUpdate),
            "package_delivered" => Ok(NotificationEvent::PackageDelivered),
            other => Err(ModelError::InvalidNotificationEvent(other.to_string())),
        }
    }
}

/// Per-user, per-notifier delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub user_id: UserId,
    pub module_key: String,
    pub enabled: bool,
    /// Subscribed events; `None` means all events.
    pub events: Option<Vec<NotificationEvent>>,
    /// Module-specific settings, e.g. the webhook URL.
    pub config: Option<serde_json::Value>,
}

impl NotificationConfig {
    /// Whether this config subscribes to the given event.
    pub fn subscribes_to(&self, event: NotificationEvent) -> bool {
        match &self.events {
            Some(events) => events.contains(&event),
            None => true,
        }
    }
}
