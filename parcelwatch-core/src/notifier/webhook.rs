//! Webhook notifier: POSTs events to a per-user URL.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parcelwatch_model::{NotificationEvent, UserId};
use serde_json::json;
use url::Url;

use crate::error::{CoreError, Result};
use crate::notifier::Notifier;

pub const MODULE_KEY: &str = "webhook";

#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    http: reqwest::Client,
}

impl Default for WebhookNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl WebhookNotifier {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .expect("failed to build HTTP client");
        Self { http }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(
        &self,
        user_id: UserId,
        event: NotificationEvent,
        event_data: &serde_json::Value,
        config: Option<&serde_json::Value>,
    ) -> Result<()> {
        let url = config
            .and_then(|c| c.get("url"))
            .and_then(|u| u.as_str())
            .ok_or_else(|| CoreError::Validation("webhook config has no url".into()))?;
        let url: Url = url
            .parse()
            .map_err(|e| CoreError::Validation(format!("invalid webhook url: {e}")))?;

        let payload = json!({
            "event": event.as_str(),
            "user_id": user_id,
            "data": event_data,
            "sent_at": Utc::now().to_rfc3339(),
        });

        self.http
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| CoreError::Internal(format!("webhook delivery failed: {e}")))?
            .error_for_status()
            .map_err(|e| CoreError::Internal(format!("webhook endpoint rejected event: {e}")))?;

        Ok(())
    }
}
