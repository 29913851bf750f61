//! Per-user notifier delivery settings.

use axum::Json;
use axum::extract::State;
use parcelwatch_model::{ModuleKind, NotificationConfig, NotificationEvent};
use serde::Deserialize;

use crate::auth::CurrentUser;
use crate::errors::{AppError, AppResult};
use crate::state::AppState;

pub async fn list_configs(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<NotificationConfig>>> {
    Ok(Json(
        state.repos.notifications.configs_for_user(user.id).await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct UpsertNotificationRequest {
    pub module_key: String,
    pub enabled: bool,
    /// Subscribed events; omit for all events.
    pub events: Option<Vec<NotificationEvent>>,
    /// Module-specific settings, e.g. `{"url": "..."}` for the webhook.
    pub config: Option<serde_json::Value>,
}

pub async fn upsert_config(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(request): Json<UpsertNotificationRequest>,
) -> AppResult<Json<NotificationConfig>> {
    let is_notifier = state
        .registry
        .module(&request.module_key)
        .is_some_and(|module| module.manifest.kind == ModuleKind::Notifier);
    if !is_notifier {
        return Err(AppError::unprocessable(format!(
            "{} is not a notifier module",
            request.module_key
        )));
    }

    let config = NotificationConfig {
        user_id: user.id,
        module_key: request.module_key,
        enabled: request.enabled,
        events: request.events,
        config: request.config,
    };
    state.repos.notifications.upsert(&config).await?;

    Ok(Json(config))
}
