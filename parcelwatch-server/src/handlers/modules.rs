//! Module administration: listing and enable/disable/priority toggles.

use axum::Json;
use axum::extract::{Path, State};
use parcelwatch_core::modules::ModuleOverview;
use parcelwatch_model::ModuleConfigRecord;
use serde::Deserialize;

use crate::auth::AdminUser;
use crate::errors::{AppError, AppResult};
use crate::state::AppState;

pub async fn list_modules(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<ModuleOverview>>> {
    Ok(Json(state.registry.overview().await?))
}

#[derive(Debug, Deserialize)]
pub struct UpdateModuleRequest {
    pub enabled: Option<bool>,
    pub priority: Option<i32>,
}

pub async fn update_module(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(request): Json<UpdateModuleRequest>,
) -> AppResult<Json<ModuleConfigRecord>> {
    if state.registry.module(&key).is_none() {
        return Err(AppError::not_found(format!("unknown module {key}")));
    }

    let mut record = state
        .repos
        .modules
        .get(&key)
        .await?
        .ok_or_else(|| AppError::not_found(format!("unknown module {key}")))?;

    if let Some(priority) = request.priority {
        record = state.repos.modules.set_priority(&key, priority).await?;
    }
    if let Some(enabled) = request.enabled {
        // The registry persists the toggle and runs the lifecycle hook.
        record = state.registry.set_enabled(&key, enabled).await?;
    }

    Ok(Json(record))
}
