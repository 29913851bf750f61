//! Capture-queue API: inspection and manual retry.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use parcelwatch_model::{QueueItem, QueueItemId, QueueStatus};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::errors::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

pub async fn list_queue(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<QueueItem>>> {
    let items = state
        .repos
        .queue
        .list_for_user(user.id, query.limit.clamp(1, 500))
        .await?;
    Ok(Json(items))
}

/// Retry a failed item: the original stays failed and a fresh queued
/// clone references it.
pub async fn retry_item(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<QueueItem>)> {
    let item = state
        .repos
        .queue
        .get(QueueItemId(id))
        .await?
        .filter(|item| item.user_id == user.id)
        .ok_or_else(|| AppError::not_found("queue item not found"))?;

    if item.status != QueueStatus::Failed {
        return Err(AppError::unprocessable("only failed items can be retried"));
    }

    let clone = state.repos.queue.clone_for_retry(item.id).await?;
    Ok((StatusCode::CREATED, Json(clone)))
}
