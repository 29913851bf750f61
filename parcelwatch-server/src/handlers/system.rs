//! Health and system status: scheduler jobs, queue depth, module and
//! watcher state.

use axum::Json;
use axum::extract::State;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use crate::auth::AdminUser;
use crate::errors::AppResult;
use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    // Best-effort: health stays 200 while the process is up; the check
    // results tell the operator what is degraded.
    let database = match state.repos.queue.queued_count().await {
        Ok(_) => json!({"status": "healthy"}),
        Err(e) => json!({"status": "unhealthy", "error": e.to_string()}),
    };

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
        "checks": {"database": database},
    }))
}

pub async fn system_status(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> AppResult<Json<Value>> {
    let jobs: Vec<Value> = state
        .scheduler
        .snapshot()
        .into_iter()
        .map(|(id, meta)| {
            let next_run_at: Option<DateTime<Utc>> = meta
                .last_run_at
                .map(|last| last + chrono::Duration::seconds(meta.interval_seconds as i64));
            json!({
                "id": id,
                "description": meta.description,
                "interval_seconds": meta.interval_seconds,
                "last_run_at": meta.last_run_at,
                "last_status": meta.last_status,
                "next_run_at": next_run_at,
            })
        })
        .collect();

    let queued = state.repos.queue.queued_count().await?;
    let modules = state.registry.overview().await?;

    let watchers: Vec<Value> = state
        .supervisor
        .status_snapshot()
        .into_iter()
        .map(|(target, running, status)| {
            json!({
                "target": target.to_string(),
                "running": running,
                "state": status,
            })
        })
        .collect();

    Ok(Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "scheduler": {"jobs": jobs},
        "queue": {"queued": queued},
        "modules": modules,
        "watchers": watchers,
    })))
}
