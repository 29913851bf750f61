//! Administration of the global shared mailbox and its sender bindings.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use parcelwatch_model::{GlobalMailbox, MailboxSecurity, SenderBinding};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{AdminUser, CurrentUser};
use crate::errors::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct GlobalMailboxResponse {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub security: MailboxSecurity,
    pub poll_interval_secs: u32,
    pub prefer_polling: bool,
    pub idle_supported: Option<bool>,
    pub watched_folder: String,
    pub last_uid: u32,
}

impl From<GlobalMailbox> for GlobalMailboxResponse {
    fn from(global: GlobalMailbox) -> Self {
        Self {
            host: global.host,
            port: global.port,
            username: global.username,
            security: global.security,
            poll_interval_secs: global.poll_interval_secs,
            prefer_polling: global.prefer_polling,
            idle_supported: global.idle_supported,
            watched_folder: global.watched_folder,
            last_uid: global.last_uid,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpsertGlobalMailboxRequest {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
    #[serde(default = "default_security")]
    pub security: MailboxSecurity,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u32,
    #[serde(default)]
    pub prefer_polling: bool,
    #[serde(default = "default_folder")]
    pub watched_folder: String,
}

fn default_security() -> MailboxSecurity {
    MailboxSecurity::Ssl
}

fn default_poll_interval() -> u32 {
    300
}

fn default_folder() -> String {
    "INBOX".to_string()
}

pub async fn get_global(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> AppResult<Json<GlobalMailboxResponse>> {
    let global = state
        .repos
        .mailboxes
        .global()
        .await?
        .ok_or_else(|| AppError::not_found("global mailbox is not configured"))?;
    Ok(Json(global.into()))
}

pub async fn upsert_global(
    _admin: AdminUser,
    State(state): State<AppState>,
    Json(request): Json<UpsertGlobalMailboxRequest>,
) -> AppResult<Json<GlobalMailboxResponse>> {
    let existing = state.repos.mailboxes.global().await?;

    let password_encrypted = match (&request.password, &existing) {
        (Some(password), _) => state.cipher.encrypt(password)?,
        (None, Some(existing)) => existing.password_encrypted.clone(),
        (None, None) => {
            return Err(AppError::unprocessable(
                "a password is required when configuring the global mailbox",
            ));
        }
    };

    // A changed folder means the stored cursor is meaningless.
    let (last_uid, uid_validity) = match &existing {
        Some(existing) if existing.watched_folder == request.watched_folder => {
            (existing.last_uid, existing.uid_validity)
        }
        _ => (0, None),
    };

    let global = GlobalMailbox {
        host: request.host,
        port: request.port,
        username: request.username,
        password_encrypted,
        security: request.security,
        poll_interval_secs: request.poll_interval_secs,
        prefer_polling: request.prefer_polling,
        idle_supported: existing.and_then(|e| e.idle_supported),
        watched_folder: request.watched_folder,
        last_uid,
        uid_validity,
    };
    state.repos.mailboxes.upsert_global(&global).await?;

    // Reconnect with the new settings.
    state.mail_global.restart().await?;

    Ok(Json(global.into()))
}

pub async fn delete_global(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> AppResult<StatusCode> {
    state.mail_global.stop().await;
    if state.repos.mailboxes.delete_global().await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("global mailbox is not configured"))
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateBindingRequest {
    pub email_address: String,
}

pub async fn list_bindings(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<SenderBinding>>> {
    Ok(Json(state.repos.bindings.list_for_user(user.id).await?))
}

pub async fn create_binding(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(request): Json<CreateBindingRequest>,
) -> AppResult<(StatusCode, Json<SenderBinding>)> {
    let address = request.email_address.trim();
    if address.is_empty() || !address.contains('@') {
        return Err(AppError::unprocessable("a valid email address is required"));
    }

    let binding = state.repos.bindings.insert(user.id, address).await?;
    Ok((StatusCode::CREATED, Json(binding)))
}

pub async fn delete_binding(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    if state.repos.bindings.delete(user.id, id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("sender address not found"))
    }
}
