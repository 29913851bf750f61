//! User mailbox management: accounts, watched folders, connection
//! testing, and manual scans.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::Utc;
use parcelwatch_core::mail::transport::MailboxEndpoint;
use parcelwatch_model::{FolderId, Mailbox, MailboxId, MailboxSecurity, WatchedFolder};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::errors::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct MailboxResponse {
    pub id: MailboxId,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub security: MailboxSecurity,
    pub poll_interval_secs: u32,
    pub prefer_polling: bool,
    pub idle_supported: Option<bool>,
    pub is_active: bool,
}

impl From<Mailbox> for MailboxResponse {
    fn from(mailbox: Mailbox) -> Self {
        Self {
            id: mailbox.id,
            name: mailbox.name,
            host: mailbox.host,
            port: mailbox.port,
            username: mailbox.username,
            security: mailbox.security,
            poll_interval_secs: mailbox.poll_interval_secs,
            prefer_polling: mailbox.prefer_polling,
            idle_supported: mailbox.idle_supported,
            is_active: mailbox.is_active,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateMailboxRequest {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(default = "default_security")]
    pub security: MailboxSecurity,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u32,
    #[serde(default)]
    pub prefer_polling: bool,
}

fn default_security() -> MailboxSecurity {
    MailboxSecurity::Ssl
}

fn default_poll_interval() -> u32 {
    300
}

#[derive(Debug, Deserialize)]
pub struct UpdateMailboxRequest {
    pub name: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    /// Re-encrypts and replaces the stored password when present.
    pub password: Option<String>,
    pub security: Option<MailboxSecurity>,
    pub poll_interval_secs: Option<u32>,
    pub prefer_polling: Option<bool>,
    pub is_active: Option<bool>,
}

pub async fn list_mailboxes(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<MailboxResponse>>> {
    let mailboxes = state.repos.mailboxes.list_for_user(user.id).await?;
    Ok(Json(mailboxes.into_iter().map(Into::into).collect()))
}

pub async fn create_mailbox(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(request): Json<CreateMailboxRequest>,
) -> AppResult<(StatusCode, Json<MailboxResponse>)> {
    let mailbox = Mailbox {
        id: MailboxId::new(),
        user_id: user.id,
        name: request.name,
        host: request.host,
        port: request.port,
        username: request.username,
        password_encrypted: state.cipher.encrypt(&request.password)?,
        security: request.security,
        poll_interval_secs: request.poll_interval_secs,
        prefer_polling: request.prefer_polling,
        idle_supported: None,
        is_active: true,
        created_at: Utc::now(),
    };
    state.repos.mailboxes.insert_mailbox(&mailbox).await?;

    Ok((StatusCode::CREATED, Json(mailbox.into())))
}

async fn owned_mailbox(state: &AppState, user: &parcelwatch_model::User, id: Uuid) -> AppResult<Mailbox> {
    let mailbox = state
        .repos
        .mailboxes
        .get_mailbox(MailboxId(id))
        .await?
        .filter(|mailbox| mailbox.user_id == user.id)
        .ok_or_else(|| AppError::not_found("mailbox not found"))?;
    Ok(mailbox)
}

pub async fn update_mailbox(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateMailboxRequest>,
) -> AppResult<Json<MailboxResponse>> {
    let mut mailbox = owned_mailbox(&state, &user, id).await?;

    if let Some(name) = request.name {
        mailbox.name = name;
    }
    if let Some(host) = request.host {
        mailbox.host = host;
    }
    if let Some(port) = request.port {
        mailbox.port = port;
    }
    if let Some(username) = request.username {
        mailbox.username = username;
    }
    if let Some(password) = request.password {
        mailbox.password_encrypted = state.cipher.encrypt(&password)?;
    }
    if let Some(security) = request.security {
        mailbox.security = security;
    }
    if let Some(interval) = request.poll_interval_secs {
        mailbox.poll_interval_secs = interval;
    }
    if let Some(prefer) = request.prefer_polling {
        mailbox.prefer_polling = prefer;
    }
    if let Some(active) = request.is_active {
        mailbox.is_active = active;
    }

    state.repos.mailboxes.update_mailbox(&mailbox).await?;

    // Watchers reload their configuration on the next cycle; a manual
    // restart picks it up immediately.
    for folder in state
        .repos
        .mailboxes
        .folders_for_mailbox(mailbox.id)
        .await?
    {
        if mailbox.is_active {
            state.mail_user.restart_folder(folder.id).await?;
        } else {
            state
                .supervisor
                .stop(&parcelwatch_core::watcher::WatchTarget::UserFolder(folder.id))
                .await;
        }
    }

    Ok(Json(mailbox.into()))
}

pub async fn delete_mailbox(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let mailbox = owned_mailbox(&state, &user, id).await?;

    for folder in state
        .repos
        .mailboxes
        .folders_for_mailbox(mailbox.id)
        .await?
    {
        state
            .supervisor
            .stop(&parcelwatch_core::watcher::WatchTarget::UserFolder(folder.id))
            .await;
    }

    state.repos.mailboxes.delete_mailbox(user.id, mailbox.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct CreateFolderRequest {
    pub path: String,
    pub max_age_days: Option<i32>,
}

pub async fn list_folders(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<WatchedFolder>>> {
    let mailbox = owned_mailbox(&state, &user, id).await?;
    let folders = state.repos.mailboxes.folders_for_mailbox(mailbox.id).await?;
    Ok(Json(folders))
}

pub async fn create_folder(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<CreateFolderRequest>,
) -> AppResult<(StatusCode, Json<WatchedFolder>)> {
    let mailbox = owned_mailbox(&state, &user, id).await?;
    if request.path.trim().is_empty() {
        return Err(AppError::unprocessable("folder path must not be empty"));
    }

    let folder = WatchedFolder {
        id: FolderId::new(),
        mailbox_id: mailbox.id,
        path: request.path.trim().to_string(),
        last_uid: 0,
        uid_validity: None,
        max_age_days: request.max_age_days,
    };
    state.repos.mailboxes.insert_folder(&folder).await?;

    if mailbox.is_active {
        state.mail_user.restart_folder(folder.id).await?;
    }

    Ok((StatusCode::CREATED, Json(folder)))
}

pub async fn delete_folder(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path((id, folder_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    let mailbox = owned_mailbox(&state, &user, id).await?;
    let folder_id = FolderId(folder_id);

    let owned = state
        .repos
        .mailboxes
        .get_folder(folder_id)
        .await?
        .is_some_and(|folder| folder.mailbox_id == mailbox.id);
    if !owned {
        return Err(AppError::not_found("folder not found"));
    }

    state
        .supervisor
        .stop(&parcelwatch_core::watcher::WatchTarget::UserFolder(folder_id))
        .await;
    state.repos.mailboxes.delete_folder(folder_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Manual "scan now": restart the folder's watcher, which reconnects and
/// drains immediately.
pub async fn scan_folder(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path((id, folder_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<serde_json::Value>> {
    let mailbox = owned_mailbox(&state, &user, id).await?;
    let folder_id = FolderId(folder_id);

    let owned = state
        .repos
        .mailboxes
        .get_folder(folder_id)
        .await?
        .is_some_and(|folder| folder.mailbox_id == mailbox.id);
    if !owned {
        return Err(AppError::not_found("folder not found"));
    }

    state.mail_user.restart_folder(folder_id).await?;
    Ok(Json(serde_json::json!({"status": "scanning"})))
}

/// Connect with the stored credentials and list the server's folders,
/// so the UI can offer paths to watch.
pub async fn available_folders(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<String>>> {
    let mailbox = owned_mailbox(&state, &user, id).await?;
    let password = state.cipher.decrypt(&mailbox.password_encrypted)?;

    let mut session = state
        .connector
        .connect(&MailboxEndpoint {
            host: mailbox.host,
            port: mailbox.port,
            username: mailbox.username,
            password,
            security: mailbox.security,
        })
        .await?;
    let folders = session.list_folders().await?;
    let _ = session.logout().await;

    Ok(Json(folders))
}

#[derive(Debug, Deserialize)]
pub struct TestConnectionRequest {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(default = "default_security")]
    pub security: MailboxSecurity,
}

#[derive(Debug, Serialize)]
pub struct TestConnectionResponse {
    pub success: bool,
    pub message: String,
    pub idle_supported: Option<bool>,
}

/// Try the credentials without persisting anything.
pub async fn test_connection(
    CurrentUser(_user): CurrentUser,
    State(state): State<AppState>,
    Json(request): Json<TestConnectionRequest>,
) -> AppResult<Json<TestConnectionResponse>> {
    let endpoint = MailboxEndpoint {
        host: request.host,
        port: request.port,
        username: request.username,
        password: request.password,
        security: request.security,
    };

    match state.connector.connect(&endpoint).await {
        Ok(mut session) => {
            let idle_supported = session.supports_idle();
            let _ = session.logout().await;
            Ok(Json(TestConnectionResponse {
                success: true,
                message: "connection successful".into(),
                idle_supported: Some(idle_supported),
            }))
        }
        Err(e) => Ok(Json(TestConnectionResponse {
            success: false,
            message: e.to_string(),
            idle_supported: None,
        })),
    }
}
