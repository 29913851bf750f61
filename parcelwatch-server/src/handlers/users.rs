use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use parcelwatch_model::{User, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{AdminUser, CurrentUser};
use crate::errors::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: UserId,
    pub username: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            is_admin: user.is_admin,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub is_admin: bool,
}

pub async fn me(CurrentUser(user): CurrentUser) -> Json<UserResponse> {
    Json(user.into())
}

pub async fn list_users(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<UserResponse>>> {
    let users = state.repos.users.list().await?;
    Ok(Json(users.into_iter().map(Into::into).collect()))
}

pub async fn create_user(
    _admin: AdminUser,
    State(state): State<AppState>,
    Json(request): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    if request.username.trim().is_empty() {
        return Err(AppError::unprocessable("username must not be empty"));
    }
    if request.password.len() < 8 {
        return Err(AppError::unprocessable(
            "password must be at least 8 characters",
        ));
    }

    let user = User {
        id: UserId::new(),
        username: request.username.trim().to_string(),
        password_hash: state.auth.hash_password(&request.password)?,
        is_admin: request.is_admin,
        created_at: Utc::now(),
    };
    state.repos.users.insert(&user).await?;

    Ok((StatusCode::CREATED, Json(user.into())))
}

pub async fn delete_user(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let id = UserId(id);
    if admin.id == id {
        return Err(AppError::unprocessable("cannot delete your own account"));
    }

    if state.repos.users.delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("user not found"))
    }
}
