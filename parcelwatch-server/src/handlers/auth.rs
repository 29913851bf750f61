use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
}

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> AppResult<Json<TokenResponse>> {
    let user = state
        .repos
        .users
        .find_by_username(&request.username)
        .await?;

    // Verify against a found user only after the lookup so the error is
    // identical for unknown users and wrong passwords.
    let authenticated = user
        .as_ref()
        .is_some_and(|user| state.auth.verify_password(&user.password_hash, &request.password));
    let Some(user) = user.filter(|_| authenticated) else {
        return Err(AppError::unauthorized("invalid username or password"));
    };

    let access_token = state.auth.issue_token(user.id)?;
    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer",
    }))
}
