//! Admin-managed singleton settings: IMAP scanning, queue retention,
//! and the LLM backend.

use axum::Json;
use axum::extract::State;
use parcelwatch_model::{ImapSettings, LlmConfig, QueueSettings};
use serde::{Deserialize, Serialize};

use crate::auth::AdminUser;
use crate::errors::{AppError, AppResult};
use crate::state::AppState;

pub async fn get_imap_settings(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> AppResult<Json<ImapSettings>> {
    Ok(Json(state.repos.settings.imap_settings().await?))
}

pub async fn update_imap_settings(
    _admin: AdminUser,
    State(state): State<AppState>,
    Json(settings): Json<ImapSettings>,
) -> AppResult<Json<ImapSettings>> {
    if settings.max_email_age_days < 1 {
        return Err(AppError::unprocessable("max_email_age_days must be >= 1"));
    }
    state
        .repos
        .settings
        .update_imap_settings(&settings)
        .await?;
    Ok(Json(settings))
}

pub async fn get_queue_settings(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> AppResult<Json<QueueSettings>> {
    Ok(Json(state.repos.settings.queue_settings().await?))
}

pub async fn update_queue_settings(
    _admin: AdminUser,
    State(state): State<AppState>,
    Json(settings): Json<QueueSettings>,
) -> AppResult<Json<QueueSettings>> {
    if settings.max_age_days < 1 || settings.max_per_user < 1 {
        return Err(AppError::unprocessable(
            "queue retention limits must be >= 1",
        ));
    }
    state
        .repos
        .settings
        .update_queue_settings(&settings)
        .await?;
    Ok(Json(settings))
}

#[derive(Debug, Serialize)]
pub struct LlmConfigResponse {
    pub provider: String,
    pub model_name: String,
    pub api_base_url: Option<String>,
    pub system_prompt: Option<String>,
    pub is_active: bool,
    pub has_api_key: bool,
}

impl From<LlmConfig> for LlmConfigResponse {
    fn from(config: LlmConfig) -> Self {
        Self {
            provider: config.provider,
            model_name: config.model_name,
            api_base_url: config.api_base_url,
            system_prompt: config.system_prompt,
            is_active: config.is_active,
            has_api_key: config.api_key_encrypted.is_some(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpsertLlmConfigRequest {
    pub provider: String,
    pub model_name: String,
    /// Replaces the stored key when present; otherwise the old key is
    /// kept.
    pub api_key: Option<String>,
    pub api_base_url: Option<String>,
    pub system_prompt: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

pub async fn get_llm_config(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> AppResult<Json<LlmConfigResponse>> {
    let config = state
        .repos
        .settings
        .llm_config()
        .await?
        .ok_or_else(|| AppError::not_found("no analyzer backend configured"))?;
    Ok(Json(config.into()))
}

pub async fn update_llm_config(
    _admin: AdminUser,
    State(state): State<AppState>,
    Json(request): Json<UpsertLlmConfigRequest>,
) -> AppResult<Json<LlmConfigResponse>> {
    let existing = state.repos.settings.llm_config().await?;

    let api_key_encrypted = match request.api_key {
        Some(key) => Some(state.cipher.encrypt(&key)?),
        None => existing.and_then(|config| config.api_key_encrypted),
    };

    let config = LlmConfig {
        provider: request.provider,
        model_name: request.model_name,
        api_key_encrypted,
        api_base_url: request.api_base_url,
        system_prompt: request.system_prompt,
        is_active: request.is_active,
    };
    state.repos.settings.upsert_llm_config(&config).await?;

    Ok(Json(config.into()))
}
