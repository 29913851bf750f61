//! Password hashing, bearer tokens, and the request extractors that
//! enforce them.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use parcelwatch_model::{User, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;

/// Issues and verifies bearer tokens, and owns password hashing.
#[derive(Clone)]
pub struct AuthService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    algorithm: Algorithm,
    expire_minutes: i64,
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("algorithm", &self.algorithm)
            .field("expire_minutes", &self.expire_minutes)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: Uuid,
    pub iat: i64,
    pub exp: i64,
}

impl AuthService {
    pub fn new(secret: &str, algorithm: &str, expire_minutes: i64) -> anyhow::Result<Self> {
        let algorithm: Algorithm = algorithm
            .parse()
            .map_err(|_| anyhow::anyhow!("unsupported JWT algorithm: {algorithm}"))?;
        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            algorithm,
            expire_minutes,
        })
    }

    pub fn hash_password(&self, password: &str) -> Result<String, AppError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AppError::internal(format!("failed to hash password: {e}")))
    }

    pub fn verify_password(&self, hash: &str, password: &str) -> bool {
        PasswordHash::new(hash)
            .map(|parsed| {
                Argon2::default()
                    .verify_password(password.as_bytes(), &parsed)
                    .is_ok()
            })
            .unwrap_or(false)
    }

    pub fn issue_token(&self, user_id: UserId) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_uuid(),
            iat: now.timestamp(),
            exp: (now + chrono::Duration::minutes(self.expire_minutes)).timestamp(),
        };
        jsonwebtoken::encode(&Header::new(self.algorithm), &claims, &self.encoding)
            .map_err(|e| AppError::internal(format!("failed to sign token: {e}")))
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, AppError> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &Validation::new(self.algorithm))
            .map(|data| data.claims)
            .map_err(|_| AppError::unauthorized("invalid or expired token"))
    }
}

/// The authenticated user behind the request's bearer token.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::unauthorized("missing authorization header"))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::unauthorized("expected a bearer token"))?;

        let claims = state.auth.verify_token(token)?;
        let user = state
            .repos
            .users
            .get(UserId(claims.sub))
            .await?
            .ok_or_else(|| AppError::unauthorized("user no longer exists"))?;

        Ok(CurrentUser(user))
    }
}

/// Like [`CurrentUser`], but rejects non-admins.
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_admin {
            return Err(AppError::forbidden("administrator access required"));
        }
        Ok(AdminUser(user))
    }
}
