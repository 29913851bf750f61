use std::env;

use anyhow::Context;

/// Server configuration loaded via environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Server settings
    pub server_host: String,
    pub server_port: u16,

    // Database settings
    pub database_url: String,

    // Bearer-token signing secret
    pub secret_key: String,

    // Key material for at-rest secret encryption
    pub encryption_key: String,

    // Token settings
    pub jwt_algorithm: String,
    pub jwt_expire_minutes: i64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .context("DATABASE_URL is required (postgres://...)")?;

        Ok(Self {
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .unwrap_or(8000),

            database_url,

            secret_key: env::var("SECRET_KEY")
                .unwrap_or_else(|_| "change-me-in-production".to_string()),
            encryption_key: env::var("ENCRYPTION_KEY")
                .unwrap_or_else(|_| "change-me-in-production".to_string()),

            jwt_algorithm: env::var("JWT_ALGORITHM").unwrap_or_else(|_| "HS256".to_string()),
            jwt_expire_minutes: env::var("JWT_EXPIRE_MINUTES")
                .unwrap_or_else(|_| "1440".to_string())
                .parse()
                .unwrap_or(1440),
        })
    }
}
