use async_trait::async_trait;
use parcelwatch_model::{ImapSettings, LlmConfig, QueueSettings, SmtpConfig};
use sqlx::PgPool;

use crate::database::ports::settings::SettingsStore;
use crate::error::Result;

/// Singleton configuration rows, all pinned to `id = 1`.
///
/// Reads fall back to `Default` so a fresh deployment behaves sensibly
/// before an admin ever touches settings.
#[derive(Debug, Clone)]
pub struct PostgresSettingsRepository {
    pool: PgPool,
}

impl PostgresSettingsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SettingsStore for PostgresSettingsRepository {
    async fn imap_settings(&self) -> Result<ImapSettings> {
        let row = sqlx::query_as::<_, ImapSettingsRow>(
            "SELECT max_email_age_days, check_uidvalidity FROM imap_settings WHERE id = 1",
        )
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(Into::into).unwrap_or_default())
    }

    async fn update_imap_settings(&self, settings: &ImapSettings) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO imap_settings (id, max_email_age_days, check_uidvalidity)
            VALUES (1, $1, $2)
            ON CONFLICT (id) DO UPDATE SET
                max_email_age_days = EXCLUDED.max_email_age_days,
                check_uidvalidity = EXCLUDED.check_uidvalidity
            "#,
        )
        .bind(settings.max_email_age_days)
        .bind(settings.check_uidvalidity)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    async fn queue_settings(&self) -> Result<QueueSettings> {
        let row = sqlx::query_as::<_, QueueSettingsRow>(
            "SELECT max_age_days, max_per_user FROM queue_settings WHERE id = 1",
        )
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(Into::into).unwrap_or_default())
    }

    async fn update_queue_settings(&self, settings: &QueueSettings) -> Result<()> {
        let settings = settings.clone().clamped();
        sqlx::query(
            r#"
            INSERT INTO queue_settings (id, max_age_days, max_per_user)
            VALUES (1, $1, $2)
            ON CONFLICT (id) DO UPDATE SET
                max_age_days = EXCLUDED.max_age_days,
                max_per_user = EXCLUDED.max_per_user
            "#,
        )
        .bind(settings.max_age_days)
        .bind(settings.max_per_user)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    async fn llm_config(&self) -> Result<Option<LlmConfig>> {
        let row = sqlx::query_as::<_, LlmConfigRow>(
            r#"
            SELECT provider, model_name, api_key_encrypted, api_base_url, system_prompt, is_active
            FROM llm_config
            WHERE id = 1
            "#,
        )
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(Into::into))
    }

    async fn upsert_llm_config(&self, config: &LlmConfig) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO llm_config (id, provider, model_name, api_key_encrypted, api_base_url, system_prompt, is_active)
            VALUES (1, $1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                provider = EXCLUDED.provider,
                model_name = EXCLUDED.model_name,
                api_key_encrypted = EXCLUDED.api_key_encrypted,
                api_base_url = EXCLUDED.api_base_url,
                system_prompt = EXCLUDED.system_prompt,
                is_active = EXCLUDED.is_active
            "#,
        )
        .bind(&config.provider)
        .bind(&config.model_name)
        .bind(&config.api_key_encrypted)
        .bind(&config.api_base_url)
        .bind(&config.system_prompt)
        .bind(config.is_active)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    async fn smtp_config(&self) -> Result<Option<SmtpConfig>> {
        let row = sqlx::query_as::<_, SmtpConfigRow>(
            r#"
            SELECT host, port, username, password_encrypted, from_address, use_tls
            FROM smtp_config
            WHERE id = 1
            "#,
        )
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(Into::into))
    }

    async fn upsert_smtp_config(&self, config: &SmtpConfig) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO smtp_config (id, host, port, username, password_encrypted, from_address, use_tls)
            VALUES (1, $1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                host = EXCLUDED.host,
                port = EXCLUDED.port,
                username = EXCLUDED.username,
                password_encrypted = EXCLUDED.password_encrypted,
                from_address = EXCLUDED.from_address,
                use_tls = EXCLUDED.use_tls
            "#,
        )
        .bind(&config.host)
        .bind(config.port as i32)
        .bind(&config.username)
        .bind(&config.password_encrypted)
        .bind(&config.from_address)
        .bind(config.use_tls)
        .execute(self.pool())
        .await?;

        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct ImapSettingsRow {
    max_email_age_days: i32,
    check_uidvalidity: bool,
}

impl From<ImapSettingsRow> for ImapSettings {
    fn from(row: ImapSettingsRow) -> Self {
        ImapSettings {
            max_email_age_days: row.max_email_age_days,
            check_uidvalidity: row.check_uidvalidity,
        }
    }
}

#[derive(sqlx::FromRow)]
struct QueueSettingsRow {
    max_age_days: i64,
    max_per_user: i64,
}

impl From<QueueSettingsRow> for QueueSettings {
    fn from(row: QueueSettingsRow) -> Self {
        QueueSettings {
            max_age_days: row.max_age_days,
            max_per_user: row.max_per_user,
        }
        .clamped()
    }
}

#[derive(sqlx::FromRow)]
struct LlmConfigRow {
    provider: String,
    model_name: String,
    api_key_encrypted: Option<String>,
    api_base_url: Option<String>,
    system_prompt: Option<String>,
    is_active: bool,
}

impl From<LlmConfigRow> for LlmConfig {
    fn from(row: LlmConfigRow) -> Self {
        LlmConfig {
            provider: row.provider,
            model_name: row.model_name,
            api_key_encrypted: row.api_key_encrypted,
            api_base_url: row.api_base_url,
            system_prompt: row.system_prompt,
            is_active: row.is_active,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SmtpConfigRow {
    host: String,
    port: i32,
    username: String,
    password_encrypted: String,
    from_address: String,
    use_tls: bool,
}

impl From<SmtpConfigRow> for SmtpConfig {
    fn from(row: SmtpConfigRow) -> Self {
        SmtpConfig {
            host: row.host,
            port: row.port as u16,
            username: row.username,
            password_encrypted: row.password_encrypted,
            from_address: row.from_address,
            use_tls: row.use_tls,
        }
    }
}
