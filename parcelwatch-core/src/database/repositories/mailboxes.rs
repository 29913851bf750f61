use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parcelwatch_model::{
    FolderId, GlobalMailbox, Mailbox, MailboxId, MailboxSecurity, UserId, WatchedFolder,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::ports::mailboxes::MailboxStore;
use crate::error::{CoreError, Result};

#[derive(Debug, Clone)]
pub struct PostgresMailboxRepository {
    pool: PgPool,
}

impl PostgresMailboxRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }
}

const MAILBOX_COLUMNS: &str = r#"
    id, user_id, name, host, port, username, password_encrypted, security,
    poll_interval_secs, prefer_polling, idle_supported, is_active, created_at
"#;

const FOLDER_COLUMNS: &str = "id, mailbox_id, path, last_uid, uid_validity, max_age_days";

#[async_trait]
impl MailboxStore for PostgresMailboxRepository {
    async fn insert_mailbox(&self, mailbox: &Mailbox) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO mailboxes (
                id, user_id, name, host, port, username, password_encrypted,
                security, poll_interval_secs, prefer_polling, idle_supported,
                is_active, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(mailbox.id.as_uuid())
        .bind(mailbox.user_id.as_uuid())
        .bind(&mailbox.name)
        .bind(&mailbox.host)
        .bind(mailbox.port as i32)
        .bind(&mailbox.username)
        .bind(&mailbox.password_encrypted)
        .bind(mailbox.security.as_str())
        .bind(mailbox.poll_interval_secs as i32)
        .bind(mailbox.prefer_polling)
        .bind(mailbox.idle_supported)
        .bind(mailbox.is_active)
        .bind(mailbox.created_at)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    async fn update_mailbox(&self, mailbox: &Mailbox) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE mailboxes
            SET name = $1,
                host = $2,
                port = $3,
                username = $4,
                password_encrypted = $5,
                security = $6,
                poll_interval_secs = $7,
                prefer_polling = $8,
                is_active = $9
            WHERE id = $10
            "#,
        )
        .bind(&mailbox.name)
        .bind(&mailbox.host)
        .bind(mailbox.port as i32)
        .bind(&mailbox.username)
        .bind(&mailbox.password_encrypted)
        .bind(mailbox.security.as_str())
        .bind(mailbox.poll_interval_secs as i32)
        .bind(mailbox.prefer_polling)
        .bind(mailbox.is_active)
        .bind(mailbox.id.as_uuid())
        .execute(self.pool())
        .await?;

        Ok(())
    }

    async fn delete_mailbox(&self, user_id: UserId, id: MailboxId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM mailboxes WHERE id = $1 AND user_id = $2")
            .bind(id.as_uuid())
            .bind(user_id.as_uuid())
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_mailbox(&self, id: MailboxId) -> Result<Option<Mailbox>> {
        let row = sqlx::query_as::<_, MailboxRow>(&format!(
            "SELECT {MAILBOX_COLUMNS} FROM mailboxes WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(self.pool())
        .await?;

        row.map(Mailbox::try_from).transpose()
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Mailbox>> {
        let rows = sqlx::query_as::<_, MailboxRow>(&format!(
            "SELECT {MAILBOX_COLUMNS} FROM mailboxes WHERE user_id = $1 ORDER BY created_at"
        ))
        .bind(user_id.as_uuid())
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(Mailbox::try_from).collect()
    }

    async fn insert_folder(&self, folder: &WatchedFolder) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO watched_folders (id, mailbox_id, path, last_uid, uid_validity, max_age_days)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(folder.id.as_uuid())
        .bind(folder.mailbox_id.as_uuid())
        .bind(&folder.path)
        .bind(folder.last_uid as i64)
        .bind(folder.uid_validity.map(|v| v as i64))
        .bind(folder.max_age_days)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    async fn delete_folder(&self, id: FolderId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM watched_folders WHERE id = $1")
            .bind(id.as_uuid())
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_folder(&self, id: FolderId) -> Result<Option<WatchedFolder>> {
        let row = sqlx::query_as::<_, FolderRow>(&format!(
            "SELECT {FOLDER_COLUMNS} FROM watched_folders WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(Into::into))
    }

    async fn folders_for_mailbox(&self, mailbox_id: MailboxId) -> Result<Vec<WatchedFolder>> {
        let rows = sqlx::query_as::<_, FolderRow>(&format!(
            "SELECT {FOLDER_COLUMNS} FROM watched_folders WHERE mailbox_id = $1 ORDER BY path"
        ))
        .bind(mailbox_id.as_uuid())
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_active_folders(&self) -> Result<Vec<(Mailbox, WatchedFolder)>> {
        let rows = sqlx::query_as::<_, ActiveFolderRow>(
            r#"
            SELECT
                m.id AS mailbox_id, m.user_id, m.name, m.host, m.port, m.username,
                m.password_encrypted, m.security, m.poll_interval_secs,
                m.prefer_polling, m.idle_supported, m.is_active, m.created_at,
                f.id AS folder_id, f.path, f.last_uid, f.uid_validity, f.max_age_days
            FROM watched_folders f
            JOIN mailboxes m ON m.id = f.mailbox_id
            WHERE m.is_active = TRUE
            ORDER BY m.created_at, f.path
            "#,
        )
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn save_folder_uid(&self, id: FolderId, uid: u32) -> Result<()> {
        sqlx::query("UPDATE watched_folders SET last_uid = $1 WHERE id = $2")
            .bind(uid as i64)
            .bind(id.as_uuid())
            .execute(self.pool())
            .await?;

        Ok(())
    }

    async fn set_folder_validity(
        &self,
        id: FolderId,
        uid_validity: u32,
        reset_last_uid: bool,
    ) -> Result<()> {
        let query = if reset_last_uid {
            "UPDATE watched_folders SET uid_validity = $1, last_uid = 0 WHERE id = $2"
        } else {
            "UPDATE watched_folders SET uid_validity = $1 WHERE id = $2"
        };
        sqlx::query(query)
            .bind(uid_validity as i64)
            .bind(id.as_uuid())
            .execute(self.pool())
            .await?;

        Ok(())
    }

    async fn set_idle_supported(&self, id: MailboxId, supported: bool) -> Result<()> {
        sqlx::query("UPDATE mailboxes SET idle_supported = $1 WHERE id = $2")
            .bind(supported)
            .bind(id.as_uuid())
            .execute(self.pool())
            .await?;

        Ok(())
    }

    async fn set_prefer_polling(&self, id: MailboxId, prefer: bool) -> Result<()> {
        sqlx::query("UPDATE mailboxes SET prefer_polling = $1 WHERE id = $2")
            .bind(prefer)
            .bind(id.as_uuid())
            .execute(self.pool())
            .await?;

        Ok(())
    }

    async fn global(&self) -> Result<Option<GlobalMailbox>> {
        let row = sqlx::query_as::<_, GlobalRow>(
            r#"
            SELECT host, port, username, password_encrypted, security,
                   poll_interval_secs, prefer_polling, idle_supported,
                   watched_folder, last_uid, uid_validity
            FROM global_mailbox
            WHERE id = 1
            "#,
        )
        .fetch_optional(self.pool())
        .await?;

        row.map(GlobalMailbox::try_from).transpose()
    }

    async fn upsert_global(&self, global: &GlobalMailbox) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO global_mailbox (
                id, host, port, username, password_encrypted, security,
                poll_interval_secs, prefer_polling, idle_supported,
                watched_folder, last_uid, uid_validity
            ) VALUES (1, $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                host = EXCLUDED.host,
                port = EXCLUDED.port,
                username = EXCLUDED.username,
                password_encrypted = EXCLUDED.password_encrypted,
                security = EXCLUDED.security,
                poll_interval_secs = EXCLUDED.poll_interval_secs,
                prefer_polling = EXCLUDED.prefer_polling,
                idle_supported = EXCLUDED.idle_supported,
                watched_folder = EXCLUDED.watched_folder,
                last_uid = EXCLUDED.last_uid,
                uid_validity = EXCLUDED.uid_validity
            "#,
        )
        .bind(&global.host)
        .bind(global.port as i32)
        .bind(&global.username)
        .bind(&global.password_encrypted)
        .bind(global.security.as_str())
        .bind(global.poll_interval_secs as i32)
        .bind(global.prefer_polling)
        .bind(global.idle_supported)
        .bind(&global.watched_folder)
        .bind(global.last_uid as i64)
        .bind(global.uid_validity.map(|v| v as i64))
        .execute(self.pool())
        .await?;

        Ok(())
    }

    async fn delete_global(&self) -> Result<bool> {
        let result = sqlx::query("DELETE FROM global_mailbox WHERE id = 1")
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn save_global_uid(&self, uid: u32) -> Result<()> {
        sqlx::query("UPDATE global_mailbox SET last_uid = $1 WHERE id = 1")
            .bind(uid as i64)
            .execute(self.pool())
            .await?;

        Ok(())
    }

    async fn set_global_validity(&self, uid_validity: u32, reset_last_uid: bool) -> Result<()> {
        let query = if reset_last_uid {
            "UPDATE global_mailbox SET uid_validity = $1, last_uid = 0 WHERE id = 1"
        } else {
            "UPDATE global_mailbox SET uid_validity = $1 WHERE id = 1"
        };
        sqlx::query(query)
            .bind(uid_validity as i64)
            .execute(self.pool())
            .await?;

        Ok(())
    }

    async fn set_global_idle_supported(&self, supported: bool) -> Result<()> {
        sqlx::query("UPDATE global_mailbox SET idle_supported = $1 WHERE id = 1")
            .bind(supported)
            .execute(self.pool())
            .await?;

        Ok(())
    }

    async fn set_global_prefer_polling(&self, prefer: bool) -> Result<()> {
        sqlx::query("UPDATE global_mailbox SET prefer_polling = $1 WHERE id = 1")
            .bind(prefer)
            .execute(self.pool())
            .await?;

        Ok(())
    }
}

fn parse_security(value: &str) -> Result<MailboxSecurity> {
    value
        .parse()
        .map_err(|_| CoreError::Internal(format!("invalid security value in database: {value}")))
}

#[derive(sqlx::FromRow)]
struct MailboxRow {
    id: Uuid,
    user_id: Uuid,
    name: String,
    host: String,
    port: i32,
    username: String,
    password_encrypted: String,
    security: String,
    poll_interval_secs: i32,
    prefer_polling: bool,
    idle_supported: Option<bool>,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<MailboxRow> for Mailbox {
    type Error = CoreError;

    fn try_from(row: MailboxRow) -> Result<Self> {
        Ok(Mailbox {
            id: MailboxId(row.id),
            user_id: UserId(row.user_id),
            name: row.name,
            host: row.host,
            port: row.port as u16,
            username: row.username,
            password_encrypted: row.password_encrypted,
            security: parse_security(&row.security)?,
            poll_interval_secs: row.poll_interval_secs as u32,
            prefer_polling: row.prefer_polling,
            idle_supported: row.idle_supported,
            is_active: row.is_active,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct FolderRow {
    id: Uuid,
    mailbox_id: Uuid,
    path: String,
    last_uid: i64,
    uid_validity: Option<i64>,
    max_age_days: Option<i32>,
}

impl From<FolderRow> for WatchedFolder {
    fn from(row: FolderRow) -> Self {
        WatchedFolder {
            id: FolderId(row.id),
            mailbox_id: MailboxId(row.mailbox_id),
            path: row.path,
            last_uid: row.last_uid as u32,
            uid_validity: row.uid_validity.map(|v| v as u32),
            max_age_days: row.max_age_days,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ActiveFolderRow {
    mailbox_id: Uuid,
    user_id: Uuid,
    name: String,
    host: String,
    port: i32,
    username: String,
    password_encrypted: String,
    security: String,
    poll_interval_secs: i32,
    prefer_polling: bool,
    idle_supported: Option<bool>,
    is_active: bool,
    created_at: DateTime<Utc>,
    folder_id: Uuid,
    path: String,
    last_uid: i64,
    uid_validity: Option<i64>,
    max_age_days: Option<i32>,
}

impl TryFrom<ActiveFolderRow> for (Mailbox, WatchedFolder) {
    type Error = CoreError;

    fn try_from(row: ActiveFolderRow) -> Result<Self> {
        let mailbox = Mailbox {
            id: MailboxId(row.mailbox_id),
            user_id: UserId(row.user_id),
            name: row.name,
            host: row.host,
            port: row.port as u16,
            username: row.username,
            password_encrypted: row.password_encrypted,
            security: parse_security(&row.security)?,
            poll_interval_secs: row.poll_interval_secs as u32,
            prefer_polling: row.prefer_polling,
            idle_supported: row.idle_supported,
            is_active: row.is_active,
            created_at: row.created_at,
        };
        let folder = WatchedFolder {
            id: FolderId(row.folder_id),
            mailbox_id: MailboxId(row.mailbox_id),
            path: row.path,
            last_uid: row.last_uid as u32,
            uid_validity: row.uid_validity.map(|v| v as u32),
            max_age_days: row.max_age_days,
        };
        Ok((mailbox, folder))
    }
}

#[derive(sqlx::FromRow)]
struct GlobalRow {
    host: String,
    port: i32,
    username: String,
    password_encrypted: String,
    security: String,
    poll_interval_secs: i32,
    prefer_polling: bool,
    idle_supported: Option<bool>,
    watched_folder: String,
    last_uid: i64,
    uid_validity: Option<i64>,
}

impl TryFrom<GlobalRow> for GlobalMailbox {
    type Error = CoreError;

    fn try_from(row: GlobalRow) -> Result<Self> {
        Ok(GlobalMailbox {
            host: row.host,
            port: row.port as u16,
            username: row.username,
            password_encrypted: row.password_encrypted,
            security: parse_security(&row.security)?,
            poll_interval_secs: row.poll_interval_secs as u32,
            prefer_polling: row.prefer_polling,
            idle_supported: row.idle_supported,
            watched_folder: row.watched_folder,
            last_uid: row.last_uid as u32,
            uid_validity: row.uid_validity.map(|v| v as u32),
        })
    }
}
