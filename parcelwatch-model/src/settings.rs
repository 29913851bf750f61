use serde::{Deserialize, Serialize};

/// Global mail-scanning knobs, stored as a singleton row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImapSettings {
    /// How far back `SINCE` searches reach. Folder overrides beat this.
    pub max_email_age_days: i32,
    /// When off, UIDVALIDITY changes are ignored instead of resetting.
    pub check_uidvalidity: bool,
}

impl Default for ImapSettings {
    fn default() -> Self {
        Self {
            max_email_age_days: 7,
            check_uidvalidity: true,
        }
    }
}

/// Queue retention limits, stored as a singleton row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSettings {
    pub max_age_days: i64,
    pub max_per_user: i64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            max_age_days: 7,
            max_per_user: 5000,
        }
    }
}

impl QueueSettings {
    /// Both limits must stay at least 1.
    pub fn clamped(self) -> Self {
        Self {
            max_age_days: self.max_age_days.max(1),
            max_per_user: self.max_per_user.max(1),
        }
    }
}

/// Connection settings for the analyzer's LLM endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: String,
    pub model_name: String,
    #[serde(skip_serializing)]
    pub api_key_encrypted: Option<String>,
    pub api_base_url: Option<String>,
    /// Overrides the built-in extraction prompt when set.
    pub system_prompt: Option<String>,
    pub is_active: bool,
}

/// Outbound mail settings, managed externally and consumed by notifier
/// modules that deliver over SMTP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_encrypted: String,
    pub from_address: String,
    pub use_tls: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_settings_clamp_to_one() {
        let s = QueueSettings {
            max_age_days: 0,
            max_per_user: -3,
        }
        .clamped();
        assert_eq!(s.max_age_days, 1);
        assert_eq!(s.max_per_user, 1);
    }
}
