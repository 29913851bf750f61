use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// What a registered module contributes to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKind {
    /// Captures messages into the queue (mailbox sources).
    Provider,
    /// Turns raw captures into structured order data.
    Analyzer,
    /// Delivers user-visible notifications.
    Notifier,
}

impl ModuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleKind::Provider => "provider",
            ModuleKind::Analyzer => "analyzer",
            ModuleKind::Notifier => "notifier",
        }
    }
}

impl std::str::FromStr for ModuleKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "provider" => Ok(ModuleKind::Provider),
            "analyzer" => Ok(ModuleKind::Analyzer),
            "notifier" => Ok(ModuleKind::Notifier),
            other => Err(ModelError::InvalidModuleKind(other.to_string())),
        }
    }
}

/// Persisted admin toggle for a discovered module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleConfigRecord {
    pub module_key: String,
    pub enabled: bool,
    pub priority: i32,
}
