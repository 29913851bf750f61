use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::ids::{OrderId, QueueItemId, UserId};

/// Lifecycle of a captured message in the processing queue.
///
/// Transitions form a DAG: `queued -> processing -> {completed, failed}`.
/// A failed item is never re-queued in place; retry clones it into a new
/// row referencing the original via `cloned_from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Queued => "queued",
            QueueStatus::Processing => "processing",
            QueueStatus::Completed => "completed",
            QueueStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, QueueStatus::Completed | QueueStatus::Failed)
    }
}

impl std::str::FromStr for QueueStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(QueueStatus::Queued),
            "processing" => Ok(QueueStatus::Processing),
            "completed" => Ok(QueueStatus::Completed),
            "failed" => Ok(QueueStatus::Failed),
            other => Err(ModelError::InvalidQueueStatus(other.to_string())),
        }
    }
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The captured message payload stored on a queue item, exactly as the
/// watcher saw it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEmail {
    pub subject: String,
    pub sender: String,
    pub body: String,
    pub message_id: String,
    pub email_uid: u32,
    pub email_date: Option<DateTime<Utc>>,
}

/// One unit of analyzer work, created by a watcher and consumed by the
/// queue processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: QueueItemId,
    pub user_id: UserId,
    pub status: QueueStatus,
    pub source_type: String,
    pub source_info: String,
    pub raw_data: RawEmail,
    /// Raw analyzer response, stored regardless of outcome.
    pub extracted_data: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub order_id: Option<OrderId>,
    pub cloned_from: Option<QueueItemId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
