use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a watcher currently is in its connect/drain/wait cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatcherMode {
    Connecting,
    Idle,
    Polling,
    Processing,
    ErrorBackoff,
    Stopped,
}

impl WatcherMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatcherMode::Connecting => "connecting",
            WatcherMode::Idle => "idle",
            WatcherMode::Polling => "polling",
            WatcherMode::Processing => "processing",
            WatcherMode::ErrorBackoff => "error_backoff",
            WatcherMode::Stopped => "stopped",
        }
    }
}

/// Point-in-time snapshot of a running watcher, read by the status API.
///
/// The watcher task is the only writer; readers always take a copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherStatus {
    pub mode: WatcherMode,
    pub last_scan_at: Option<DateTime<Utc>>,
    pub next_scan_at: Option<DateTime<Utc>>,
    pub last_activity_at: Option<DateTime<Utc>>,
    /// Total messages found in the current drain.
    pub queue_total: usize,
    /// 1-based position within the current drain.
    pub queue_position: usize,
    pub current_subject: Option<String>,
    pub current_sender: Option<String>,
    pub error: Option<String>,
}

impl Default for WatcherStatus {
    fn default() -> Self {
        Self {
            mode: WatcherMode::Connecting,
            last_scan_at: None,
            next_scan_at: None,
            last_activity_at: None,
            queue_total: 0,
            queue_position: 0,
            current_subject: None,
            current_sender: None,
            error: None,
        }
    }
}

impl WatcherStatus {
    /// Reset drain progress after a cycle completes.
    pub fn clear_progress(&mut self) {
        self.queue_total = 0;
        self.queue_position = 0;
        self.current_subject = None;
        self.current_sender = None;
    }
}
