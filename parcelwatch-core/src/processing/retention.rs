//! Periodic queue retention: age-based sweep plus a per-user cap.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::database::ports::queue::QueueStore;
use crate::database::ports::settings::SettingsStore;
use crate::error::Result;

pub struct RetentionSweeper {
    queue: Arc<dyn QueueStore>,
    settings: Arc<dyn SettingsStore>,
}

impl std::fmt::Debug for RetentionSweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetentionSweeper").finish_non_exhaustive()
    }
}

impl RetentionSweeper {
    pub fn new(queue: Arc<dyn QueueStore>, settings: Arc<dyn SettingsStore>) -> Self {
        Self { queue, settings }
    }

    pub async fn run(&self) -> Result<()> {
        let settings = self.settings.queue_settings().await?.clamped();

        let cutoff = Utc::now() - chrono::Duration::days(settings.max_age_days);
        let mut removed = self.queue.delete_older_than(cutoff).await?;
        removed += self.queue.delete_user_overflow(settings.max_per_user).await?;

        if removed > 0 {
            info!("queue cleanup: removed {removed} items");
        }

        Ok(())
    }
}
