//! Interval scheduler for the background jobs, with per-job run
//! metadata for the system status API.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::Result;

/// Live metadata for one registered job.
#[derive(Debug, Clone, Serialize)]
pub struct JobMetadata {
    pub description: String,
    pub interval_seconds: u64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_status: Option<String>,
}

/// Runs registered jobs on fixed intervals until shut down.
///
/// Ticks that fall behind are skipped rather than bursted, so a slow
/// run never causes a backlog of immediate re-runs.
pub struct Scheduler {
    jobs: Arc<DashMap<String, JobMetadata>>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("job_count", &self.jobs.len())
            .finish_non_exhaustive()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(DashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Register and start an interval job. Adding an id that already
    /// exists is a no-op.
    pub fn add_job<F, Fut>(&self, id: &str, description: &str, period: Duration, job: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        if self.jobs.contains_key(id) {
            debug!("schedule {id} already exists, skipping");
            return;
        }

        self.jobs.insert(
            id.to_string(),
            JobMetadata {
                description: description.to_string(),
                interval_seconds: period.as_secs(),
                last_run_at: None,
                last_status: None,
            },
        );

        let jobs = Arc::clone(&self.jobs);
        let shutdown = self.shutdown.clone();
        let id_owned = id.to_string();

        tokio::spawn(async move {
            let id = id_owned;
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick fires immediately; skip it so a fresh start
            // does not run every job at once.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("scheduler job {id} stopping");
                        break;
                    }
                    _ = ticker.tick() => {}
                }

                if let Some(mut meta) = jobs.get_mut(&id) {
                    meta.last_run_at = Some(Utc::now());
                }

                let status = match job().await {
                    Ok(()) => "success".to_string(),
                    Err(e) => {
                        error!("scheduled job {id} failed: {e}");
                        format!("error: {e}")
                    }
                };

                if let Some(mut meta) = jobs.get_mut(&id) {
                    meta.last_status = Some(status);
                }
            }
        });

        info!("added schedule {id}");
    }

    /// Metadata snapshot for the status API, ordered by job id.
    pub fn snapshot(&self) -> Vec<(String, JobMetadata)> {
        let mut jobs: Vec<(String, JobMetadata)> = self
            .jobs
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        jobs.sort_by(|a, b| a.0.cmp(&b.0));
        jobs
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn runs_jobs_on_the_interval() {
        let scheduler = Scheduler::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&runs);
        scheduler.add_job("tick", "count invocations", Duration::from_secs(5), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        tokio::time::sleep(Duration::from_secs(16)).await;
        scheduler.shutdown();

        assert!(runs.load(Ordering::SeqCst) >= 3);
        let snapshot = scheduler.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].1.last_status.as_deref(), Some("success"));
    }

    #[tokio::test(start_paused = true)]
    async fn adding_an_existing_job_is_a_noop() {
        let scheduler = Scheduler::new();
        let runs = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let counter = Arc::clone(&runs);
            scheduler.add_job("dup", "first registration wins", Duration::from_secs(5), move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            });
        }

        tokio::time::sleep(Duration::from_secs(6)).await;
        scheduler.shutdown();

        assert_eq!(scheduler.snapshot().len(), 1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn job_errors_are_recorded_in_metadata() {
        let scheduler = Scheduler::new();

        scheduler.add_job("failing", "always errors", Duration::from_secs(5), || async {
            Err(crate::error::CoreError::Internal("boom".into()))
        });

        tokio::time::sleep(Duration::from_secs(6)).await;
        scheduler.shutdown();

        let snapshot = scheduler.snapshot();
        let status = snapshot[0].1.last_status.as_deref().unwrap();
        assert!(status.starts_with("error:"), "got {status}");
    }
}
