//! Ownership of running watcher tasks, keyed by watch target.

use std::sync::Arc;

use dashmap::DashMap;
use parcelwatch_model::{FolderId, WatcherMode, WatcherStatus};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::database::ports::queue::QueueStore;
use crate::watcher::provider::WatchProvider;
use crate::watcher::run::{StatusSlot, watch_loop};

/// What a watcher is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchTarget {
    UserFolder(FolderId),
    Global,
}

impl std::fmt::Display for WatchTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatchTarget::UserFolder(id) => write!(f, "folder {id}"),
            WatchTarget::Global => write!(f, "global mailbox"),
        }
    }
}

struct WatcherHandle {
    token: CancellationToken,
    join: JoinHandle<()>,
    status: StatusSlot,
}

/// Supervises one long-lived task per watch target.
///
/// The supervisor is the only writer of the task map; status readers take
/// snapshots.
pub struct WatcherSupervisor {
    queue: Arc<dyn QueueStore>,
    tasks: DashMap<WatchTarget, WatcherHandle>,
}

impl std::fmt::Debug for WatcherSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherSupervisor")
            .field("task_count", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

impl WatcherSupervisor {
    pub fn new(queue: Arc<dyn QueueStore>) -> Self {
        Self {
            queue,
            tasks: DashMap::new(),
        }
    }

    /// Idempotent: an already-running target is left alone.
    pub fn start(&self, target: WatchTarget, provider: Arc<dyn WatchProvider>) {
        if let Some(handle) = self.tasks.get(&target) {
            if !handle.join.is_finished() {
                return;
            }
        }

        let token = CancellationToken::new();
        let status: StatusSlot = Arc::new(std::sync::RwLock::new(WatcherStatus::default()));
        let join = tokio::spawn(watch_loop(
            provider,
            Arc::clone(&self.queue),
            Arc::clone(&status),
            token.clone(),
        ));

        info!("started watcher for {target}");
        self.tasks.insert(
            target,
            WatcherHandle {
                token,
                join,
                status,
            },
        );
    }

    /// Cooperative cancellation; waits for the task so the server
    /// connection is released before returning.
    pub async fn stop(&self, target: &WatchTarget) {
        if let Some((_, handle)) = self.tasks.remove(target) {
            handle.token.cancel();
            if let Err(e) = handle.join.await {
                if !e.is_cancelled() {
                    warn!("watcher task for {target} panicked: {e}");
                }
            }
            info!("stopped watcher for {target}");
        }
    }

    pub async fn restart(&self, target: WatchTarget, provider: Arc<dyn WatchProvider>) {
        self.stop(&target).await;
        self.start(target, provider);
    }

    /// True iff the worker is currently mid-drain.
    pub fn is_scanning(&self, target: &WatchTarget) -> bool {
        self.tasks
            .get(target)
            .map(|handle| {
                handle
                    .status
                    .read()
                    .map(|s| s.mode == WatcherMode::Processing)
                    .unwrap_or(false)
            })
            .unwrap_or(false)
    }

    pub fn is_running(&self, target: &WatchTarget) -> bool {
        self.tasks
            .get(target)
            .map(|handle| !handle.join.is_finished())
            .unwrap_or(false)
    }

    pub fn status(&self, target: &WatchTarget) -> Option<WatcherStatus> {
        self.tasks
            .get(target)
            .and_then(|handle| handle.status.read().ok().map(|s| s.clone()))
    }

    /// Snapshot of every known watcher: target, still-running, last state.
    pub fn status_snapshot(&self) -> Vec<(WatchTarget, bool, WatcherStatus)> {
        self.tasks
            .iter()
            .map(|entry| {
                let running = !entry.value().join.is_finished();
                let status = entry
                    .value()
                    .status
                    .read()
                    .map(|s| s.clone())
                    .unwrap_or_default();
                (*entry.key(), running, status)
            })
            .collect()
    }

    pub fn running_targets(&self) -> Vec<WatchTarget> {
        self.tasks.iter().map(|entry| *entry.key()).collect()
    }

    pub async fn stop_all(&self) {
        let targets: Vec<WatchTarget> = self.tasks.iter().map(|entry| *entry.key()).collect();
        for target in targets {
            self.stop(&target).await;
        }
    }
}
