//! The queue processor: one claimed item per tick, end to end.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parcelwatch_model::{NotificationEvent, OrderStatus, QueueItem};
use serde_json::json;
use tracing::{error, warn};

use crate::analyzer::Analyzer;
use crate::database::ports::orders::OrderStore;
use crate::database::ports::queue::QueueStore;
use crate::error::Result;
use crate::modules::ModuleRegistry;
use crate::notifier::NotificationDispatcher;
use crate::orders::matcher::OrderMatcher;
use crate::orders::service::create_or_update_order;

/// Drains the capture queue one item at a time. Driven by the scheduler
/// every few seconds; multiple instances may run against the same
/// database because claims skip locked rows.
pub struct QueueProcessor {
    queue: Arc<dyn QueueStore>,
    orders: Arc<dyn OrderStore>,
    matcher: Arc<dyn OrderMatcher>,
    registry: Arc<ModuleRegistry>,
    notifications: Arc<NotificationDispatcher>,
    no_analyzer_warned: AtomicBool,
}

impl std::fmt::Debug for QueueProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueProcessor").finish_non_exhaustive()
    }
}

impl QueueProcessor {
    pub fn new(
        queue: Arc<dyn QueueStore>,
        orders: Arc<dyn OrderStore>,
        matcher: Arc<dyn OrderMatcher>,
        registry: Arc<ModuleRegistry>,
        notifications: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            queue,
            orders,
            matcher,
            registry,
            notifications,
            no_analyzer_warned: AtomicBool::new(false),
        }
    }

    /// Process at most one queued item.
    ///
    /// With no usable analyzer the queue is left untouched and a single
    /// warning is logged until one becomes available again.
    pub async fn tick(&self) -> Result<()> {
        let Some(analyzer) = self.registry.active_analyzer().await? else {
            if !self.no_analyzer_warned.swap(true, Ordering::Relaxed) {
                warn!("no analyzer module is enabled and configured, queue processing paused");
            }
            return Ok(());
        };
        self.no_analyzer_warned.store(false, Ordering::Relaxed);

        let Some(item) = self.queue.claim_next().await? else {
            return Ok(());
        };

        if let Err(e) = self.process_item(&item, analyzer).await {
            error!("failed to process queue item {}: {e}", item.id);
            // Each store write is its own transaction, so nothing from the
            // failed step is left half-applied; record the failure on the
            // item so it reaches a terminal state.
            self.queue.mark_failed(item.id, &e.to_string()).await?;
        }

        Ok(())
    }

    async fn process_item(&self, item: &QueueItem, analyzer: Arc<dyn Analyzer>) -> Result<()> {
        let (analysis, raw_response) = analyzer.analyze(&item.raw_data).await?;

        let Some(analysis) = analysis.filter(|a| a.is_actionable()) else {
            self.queue
                .mark_completed(item.id, Some(raw_response), None)
                .await?;
            return Ok(());
        };

        let existing = self.matcher.find_match(&analysis, item.user_id).await?;

        let outcome = create_or_update_order(
            &self.orders,
            &analysis,
            item.user_id,
            existing,
            &item.source_type,
            &item.source_info,
        )
        .await?;

        let event = if outcome.created {
            NotificationEvent::NewOrder
        } else if outcome.order.status == OrderStatus::Delivered {
            NotificationEvent::PackageDelivered
        } else {
            NotificationEvent::TrackingUpdate
        };

        // Best-effort fan-out: delivery failures are logged inside the
        // dispatcher and never fail the item.
        self.notifications
            .notify_user(
                item.user_id,
                event,
                json!({
                    "order_id": outcome.order.id,
                    "order_number": outcome.order.order_number,
                    "tracking_number": outcome.order.tracking_number,
                    "vendor_name": outcome.order.vendor_name,
                    "status": outcome.order.status,
                    "carrier": outcome.order.carrier,
                    "items": outcome
                        .order
                        .items
                        .as_ref()
                        .map(|items| items.iter().map(|i| i.name.clone()).collect::<Vec<_>>()),
                }),
            )
            .await;

        self.queue
            .mark_completed(item.id, Some(raw_response), Some(outcome.order.id))
            .await?;

        Ok(())
    }
}
