//! The generic watch loop: connect, drain by ascending UID, then hold a
//! push wait or poll, reconnecting with exponential backoff on errors.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use parcelwatch_model::{RawEmail, WatcherMode, WatcherStatus};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::database::ports::queue::{EnqueueOutcome, EnqueueRequest, QueueStore};
use crate::error::Result;
use crate::mail::message::{fallback_message_id, parse_email};
use crate::mail::transport::{MailSession, PushOutcome};
use crate::watcher::provider::{FetchContext, RouteOutcome, WatchProvider};

/// Push waits re-issue well under RFC 2177's 29-minute ceiling.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(24 * 60);

const INITIAL_BACKOFF: Duration = Duration::from_secs(30);
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Shared snapshot the watcher task writes and the status API reads.
/// Never held across an await.
pub type StatusSlot = Arc<RwLock<WatcherStatus>>;

fn update_status(slot: &StatusSlot, f: impl FnOnce(&mut WatcherStatus)) {
    if let Ok(mut guard) = slot.write() {
        f(&mut guard);
    }
}

enum CycleEnd {
    /// Watch target removed or disabled; exit without error.
    Stop,
    Cancelled,
    /// Poll cycle finished; reconnect immediately without backoff.
    Continue,
}

/// Top-level loop for one watcher task. Returns only on cancellation or
/// when the provider reports the target is gone.
pub async fn watch_loop(
    provider: Arc<dyn WatchProvider>,
    queue: Arc<dyn QueueStore>,
    status: StatusSlot,
    token: CancellationToken,
) {
    let mut backoff = INITIAL_BACKOFF;

    loop {
        update_status(&status, |s| {
            s.mode = WatcherMode::Connecting;
            s.next_scan_at = None;
            s.error = None;
            s.clear_progress();
        });

        if token.is_cancelled() {
            break;
        }

        match run_cycle(&provider, &queue, &status, &token, &mut backoff).await {
            Ok(CycleEnd::Stop) => {
                info!("stopping watcher for {}: inactive or removed", provider.label());
                break;
            }
            Ok(CycleEnd::Cancelled) => {
                info!("watcher cancelled for {}", provider.label());
                break;
            }
            Ok(CycleEnd::Continue) => continue,
            Err(e) => {
                error!("error watching {}: {e}", provider.label());
                let next = Utc::now() + chrono::Duration::from_std(backoff).unwrap_or_else(|_| chrono::Duration::zero());
                update_status(&status, |s| {
                    s.mode = WatcherMode::ErrorBackoff;
                    s.error = Some(e.to_string());
                    s.next_scan_at = Some(next);
                });
            }
        }

        tokio::select! {
            _ = token.cancelled() => break,
            _ = sleep(backoff) => {}
        }
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }

    update_status(&status, |s| s.mode = WatcherMode::Stopped);
}

async fn run_cycle(
    provider: &Arc<dyn WatchProvider>,
    queue: &Arc<dyn QueueStore>,
    status: &StatusSlot,
    token: &CancellationToken,
    backoff: &mut Duration,
) -> Result<CycleEnd> {
    let Some(mut conn) = provider.connect().await? else {
        return Ok(CycleEnd::Stop);
    };
    let Some(ctx) = provider.fetch_context().await? else {
        let _ = conn.session.logout().await;
        return Ok(CycleEnd::Stop);
    };

    drain(conn.session.as_mut(), &ctx, provider, queue, status, token).await?;
    if token.is_cancelled() {
        let _ = conn.session.logout().await;
        return Ok(CycleEnd::Cancelled);
    }

    // A clean drain resets the reconnect backoff.
    *backoff = INITIAL_BACKOFF;

    if conn.push_supported && !conn.force_polling {
        idle_hold(conn.session.as_mut(), provider, queue, status, token).await
    } else {
        let _ = conn.session.logout().await;
        poll_sleep(conn.poll_interval, status, token).await
    }
}

/// Hold a push wait, re-draining whenever the server signals new mail.
/// Returns only on cancellation; protocol errors bubble up to trigger a
/// reconnect.
async fn idle_hold(
    session: &mut dyn MailSession,
    provider: &Arc<dyn WatchProvider>,
    queue: &Arc<dyn QueueStore>,
    status: &StatusSlot,
    token: &CancellationToken,
) -> Result<CycleEnd> {
    loop {
        update_status(status, |s| {
            s.mode = WatcherMode::Idle;
            s.next_scan_at = None;
            s.last_activity_at = Some(Utc::now());
        });

        match session.idle_wait(IDLE_TIMEOUT, token).await? {
            PushOutcome::Cancelled => {
                let _ = session.logout().await;
                return Ok(CycleEnd::Cancelled);
            }
            PushOutcome::Timeout => continue,
            PushOutcome::NewMail => {
                let Some(ctx) = provider.fetch_context().await? else {
                    let _ = session.logout().await;
                    return Ok(CycleEnd::Stop);
                };
                drain(session, &ctx, provider, queue, status, token).await?;
                if token.is_cancelled() {
                    let _ = session.logout().await;
                    return Ok(CycleEnd::Cancelled);
                }
            }
        }
    }
}

/// Between poll cycles the connection is released entirely.
async fn poll_sleep(
    interval: Duration,
    status: &StatusSlot,
    token: &CancellationToken,
) -> Result<CycleEnd> {
    let next = Utc::now() + chrono::Duration::from_std(interval).unwrap_or_else(|_| chrono::Duration::zero());
    update_status(status, |s| {
        s.mode = WatcherMode::Polling;
        s.next_scan_at = Some(next);
    });

    tokio::select! {
        _ = token.cancelled() => Ok(CycleEnd::Cancelled),
        _ = sleep(interval) => Ok(CycleEnd::Continue),
    }
}

/// Search for messages past the UID cursor, capture each one, and advance
/// the cursor per message so progress survives later failures.
async fn drain(
    session: &mut dyn MailSession,
    ctx: &FetchContext,
    provider: &Arc<dyn WatchProvider>,
    queue: &Arc<dyn QueueStore>,
    status: &StatusSlot,
    token: &CancellationToken,
) -> Result<()> {
    let since = (Utc::now() - chrono::Duration::days(ctx.max_age_days.max(1) as i64)).date_naive();
    let uids = session.uid_search_since(ctx.last_uid + 1, since).await?;
    // Servers answer an open-ended `N:*` range with the newest UID even
    // when it is below N.
    let uids: Vec<u32> = uids.into_iter().filter(|&uid| uid > ctx.last_uid).collect();

    update_status(status, |s| {
        if !uids.is_empty() {
            s.mode = WatcherMode::Processing;
            s.queue_total = uids.len();
        }
        s.last_activity_at = Some(Utc::now());
    });

    for (position, &uid) in uids.iter().enumerate() {
        // Checked between messages so stop() is bounded.
        if token.is_cancelled() {
            return Ok(());
        }

        let Some(raw) = session.uid_fetch(uid).await? else {
            debug!("{}: UID {uid} fetch returned no body", provider.label());
            continue;
        };

        let parsed = match parse_email(&raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("{}: failed to parse UID {uid}: {e}", provider.label());
                provider.save_uid(uid).await?;
                continue;
            }
        };

        let stable_message_id = parsed.message_id.clone().unwrap_or_else(|| {
            fallback_message_id(ctx.mailbox_id, &ctx.folder_path, ctx.uid_validity, uid)
        });

        match provider.route(&parsed.sender).await? {
            RouteOutcome::Skip => {
                // Discarded messages still advance the cursor.
                provider.save_uid(uid).await?;
                continue;
            }
            RouteOutcome::Deliver { user_id, source } => {
                update_status(status, |s| {
                    s.queue_position = position + 1;
                    s.current_subject = Some(parsed.subject.clone());
                    s.current_sender = Some(parsed.sender.clone());
                    s.last_activity_at = Some(Utc::now());
                });

                let outcome = queue
                    .enqueue_if_unseen(EnqueueRequest {
                        user_id,
                        source,
                        source_info: ctx.source_info.clone(),
                        mailbox_id: ctx.mailbox_id,
                        folder_path: ctx.folder_path.clone(),
                        stable_message_id: stable_message_id.clone(),
                        raw: RawEmail {
                            subject: parsed.subject,
                            sender: parsed.sender,
                            body: parsed.body,
                            message_id: stable_message_id,
                            email_uid: uid,
                            email_date: parsed.date,
                        },
                    })
                    .await?;
                if outcome == EnqueueOutcome::AlreadySeen {
                    debug!("{}: UID {uid} already seen", provider.label());
                }

                provider.save_uid(uid).await?;
            }
        }
    }

    update_status(status, |s| {
        s.last_scan_at = Some(Utc::now());
        s.clear_progress();
    });

    Ok(())
}
