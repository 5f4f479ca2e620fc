//! Background and forum-wide synchronization passes.
//!
//! Both announce their results on the [`EventBus`] so open discussion views can
//! refresh themselves.

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::Synchronizer;
use crate::config::Config;
use crate::error::{QueueError, SyncError};
use crate::events::{EventBus, ForumEvent};
use crate::models::SyncOutcome;
use crate::offline::SqliteOfflineQueue;

/// Synchronize every discussion with queued replies until cancelled.
pub async fn auto_sync_loop(
    config: Config,
    synchronizer: &dyn Synchronizer,
    queue: SqliteOfflineQueue,
    bus: EventBus,
    cancel: CancellationToken,
) {
    info!(
        interval_secs = config.auto_sync_interval.as_secs(),
        "Automatic synchronization started"
    );

    loop {
        match sync_all_once(&config, synchronizer, &queue, &bus).await {
            Ok(updated) if updated > 0 => info!(updated, "Automatic synchronization updated discussions"),
            Ok(_) => debug!("Automatic synchronization found nothing to send"),
            Err(e) => error!("Failed to read offline queue: {e}"),
        }

        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(config.auto_sync_interval) => {}
        }
    }

    info!("Automatic synchronization stopped");
}

/// One automatic pass over all discussions with queued replies.
///
/// Publishes [`ForumEvent::AutoSynced`] for each discussion that changed and
/// returns how many did. A discussion that fails to synchronize is skipped.
///
/// # Errors
///
/// Returns an error if the offline queue cannot be read.
pub async fn sync_all_once(
    config: &Config,
    synchronizer: &dyn Synchronizer,
    queue: &SqliteOfflineQueue,
    bus: &EventBus,
) -> Result<usize, QueueError> {
    let mut updated = 0;

    for (forum_id, discussion_id) in queue.pending_discussions().await? {
        match synchronizer.sync(discussion_id).await {
            Ok(outcome) if outcome.updated => {
                updated += 1;
                bus.publish(ForumEvent::AutoSynced {
                    site_id: config.site_id.clone(),
                    user_id: config.user_id,
                    forum_id,
                    discussion_id,
                });
            }
            Ok(_) => debug!(discussion_id, "Discussion unchanged"),
            Err(e) => warn!(forum_id, discussion_id, error = %e, "Automatic synchronization failed"),
        }
    }

    Ok(updated)
}

/// Synchronize every discussion of a forum, as requested from the discussion list.
///
/// Publishes [`ForumEvent::ManualSynced`] if anything changed. Warnings from all
/// discussions are collected into the returned outcome.
///
/// # Errors
///
/// Stops at and returns the first synchronization failure.
pub async fn sync_forum(
    config: &Config,
    synchronizer: &dyn Synchronizer,
    queue: &SqliteOfflineQueue,
    bus: &EventBus,
    forum_id: i64,
) -> Result<SyncOutcome, SyncError> {
    let mut combined = SyncOutcome::unchanged();

    for discussion_id in queue.pending_discussions_in_forum(forum_id).await? {
        let outcome = synchronizer.sync(discussion_id).await?;
        combined.updated |= outcome.updated;
        combined.warnings.extend(outcome.warnings);
    }

    if combined.updated {
        bus.publish(ForumEvent::ManualSynced {
            site_id: config.site_id.clone(),
            user_id: config.user_id,
            forum_id,
        });
    }

    Ok(combined)
}
