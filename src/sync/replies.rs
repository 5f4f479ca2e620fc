use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{DiscussionLocks, Synchronizer};
use crate::error::SyncError;
use crate::models::{PendingReply, SyncOutcome};
use crate::offline::{OfflineQueue, SqliteOfflineQueue};
use crate::posts::WireWarning;
use crate::ws::{WsClient, WsError};

const ADD_POST_FUNCTION: &str = "mod_forum_add_discussion_post";

#[derive(Debug, Deserialize)]
struct AddPostResponse {
    postid: i64,
    #[serde(default)]
    warnings: Vec<WireWarning>,
}

/// Sends queued replies to the site, one discussion at a time.
#[derive(Debug)]
pub struct ReplySynchronizer {
    ws: WsClient,
    queue: SqliteOfflineQueue,
    locks: DiscussionLocks,
}

impl ReplySynchronizer {
    #[must_use]
    pub fn new(ws: WsClient, queue: SqliteOfflineQueue) -> Self {
        Self {
            ws,
            queue,
            locks: DiscussionLocks::new(),
        }
    }

    async fn send(&self, reply: &PendingReply) -> Result<AddPostResponse, WsError> {
        self.ws
            .call(
                ADD_POST_FUNCTION,
                &[
                    ("postid", reply.parent_id.to_string()),
                    ("subject", reply.subject.clone()),
                    ("message", reply.message.clone()),
                ],
            )
            .await
    }

    async fn drain(&self, discussion_id: i64) -> Result<SyncOutcome, SyncError> {
        let replies = self.queue.list(discussion_id).await?;
        if replies.is_empty() {
            debug!(discussion_id, "Nothing to synchronize");
            return Ok(SyncOutcome::unchanged());
        }

        let mut outcome = SyncOutcome::unchanged();

        for reply in &replies {
            match self.send(reply).await {
                Ok(response) => {
                    debug!(discussion_id, reply_id = reply.id, post_id = response.postid, "Offline reply sent");
                    self.queue.delete(reply.id).await?;
                    outcome.updated = true;
                    outcome
                        .warnings
                        .extend(response.warnings.into_iter().map(|w| w.message));
                }
                Err(e) if e.is_session_error() => {
                    // Nothing can be sent until the session is fixed; keep the rest queued.
                    warn!(discussion_id, reply_id = reply.id, error = %e, "Site refused session during synchronization");
                    return Err(e.into());
                }
                Err(WsError::Remote { message, errorcode }) => {
                    warn!(discussion_id, reply_id = reply.id, errorcode = %errorcode, "Site rejected offline reply, discarding");
                    self.queue.delete(reply.id).await?;
                    outcome.updated = true;
                    outcome.warnings.push(format!(
                        "Offline reply '{}' was discarded: {message}",
                        reply.subject
                    ));
                }
                Err(e) => {
                    warn!(discussion_id, reply_id = reply.id, error = %e, "Site unreachable during synchronization");
                    return Err(e.into());
                }
            }
        }

        info!(
            discussion_id,
            replies = replies.len(),
            warnings = outcome.warnings.len(),
            "Discussion synchronized"
        );
        Ok(outcome)
    }
}

#[async_trait]
impl Synchronizer for ReplySynchronizer {
    async fn sync(&self, discussion_id: i64) -> Result<SyncOutcome, SyncError> {
        let guard = self.locks.acquire(discussion_id).await;
        let result = self.drain(discussion_id).await;
        drop(guard);
        self.locks.release(discussion_id).await;
        result
    }
}
