//! Replaying queued offline replies against the site.

mod auto;
mod locks;
mod replies;

pub use auto::{auto_sync_loop, sync_all_once, sync_forum};
pub use locks::DiscussionLocks;
pub use replies::ReplySynchronizer;

use async_trait::async_trait;

use crate::error::SyncError;
use crate::models::SyncOutcome;

/// Attempts to drain a discussion's offline queue into the site.
#[async_trait]
pub trait Synchronizer: Send + Sync {
    async fn sync(&self, discussion_id: i64) -> Result<SyncOutcome, SyncError>;
}
