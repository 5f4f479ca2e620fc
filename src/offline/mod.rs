//! Durable queue of replies written while offline.

mod migrations;
mod sqlite;

pub use sqlite::SqliteOfflineQueue;

use async_trait::async_trait;

use crate::error::{ConversionError, QueueError};
use crate::models::{PendingReply, Post};

/// Read access to queued replies, as needed by the discussion view.
///
/// Writers (composing a reply, draining the queue) go through the concrete
/// queue type; the view only ever reads.
#[async_trait]
pub trait OfflineQueue: Send + Sync {
    async fn has_entries(&self, discussion_id: i64) -> Result<bool, QueueError>;

    /// Queued replies of a discussion, oldest first.
    async fn list(&self, discussion_id: i64) -> Result<Vec<PendingReply>, QueueError>;

    /// Turn a queued reply into a post that can be shown alongside remote ones.
    async fn convert_to_display(&self, reply: &PendingReply) -> Result<Post, ConversionError>;
}
