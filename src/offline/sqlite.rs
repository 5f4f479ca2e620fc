use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::DateTime;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use super::{migrations, OfflineQueue};
use crate::error::{ConversionError, QueueError};
use crate::models::{NewPendingReply, PendingReply, Post, PostId};

/// Offline reply queue stored in a local SQLite database.
///
/// Shared by every open discussion and by the synchronizer; clones share the pool.
#[derive(Debug, Clone)]
pub struct SqliteOfflineQueue {
    pool: SqlitePool,
}

impl SqliteOfflineQueue {
    /// Open (creating if needed) the queue database, running migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails or migrations fail.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            // Views read while the synchronizer deletes drained entries.
            .busy_timeout(Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to connect to offline queue database")?;

        migrations::run(&pool).await?;
        info!(path = %path.display(), "Offline queue ready");

        Ok(Self { pool })
    }

    /// Queue a reply, returning its local id.
    pub async fn enqueue(&self, reply: &NewPendingReply) -> Result<i64, QueueError> {
        let result = sqlx::query(
            r"
            INSERT INTO pending_replies
                (forum_id, discussion_id, parent_id, subject, message, user_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(reply.forum_id)
        .bind(reply.discussion_id)
        .bind(reply.parent_id)
        .bind(&reply.subject)
        .bind(&reply.message)
        .bind(reply.user_id)
        .bind(reply.created_at)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!(id, discussion_id = reply.discussion_id, parent_id = reply.parent_id, "Queued offline reply");
        Ok(id)
    }

    /// Remove a queued reply. Returns whether it existed.
    pub async fn delete(&self, id: i64) -> Result<bool, QueueError> {
        let result = sqlx::query("DELETE FROM pending_replies WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Distinct `(forum_id, discussion_id)` pairs that have queued replies.
    pub async fn pending_discussions(&self) -> Result<Vec<(i64, i64)>, QueueError> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            r"
            SELECT DISTINCT forum_id, discussion_id
            FROM pending_replies
            ORDER BY forum_id, discussion_id
            ",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Discussions of one forum that have queued replies.
    pub async fn pending_discussions_in_forum(&self, forum_id: i64) -> Result<Vec<i64>, QueueError> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            "SELECT DISTINCT discussion_id FROM pending_replies WHERE forum_id = ? ORDER BY discussion_id",
        )
        .bind(forum_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

#[async_trait]
impl OfflineQueue for SqliteOfflineQueue {
    async fn has_entries(&self, discussion_id: i64) -> Result<bool, QueueError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM pending_replies WHERE discussion_id = ?")
                .bind(discussion_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }

    async fn list(&self, discussion_id: i64) -> Result<Vec<PendingReply>, QueueError> {
        let replies = sqlx::query_as(
            r"
            SELECT id, forum_id, discussion_id, parent_id, subject, message, user_id, created_at
            FROM pending_replies
            WHERE discussion_id = ?
            ORDER BY created_at, id
            ",
        )
        .bind(discussion_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(replies)
    }

    async fn convert_to_display(&self, reply: &PendingReply) -> Result<Post, ConversionError> {
        to_display(reply)
    }
}

/// Virtual post for a queued reply. Replies to it are not allowed until it is synchronized.
fn to_display(reply: &PendingReply) -> Result<Post, ConversionError> {
    if reply.parent_id <= 0 {
        return Err(ConversionError::new(reply.id, "reply has no parent post"));
    }
    if reply.subject.trim().is_empty() {
        return Err(ConversionError::new(reply.id, "empty subject"));
    }
    if reply.message.trim().is_empty() {
        return Err(ConversionError::new(reply.id, "empty message"));
    }
    let created = DateTime::from_timestamp(reply.created_at, 0).ok_or_else(|| {
        ConversionError::new(
            reply.id,
            format!("creation time {} out of range", reply.created_at),
        )
    })?;

    Ok(Post {
        id: PostId::Pending(reply.id),
        discussion_id: reply.discussion_id,
        parent: Some(reply.parent_id),
        subject: reply.subject.clone(),
        message: reply.message.clone(),
        author_id: Some(reply.user_id),
        author_name: None,
        created,
        modified: None,
        can_reply: false,
    })
}
