//! Merging remote posts with replies still waiting in the offline queue.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{debug, warn};

use super::sort::sort_posts;
use crate::error::FetchError;
use crate::models::{PendingReply, Post, PostId, SortDirection};
use crate::offline::OfflineQueue;
use crate::posts::PostStore;

/// One consistent, ordered picture of a discussion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedView {
    pub discussion_id: i64,
    /// Remote posts followed by converted offline replies, in sort order.
    pub posts: Vec<Post>,
    pub starting_post: Post,
    /// Subject a new reply gets unless the user changes it.
    pub default_subject: String,
    pub sort_direction: SortDirection,
    pub has_offline_replies: bool,
    /// Queued replies that could not be converted for display.
    pub skipped_replies: usize,
    /// Remote posts are an old copy; the site could not be reached.
    pub stale: bool,
}

impl MergedView {
    #[must_use]
    pub fn post(&self, id: PostId) -> Option<&Post> {
        self.posts.iter().find(|p| p.id == id)
    }

    /// Every post except the starting post, in sort order.
    pub fn replies(&self) -> impl Iterator<Item = &Post> {
        let start = self.starting_post.id;
        self.posts.iter().filter(move |p| p.id != start)
    }
}

/// Builds [`MergedView`]s from the post store and the offline queue.
///
/// Never writes to either collaborator.
pub struct ReconciliationEngine {
    posts: Arc<dyn PostStore>,
    queue: Arc<dyn OfflineQueue>,
    reply_prefix: String,
}

impl ReconciliationEngine {
    pub fn new(
        posts: Arc<dyn PostStore>,
        queue: Arc<dyn OfflineQueue>,
        reply_prefix: impl Into<String>,
    ) -> Self {
        Self {
            posts,
            queue,
            reply_prefix: reply_prefix.into(),
        }
    }

    /// Fetch, merge and order a discussion's posts.
    ///
    /// # Errors
    ///
    /// Fails only when the remote posts are unavailable. Offline queue problems
    /// and malformed queued replies are logged and left out of the view.
    pub async fn build_view(
        &self,
        discussion_id: i64,
        direction: SortDirection,
    ) -> Result<MergedView, FetchError> {
        let (remote, (has_offline_replies, pending)) = tokio::join!(
            self.posts.fetch_snapshot(discussion_id),
            self.pending_replies(discussion_id)
        );
        let snapshot = remote?;
        let stale = snapshot.stale;
        let remote = snapshot.posts;
        if remote.is_empty() {
            return Err(FetchError::EmptyDiscussion(discussion_id));
        }

        let mut posts = dedupe(remote);
        disable_reply_targets(&mut posts, &pending);

        let converted = self.convert(&pending).await;
        let skipped_replies = pending.len() - converted.len();
        posts.extend(converted);

        sort_posts(&mut posts, direction);

        let starting_post = starting_post(&posts)
            .cloned()
            .ok_or(FetchError::EmptyDiscussion(discussion_id))?;
        let default_subject = self.default_subject(&starting_post.subject);

        debug!(
            discussion_id,
            posts = posts.len(),
            pending = pending.len(),
            skipped_replies,
            stale,
            "Built discussion view"
        );

        Ok(MergedView {
            discussion_id,
            posts,
            starting_post,
            default_subject,
            sort_direction: direction,
            has_offline_replies,
            skipped_replies,
            stale,
        })
    }

    fn default_subject(&self, subject: &str) -> String {
        if self.reply_prefix.is_empty() {
            subject.to_string()
        } else {
            format!("{} {subject}", self.reply_prefix)
        }
    }

    async fn pending_replies(&self, discussion_id: i64) -> (bool, Vec<PendingReply>) {
        match self.queue.has_entries(discussion_id).await {
            Ok(false) => (false, Vec::new()),
            Ok(true) => match self.queue.list(discussion_id).await {
                Ok(replies) => (true, replies),
                Err(e) => {
                    warn!(discussion_id, error = %e, "Failed to list offline replies");
                    (true, Vec::new())
                }
            },
            Err(e) => {
                warn!(discussion_id, error = %e, "Failed to check offline replies");
                (false, Vec::new())
            }
        }
    }

    async fn convert(&self, pending: &[PendingReply]) -> Vec<Post> {
        let results = join_all(
            pending
                .iter()
                .map(|reply| self.queue.convert_to_display(reply)),
        )
        .await;

        results
            .into_iter()
            .filter_map(|result| match result {
                Ok(post) => Some(post),
                Err(e) => {
                    warn!(reply_id = e.reply_id, "Skipping offline reply: {e}");
                    None
                }
            })
            .collect()
    }
}

/// Drop repeated ids, keeping the first occurrence and the fetch order.
fn dedupe(posts: Vec<Post>) -> Vec<Post> {
    let mut seen = HashSet::with_capacity(posts.len());
    posts.into_iter().filter(|p| seen.insert(p.id)).collect()
}

/// A post with a queued reply cannot be replied to again offline; that reply must be edited instead.
fn disable_reply_targets(posts: &mut [Post], pending: &[PendingReply]) {
    if pending.is_empty() {
        return;
    }

    let index: HashMap<i64, usize> = posts
        .iter()
        .enumerate()
        .filter_map(|(i, p)| p.id.remote().map(|id| (id, i)))
        .collect();

    for reply in pending {
        if let Some(&i) = index.get(&reply.parent_id) {
            posts[i].can_reply = false;
        } else {
            debug!(
                reply_id = reply.id,
                parent_id = reply.parent_id,
                "Offline reply targets a post not in the discussion"
            );
        }
    }
}

/// The discussion's first post: the post without a parent, or the earliest post
/// when no post is marked as root.
fn starting_post(posts: &[Post]) -> Option<&Post> {
    posts
        .iter()
        .filter(|p| p.is_root())
        .min_by_key(|p| p.created)
        .or_else(|| posts.iter().min_by_key(|p| p.created))
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::*;

    fn post(id: i64, parent: Option<i64>, created: i64) -> Post {
        Post {
            id: PostId::Remote(id),
            discussion_id: 1,
            parent,
            subject: format!("Post {id}"),
            message: String::new(),
            author_id: None,
            author_name: None,
            created: DateTime::<Utc>::from_timestamp(created, 0).unwrap(),
            modified: None,
            can_reply: true,
        }
    }

    fn pending(id: i64, parent_id: i64) -> PendingReply {
        PendingReply {
            id,
            forum_id: 1,
            discussion_id: 1,
            parent_id,
            subject: "Re: Post".to_string(),
            message: "offline".to_string(),
            user_id: 2,
            created_at: 500,
        }
    }

    #[test]
    fn test_dedupe_keeps_first_and_order() {
        let posts = vec![post(3, None, 10), post(1, Some(3), 20), post(3, None, 99)];
        let deduped = dedupe(posts);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].id, PostId::Remote(3));
        assert_eq!(deduped[0].created.timestamp(), 10);
        assert_eq!(deduped[1].id, PostId::Remote(1));
    }

    #[test]
    fn test_disable_reply_targets() {
        let mut posts = vec![post(1, None, 10), post(2, Some(1), 20), post(3, Some(1), 30)];
        disable_reply_targets(&mut posts, &[pending(1, 2), pending(2, 2), pending(3, 99)]);
        assert!(posts[0].can_reply);
        assert!(!posts[1].can_reply);
        assert!(posts[2].can_reply);
    }

    #[test]
    fn test_starting_post_prefers_root() {
        let posts = vec![post(2, Some(1), 5), post(1, None, 10)];
        assert_eq!(starting_post(&posts).unwrap().id, PostId::Remote(1));
    }

    #[test]
    fn test_starting_post_falls_back_to_earliest() {
        let posts = vec![post(5, Some(1), 30), post(4, Some(1), 20), post(6, Some(1), 20)];
        assert_eq!(starting_post(&posts).unwrap().id, PostId::Remote(4));
        assert!(starting_post(&[]).is_none());
    }
}
