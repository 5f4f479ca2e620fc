//! Remote source of truth for a discussion's posts.

mod cache;
mod http;

pub use cache::PostsCache;
pub use http::HttpPostStore;

use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;
use thiserror::Error;

use crate::error::FetchError;
use crate::models::{Post, PostId};

/// Remote posts for discussions, with a cache the caller can invalidate.
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Fetch all posts of a discussion.
    async fn fetch(&self, discussion_id: i64) -> Result<Vec<Post>, FetchError>;

    /// Like [`PostStore::fetch`], but also says whether the posts are an old
    /// copy served because the site could not be reached.
    async fn fetch_snapshot(&self, discussion_id: i64) -> Result<PostsSnapshot, FetchError> {
        self.fetch(discussion_id).await.map(PostsSnapshot::fresh)
    }

    /// Drop any cached posts so the next fetch goes to the site.
    async fn invalidate(&self, discussion_id: i64);

    /// Record on the site that the discussion was viewed.
    async fn log_view(&self, _discussion_id: i64) -> Result<(), FetchError> {
        Ok(())
    }
}

/// Posts of one discussion as returned by a [`PostStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostsSnapshot {
    pub posts: Vec<Post>,
    /// Served from an expired copy while the site was unreachable.
    pub stale: bool,
}

impl PostsSnapshot {
    #[must_use]
    pub fn fresh(posts: Vec<Post>) -> Self {
        Self {
            posts,
            stale: false,
        }
    }

    #[must_use]
    pub fn stale(posts: Vec<Post>) -> Self {
        Self { posts, stale: true }
    }
}

/// Post as returned by `mod_forum_get_forum_discussion_posts`.
#[derive(Debug, Clone, Deserialize)]
pub struct WirePost {
    pub id: i64,
    pub discussion: i64,
    /// Zero for the discussion's first post.
    #[serde(default)]
    pub parent: i64,
    #[serde(default)]
    pub userid: Option<i64>,
    #[serde(default)]
    pub userfullname: Option<String>,
    pub created: i64,
    #[serde(default)]
    pub modified: Option<i64>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub message: String,
    #[serde(default = "default_can_reply")]
    pub canreply: bool,
}

fn default_can_reply() -> bool {
    true
}

/// Response envelope of `mod_forum_get_forum_discussion_posts`.
#[derive(Debug, Deserialize)]
pub struct DiscussionPostsResponse {
    pub posts: Vec<WirePost>,
    #[serde(default)]
    pub warnings: Vec<WireWarning>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireWarning {
    #[serde(default)]
    pub warningcode: Option<String>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Error)]
#[error("post {post_id} has an out of range creation time {created}")]
pub struct InvalidWirePost {
    pub post_id: i64,
    pub created: i64,
}

impl TryFrom<WirePost> for Post {
    type Error = InvalidWirePost;

    fn try_from(wire: WirePost) -> Result<Self, Self::Error> {
        let created = DateTime::from_timestamp(wire.created, 0).ok_or(InvalidWirePost {
            post_id: wire.id,
            created: wire.created,
        })?;

        Ok(Self {
            id: PostId::Remote(wire.id),
            discussion_id: wire.discussion,
            parent: (wire.parent > 0).then_some(wire.parent),
            subject: wire.subject,
            message: wire.message,
            author_id: wire.userid,
            author_name: wire.userfullname,
            created,
            modified: wire.modified.and_then(|m| DateTime::from_timestamp(m, 0)),
            can_reply: wire.canreply,
        })
    }
}
