use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Display identity of a post.
///
/// Remote posts carry the id the site assigned them. Replies still waiting in
/// the offline queue only have the queue's local row id, which lives in a
/// separate namespace so the two can never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum PostId {
    Remote(i64),
    Pending(i64),
}

impl PostId {
    /// Remote id, if this post exists on the site.
    #[must_use]
    pub fn remote(&self) -> Option<i64> {
        match self {
            Self::Remote(id) => Some(*id),
            Self::Pending(_) => None,
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(id) => write!(f, "{id}"),
            Self::Pending(id) => write!(f, "offline-{id}"),
        }
    }
}

/// A post as shown in a discussion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub discussion_id: i64,
    /// Remote id of the post this one replies to, `None` for the discussion root.
    pub parent: Option<i64>,
    pub subject: String,
    pub message: String,
    pub author_id: Option<i64>,
    pub author_name: Option<String>,
    pub created: DateTime<Utc>,
    pub modified: Option<DateTime<Utc>>,
    /// False when replying is not allowed, or a queued reply already targets this post.
    pub can_reply: bool,
}

impl Post {
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// A reply written while offline, owned by the offline queue until synchronized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PendingReply {
    /// Local queue id, not a remote post id.
    pub id: i64,
    pub forum_id: i64,
    pub discussion_id: i64,
    /// Remote id of the post being replied to.
    pub parent_id: i64,
    pub subject: String,
    pub message: String,
    pub user_id: i64,
    /// Creation time as Unix seconds.
    pub created_at: i64,
}

/// Data needed to queue a new offline reply.
#[derive(Debug, Clone)]
pub struct NewPendingReply {
    pub forum_id: i64,
    pub discussion_id: i64,
    pub parent_id: i64,
    pub subject: String,
    pub message: String,
    pub user_id: i64,
    pub created_at: i64,
}

/// Chronological direction of a discussion's post list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    NewestFirst,
    OldestFirst,
}

impl SortDirection {
    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            Self::NewestFirst => Self::OldestFirst,
            Self::OldestFirst => Self::NewestFirst,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::NewestFirst => "Sort by newest first",
            Self::OldestFirst => "Sort by oldest first",
        }
    }
}

/// Result of one synchronization attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Whether the remote discussion changed.
    pub updated: bool,
    pub warnings: Vec<String>,
}

impl SyncOutcome {
    #[must_use]
    pub fn unchanged() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn first_warning(&self) -> Option<&str> {
        self.warnings.first().map(String::as_str)
    }
}
