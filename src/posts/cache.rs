//! Per-discussion posts cache with a TTL.
//!
//! Invalidating an entry only marks it expired: the posts are kept so they can
//! still be served while the site is unreachable.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::models::Post;

#[derive(Debug, Clone)]
struct CachedPosts {
    posts: Vec<Post>,
    cached_at: Instant,
    invalidated: bool,
}

impl CachedPosts {
    fn is_valid(&self, ttl: Duration) -> bool {
        !self.invalidated && self.cached_at.elapsed() < ttl
    }
}

#[derive(Debug)]
pub struct PostsCache {
    entries: RwLock<HashMap<i64, CachedPosts>>,
    ttl: Duration,
}

impl PostsCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Posts cached for the discussion if the entry is neither expired nor invalidated.
    pub async fn fresh(&self, discussion_id: i64) -> Option<Vec<Post>> {
        let entries = self.entries.read().await;
        entries
            .get(&discussion_id)
            .filter(|entry| entry.is_valid(self.ttl))
            .map(|entry| entry.posts.clone())
    }

    /// Whatever is cached for the discussion, however old.
    pub async fn stale(&self, discussion_id: i64) -> Option<Vec<Post>> {
        let entries = self.entries.read().await;
        entries.get(&discussion_id).map(|entry| entry.posts.clone())
    }

    pub async fn store(&self, discussion_id: i64, posts: Vec<Post>) {
        let mut entries = self.entries.write().await;
        entries.insert(
            discussion_id,
            CachedPosts {
                posts,
                cached_at: Instant::now(),
                invalidated: false,
            },
        );
    }

    /// Mark the discussion's entry expired. Returns whether an entry existed.
    pub async fn invalidate(&self, discussion_id: i64) -> bool {
        let mut entries = self.entries.write().await;
        entries.get_mut(&discussion_id).is_some_and(|entry| {
            entry.invalidated = true;
            true
        })
    }
}

impl Default for PostsCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(300)) // 5 minute TTL
    }
}
