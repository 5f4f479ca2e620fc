use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{DiscussionPostsResponse, PostStore, PostsCache, PostsSnapshot};
use crate::config::Config;
use crate::error::FetchError;
use crate::models::Post;
use crate::ws::WsClient;

const GET_POSTS_FUNCTION: &str = "mod_forum_get_forum_discussion_posts";
const VIEW_DISCUSSION_FUNCTION: &str = "mod_forum_view_forum_discussion";

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    status: bool,
}

/// [`PostStore`] backed by the site's web service, with a per-discussion cache.
#[derive(Debug)]
pub struct HttpPostStore {
    ws: WsClient,
    cache: PostsCache,
}

impl HttpPostStore {
    #[must_use]
    pub fn new(ws: WsClient, config: &Config) -> Self {
        Self {
            ws,
            cache: PostsCache::new(config.posts_cache_ttl),
        }
    }

    async fn fetch_remote(&self, discussion_id: i64) -> Result<Vec<Post>, FetchError> {
        let response: DiscussionPostsResponse = self
            .ws
            .call(
                GET_POSTS_FUNCTION,
                &[("discussionid", discussion_id.to_string())],
            )
            .await
            .map_err(|e| FetchError::unavailable(discussion_id, &e))?;

        for warning in &response.warnings {
            warn!(
                discussion_id,
                code = warning.warningcode.as_deref().unwrap_or(""),
                "Site warning while fetching posts: {}",
                warning.message
            );
        }

        Ok(response
            .posts
            .into_iter()
            .filter_map(|wire| match Post::try_from(wire) {
                Ok(post) => Some(post),
                Err(e) => {
                    warn!(discussion_id, post_id = e.post_id, "Skipping post: {e}");
                    None
                }
            })
            .collect())
    }
}

#[async_trait]
impl PostStore for HttpPostStore {
    async fn fetch(&self, discussion_id: i64) -> Result<Vec<Post>, FetchError> {
        self.fetch_snapshot(discussion_id).await.map(|s| s.posts)
    }

    async fn fetch_snapshot(&self, discussion_id: i64) -> Result<PostsSnapshot, FetchError> {
        if let Some(posts) = self.cache.fresh(discussion_id).await {
            debug!(discussion_id, count = posts.len(), "Serving posts from cache");
            return Ok(PostsSnapshot::fresh(posts));
        }

        match self.fetch_remote(discussion_id).await {
            Ok(posts) => {
                debug!(discussion_id, count = posts.len(), "Fetched posts from site");
                self.cache.store(discussion_id, posts.clone()).await;
                Ok(PostsSnapshot::fresh(posts))
            }
            Err(e) => {
                if let Some(posts) = self.cache.stale(discussion_id).await {
                    warn!(discussion_id, error = %e, "Site unreachable, serving stale posts");
                    Ok(PostsSnapshot::stale(posts))
                } else {
                    Err(e)
                }
            }
        }
    }

    async fn invalidate(&self, discussion_id: i64) {
        if self.cache.invalidate(discussion_id).await {
            debug!(discussion_id, "Invalidated cached posts");
        }
    }

    async fn log_view(&self, discussion_id: i64) -> Result<(), FetchError> {
        let response: StatusResponse = self
            .ws
            .call(
                VIEW_DISCUSSION_FUNCTION,
                &[("discussionid", discussion_id.to_string())],
            )
            .await
            .map_err(|e| FetchError::unavailable(discussion_id, &e))?;

        if !response.status {
            debug!(discussion_id, "Site did not record discussion view");
        }
        Ok(())
    }
}
