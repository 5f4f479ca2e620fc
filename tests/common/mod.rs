//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use forum_discussion_sync::discussion::{
    Collaborators, DiscussionContext, SessionContext, SyncCoordinator,
};
use forum_discussion_sync::error::{ConversionError, FetchError, QueueError, SyncError};
use forum_discussion_sync::events::EventBus;
use forum_discussion_sync::models::{PendingReply, Post, PostId, SyncOutcome};
use forum_discussion_sync::offline::OfflineQueue;
use forum_discussion_sync::posts::{PostStore, PostsSnapshot};
use forum_discussion_sync::sync::Synchronizer;

pub const DISCUSSION: i64 = 30;
pub const FORUM: i64 = 3;
pub const CMID: i64 = 300;
pub const SITE: &str = "school.example.org";
pub const USER: i64 = 7;

pub fn remote_post(id: i64, parent: Option<i64>, created: i64) -> Post {
    Post {
        id: PostId::Remote(id),
        discussion_id: DISCUSSION,
        parent,
        subject: if parent.is_none() {
            "Welcome".to_string()
        } else {
            "Re: Welcome".to_string()
        },
        message: format!("message {id}"),
        author_id: Some(1),
        author_name: Some("Tutor".to_string()),
        created: DateTime::<Utc>::from_timestamp(created, 0).unwrap(),
        modified: None,
        can_reply: true,
    }
}

pub fn pending_reply(id: i64, parent_id: i64, created_at: i64) -> PendingReply {
    PendingReply {
        id,
        forum_id: FORUM,
        discussion_id: DISCUSSION,
        parent_id,
        subject: "Re: Welcome".to_string(),
        message: format!("offline {id}"),
        user_id: USER,
        created_at,
    }
}

/// Post store whose contents and failures are set by the test.
#[derive(Default)]
pub struct FakePostStore {
    posts: Mutex<HashMap<i64, Vec<Post>>>,
    fail: AtomicBool,
    stale: AtomicBool,
    fetch_delay: Mutex<Option<Duration>>,
    log: Mutex<Vec<&'static str>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    invalidations: AtomicUsize,
    fetches: AtomicUsize,
    views_logged: AtomicUsize,
}

impl FakePostStore {
    pub fn with_posts(posts: Vec<Post>) -> Self {
        let store = Self::default();
        store.set_posts(posts);
        store
    }

    pub fn set_posts(&self, posts: Vec<Post>) {
        self.posts.lock().unwrap().insert(DISCUSSION, posts);
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_stale(&self, stale: bool) {
        self.stale.store(stale, Ordering::SeqCst);
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = Some(delay);
    }

    pub fn invalidations(&self) -> usize {
        self.invalidations.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn views_logged(&self) -> usize {
        self.views_logged.load(Ordering::SeqCst)
    }

    pub fn log(&self) -> Vec<&'static str> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl PostStore for FakePostStore {
    async fn fetch(&self, discussion_id: i64) -> Result<Vec<Post>, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push("fetch");
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.fetch_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.log.lock().unwrap().push("fetched");

        if self.fail.load(Ordering::SeqCst) {
            return Err(FetchError::Unavailable {
                discussion_id,
                message: "timed out".to_string(),
            });
        }
        Ok(self
            .posts
            .lock()
            .unwrap()
            .get(&discussion_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_snapshot(&self, discussion_id: i64) -> Result<PostsSnapshot, FetchError> {
        let posts = self.fetch(discussion_id).await?;
        Ok(PostsSnapshot {
            posts,
            stale: self.stale.load(Ordering::SeqCst),
        })
    }

    async fn invalidate(&self, _discussion_id: i64) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push("invalidate");
    }

    async fn log_view(&self, _discussion_id: i64) -> Result<(), FetchError> {
        self.views_logged.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Offline queue backed by a vector; selected replies fail conversion.
#[derive(Default)]
pub struct FakeQueue {
    replies: Mutex<Vec<PendingReply>>,
    broken: Mutex<HashSet<i64>>,
    fail_reads: AtomicBool,
}

impl FakeQueue {
    pub fn with_replies(replies: Vec<PendingReply>) -> Self {
        let queue = Self::default();
        *queue.replies.lock().unwrap() = replies;
        queue
    }

    pub fn break_reply(&self, id: i64) {
        self.broken.lock().unwrap().insert(id);
    }

    pub fn set_failing_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.replies.lock().unwrap().clear();
    }
}

#[async_trait]
impl OfflineQueue for FakeQueue {
    async fn has_entries(&self, discussion_id: i64) -> Result<bool, QueueError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(QueueError::Database(sqlx::Error::PoolClosed));
        }
        Ok(self
            .replies
            .lock()
            .unwrap()
            .iter()
            .any(|r| r.discussion_id == discussion_id))
    }

    async fn list(&self, discussion_id: i64) -> Result<Vec<PendingReply>, QueueError> {
        Ok(self
            .replies
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.discussion_id == discussion_id)
            .cloned()
            .collect())
    }

    async fn convert_to_display(&self, reply: &PendingReply) -> Result<Post, ConversionError> {
        if self.broken.lock().unwrap().contains(&reply.id) {
            return Err(ConversionError::new(reply.id, "corrupt entry"));
        }
        Ok(Post {
            id: PostId::Pending(reply.id),
            discussion_id: reply.discussion_id,
            parent: Some(reply.parent_id),
            subject: reply.subject.clone(),
            message: reply.message.clone(),
            author_id: Some(reply.user_id),
            author_name: None,
            created: DateTime::<Utc>::from_timestamp(reply.created_at, 0).unwrap(),
            modified: None,
            can_reply: false,
        })
    }
}

/// Synchronizer replaying scripted results; unchanged once the script runs out.
#[derive(Default)]
pub struct FakeSynchronizer {
    script: Mutex<VecDeque<Result<SyncOutcome, SyncError>>>,
    calls: AtomicUsize,
}

impl FakeSynchronizer {
    pub fn scripted(results: Vec<Result<SyncOutcome, SyncError>>) -> Self {
        Self {
            script: Mutex::new(results.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Synchronizer for FakeSynchronizer {
    async fn sync(&self, _discussion_id: i64) -> Result<SyncOutcome, SyncError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(SyncOutcome::unchanged()))
    }
}

pub struct Harness {
    pub posts: Arc<FakePostStore>,
    pub queue: Arc<FakeQueue>,
    pub synchronizer: Arc<FakeSynchronizer>,
    pub bus: EventBus,
}

impl Harness {
    pub fn new(posts: FakePostStore, queue: FakeQueue, synchronizer: FakeSynchronizer) -> Self {
        Self {
            posts: Arc::new(posts),
            queue: Arc::new(queue),
            synchronizer: Arc::new(synchronizer),
            bus: EventBus::new(16),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            posts: self.posts.clone(),
            queue: self.queue.clone(),
            synchronizer: self.synchronizer.clone(),
        }
    }

    pub fn coordinator(&self) -> Arc<SyncCoordinator> {
        Arc::new(SyncCoordinator::new(
            self.collaborators(),
            session(),
            context(),
            self.bus.clone(),
            "Re:",
        ))
    }
}

pub fn session() -> SessionContext {
    SessionContext {
        site_id: SITE.to_string(),
        user_id: USER,
    }
}

pub fn context() -> DiscussionContext {
    DiscussionContext {
        forum_id: FORUM,
        discussion_id: DISCUSSION,
        context_id: CMID,
    }
}

/// Poll `condition` until it holds, failing the test after a second.
pub async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
