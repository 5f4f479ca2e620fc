//! Decides when a discussion view synchronizes and rebuilds, and keeps its
//! state consistent while it does.
//!
//! Loads and refreshes are serialized: a request arriving while another is in
//! flight waits for it, so cache invalidation and fetching of two refreshes
//! never interleave and the last one to finish is what the view shows.
//! Synchronizer calls are serialized separately, giving at most one sync in
//! flight per view.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use super::reconcile::{MergedView, ReconciliationEngine};
use super::state::{project, DiscussionReadModel, Draft, ViewPhase, ViewState};
use crate::error::{FetchError, SyncError};
use crate::events::{EventBus, ForumEvent, Subscription};
use crate::models::PostId;
use crate::offline::OfflineQueue;
use crate::posts::PostStore;
use crate::sync::Synchronizer;

pub const GENERIC_SYNC_ERROR: &str = "An error occurred while synchronising. Please try again.";

pub const STALE_POSTS_WARNING: &str =
    "The site could not be reached. Showing posts saved earlier, which may be out of date.";

const NOTICE_CHANNEL_CAPACITY: usize = 16;

/// Message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Shown without interrupting the user.
    Warning(String),
    /// Shown as a blocking error.
    Error(String),
}

/// Who is looking at the discussion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub site_id: String,
    pub user_id: i64,
}

/// Which discussion is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscussionContext {
    pub forum_id: i64,
    pub discussion_id: i64,
    /// Course module of the forum.
    pub context_id: i64,
}

/// The external services a discussion view depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub posts: Arc<dyn PostStore>,
    pub queue: Arc<dyn OfflineQueue>,
    pub synchronizer: Arc<dyn Synchronizer>,
}

/// Whether a bus event means this discussion's data changed underneath it.
#[must_use]
pub fn concerns_discussion(
    session: &SessionContext,
    context: &DiscussionContext,
    event: &ForumEvent,
) -> bool {
    match event {
        ForumEvent::AutoSynced {
            site_id,
            user_id,
            forum_id,
            discussion_id,
        } => {
            *site_id == session.site_id
                && *user_id == session.user_id
                && *forum_id == context.forum_id
                && *discussion_id == context.discussion_id
        }
        ForumEvent::ManualSynced {
            site_id,
            user_id,
            forum_id,
        } => {
            *site_id == session.site_id
                && *user_id == session.user_id
                && *forum_id == context.forum_id
        }
        ForumEvent::PostListChanged { .. } => false,
    }
}

pub struct SyncCoordinator {
    session: SessionContext,
    context: DiscussionContext,
    engine: ReconciliationEngine,
    posts: Arc<dyn PostStore>,
    synchronizer: Arc<dyn Synchronizer>,
    bus: EventBus,
    state: Mutex<ViewState>,
    cycle_gate: tokio::sync::Mutex<()>,
    sync_gate: tokio::sync::Mutex<()>,
    model_tx: watch::Sender<DiscussionReadModel>,
    notice_tx: broadcast::Sender<Notice>,
}

impl SyncCoordinator {
    pub fn new(
        collaborators: Collaborators,
        session: SessionContext,
        context: DiscussionContext,
        bus: EventBus,
        reply_prefix: impl Into<String>,
    ) -> Self {
        let engine = ReconciliationEngine::new(
            Arc::clone(&collaborators.posts),
            Arc::clone(&collaborators.queue),
            reply_prefix,
        );
        let (model_tx, _) = watch::channel(DiscussionReadModel::default());
        let (notice_tx, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);

        Self {
            session,
            context,
            engine,
            posts: collaborators.posts,
            synchronizer: collaborators.synchronizer,
            bus,
            state: Mutex::new(ViewState::default()),
            cycle_gate: tokio::sync::Mutex::new(()),
            sync_gate: tokio::sync::Mutex::new(()),
            model_tx,
            notice_tx,
        }
    }

    #[must_use]
    pub fn context(&self) -> &DiscussionContext {
        &self.context
    }

    #[must_use]
    pub fn read_model(&self) -> DiscussionReadModel {
        self.with_state(project)
    }

    /// Receiver that sees every new read model.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<DiscussionReadModel> {
        self.model_tx.subscribe()
    }

    #[must_use]
    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notice_tx.subscribe()
    }

    #[must_use]
    pub fn phase(&self) -> ViewPhase {
        self.with_state(|s| s.phase)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.phase() == ViewPhase::Closed
    }

    /// Build the view from scratch, optionally synchronizing first.
    pub async fn load(&self, with_sync: bool) -> Result<MergedView, FetchError> {
        self.run_cycle(false, with_sync).await
    }

    /// Rebuild the view from freshly fetched posts, optionally synchronizing first.
    pub async fn refresh(&self, with_sync: bool) -> Result<MergedView, FetchError> {
        self.run_cycle(true, with_sync).await
    }

    /// Pull-to-refresh: only acts while the view is interactive.
    pub async fn pull_to_refresh(&self) -> Option<Result<MergedView, FetchError>> {
        if !self.phase().is_interactive() {
            debug!(discussion_id = self.context.discussion_id, "Ignoring refresh while busy");
            return None;
        }
        Some(self.refresh(true).await)
    }

    /// Flip the sort order and rebuild the view.
    pub async fn toggle_sort(&self) -> Result<MergedView, FetchError> {
        self.update(|s| s.sort_direction = s.sort_direction.toggled());
        self.load(false).await
    }

    /// Synchronize at the user's request.
    ///
    /// # Errors
    ///
    /// Returns the synchronizer's failure after showing it to the user.
    pub async fn manual_sync(&self) -> Result<(), SyncError> {
        let discussion_id = self.context.discussion_id;
        let result = {
            let _sync = self.sync_gate.lock().await;
            self.synchronizer.sync(discussion_id).await
        };

        match result {
            Ok(outcome) => {
                if let Some(warning) = outcome.first_warning() {
                    self.notify(Notice::Warning(warning.to_string()));
                }
                if outcome.updated {
                    info!(discussion_id, "Manual synchronization updated discussion");
                    if let Err(e) = self.refresh(false).await {
                        debug!(discussion_id, error = %e, "Refresh after synchronization failed");
                    }
                }
                Ok(())
            }
            Err(e) => {
                error!(discussion_id, error = %e, "Manual synchronization failed");
                let message = e.user_message().unwrap_or(GENERIC_SYNC_ERROR).to_string();
                self.notify(Notice::Error(message));
                Err(e)
            }
        }
    }

    /// A reply or edit was saved: reset the draft, tell other views, refresh.
    pub async fn on_post_submitted(&self) -> Result<MergedView, FetchError> {
        self.update(|s| {
            let default_subject = s
                .view
                .as_ref()
                .map(|v| v.default_subject.clone())
                .unwrap_or_default();
            s.draft = Draft::reset(&default_subject);
        });

        self.bus.publish(ForumEvent::PostListChanged {
            forum_id: self.context.forum_id,
            discussion_id: self.context.discussion_id,
            context_id: self.context.context_id,
        });

        self.refresh(false).await
    }

    /// Start replying to a post. Refused if the post does not accept replies.
    pub fn start_reply(&self, post_id: PostId) -> bool {
        self.update(|s| {
            let Some(view) = s.view.as_ref() else {
                return false;
            };
            if !view.post(post_id).is_some_and(|p| p.can_reply) {
                return false;
            }
            let default_subject = view.default_subject.clone();
            s.draft = Draft {
                replying_to: Some(post_id),
                ..Draft::reset(&default_subject)
            };
            true
        })
    }

    /// Start editing a post, loading its subject and text into the draft.
    pub fn start_edit(&self, post_id: PostId) -> bool {
        self.update(|s| {
            let Some(post) = s.view.as_ref().and_then(|v| v.post(post_id)) else {
                return false;
            };
            s.draft = Draft {
                replying_to: None,
                editing: Some(post_id),
                subject: post.subject.clone(),
                text: post.message.clone(),
                is_editing: true,
            };
            true
        })
    }

    pub fn set_draft_text(&self, text: impl Into<String>) {
        let text = text.into();
        self.update(|s| s.draft.text = text);
    }

    /// Record on the site that the discussion was viewed. Failures are only logged.
    pub async fn log_view(&self) {
        let discussion_id = self.context.discussion_id;
        if let Err(e) = self.posts.log_view(discussion_id).await {
            debug!(discussion_id, error = %e, "Failed to log discussion view");
        }
    }

    /// Listen for synchronization events that concern this discussion.
    ///
    /// The listener holds only a weak reference and ends once the coordinator
    /// is dropped or closed.
    pub fn attach(self: &Arc<Self>) -> Subscription {
        let weak = Arc::downgrade(self);
        self.bus.listen(move |event| {
            let weak = weak.clone();
            async move {
                let Some(coordinator) = weak.upgrade() else {
                    return false;
                };
                if coordinator.is_closed() {
                    return false;
                }
                if concerns_discussion(&coordinator.session, &coordinator.context, &event) {
                    debug!(
                        discussion_id = coordinator.context.discussion_id,
                        ?event,
                        "Discussion synchronized elsewhere, refreshing"
                    );
                    if let Err(e) = coordinator.refresh(false).await {
                        debug!(error = %e, "Refresh after synchronization event failed");
                    }
                }
                !coordinator.is_closed()
            }
        })
    }

    /// Tear down: results still in flight are discarded.
    pub fn close(&self) {
        self.update(|s| s.phase = ViewPhase::Closed);
    }

    async fn run_cycle(&self, refresh: bool, with_sync: bool) -> Result<MergedView, FetchError> {
        let _cycle = self.cycle_gate.lock().await;
        let discussion_id = self.context.discussion_id;

        let direction = self.update(|s| {
            s.phase = if refresh {
                s.phase.on_refresh()
            } else if s.phase == ViewPhase::Closed {
                ViewPhase::Closed
            } else {
                ViewPhase::Loading
            };
            s.sort_direction
        });

        if with_sync {
            self.sync_quietly().await;
        }
        if refresh {
            self.posts.invalidate(discussion_id).await;
        }

        let result = self.engine.build_view(discussion_id, direction).await;

        self.update(|s| {
            if s.phase == ViewPhase::Closed {
                return;
            }
            match &result {
                Ok(view) => {
                    if s.draft.replying_to.is_none() && !s.draft.is_editing {
                        s.draft.subject.clone_from(&view.default_subject);
                    }
                    s.view = Some(view.clone());
                    s.last_error = None;
                }
                Err(e) => s.last_error = Some(e.to_string()),
            }
            s.phase = s.phase.on_settled();
        });

        match &result {
            Ok(view) if view.stale && !self.is_closed() => {
                warn!(discussion_id, "Showing stale posts");
                self.notify(Notice::Warning(STALE_POSTS_WARNING.to_string()));
            }
            Ok(_) => {}
            Err(e) => {
                error!(discussion_id, error = %e, "Failed to load discussion");
                if !self.is_closed() {
                    self.notify(Notice::Error(e.to_string()));
                }
            }
        }

        result
    }

    /// Best-effort synchronization before a load; failure means "no update".
    async fn sync_quietly(&self) {
        let discussion_id = self.context.discussion_id;
        let _sync = self.sync_gate.lock().await;

        match self.synchronizer.sync(discussion_id).await {
            Ok(outcome) => {
                if let Some(warning) = outcome.first_warning() {
                    self.notify(Notice::Warning(warning.to_string()));
                }
                debug!(discussion_id, updated = outcome.updated, "Synchronized before load");
            }
            Err(e) => warn!(discussion_id, error = %e, "Synchronization before load failed"),
        }
    }

    fn notify(&self, notice: Notice) {
        // Nobody listening is fine.
        let _ = self.notice_tx.send(notice);
    }

    fn with_state<R>(&self, f: impl FnOnce(&ViewState) -> R) -> R {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Mutate the state and publish the new read model.
    fn update<R>(&self, f: impl FnOnce(&mut ViewState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let result = f(&mut state);
        self.model_tx.send_replace(project(&state));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> SessionContext {
        SessionContext {
            site_id: "site".to_string(),
            user_id: 7,
        }
    }

    fn context() -> DiscussionContext {
        DiscussionContext {
            forum_id: 3,
            discussion_id: 30,
            context_id: 300,
        }
    }

    fn auto(site: &str, user: i64, forum: i64, discussion: i64) -> ForumEvent {
        ForumEvent::AutoSynced {
            site_id: site.to_string(),
            user_id: user,
            forum_id: forum,
            discussion_id: discussion,
        }
    }

    #[test]
    fn test_auto_synced_must_match_everything() {
        assert!(concerns_discussion(&session(), &context(), &auto("site", 7, 3, 30)));
        assert!(!concerns_discussion(&session(), &context(), &auto("other", 7, 3, 30)));
        assert!(!concerns_discussion(&session(), &context(), &auto("site", 8, 3, 30)));
        assert!(!concerns_discussion(&session(), &context(), &auto("site", 7, 4, 30)));
        assert!(!concerns_discussion(&session(), &context(), &auto("site", 7, 3, 31)));
    }

    #[test]
    fn test_manual_synced_matches_whole_forum() {
        let event = ForumEvent::ManualSynced {
            site_id: "site".to_string(),
            user_id: 7,
            forum_id: 3,
        };
        assert!(concerns_discussion(&session(), &context(), &event));

        let other_forum = ForumEvent::ManualSynced {
            site_id: "site".to_string(),
            user_id: 7,
            forum_id: 9,
        };
        assert!(!concerns_discussion(&session(), &context(), &other_forum));
    }

    #[test]
    fn test_post_list_changed_is_not_a_sync() {
        let event = ForumEvent::PostListChanged {
            forum_id: 3,
            discussion_id: 30,
            context_id: 300,
        };
        assert!(!concerns_discussion(&session(), &context(), &event));
    }
}
