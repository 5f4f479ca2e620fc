use std::sync::Arc;

use tracing::{info, warn};

use super::coordinator::{Collaborators, DiscussionContext, SessionContext, SyncCoordinator};
use crate::events::{EventBus, Subscription};

/// An open discussion: the coordinator plus its bus subscription.
///
/// Closing or dropping the view releases the subscription.
pub struct DiscussionView {
    coordinator: Arc<SyncCoordinator>,
    subscription: Option<Subscription>,
}

impl DiscussionView {
    /// Open a discussion: subscribe to sync events, load with a synchronization
    /// attempt first, then record the view on the site.
    ///
    /// A failed first load leaves the view open in its error state.
    pub async fn open(
        collaborators: Collaborators,
        session: SessionContext,
        context: DiscussionContext,
        bus: EventBus,
        reply_prefix: impl Into<String>,
    ) -> Self {
        let coordinator = Arc::new(SyncCoordinator::new(
            collaborators,
            session,
            context,
            bus,
            reply_prefix,
        ));
        let subscription = coordinator.attach();

        match coordinator.load(true).await {
            Ok(view) => {
                info!(
                    discussion_id = context.discussion_id,
                    posts = view.posts.len(),
                    "Discussion opened"
                );
                coordinator.log_view().await;
            }
            Err(e) => warn!(discussion_id = context.discussion_id, error = %e, "Discussion opened without posts"),
        }

        Self {
            coordinator,
            subscription: Some(subscription),
        }
    }

    #[must_use]
    pub fn coordinator(&self) -> &Arc<SyncCoordinator> {
        &self.coordinator
    }

    pub fn close(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        self.coordinator.close();
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}

impl Drop for DiscussionView {
    fn drop(&mut self) {
        self.teardown();
    }
}
