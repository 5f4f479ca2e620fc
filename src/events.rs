//! In-process notification bus shared by discussion views and the synchronizer.

use std::future::Future;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Events exchanged between views and background synchronization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForumEvent {
    /// The background loop synchronized one discussion.
    AutoSynced {
        site_id: String,
        user_id: i64,
        forum_id: i64,
        discussion_id: i64,
    },
    /// A forum was synchronized by hand from somewhere else (e.g. the discussion list).
    ManualSynced {
        site_id: String,
        user_id: i64,
        forum_id: i64,
    },
    /// A post was created or edited in a discussion.
    PostListChanged {
        forum_id: i64,
        discussion_id: i64,
        context_id: i64,
    },
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ForumEvent>,
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event, returning how many listeners will see it.
    pub fn publish(&self, event: ForumEvent) -> usize {
        debug!(?event, "Publishing forum event");
        self.tx.send(event).unwrap_or(0)
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ForumEvent> {
        self.tx.subscribe()
    }

    /// Run `handler` for every event published from now on, until the returned
    /// [`Subscription`] is released or the handler returns `false`.
    pub fn listen<F, Fut>(&self, mut handler: F) -> Subscription
    where
        F: FnMut(ForumEvent) -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let mut rx = self.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if !handler(event).await {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Event listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        Subscription {
            handle: Some(handle),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Handle to a running listener. The listener stops when this is released or dropped.
#[derive(Debug)]
#[must_use = "dropping a Subscription stops the listener"]
pub struct Subscription {
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Stop the listener now.
    pub fn unsubscribe(mut self) {
        self.stop();
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use tokio::sync::mpsc;

    use super::*;

    async fn settle() {
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
    }

    fn changed(discussion_id: i64) -> ForumEvent {
        ForumEvent::PostListChanged {
            forum_id: 1,
            discussion_id,
            context_id: 5,
        }
    }

    #[tokio::test]
    async fn test_publish_without_listeners() {
        let bus = EventBus::new(4);
        assert_eq!(bus.publish(changed(1)), 0);
    }

    #[tokio::test]
    async fn test_listener_receives_events_in_order() {
        let bus = EventBus::new(8);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let _subscription = bus.listen(move |event| {
            let tx = tx.clone();
            async move { tx.send(event).is_ok() }
        });

        bus.publish(changed(1));
        bus.publish(changed(2));

        assert_eq!(rx.recv().await, Some(changed(1)));
        assert_eq!(rx.recv().await, Some(changed(2)));
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_listener() {
        let bus = EventBus::new(8);
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);

        let subscription = bus.listen(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { true }
        });
        assert!(subscription.is_active());
        subscription.unsubscribe();
        settle().await;

        assert_eq!(bus.publish(changed(1)), 0);
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dropping_subscription_releases_receiver() {
        let bus = EventBus::new(8);
        {
            let _subscription = bus.listen(|_| async { true });
            settle().await;
        }
        settle().await;
        assert_eq!(bus.publish(changed(1)), 0);
    }
}
