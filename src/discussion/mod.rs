//! The discussion view core: reconciliation, ordering and sync coordination.

mod coordinator;
mod reconcile;
mod sort;
mod state;
mod view;

pub use coordinator::{
    concerns_discussion, Collaborators, DiscussionContext, Notice, SessionContext,
    SyncCoordinator, GENERIC_SYNC_ERROR, STALE_POSTS_WARNING,
};
pub use reconcile::{MergedView, ReconciliationEngine};
pub use sort::{sort_posts, sorted};
pub use state::{project, DiscussionReadModel, Draft, ViewPhase, ViewState};
pub use view::DiscussionView;
