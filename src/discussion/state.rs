//! View state of an open discussion and its projection into display fields.

use super::reconcile::MergedView;
use crate::models::{Post, PostId, SortDirection};

/// Lifecycle of a discussion view.
///
/// `Loading -> Loaded <-> Refreshing -> Loaded`; changing the sort order goes
/// back through `Loading`. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewPhase {
    #[default]
    Loading,
    Loaded,
    Refreshing,
    Closed,
}

impl ViewPhase {
    /// Whether the user can interact with the view (pull to refresh, reply, sort).
    #[must_use]
    pub fn is_interactive(self) -> bool {
        matches!(self, Self::Loaded)
    }

    /// Phase entered when a refresh starts from this one.
    #[must_use]
    pub fn on_refresh(self) -> Self {
        match self {
            Self::Loaded | Self::Refreshing => Self::Refreshing,
            other => other,
        }
    }

    /// Phase entered when a load or refresh finishes, successfully or not.
    #[must_use]
    pub fn on_settled(self) -> Self {
        match self {
            Self::Closed => Self::Closed,
            _ => Self::Loaded,
        }
    }
}

/// The reply or edit being composed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub replying_to: Option<PostId>,
    pub editing: Option<PostId>,
    pub subject: String,
    pub text: String,
    pub is_editing: bool,
}

impl Draft {
    /// Empty draft carrying the discussion's default reply subject.
    #[must_use]
    pub fn reset(default_subject: &str) -> Self {
        Self {
            subject: default_subject.to_string(),
            ..Self::default()
        }
    }
}

/// Everything the coordinator tracks for one open discussion.
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    pub phase: ViewPhase,
    pub sort_direction: SortDirection,
    pub view: Option<MergedView>,
    pub draft: Draft,
    pub last_error: Option<String>,
}

/// Display fields derived from [`ViewState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscussionReadModel {
    pub phase: ViewPhase,
    pub posts: Vec<Post>,
    pub starting_post: Option<Post>,
    pub default_subject: String,
    pub sort_direction: SortDirection,
    pub sort_label: &'static str,
    pub has_offline_replies: bool,
    /// Posts shown are an old copy kept from before the site became unreachable.
    pub stale: bool,
    pub loaded: bool,
    pub draft: Draft,
    pub error: Option<String>,
}

impl Default for DiscussionReadModel {
    fn default() -> Self {
        project(&ViewState::default())
    }
}

/// Pure projection from view state to what the view shows.
#[must_use]
pub fn project(state: &ViewState) -> DiscussionReadModel {
    let view = state.view.as_ref();
    DiscussionReadModel {
        phase: state.phase,
        posts: view.map(|v| v.posts.clone()).unwrap_or_default(),
        starting_post: view.map(|v| v.starting_post.clone()),
        default_subject: view.map(|v| v.default_subject.clone()).unwrap_or_default(),
        sort_direction: state.sort_direction,
        sort_label: state.sort_direction.label(),
        has_offline_replies: view.is_some_and(|v| v.has_offline_replies),
        stale: view.is_some_and(|v| v.stale),
        loaded: state.phase.is_interactive(),
        draft: state.draft.clone(),
        error: state.last_error.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_transitions() {
        assert_eq!(ViewPhase::default(), ViewPhase::Loading);
        assert_eq!(ViewPhase::Loaded.on_refresh(), ViewPhase::Refreshing);
        assert_eq!(ViewPhase::Loading.on_refresh(), ViewPhase::Loading);
        assert_eq!(ViewPhase::Refreshing.on_settled(), ViewPhase::Loaded);
        assert_eq!(ViewPhase::Closed.on_refresh(), ViewPhase::Closed);
        assert_eq!(ViewPhase::Closed.on_settled(), ViewPhase::Closed);
    }

    #[test]
    fn test_only_loaded_is_interactive() {
        assert!(ViewPhase::Loaded.is_interactive());
        assert!(!ViewPhase::Loading.is_interactive());
        assert!(!ViewPhase::Refreshing.is_interactive());
        assert!(!ViewPhase::Closed.is_interactive());
    }

    #[test]
    fn test_project_empty_state() {
        let model = project(&ViewState::default());
        assert_eq!(model.phase, ViewPhase::Loading);
        assert!(!model.loaded);
        assert!(model.posts.is_empty());
        assert!(model.starting_post.is_none());
        assert_eq!(model.sort_label, "Sort by newest first");
    }

    #[test]
    fn test_project_sort_label_follows_direction() {
        let state = ViewState {
            phase: ViewPhase::Loaded,
            sort_direction: SortDirection::OldestFirst,
            ..ViewState::default()
        };
        let model = project(&state);
        assert!(model.loaded);
        assert_eq!(model.sort_label, "Sort by oldest first");
    }

    #[test]
    fn test_draft_reset() {
        let draft = Draft::reset("Re: Welcome");
        assert_eq!(draft.subject, "Re: Welcome");
        assert!(draft.text.is_empty());
        assert!(draft.replying_to.is_none());
        assert!(!draft.is_editing);
    }
}
