use thiserror::Error;

use crate::ws::WsError;

/// Remote posts could not be obtained. Terminal for the load or refresh that hit it.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("posts for discussion {discussion_id} are unavailable: {message}")]
    Unavailable { discussion_id: i64, message: String },
    #[error("discussion {0} has no posts")]
    EmptyDiscussion(i64),
}

impl FetchError {
    #[must_use]
    pub fn unavailable(discussion_id: i64, err: &WsError) -> Self {
        Self::Unavailable {
            discussion_id,
            message: err.to_string(),
        }
    }
}

/// A single queued reply could not be turned into a display post.
#[derive(Debug, Error)]
#[error("offline reply {reply_id} is malformed: {reason}")]
pub struct ConversionError {
    pub reply_id: i64,
    pub reason: String,
}

impl ConversionError {
    pub fn new(reply_id: i64, reason: impl Into<String>) -> Self {
        Self {
            reply_id,
            reason: reason.into(),
        }
    }
}

/// Offline queue storage failure.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("offline queue database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A synchronization pass failed as a whole.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The site could not be reached; queued replies stay queued.
    #[error("site unreachable: {0}")]
    Offline(String),
    /// The site answered with an error of its own.
    #[error("site rejected synchronization: {message}")]
    Remote { message: String },
    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl SyncError {
    /// Message worth showing the user as-is, if the site supplied one.
    #[must_use]
    pub fn user_message(&self) -> Option<&str> {
        match self {
            Self::Remote { message } if !message.is_empty() => Some(message),
            _ => None,
        }
    }
}

impl From<WsError> for SyncError {
    fn from(err: WsError) -> Self {
        match err {
            WsError::Remote { message, .. } => Self::Remote { message },
            other => Self::Offline(other.to_string()),
        }
    }
}
