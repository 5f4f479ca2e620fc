//! Forum discussion sync library.
//!
//! Shows a forum discussion by merging the site's posts with replies written
//! offline, keeps that view consistent across refreshes and background
//! synchronization, and replays queued replies when the site is reachable.

pub mod config;
pub mod discussion;
pub mod error;
pub mod events;
pub mod models;
pub mod offline;
pub mod posts;
pub mod sync;
pub mod ws;
