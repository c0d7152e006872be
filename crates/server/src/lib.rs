//! HTTP surface of anitrack: an axum router over [`anitrack_core::AnimeTracker`].

pub mod api;
pub mod metrics;
pub mod state;
