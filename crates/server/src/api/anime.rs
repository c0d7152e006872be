//! Anime and episode reads, reconciled between the catalog and the library.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use anitrack_core::{EpisodeDetails, EpisodeListing, EpisodeWithStatus, LoadedAnime, WatchedMark};

use super::catalog::default_page;
use super::error::{tracker_error, ApiError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EpisodePageParams {
    #[serde(default = "default_page")]
    pub page: u32,
}

/// GET /api/v1/anime/{id}
///
/// `id` is a catalog id, or a local id when the catalog is unreachable.
pub async fn get_anime(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<LoadedAnime>, ApiError> {
    state
        .tracker()
        .load_anime(&id)
        .await
        .map(Json)
        .map_err(tracker_error)
}

/// Episodes response.
#[derive(Debug, Serialize)]
pub struct EpisodeListResponse {
    #[serde(flatten)]
    pub listing: EpisodeListing,
    /// Every stored episode of the anime with the user's state, so catalog
    /// episodes can be matched to local ids by `external_id` or `number`.
    pub library: Vec<EpisodeWithStatus>,
}

/// GET /api/v1/anime/{id}/episodes?page=
///
/// An anime already in the library is not fetched from the catalog again.
pub async fn list_episodes(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<EpisodePageParams>,
) -> Result<Json<EpisodeListResponse>, ApiError> {
    let tracker = state.tracker();
    let listing = tracker
        .load_episodes_by_id(&id, params.page)
        .await
        .map_err(tracker_error)?;

    Ok(Json(EpisodeListResponse {
        listing,
        library: tracker.episodes_with_status(&id),
    }))
}

#[derive(Debug, Serialize)]
pub struct WatchedEpisodesResponse {
    /// Local episode ids, sorted.
    pub episode_ids: Vec<String>,
    pub marks: Vec<WatchedMark>,
}

/// GET /api/v1/anime/{id}/watched
pub async fn list_watched(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<WatchedEpisodesResponse>, ApiError> {
    let tracker = state.tracker();
    let mut episode_ids: Vec<String> = tracker
        .watched_episode_ids(&id)
        .map_err(tracker_error)?
        .into_iter()
        .collect();
    episode_ids.sort();
    let marks = tracker.watched_marks(&id).map_err(tracker_error)?;

    Ok(Json(WatchedEpisodesResponse { episode_ids, marks }))
}

/// GET /api/v1/anime/{id}/episodes/{episode_id}
///
/// Both ids may be local or catalog ids.
pub async fn get_episode(
    State(state): State<Arc<AppState>>,
    Path((anime_id, episode_id)): Path<(String, String)>,
) -> Result<Json<EpisodeDetails>, ApiError> {
    state
        .tracker()
        .episode_details(&anime_id, &episode_id)
        .map(Json)
        .map_err(tracker_error)
}
