//! User state handlers: watched marks, watchlist and collection.
//!
//! These only touch the local library. The one exception is marking an
//! episode of an anime the library has never stored, which fetches the anime.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use anitrack_core::{
    library::{CollectionEntry, CollectionItem, CollectionStatus, CollectionUpdate, WatchlistItem},
    EpisodeStub, LibraryStore, RemoteAnimeRecord, TrackerError,
};

use super::error::{error_response, tracker_error, ApiError, SuccessResponse};
use crate::state::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

/// Optional body of `POST /episodes/{id}/watched`, used to create the
/// episode first when the library does not know it.
#[derive(Debug, Deserialize)]
pub struct MarkWatchedRequest {
    pub anime_id: String,
    pub number: u32,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WatchedResponse {
    pub episode_id: String,
    pub watched: bool,
}

#[derive(Debug, Serialize)]
pub struct WatchlistResponse {
    pub episode_id: String,
    pub in_watchlist: bool,
}

/// Body of `POST /collection`: a local anime id or a catalog record.
#[derive(Debug, Deserialize)]
pub struct AddToCollectionRequest {
    #[serde(default)]
    pub anime_id: Option<String>,
    #[serde(default)]
    pub anime: Option<RemoteAnimeRecord>,
    #[serde(default)]
    pub status: CollectionStatus,
}

#[derive(Debug, Serialize)]
pub struct CollectionListResponse {
    pub items: Vec<CollectionItemView>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct CollectionItemView {
    #[serde(flatten)]
    pub item: CollectionItem,
    pub completion: f32,
}

#[derive(Debug, Serialize)]
pub struct WatchlistListResponse {
    pub items: Vec<WatchlistItem>,
    pub total: usize,
}

// ============================================================================
// Watched marks
// ============================================================================

/// POST /api/v1/episodes/{id}/watched
pub async fn mark_watched(
    State(state): State<Arc<AppState>>,
    Path(episode_id): Path<String>,
    body: Bytes,
) -> Result<Json<WatchedResponse>, ApiError> {
    let tracker = state.tracker();

    let episode_id = if body.is_empty() {
        tracker.mark_watched(&episode_id).map_err(tracker_error)?;
        episode_id
    } else {
        let request: MarkWatchedRequest = serde_json::from_slice(&body).map_err(|e| {
            error_response(StatusCode::BAD_REQUEST, format!("Invalid request body: {}", e))
        })?;
        tracker
            .mark_watched_with(&EpisodeStub {
                episode_id,
                anime_id: request.anime_id,
                number: request.number,
                title: request.title,
            })
            .await
            .map_err(tracker_error)?
    };

    Ok(Json(WatchedResponse {
        episode_id,
        watched: true,
    }))
}

/// DELETE /api/v1/episodes/{id}/watched
pub async fn unmark_watched(
    State(state): State<Arc<AppState>>,
    Path(episode_id): Path<String>,
) -> Result<Json<WatchedResponse>, ApiError> {
    state
        .tracker()
        .unmark_watched(&episode_id)
        .map_err(tracker_error)?;
    Ok(Json(WatchedResponse {
        episode_id,
        watched: false,
    }))
}

// ============================================================================
// Watchlist
// ============================================================================

/// POST /api/v1/episodes/{id}/watchlist
pub async fn add_to_watchlist(
    State(state): State<Arc<AppState>>,
    Path(episode_id): Path<String>,
) -> Result<Json<WatchlistResponse>, ApiError> {
    state
        .tracker()
        .add_to_watchlist(&episode_id)
        .map_err(tracker_error)?;
    Ok(Json(WatchlistResponse {
        episode_id,
        in_watchlist: true,
    }))
}

/// DELETE /api/v1/episodes/{id}/watchlist
pub async fn remove_from_watchlist(
    State(state): State<Arc<AppState>>,
    Path(episode_id): Path<String>,
) -> Result<Json<WatchlistResponse>, ApiError> {
    state
        .tracker()
        .remove_from_watchlist(&episode_id)
        .map_err(tracker_error)?;
    Ok(Json(WatchlistResponse {
        episode_id,
        in_watchlist: false,
    }))
}

/// GET /api/v1/watchlist
pub async fn list_watchlist(State(state): State<Arc<AppState>>) -> Json<WatchlistListResponse> {
    let items = state.tracker().watchlist();
    let total = items.len();
    Json(WatchlistListResponse { items, total })
}

// ============================================================================
// Collection
// ============================================================================

/// GET /api/v1/collection
pub async fn list_collection(State(state): State<Arc<AppState>>) -> Json<CollectionListResponse> {
    let items: Vec<CollectionItemView> = state
        .tracker()
        .collection()
        .into_iter()
        .map(|item| CollectionItemView {
            completion: item.completion_ratio(),
            item,
        })
        .collect();
    let total = items.len();
    Json(CollectionListResponse { items, total })
}

/// POST /api/v1/collection
///
/// Exactly one of `anime_id` and `anime` must be given.
pub async fn add_to_collection(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AddToCollectionRequest>,
) -> Result<(StatusCode, Json<CollectionEntry>), ApiError> {
    let tracker = state.tracker();

    let entry = match (request.anime_id, request.anime) {
        (Some(anime_id), None) => {
            tracker
                .add_to_collection(&anime_id, request.status)
                .map_err(tracker_error)?;
            tracker
                .store()
                .collection_entry_for_anime(&anime_id)
                .map_err(|e| tracker_error(TrackerError::Store(e)))?
                .ok_or_else(|| {
                    tracker_error(TrackerError::NotFound(format!(
                        "Collection entry of anime {}",
                        anime_id
                    )))
                })?
        }
        (None, Some(record)) => tracker
            .add_remote_to_collection(&record, request.status)
            .map_err(tracker_error)?,
        _ => {
            return Err(error_response(
                StatusCode::BAD_REQUEST,
                "Exactly one of 'anime_id' and 'anime' is required",
            ))
        }
    };

    Ok((StatusCode::CREATED, Json(entry)))
}

/// PATCH /api/v1/collection/{id}
pub async fn update_collection(
    State(state): State<Arc<AppState>>,
    Path(collection_id): Path<String>,
    Json(update): Json<CollectionUpdate>,
) -> Result<Json<SuccessResponse>, ApiError> {
    if update.is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "Nothing to update"));
    }

    state
        .tracker()
        .update_collection(&collection_id, &update)
        .map_err(tracker_error)?;
    Ok(Json(SuccessResponse {
        message: format!("Updated collection entry {}", collection_id),
    }))
}

/// DELETE /api/v1/collection/{id}
pub async fn remove_from_collection(
    State(state): State<Arc<AppState>>,
    Path(collection_id): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state
        .tracker()
        .remove_from_collection(&collection_id)
        .map_err(tracker_error)?;
    Ok(Json(SuccessResponse {
        message: format!("Removed {} from collection", collection_id),
    }))
}
