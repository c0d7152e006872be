//! Catalog API handlers: search and trending, straight from the remote catalog.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use anitrack_core::{CatalogPage, RemoteAnimeRecord};

use super::error::{tracker_error, ApiError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub query: String,
    #[serde(default = "default_page")]
    pub page: u32,
}

pub(super) fn default_page() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct TrendingParams {
    #[serde(default)]
    pub limit: Option<u32>,
}

/// GET /api/v1/catalog/search?query=&page=
pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<CatalogPage<RemoteAnimeRecord>>, ApiError> {
    state
        .tracker()
        .search(&params.query, params.page)
        .await
        .map(Json)
        .map_err(tracker_error)
}

/// GET /api/v1/catalog/trending?limit=
pub async fn trending(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TrendingParams>,
) -> Result<Json<Vec<RemoteAnimeRecord>>, ApiError> {
    let limit = params.limit.unwrap_or_else(|| state.trending_limit());
    state
        .tracker()
        .trending(limit)
        .await
        .map(Json)
        .map_err(tracker_error)
}
