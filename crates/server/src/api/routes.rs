use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::{anime, catalog, handlers, library, middleware::metrics_middleware};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health, config and status
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/status", get(handlers::get_status))
        // Catalog (remote only)
        .route("/catalog/search", get(catalog::search))
        .route("/catalog/trending", get(catalog::trending))
        // Anime and episodes (remote first, local fallback)
        .route("/anime/{id}", get(anime::get_anime))
        .route("/anime/{id}/episodes", get(anime::list_episodes))
        .route("/anime/{id}/episodes/{episode_id}", get(anime::get_episode))
        .route("/anime/{id}/watched", get(anime::list_watched))
        // Watched marks and watchlist
        .route(
            "/episodes/{id}/watched",
            post(library::mark_watched).delete(library::unmark_watched),
        )
        .route(
            "/episodes/{id}/watchlist",
            post(library::add_to_watchlist).delete(library::remove_from_watchlist),
        )
        .route("/watchlist", get(library::list_watchlist))
        // Collection
        .route(
            "/collection",
            get(library::list_collection).post(library::add_to_collection),
        )
        .route(
            "/collection/{id}",
            patch(library::update_collection).delete(library::remove_from_collection),
        );

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::get_metrics))
        .with_state(state)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
