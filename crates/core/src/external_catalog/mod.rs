//! Remote anime catalog (Kitsu) integration.
//!
//! The client is stateless and never retries. Callers that need offline
//! behavior fall back to the local library themselves.

mod kitsu;
pub mod security;
mod types;

pub use kitsu::KitsuClient;
pub use types::*;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur when talking to the remote catalog.
#[derive(Debug, Error)]
pub enum ExternalCatalogError {
    /// The search query was rejected before any request was made.
    #[error("Invalid search query: {0}")]
    InvalidQuery(String),

    /// Host allow-list or response content-type check failed.
    #[error("Security check failed: {0}")]
    Security(String),

    /// Resource not found (any non-success status on a lookup).
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// API returned an error.
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    ParseError(String),
}

/// Trait for remote anime catalogs.
#[async_trait]
pub trait RemoteCatalog: Send + Sync {
    /// Full-text search. `page` is 1-based.
    async fn search(
        &self,
        query: &str,
        page: u32,
    ) -> Result<CatalogPage<RemoteAnimeRecord>, ExternalCatalogError>;

    /// Currently trending animes.
    async fn trending(&self, limit: u32) -> Result<Vec<RemoteAnimeRecord>, ExternalCatalogError>;

    /// Get an anime by catalog id.
    async fn get_anime(&self, external_id: &str) -> Result<RemoteAnimeRecord, ExternalCatalogError>;

    /// One page of an anime's episodes, ordered by number. `page` is 1-based.
    async fn get_episodes(
        &self,
        external_id: &str,
        page: u32,
    ) -> Result<CatalogPage<RemoteEpisodeRecord>, ExternalCatalogError>;

    /// Get an episode by catalog id.
    async fn get_episode(&self, external_id: &str)
        -> Result<RemoteEpisodeRecord, ExternalCatalogError>;
}
