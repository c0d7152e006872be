//! Types for the reconciling tracker.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::external_catalog::{
    CatalogPage, ExternalCatalogError, RemoteAnimeRecord, RemoteEpisodeRecord,
};
use crate::library::{Anime, Episode, LibraryError};

/// An anime together with where it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "origin", content = "anime", rename_all = "snake_case")]
pub enum LoadedAnime {
    /// Fresh from the catalog.
    Remote(RemoteAnimeRecord),
    /// From the local library because the catalog could not be reached.
    Local(Anime),
}

impl LoadedAnime {
    pub fn is_remote(&self) -> bool {
        matches!(self, LoadedAnime::Remote(_))
    }

    pub fn title(&self) -> &str {
        match self {
            LoadedAnime::Remote(record) => &record.title,
            LoadedAnime::Local(anime) => &anime.title,
        }
    }

    /// Catalog id, if known.
    pub fn external_id(&self) -> Option<&str> {
        match self {
            LoadedAnime::Remote(record) => Some(&record.external_id),
            LoadedAnime::Local(anime) => anime.external_id.as_deref(),
        }
    }

    pub fn episode_count(&self) -> Option<u32> {
        match self {
            LoadedAnime::Remote(record) => record.episode_count,
            LoadedAnime::Local(anime) => anime.episode_count,
        }
    }
}

/// Episodes of a [`LoadedAnime`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "origin", content = "episodes", rename_all = "snake_case")]
pub enum EpisodeListing {
    /// One catalog page.
    Remote(CatalogPage<RemoteEpisodeRecord>),
    /// Every locally stored episode, by number.
    Local(Vec<Episode>),
}

impl EpisodeListing {
    pub fn len(&self) -> usize {
        match self {
            EpisodeListing::Remote(page) => page.items.len(),
            EpisodeListing::Local(episodes) => episodes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One local episode with its anime and the user's state for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeDetails {
    pub anime: Anime,
    pub episode: Episode,
    pub watched: bool,
    pub in_watchlist: bool,
}

/// A stored episode with the user's state for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeWithStatus {
    #[serde(flatten)]
    pub episode: Episode,
    pub watched: bool,
    pub in_watchlist: bool,
}

/// Enough to create a placeholder episode before marking it watched.
///
/// `episode_id` and `anime_id` may be local ids or catalog ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeStub {
    pub episode_id: String,
    pub anime_id: String,
    pub number: u32,
    #[serde(default)]
    pub title: Option<String>,
}

/// Errors from tracker operations.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Neither the catalog nor the local library knows the requested item.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] LibraryError),

    #[error(transparent)]
    Remote(#[from] ExternalCatalogError),
}
