//! Types for the local anime library.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Airing status of an anime, as reported by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnimeStatus {
    Finished,
    Current,
    Upcoming,
    #[default]
    Unknown,
}

impl AnimeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnimeStatus::Finished => "finished",
            AnimeStatus::Current => "current",
            AnimeStatus::Upcoming => "upcoming",
            AnimeStatus::Unknown => "unknown",
        }
    }

    /// Lenient parse: catalog values outside the known set map to `Unknown`.
    ///
    /// Kitsu reports not-yet-aired shows as `tba`, `unreleased` or `upcoming`.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "finished" => AnimeStatus::Finished,
            "current" => AnimeStatus::Current,
            "upcoming" | "tba" | "unreleased" => AnimeStatus::Upcoming,
            _ => AnimeStatus::Unknown,
        }
    }
}

impl fmt::Display for AnimeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The user's relationship to an anime in their collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CollectionStatus {
    Watching,
    Completed,
    #[default]
    Planned,
    Dropped,
}

impl CollectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionStatus::Watching => "watching",
            CollectionStatus::Completed => "completed",
            CollectionStatus::Planned => "planned",
            CollectionStatus::Dropped => "dropped",
        }
    }
}

impl fmt::Display for CollectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollectionStatus {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "watching" => Ok(CollectionStatus::Watching),
            "completed" => Ok(CollectionStatus::Completed),
            "planned" => Ok(CollectionStatus::Planned),
            "dropped" => Ok(CollectionStatus::Dropped),
            other => Err(LibraryError::Validation(format!(
                "unknown collection status '{}'",
                other
            ))),
        }
    }
}

/// A stored anime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anime {
    /// Local primary key.
    pub id: String,
    /// Catalog (Kitsu) id, absent for purely local entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synopsis: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poster_image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode_count: Option<u32>,
    pub status: AnimeStatus,
    /// Start date as reported by the catalog (YYYY-MM-DD).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_rating: Option<String>,
}

/// Input for [`LibraryStore::upsert_anime`](super::LibraryStore::upsert_anime).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewAnime {
    /// Local id to use on insert. Generated when absent; ignored on update.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub external_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub original_title: Option<String>,
    #[serde(default)]
    pub synopsis: Option<String>,
    #[serde(default)]
    pub poster_image_url: Option<String>,
    #[serde(default)]
    pub cover_image_url: Option<String>,
    #[serde(default)]
    pub episode_count: Option<u32>,
    #[serde(default)]
    pub status: AnimeStatus,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub age_rating: Option<String>,
}

/// A stored episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub id: String,
    pub anime_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// Episode number, positive and unique within the anime.
    pub number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synopsis: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub air_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length_minutes: Option<u32>,
}

/// Input for [`LibraryStore::upsert_episode`](super::LibraryStore::upsert_episode).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewEpisode {
    #[serde(default)]
    pub id: Option<String>,
    pub anime_id: String,
    #[serde(default)]
    pub external_id: Option<String>,
    pub number: u32,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub synopsis: Option<String>,
    #[serde(default)]
    pub air_date: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub length_minutes: Option<u32>,
}

/// The user's collection entry for one anime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionEntry {
    pub id: String,
    pub anime_id: String,
    pub status: CollectionStatus,
    /// Number of watched episodes of the anime.
    pub progress: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Partial update of a collection entry. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionUpdate {
    #[serde(default)]
    pub status: Option<CollectionStatus>,
    #[serde(default)]
    pub progress: Option<u32>,
    /// 1 to 10.
    #[serde(default)]
    pub rating: Option<u8>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl CollectionUpdate {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.progress.is_none()
            && self.rating.is_none()
            && self.notes.is_none()
    }
}

/// A collection entry joined with its anime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionItem {
    pub entry: CollectionEntry,
    pub anime: Anime,
}

impl CollectionItem {
    /// Fraction of episodes watched, in `0.0..=1.0`. Zero when the episode count is unknown.
    pub fn completion_ratio(&self) -> f32 {
        match self.anime.episode_count {
            Some(total) if total > 0 => (self.entry.progress as f32 / total as f32).min(1.0),
            _ => 0.0,
        }
    }
}

/// Fact that an episode has been watched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchedMark {
    pub id: String,
    pub episode_id: String,
    pub watched_at: DateTime<Utc>,
}

/// An episode queued to watch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub id: String,
    pub episode_id: String,
    pub added_at: DateTime<Utc>,
}

/// A watchlist entry joined with its episode and the episode's anime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchlistItem {
    pub entry: WatchlistEntry,
    pub episode: Episode,
    pub anime: Anime,
}

/// Row counts of the library tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryStats {
    pub animes: u64,
    pub episodes: u64,
    pub collection_entries: u64,
    pub watched_episodes: u64,
    pub watchlist_entries: u64,
}

/// Errors for library operations.
#[derive(Debug, Error)]
pub enum LibraryError {
    /// The database could not be opened or its schema created.
    #[error("Library initialization failed: {0}")]
    Initialization(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid value: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anime_status_lenient_parse() {
        assert_eq!(AnimeStatus::parse_lenient("finished"), AnimeStatus::Finished);
        assert_eq!(AnimeStatus::parse_lenient("Current"), AnimeStatus::Current);
        assert_eq!(AnimeStatus::parse_lenient("tba"), AnimeStatus::Upcoming);
        assert_eq!(AnimeStatus::parse_lenient("unreleased"), AnimeStatus::Upcoming);
        assert_eq!(AnimeStatus::parse_lenient("hiatus"), AnimeStatus::Unknown);
    }

    #[test]
    fn test_collection_status_round_trip_through_text() {
        for status in [
            CollectionStatus::Watching,
            CollectionStatus::Completed,
            CollectionStatus::Planned,
            CollectionStatus::Dropped,
        ] {
            assert_eq!(status.as_str().parse::<CollectionStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_collection_status_rejects_unknown_value() {
        let result = "on_hold".parse::<CollectionStatus>();
        assert!(matches!(result, Err(LibraryError::Validation(_))));
    }

    #[test]
    fn test_collection_status_serialization() {
        assert_eq!(
            serde_json::to_string(&CollectionStatus::Watching).unwrap(),
            "\"watching\""
        );
        assert_eq!(CollectionStatus::default(), CollectionStatus::Planned);
    }

    #[test]
    fn test_collection_update_is_empty() {
        assert!(CollectionUpdate::default().is_empty());
        let update = CollectionUpdate {
            rating: Some(8),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }

    fn item(progress: u32, episode_count: Option<u32>) -> CollectionItem {
        CollectionItem {
            entry: CollectionEntry {
                id: "c1".to_string(),
                anime_id: "a1".to_string(),
                status: CollectionStatus::Watching,
                progress,
                start_date: None,
                finish_date: None,
                rating: None,
                notes: None,
                created_at: Utc::now(),
            },
            anime: Anime {
                id: "a1".to_string(),
                external_id: Some("12".to_string()),
                title: "One Piece".to_string(),
                original_title: None,
                synopsis: None,
                poster_image_url: None,
                cover_image_url: None,
                episode_count,
                status: AnimeStatus::Current,
                start_date: None,
                end_date: None,
                age_rating: None,
            },
        }
    }

    #[test]
    fn test_completion_ratio() {
        assert_eq!(item(6, Some(12)).completion_ratio(), 0.5);
        assert_eq!(item(3, None).completion_ratio(), 0.0);
        assert_eq!(item(3, Some(0)).completion_ratio(), 0.0);
        assert_eq!(item(14, Some(12)).completion_ratio(), 1.0);
    }
}
