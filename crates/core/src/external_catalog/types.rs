//! Records returned by the remote anime catalog.

use serde::{Deserialize, Serialize};

use crate::library::AnimeStatus;

/// An anime as reported by the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteAnimeRecord {
    /// Catalog id (Kitsu numeric id as a string).
    pub external_id: String,
    /// Display title (canonical, falling back to English then romaji).
    pub title: String,
    /// Japanese title when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synopsis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poster_image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_count: Option<u32>,
    #[serde(default)]
    pub status: AnimeStatus,
    /// YYYY-MM-DD.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_rating: Option<String>,
}

/// An episode as reported by the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteEpisodeRecord {
    pub external_id: String,
    /// Episode number within the anime. Records without one are not stored locally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synopsis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub air_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length_minutes: Option<u32>,
}

/// One page of catalog results.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogPage<T> {
    pub items: Vec<T>,
    /// Whether the catalog advertised a next page.
    pub has_next_page: bool,
    /// Total number of matching records, when the catalog reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

impl<T> CatalogPage<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            has_next_page: false,
            total: Some(0),
        }
    }
}
