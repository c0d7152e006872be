//! Mapping catalog records into library rows.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Anime, LibraryError, LibraryStore, NewAnime, NewEpisode};
use crate::external_catalog::{RemoteAnimeRecord, RemoteEpisodeRecord};

impl NewAnime {
    pub fn from_remote(record: &RemoteAnimeRecord) -> Self {
        Self {
            id: None,
            external_id: Some(record.external_id.clone()),
            title: record.title.clone(),
            original_title: record.original_title.clone(),
            synopsis: record.synopsis.clone(),
            poster_image_url: record.poster_image_url.clone(),
            cover_image_url: record.cover_image_url.clone(),
            episode_count: record.episode_count,
            status: record.status,
            start_date: record.start_date.clone(),
            end_date: record.end_date.clone(),
            age_rating: record.age_rating.clone(),
        }
    }
}

impl NewEpisode {
    /// `None` when the record has no positive episode number.
    pub fn from_remote(record: &RemoteEpisodeRecord, anime_id: &str) -> Option<Self> {
        let number = record.number.filter(|n| *n > 0)?;
        Some(Self {
            id: None,
            anime_id: anime_id.to_string(),
            external_id: Some(record.external_id.clone()),
            number,
            title: record.title.clone(),
            synopsis: record.synopsis.clone(),
            air_date: record.air_date.clone(),
            thumbnail_url: record.thumbnail_url.clone(),
            length_minutes: record.length_minutes,
        })
    }
}

impl RemoteAnimeRecord {
    /// Catalog record rebuilt from a stored anime. `None` for purely local entries.
    pub fn from_library(anime: &Anime) -> Option<Self> {
        Some(Self {
            external_id: anime.external_id.clone()?,
            title: anime.title.clone(),
            original_title: anime.original_title.clone(),
            synopsis: anime.synopsis.clone(),
            poster_image_url: anime.poster_image_url.clone(),
            cover_image_url: anime.cover_image_url.clone(),
            episode_count: anime.episode_count,
            status: anime.status,
            start_date: anime.start_date.clone(),
            end_date: anime.end_date.clone(),
            age_rating: anime.age_rating.clone(),
        })
    }
}

/// Result of [`persist_remote`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedAnime {
    /// Local id of the stored anime.
    pub anime_id: String,
    /// Number of episodes written.
    pub episodes: usize,
}

/// Upsert a catalog anime and its episodes. Episodes without a number are skipped.
pub fn persist_remote(
    store: &dyn LibraryStore,
    anime: &RemoteAnimeRecord,
    episodes: &[RemoteEpisodeRecord],
) -> Result<PersistedAnime, LibraryError> {
    let anime_id = store.upsert_anime(&NewAnime::from_remote(anime))?;

    let mut written = 0;
    for record in episodes {
        match NewEpisode::from_remote(record, &anime_id) {
            Some(episode) => {
                store.upsert_episode(&episode)?;
                written += 1;
            }
            None => debug!(
                "Skipping episode {} of anime {}: no episode number",
                record.external_id, anime.external_id
            ),
        }
    }

    Ok(PersistedAnime {
        anime_id,
        episodes: written,
    })
}
