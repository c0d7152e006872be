//! Testing utilities and mock implementations.
//!
//! Lets the tracker and the HTTP API be exercised without network access.
//!
//! # Example
//!
//! ```rust,ignore
//! use anitrack_core::testing::{fixtures, MockRemoteCatalog};
//!
//! let catalog = MockRemoteCatalog::new();
//! catalog.add_anime(fixtures::remote_anime("12", "One Piece", Some(3))).await;
//! catalog.set_episodes("12", fixtures::remote_episodes("12", 3)).await;
//!
//! // Later, simulate losing the network
//! catalog.set_offline(true);
//! ```

mod failing_library;
mod mock_remote_catalog;

pub use failing_library::FailingLibrary;
pub use mock_remote_catalog::{MockRemoteCatalog, RecordedCatalogQuery};

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::external_catalog::{RemoteAnimeRecord, RemoteEpisodeRecord};
    use crate::library::AnimeStatus;

    /// Create a catalog anime with reasonable defaults.
    pub fn remote_anime(
        external_id: &str,
        title: &str,
        episode_count: Option<u32>,
    ) -> RemoteAnimeRecord {
        RemoteAnimeRecord {
            external_id: external_id.to_string(),
            title: title.to_string(),
            original_title: None,
            synopsis: Some(format!("An anime called {}.", title)),
            poster_image_url: Some(format!(
                "https://media.kitsu.io/anime/poster_images/{}/medium.jpg",
                external_id
            )),
            cover_image_url: None,
            episode_count,
            status: AnimeStatus::Current,
            start_date: Some("2020-01-01".to_string()),
            end_date: None,
            age_rating: Some("PG".to_string()),
        }
    }

    /// Create a catalog episode.
    pub fn remote_episode(external_id: &str, number: u32) -> RemoteEpisodeRecord {
        RemoteEpisodeRecord {
            external_id: external_id.to_string(),
            number: Some(number),
            season_number: Some(1),
            title: Some(format!("Episode {}", number)),
            synopsis: None,
            air_date: Some(format!("2020-01-{:02}", number.min(28))),
            thumbnail_url: None,
            length_minutes: Some(24),
        }
    }

    /// Episodes 1..=count of an anime, with catalog ids `<anime>-<number>`.
    pub fn remote_episodes(anime_external_id: &str, count: u32) -> Vec<RemoteEpisodeRecord> {
        (1..=count)
            .map(|n| remote_episode(&format!("{}-{}", anime_external_id, n), n))
            .collect()
    }
}
