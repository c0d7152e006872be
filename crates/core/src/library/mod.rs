//! Local anime library - the on-device store of animes, episodes and the
//! user's collection, watched marks and watchlist.
//!
//! Remote catalog reads are persisted here so the tracker keeps working
//! offline. The one derived field is [`CollectionEntry::progress`], which is
//! recomputed from the watched marks every time one is added or removed.

mod ids;
mod opener;
mod remote;
mod sqlite;
mod types;

use std::collections::HashSet;

pub use ids::generate_id;
pub use opener::LibraryOpener;
pub use remote::{persist_remote, PersistedAnime};
pub use sqlite::SqliteLibrary;
pub use types::*;

/// Trait for local library storage.
pub trait LibraryStore: Send + Sync {
    /// Insert or update an anime.
    ///
    /// Matches an existing row by non-null `external_id` and updates it in
    /// place. A `None` external id always inserts a new row.
    ///
    /// Returns the local id of the stored anime.
    fn upsert_anime(&self, anime: &NewAnime) -> Result<String, LibraryError>;

    /// Insert or update an episode, matched by (`anime_id`, `number`).
    fn upsert_episode(&self, episode: &NewEpisode) -> Result<String, LibraryError>;

    /// Get an anime by local id.
    fn get_anime(&self, id: &str) -> Result<Option<Anime>, LibraryError>;

    /// Get an anime by catalog id.
    fn get_anime_by_external_id(&self, external_id: &str) -> Result<Option<Anime>, LibraryError>;

    /// Episodes of an anime ordered by number.
    fn get_episodes(&self, anime_id: &str) -> Result<Vec<Episode>, LibraryError>;

    /// Get an episode by local id.
    fn get_episode(&self, id: &str) -> Result<Option<Episode>, LibraryError>;

    /// Get an episode by catalog id.
    fn get_episode_by_external_id(&self, external_id: &str) -> Result<Option<Episode>, LibraryError>;

    /// Mark an episode watched.
    ///
    /// Idempotent. On a new mark the collection progress of the episode's
    /// anime is recomputed (creating a `watching` entry if the anime is not
    /// collected yet). Any watchlist entry for the episode is removed.
    fn mark_watched(&self, episode_id: &str) -> Result<(), LibraryError>;

    /// Remove the watched mark of an episode and recompute progress.
    ///
    /// Idempotent. Never changes the collection status.
    fn unmark_watched(&self, episode_id: &str) -> Result<(), LibraryError>;

    fn is_watched(&self, episode_id: &str) -> Result<bool, LibraryError>;

    /// Ids of the watched episodes of an anime.
    fn watched_episode_ids(&self, anime_id: &str) -> Result<HashSet<String>, LibraryError>;

    /// Watched marks of an anime's episodes, by episode number.
    fn watched_marks(&self, anime_id: &str) -> Result<Vec<WatchedMark>, LibraryError>;

    /// Queue an episode. Idempotent.
    fn add_to_watchlist(&self, episode_id: &str) -> Result<(), LibraryError>;

    /// Dequeue an episode. Idempotent.
    fn remove_from_watchlist(&self, episode_id: &str) -> Result<(), LibraryError>;

    fn is_in_watchlist(&self, episode_id: &str) -> Result<bool, LibraryError>;

    /// Watchlist entries joined with episode and anime, newest first.
    fn watchlist(&self) -> Result<Vec<WatchlistItem>, LibraryError>;

    /// Add an anime to the collection, or change its status if already there.
    ///
    /// Returns the collection entry id.
    fn add_to_collection(
        &self,
        anime_id: &str,
        status: CollectionStatus,
    ) -> Result<String, LibraryError>;

    /// Partially update a collection entry.
    fn update_collection_entry(
        &self,
        collection_id: &str,
        update: &CollectionUpdate,
    ) -> Result<(), LibraryError>;

    /// Delete a collection entry. The anime, its episodes and watch history stay.
    fn remove_from_collection(&self, collection_id: &str) -> Result<(), LibraryError>;

    /// Collection entries joined with their anime, most recently created first.
    fn collection(&self) -> Result<Vec<CollectionItem>, LibraryError>;

    /// The collection entry of one anime, if any.
    fn collection_entry_for_anime(
        &self,
        anime_id: &str,
    ) -> Result<Option<CollectionEntry>, LibraryError>;

    /// Table row counts.
    fn stats(&self) -> Result<LibraryStats, LibraryError>;
}
