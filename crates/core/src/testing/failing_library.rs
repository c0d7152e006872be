//! Library store whose every call fails.

use std::collections::HashSet;

use crate::library::{
    Anime, CollectionEntry, CollectionItem, CollectionStatus, CollectionUpdate, Episode,
    LibraryError, LibraryStats, LibraryStore, NewAnime, NewEpisode, WatchedMark, WatchlistItem,
};

/// A [`LibraryStore`] that returns `LibraryError::Storage` from every method.
///
/// Used to check that read failures degrade and write failures propagate.
#[derive(Debug, Clone)]
pub struct FailingLibrary {
    message: String,
}

impl FailingLibrary {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    fn fail<T>(&self) -> Result<T, LibraryError> {
        Err(LibraryError::Storage(self.message.clone()))
    }
}

impl LibraryStore for FailingLibrary {
    fn upsert_anime(&self, _anime: &NewAnime) -> Result<String, LibraryError> {
        self.fail()
    }

    fn upsert_episode(&self, _episode: &NewEpisode) -> Result<String, LibraryError> {
        self.fail()
    }

    fn get_anime(&self, _id: &str) -> Result<Option<Anime>, LibraryError> {
        self.fail()
    }

    fn get_anime_by_external_id(&self, _external_id: &str) -> Result<Option<Anime>, LibraryError> {
        self.fail()
    }

    fn get_episodes(&self, _anime_id: &str) -> Result<Vec<Episode>, LibraryError> {
        self.fail()
    }

    fn get_episode(&self, _id: &str) -> Result<Option<Episode>, LibraryError> {
        self.fail()
    }

    fn get_episode_by_external_id(
        &self,
        _external_id: &str,
    ) -> Result<Option<Episode>, LibraryError> {
        self.fail()
    }

    fn mark_watched(&self, _episode_id: &str) -> Result<(), LibraryError> {
        self.fail()
    }

    fn unmark_watched(&self, _episode_id: &str) -> Result<(), LibraryError> {
        self.fail()
    }

    fn is_watched(&self, _episode_id: &str) -> Result<bool, LibraryError> {
        self.fail()
    }

    fn watched_episode_ids(&self, _anime_id: &str) -> Result<HashSet<String>, LibraryError> {
        self.fail()
    }

    fn watched_marks(&self, _anime_id: &str) -> Result<Vec<WatchedMark>, LibraryError> {
        self.fail()
    }

    fn add_to_watchlist(&self, _episode_id: &str) -> Result<(), LibraryError> {
        self.fail()
    }

    fn remove_from_watchlist(&self, _episode_id: &str) -> Result<(), LibraryError> {
        self.fail()
    }

    fn is_in_watchlist(&self, _episode_id: &str) -> Result<bool, LibraryError> {
        self.fail()
    }

    fn watchlist(&self) -> Result<Vec<WatchlistItem>, LibraryError> {
        self.fail()
    }

    fn add_to_collection(
        &self,
        _anime_id: &str,
        _status: CollectionStatus,
    ) -> Result<String, LibraryError> {
        self.fail()
    }

    fn update_collection_entry(
        &self,
        _collection_id: &str,
        _update: &CollectionUpdate,
    ) -> Result<(), LibraryError> {
        self.fail()
    }

    fn remove_from_collection(&self, _collection_id: &str) -> Result<(), LibraryError> {
        self.fail()
    }

    fn collection(&self) -> Result<Vec<CollectionItem>, LibraryError> {
        self.fail()
    }

    fn collection_entry_for_anime(
        &self,
        _anime_id: &str,
    ) -> Result<Option<CollectionEntry>, LibraryError> {
        self.fail()
    }

    fn stats(&self) -> Result<LibraryStats, LibraryError> {
        self.fail()
    }
}
