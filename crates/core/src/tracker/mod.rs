//! Reconciliation between the remote catalog and the local library.
//!
//! Reads go to the catalog first. A successful catalog read is returned at
//! once and persisted in the background through the write-behind queue; a
//! failed one falls back to whatever the library holds. User state (watched
//! marks, watchlist, collection) lives only in the library and is written
//! through synchronously.

mod types;

pub use types::*;

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::external_catalog::{
    CatalogPage, RemoteAnimeRecord, RemoteCatalog, RemoteEpisodeRecord,
};
use crate::library::{
    persist_remote, Anime, CollectionEntry, CollectionItem, CollectionStatus, CollectionUpdate,
    Episode, LibraryError, LibraryStats, LibraryStore, NewEpisode, PersistedAnime, WatchedMark,
    WatchlistItem,
};
use crate::metrics;
use crate::writeback::{WritebackHandle, WritebackJob};

/// Offline-first anime tracker.
pub struct AnimeTracker {
    remote: Arc<dyn RemoteCatalog>,
    store: Arc<dyn LibraryStore>,
    writeback: WritebackHandle,
}

impl AnimeTracker {
    pub fn new(
        remote: Arc<dyn RemoteCatalog>,
        store: Arc<dyn LibraryStore>,
        writeback: WritebackHandle,
    ) -> Self {
        Self {
            remote,
            store,
            writeback,
        }
    }

    pub fn store(&self) -> &Arc<dyn LibraryStore> {
        &self.store
    }

    // =========================================================================
    // Catalog reads
    // =========================================================================

    /// Search the catalog. There is no offline search.
    pub async fn search(
        &self,
        query: &str,
        page: u32,
    ) -> Result<CatalogPage<RemoteAnimeRecord>, TrackerError> {
        Ok(self.remote.search(query, page).await?)
    }

    pub async fn trending(&self, limit: u32) -> Result<Vec<RemoteAnimeRecord>, TrackerError> {
        Ok(self.remote.trending(limit).await?)
    }

    /// Load an anime by catalog id, or by local id when offline.
    pub async fn load_anime(&self, id: &str) -> Result<LoadedAnime, TrackerError> {
        match self.remote.get_anime(id).await {
            Ok(record) => {
                self.queue_writeback(WritebackJob::anime(record.clone()));
                Ok(LoadedAnime::Remote(record))
            }
            Err(e) => {
                warn!("Catalog lookup of anime {} failed, using local library: {}", id, e);
                metrics::LOCAL_FALLBACKS
                    .with_label_values(&["load_anime"])
                    .inc();

                self.find_local_anime(id)
                    .map(LoadedAnime::Local)
                    .ok_or_else(|| TrackerError::NotFound(format!("Anime {}", id)))
            }
        }
    }

    /// Episodes of a loaded anime.
    ///
    /// A locally loaded anime only reads the library. A remote one reads the
    /// catalog page and falls back to the library when that fails.
    pub async fn load_episodes(&self, anime: &LoadedAnime, page: u32) -> EpisodeListing {
        match anime {
            LoadedAnime::Local(anime) => EpisodeListing::Local(self.local_episodes(&anime.id)),
            LoadedAnime::Remote(record) => {
                match self.remote.get_episodes(&record.external_id, page).await {
                    Ok(episodes) => {
                        self.queue_writeback(WritebackJob::with_episodes(
                            record.clone(),
                            episodes.items.clone(),
                        ));
                        EpisodeListing::Remote(episodes)
                    }
                    Err(e) => {
                        warn!(
                            "Catalog episodes of anime {} unavailable, using local library: {}",
                            record.external_id, e
                        );
                        metrics::LOCAL_FALLBACKS
                            .with_label_values(&["load_episodes"])
                            .inc();

                        let episodes = self
                            .find_local_anime(&record.external_id)
                            .map(|anime| self.local_episodes(&anime.id))
                            .unwrap_or_default();
                        EpisodeListing::Local(episodes)
                    }
                }
            }
        }
    }

    /// Episodes of an anime by catalog or local id.
    ///
    /// An anime the library already holds is not fetched again. Its episodes
    /// still come from the catalog when it has a catalog id.
    pub async fn load_episodes_by_id(
        &self,
        id: &str,
        page: u32,
    ) -> Result<EpisodeListing, TrackerError> {
        let anime = match self.find_local_anime(id) {
            Some(anime) => match RemoteAnimeRecord::from_library(&anime) {
                Some(record) => LoadedAnime::Remote(record),
                None => LoadedAnime::Local(anime),
            },
            None => self.load_anime(id).await?,
        };

        Ok(self.load_episodes(&anime, page).await)
    }

    /// Persist a catalog anime and episodes now, returning the local id.
    pub fn save_remote(
        &self,
        anime: &RemoteAnimeRecord,
        episodes: &[RemoteEpisodeRecord],
    ) -> Result<PersistedAnime, TrackerError> {
        let result = persist_remote(self.store.as_ref(), anime, episodes);
        record_store("save_remote", &result);
        Ok(result?)
    }

    fn queue_writeback(&self, job: WritebackJob) {
        let external_id = job.anime.external_id.clone();
        if !self.writeback.try_submit(job) {
            warn!("Write-behind of anime {} skipped", external_id);
        }
    }

    /// By catalog id first, then by local id. Read errors count as "not found".
    fn find_local_anime(&self, id: &str) -> Option<Anime> {
        let by_external = self.store.get_anime_by_external_id(id).unwrap_or_else(|e| {
            warn!("Local lookup of anime {} failed: {}", id, e);
            None
        });

        by_external.or_else(|| {
            self.store.get_anime(id).unwrap_or_else(|e| {
                warn!("Local lookup of anime {} failed: {}", id, e);
                None
            })
        })
    }

    /// The library's copy of an anime, stored from the catalog first when
    /// only the catalog knows it.
    async fn ensure_local_anime(&self, id: &str) -> Result<Anime, TrackerError> {
        if let Some(anime) = self.find_local_anime(id) {
            return Ok(anime);
        }

        let record = self.remote.get_anime(id).await.map_err(|e| {
            debug!("Catalog lookup of anime {} failed: {}", id, e);
            TrackerError::NotFound(format!("Anime {}", id))
        })?;
        let persisted = self.save_remote(&record, &[])?;

        self.store
            .get_anime(&persisted.anime_id)?
            .ok_or_else(|| TrackerError::NotFound(format!("Anime {}", id)))
    }

    /// By local id first, then by catalog id.
    fn find_episode(&self, id: &str) -> Result<Option<Episode>, TrackerError> {
        match self.store.get_episode(id)? {
            Some(episode) => Ok(Some(episode)),
            None => Ok(self.store.get_episode_by_external_id(id)?),
        }
    }

    /// Local id of an episode given by local or catalog id. Unknown ids are
    /// returned unchanged.
    fn resolve_episode_id(&self, id: &str) -> Result<String, TrackerError> {
        Ok(self
            .find_episode(id)?
            .map(|episode| episode.id)
            .unwrap_or_else(|| id.to_string()))
    }

    fn local_episodes(&self, anime_id: &str) -> Vec<Episode> {
        self.store.get_episodes(anime_id).unwrap_or_else(|e| {
            warn!("Reading episodes of anime {} failed: {}", anime_id, e);
            Vec::new()
        })
    }

    // =========================================================================
    // Watched marks
    // =========================================================================

    /// Mark an episode watched. `episode_id` may be a local or a catalog id.
    pub fn mark_watched(&self, episode_id: &str) -> Result<(), TrackerError> {
        let episode_id = self.resolve_episode_id(episode_id)?;
        let result = self.store.mark_watched(&episode_id);
        record_store("mark_watched", &result);
        Ok(result?)
    }

    pub fn unmark_watched(&self, episode_id: &str) -> Result<(), TrackerError> {
        let episode_id = self.resolve_episode_id(episode_id)?;
        let result = self.store.unmark_watched(&episode_id);
        record_store("unmark_watched", &result);
        Ok(result?)
    }

    /// Flip the watched state. Returns the new state.
    pub fn toggle_watched(&self, episode_id: &str) -> Result<bool, TrackerError> {
        let episode_id = self.resolve_episode_id(episode_id)?;
        if self.store.is_watched(&episode_id)? {
            self.unmark_watched(&episode_id)?;
            Ok(false)
        } else {
            self.mark_watched(&episode_id)?;
            Ok(true)
        }
    }

    /// Mark an episode watched, first storing what the library lacks.
    /// Returns the local id that was marked.
    ///
    /// The anime is fetched from the catalog and stored when the library does
    /// not know it. An episode that matches neither the stub's id nor its
    /// number becomes a placeholder row.
    pub async fn mark_watched_with(&self, stub: &EpisodeStub) -> Result<String, TrackerError> {
        if let Some(episode) = self.find_episode(&stub.episode_id)? {
            self.mark_watched(&episode.id)?;
            return Ok(episode.id);
        }

        let anime = self.ensure_local_anime(&stub.anime_id).await?;
        let existing = self
            .store
            .get_episodes(&anime.id)?
            .into_iter()
            .find(|episode| episode.number == stub.number);

        let episode_id = match existing {
            Some(episode) => episode.id,
            None => {
                debug!(
                    "Creating placeholder episode {} of anime {}",
                    stub.number, anime.id
                );
                // Addressed by catalog id, so the episode id is a catalog id too.
                let by_catalog_id = anime.id != stub.anime_id;
                let result = self.store.upsert_episode(&NewEpisode {
                    id: (!by_catalog_id).then(|| stub.episode_id.clone()),
                    anime_id: anime.id.clone(),
                    external_id: by_catalog_id.then(|| stub.episode_id.clone()),
                    number: stub.number,
                    title: Some(
                        stub.title
                            .clone()
                            .unwrap_or_else(|| format!("Episode {}", stub.number)),
                    ),
                    ..Default::default()
                });
                record_store("upsert_episode", &result);
                result?
            }
        };

        self.mark_watched(&episode_id)?;
        Ok(episode_id)
    }

    /// Local ids of the watched episodes of an anime given by local or
    /// catalog id. Empty when the library does not know the anime.
    pub fn watched_episode_ids(&self, anime_id: &str) -> Result<HashSet<String>, TrackerError> {
        match self.find_local_anime(anime_id) {
            Some(anime) => Ok(self.store.watched_episode_ids(&anime.id)?),
            None => Ok(HashSet::new()),
        }
    }

    /// Watched marks of an anime, by episode number.
    pub fn watched_marks(&self, anime_id: &str) -> Result<Vec<WatchedMark>, TrackerError> {
        match self.find_local_anime(anime_id) {
            Some(anime) => Ok(self.store.watched_marks(&anime.id)?),
            None => Ok(Vec::new()),
        }
    }

    /// Every stored episode of an anime with its watched and watchlist state.
    ///
    /// This is how a caller holding catalog episodes finds their local ids.
    /// Read errors degrade to an empty list.
    pub fn episodes_with_status(&self, anime_id: &str) -> Vec<EpisodeWithStatus> {
        let Some(anime) = self.find_local_anime(anime_id) else {
            return Vec::new();
        };

        let statuses = self.store.watched_episode_ids(&anime.id).and_then(|watched| {
            self.store
                .get_episodes(&anime.id)?
                .into_iter()
                .map(|episode| {
                    Ok(EpisodeWithStatus {
                        watched: watched.contains(&episode.id),
                        in_watchlist: self.store.is_in_watchlist(&episode.id)?,
                        episode,
                    })
                })
                .collect::<Result<Vec<_>, LibraryError>>()
        });

        statuses.unwrap_or_else(|e| {
            warn!("Reading episode states of anime {} failed: {}", anime.id, e);
            Vec::new()
        })
    }

    // =========================================================================
    // Watchlist
    // =========================================================================

    pub fn add_to_watchlist(&self, episode_id: &str) -> Result<(), TrackerError> {
        let episode_id = self.resolve_episode_id(episode_id)?;
        let result = self.store.add_to_watchlist(&episode_id);
        record_store("add_to_watchlist", &result);
        Ok(result?)
    }

    pub fn remove_from_watchlist(&self, episode_id: &str) -> Result<(), TrackerError> {
        let episode_id = self.resolve_episode_id(episode_id)?;
        let result = self.store.remove_from_watchlist(&episode_id);
        record_store("remove_from_watchlist", &result);
        Ok(result?)
    }

    /// Flip the watchlist state. Returns the new state.
    pub fn toggle_watchlist(&self, episode_id: &str) -> Result<bool, TrackerError> {
        let episode_id = self.resolve_episode_id(episode_id)?;
        if self.store.is_in_watchlist(&episode_id)? {
            self.remove_from_watchlist(&episode_id)?;
            Ok(false)
        } else {
            self.add_to_watchlist(&episode_id)?;
            Ok(true)
        }
    }

    pub fn watchlist(&self) -> Vec<WatchlistItem> {
        self.store.watchlist().unwrap_or_else(|e| {
            warn!("Reading watchlist failed: {}", e);
            Vec::new()
        })
    }

    // =========================================================================
    // Collection
    // =========================================================================

    pub fn add_to_collection(
        &self,
        anime_id: &str,
        status: CollectionStatus,
    ) -> Result<String, TrackerError> {
        let result = self.store.add_to_collection(anime_id, status);
        record_store("add_to_collection", &result);
        Ok(result?)
    }

    /// Store a catalog anime and put it in the collection.
    pub fn add_remote_to_collection(
        &self,
        record: &RemoteAnimeRecord,
        status: CollectionStatus,
    ) -> Result<CollectionEntry, TrackerError> {
        let persisted = self.save_remote(record, &[])?;
        self.add_to_collection(&persisted.anime_id, status)?;

        self.store
            .collection_entry_for_anime(&persisted.anime_id)?
            .ok_or_else(|| {
                TrackerError::NotFound(format!("Collection entry of anime {}", persisted.anime_id))
            })
    }

    pub fn update_collection(
        &self,
        collection_id: &str,
        update: &CollectionUpdate,
    ) -> Result<(), TrackerError> {
        let result = self.store.update_collection_entry(collection_id, update);
        record_store("update_collection_entry", &result);
        Ok(result?)
    }

    pub fn remove_from_collection(&self, collection_id: &str) -> Result<(), TrackerError> {
        let result = self.store.remove_from_collection(collection_id);
        record_store("remove_from_collection", &result);
        Ok(result?)
    }

    pub fn collection(&self) -> Vec<CollectionItem> {
        self.store.collection().unwrap_or_else(|e| {
            warn!("Reading collection failed: {}", e);
            Vec::new()
        })
    }

    // =========================================================================
    // Local details
    // =========================================================================

    /// A stored episode with its anime and the user's state for it. Both ids
    /// may be local or catalog ids.
    pub fn episode_details(
        &self,
        anime_id: &str,
        episode_id: &str,
    ) -> Result<EpisodeDetails, TrackerError> {
        let anime = self
            .find_local_anime(anime_id)
            .ok_or_else(|| TrackerError::NotFound(format!("Anime {}", anime_id)))?;

        let episode = self
            .find_episode(episode_id)?
            .filter(|episode| episode.anime_id == anime.id)
            .ok_or_else(|| TrackerError::NotFound(format!("Episode {}", episode_id)))?;

        Ok(EpisodeDetails {
            watched: self.store.is_watched(&episode.id)?,
            in_watchlist: self.store.is_in_watchlist(&episode.id)?,
            anime,
            episode,
        })
    }

    pub fn stats(&self) -> Result<LibraryStats, TrackerError> {
        Ok(self.store.stats()?)
    }
}

fn record_store<T>(operation: &str, result: &Result<T, LibraryError>) {
    metrics::STORE_OPERATIONS
        .with_label_values(&[operation, metrics::result_label(result)])
        .inc();
}
