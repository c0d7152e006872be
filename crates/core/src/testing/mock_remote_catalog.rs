//! Mock remote catalog for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::external_catalog::security::validate_search_query;
use crate::external_catalog::{
    CatalogPage, ExternalCatalogError, RemoteAnimeRecord, RemoteCatalog, RemoteEpisodeRecord,
};

/// A recorded catalog query for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCatalogQuery {
    Search { query: String, page: u32 },
    Trending { limit: u32 },
    GetAnime { external_id: String },
    GetEpisodes { external_id: String, page: u32 },
    GetEpisode { external_id: String },
}

/// Mock implementation of [`RemoteCatalog`].
///
/// Serves animes and episodes from memory, records every query that reaches
/// the "network" and can simulate failures, either once
/// ([`set_next_error`](Self::set_next_error)) or until switched back
/// ([`set_offline`](Self::set_offline)).
///
/// Search queries rejected by validation are not recorded, matching the real
/// client which never sends them.
#[derive(Debug)]
pub struct MockRemoteCatalog {
    /// Animes by catalog id.
    animes: Arc<RwLock<HashMap<String, RemoteAnimeRecord>>>,
    /// Episodes by anime catalog id, in number order.
    episodes: Arc<RwLock<HashMap<String, Vec<RemoteEpisodeRecord>>>>,
    /// Catalog ids returned by `trending`, in order.
    trending: Arc<RwLock<Vec<String>>>,
    queries: Arc<RwLock<Vec<RecordedCatalogQuery>>>,
    /// If set, the next operation will fail with this error.
    next_error: Arc<RwLock<Option<ExternalCatalogError>>>,
    offline: AtomicBool,
    page_limit: u32,
}

impl Default for MockRemoteCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRemoteCatalog {
    pub fn new() -> Self {
        Self::with_page_limit(20)
    }

    pub fn with_page_limit(page_limit: u32) -> Self {
        Self {
            animes: Arc::new(RwLock::new(HashMap::new())),
            episodes: Arc::new(RwLock::new(HashMap::new())),
            trending: Arc::new(RwLock::new(Vec::new())),
            queries: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
            offline: AtomicBool::new(false),
            page_limit: page_limit.max(1),
        }
    }

    // =========================================================================
    // Catalog Content
    // =========================================================================

    pub async fn add_anime(&self, anime: RemoteAnimeRecord) {
        self.animes
            .write()
            .await
            .insert(anime.external_id.clone(), anime);
    }

    /// Set the episodes of an anime. They are served sorted by number.
    pub async fn set_episodes(&self, anime_external_id: &str, mut episodes: Vec<RemoteEpisodeRecord>) {
        episodes.sort_by_key(|e| e.number.unwrap_or(u32::MAX));
        self.episodes
            .write()
            .await
            .insert(anime_external_id.to_string(), episodes);
    }

    /// Set the trending list. Ids must refer to added animes.
    pub async fn set_trending(&self, external_ids: Vec<String>) {
        *self.trending.write().await = external_ids;
    }

    pub async fn clear(&self) {
        self.animes.write().await.clear();
        self.episodes.write().await.clear();
        self.trending.write().await.clear();
    }

    // =========================================================================
    // Query Recording
    // =========================================================================

    pub async fn recorded_queries(&self) -> Vec<RecordedCatalogQuery> {
        self.queries.read().await.clone()
    }

    pub async fn clear_recorded(&self) {
        self.queries.write().await.clear();
    }

    pub async fn query_count(&self) -> usize {
        self.queries.read().await.len()
    }

    async fn record(&self, query: RecordedCatalogQuery) {
        self.queries.write().await.push(query);
    }

    // =========================================================================
    // Error Injection
    // =========================================================================

    /// Configure the next operation to fail with the given error.
    pub async fn set_next_error(&self, error: ExternalCatalogError) {
        *self.next_error.write().await = Some(error);
    }

    pub async fn clear_next_error(&self) {
        *self.next_error.write().await = None;
    }

    /// Make every operation fail as if the network were down.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    async fn take_error(&self) -> Option<ExternalCatalogError> {
        if self.offline.load(Ordering::SeqCst) {
            return Some(ExternalCatalogError::ApiError {
                status: 503,
                message: "network unavailable".to_string(),
            });
        }
        self.next_error.write().await.take()
    }

    fn paginate<T: Clone>(&self, items: &[T], page: u32) -> CatalogPage<T> {
        let limit = self.page_limit as usize;
        let offset = (page.max(1) as usize - 1) * limit;
        let slice: Vec<T> = items.iter().skip(offset).take(limit).cloned().collect();

        CatalogPage {
            has_next_page: offset + slice.len() < items.len(),
            total: Some(items.len() as u64),
            items: slice,
        }
    }
}

#[async_trait]
impl RemoteCatalog for MockRemoteCatalog {
    async fn search(
        &self,
        query: &str,
        page: u32,
    ) -> Result<CatalogPage<RemoteAnimeRecord>, ExternalCatalogError> {
        validate_search_query(query)?;

        self.record(RecordedCatalogQuery::Search {
            query: query.to_string(),
            page,
        })
        .await;

        if let Some(error) = self.take_error().await {
            return Err(error);
        }

        let needle = query.trim().to_lowercase();
        let mut matches: Vec<RemoteAnimeRecord> = self
            .animes
            .read()
            .await
            .values()
            .filter(|a| a.title.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.title.cmp(&b.title));

        Ok(self.paginate(&matches, page))
    }

    async fn trending(&self, limit: u32) -> Result<Vec<RemoteAnimeRecord>, ExternalCatalogError> {
        self.record(RecordedCatalogQuery::Trending { limit }).await;

        if let Some(error) = self.take_error().await {
            return Err(error);
        }

        let animes = self.animes.read().await;
        Ok(self
            .trending
            .read()
            .await
            .iter()
            .filter_map(|id| animes.get(id).cloned())
            .take(limit as usize)
            .collect())
    }

    async fn get_anime(&self, external_id: &str) -> Result<RemoteAnimeRecord, ExternalCatalogError> {
        self.record(RecordedCatalogQuery::GetAnime {
            external_id: external_id.to_string(),
        })
        .await;

        if let Some(error) = self.take_error().await {
            return Err(error);
        }

        self.animes
            .read()
            .await
            .get(external_id)
            .cloned()
            .ok_or_else(|| ExternalCatalogError::NotFound(format!("Anime {}", external_id)))
    }

    async fn get_episodes(
        &self,
        external_id: &str,
        page: u32,
    ) -> Result<CatalogPage<RemoteEpisodeRecord>, ExternalCatalogError> {
        self.record(RecordedCatalogQuery::GetEpisodes {
            external_id: external_id.to_string(),
            page,
        })
        .await;

        if let Some(error) = self.take_error().await {
            return Err(error);
        }

        if !self.animes.read().await.contains_key(external_id) {
            return Err(ExternalCatalogError::NotFound(format!(
                "Episodes of anime {}",
                external_id
            )));
        }

        let episodes = self.episodes.read().await;
        let all = episodes.get(external_id).map(Vec::as_slice).unwrap_or(&[]);
        Ok(self.paginate(all, page))
    }

    async fn get_episode(
        &self,
        external_id: &str,
    ) -> Result<RemoteEpisodeRecord, ExternalCatalogError> {
        self.record(RecordedCatalogQuery::GetEpisode {
            external_id: external_id.to_string(),
        })
        .await;

        if let Some(error) = self.take_error().await {
            return Err(error);
        }

        self.episodes
            .read()
            .await
            .values()
            .flatten()
            .find(|e| e.external_id == external_id)
            .cloned()
            .ok_or_else(|| ExternalCatalogError::NotFound(format!("Episode {}", external_id)))
    }
}
