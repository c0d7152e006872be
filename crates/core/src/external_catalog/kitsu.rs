//! Kitsu API client.
//!
//! Kitsu serves JSON:API documents and needs no API key. All requests go
//! through [`HostGuard`] and the content-type check in [`security`](super::security).

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::security::{check_content_type, validate_search_query, HostGuard, JSON_API_MEDIA_TYPE};
use super::types::{CatalogPage, RemoteAnimeRecord, RemoteEpisodeRecord};
use super::{ExternalCatalogError, RemoteCatalog};
use crate::config::CatalogConfig;
use crate::library::AnimeStatus;
use crate::metrics;

/// Kitsu API client.
pub struct KitsuClient {
    client: Client,
    base_url: String,
    guard: HostGuard,
    page_limit: u32,
}

impl KitsuClient {
    /// Create a new Kitsu client.
    ///
    /// The base URL is not checked here; a base URL outside the allowed host
    /// makes every request fail with [`ExternalCatalogError::Security`].
    pub fn new(config: &CatalogConfig) -> Result<Self, ExternalCatalogError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            guard: HostGuard::new(config.allowed_host.clone()),
            page_limit: config.page_limit.max(1),
        })
    }

    fn offset(&self, page: u32) -> u32 {
        page.max(1).saturating_sub(1).saturating_mul(self.page_limit)
    }

    fn search_url(&self, query: &str, page: u32) -> String {
        format!(
            "{}/anime?filter[text]={}&page[limit]={}&page[offset]={}",
            self.base_url,
            urlencoding::encode(query.trim()),
            self.page_limit,
            self.offset(page)
        )
    }

    fn trending_url(&self, limit: u32) -> String {
        format!("{}/trending/anime?limit={}", self.base_url, limit)
    }

    fn anime_url(&self, external_id: &str) -> String {
        format!("{}/anime/{}", self.base_url, urlencoding::encode(external_id))
    }

    fn episodes_url(&self, external_id: &str, page: u32) -> String {
        format!(
            "{}/anime/{}/episodes?page[limit]={}&page[offset]={}&sort=number",
            self.base_url,
            urlencoding::encode(external_id),
            self.page_limit,
            self.offset(page)
        )
    }

    fn episode_url(&self, external_id: &str) -> String {
        format!("{}/episodes/{}", self.base_url, urlencoding::encode(external_id))
    }

    /// Guarded GET with the JSON:API headers.
    async fn send(&self, url: &str) -> Result<Response, ExternalCatalogError> {
        let url = self.guard.check_url(url)?;
        debug!("Kitsu GET {}", url);

        Ok(self
            .client
            .get(url)
            .header(ACCEPT, JSON_API_MEDIA_TYPE)
            .header(CONTENT_TYPE, JSON_API_MEDIA_TYPE)
            .send()
            .await?)
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        url: &str,
        not_found: impl FnOnce() -> String,
    ) -> Result<T, ExternalCatalogError> {
        let timer = metrics::REMOTE_REQUEST_DURATION
            .with_label_values(&[operation])
            .start_timer();
        let result = self.fetch_inner(url, not_found).await;
        timer.observe_duration();
        metrics::REMOTE_REQUESTS
            .with_label_values(&[operation, metrics::result_label(&result)])
            .inc();
        result
    }

    async fn fetch_listing<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        url: &str,
    ) -> Result<T, ExternalCatalogError> {
        let timer = metrics::REMOTE_REQUEST_DURATION
            .with_label_values(&[operation])
            .start_timer();
        let result = self.fetch_listing_inner(url).await;
        timer.observe_duration();
        metrics::REMOTE_REQUESTS
            .with_label_values(&[operation, metrics::result_label(&result)])
            .inc();
        result
    }

    async fn fetch_inner<T: DeserializeOwned>(
        &self,
        url: &str,
        not_found: impl FnOnce() -> String,
    ) -> Result<T, ExternalCatalogError> {
        let response = check_lookup_response(self.send(url).await?, not_found)?;
        decode(response).await
    }

    async fn fetch_listing_inner<T: DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<T, ExternalCatalogError> {
        let response = check_listing_response(self.send(url).await?).await?;
        decode(response).await
    }
}

/// Response check for single-resource lookups.
///
/// The content type is checked before the status, so an HTML error page is a
/// `Security` error whatever its status. Any other failure status is `NotFound`.
fn check_lookup_response(
    response: Response,
    not_found: impl FnOnce() -> String,
) -> Result<Response, ExternalCatalogError> {
    check_content_type(response.headers())?;

    if !response.status().is_success() {
        return Err(ExternalCatalogError::NotFound(not_found()));
    }
    Ok(response)
}

/// Response check for search and trending. A failure status is an `ApiError`
/// carrying the body.
async fn check_listing_response(response: Response) -> Result<Response, ExternalCatalogError> {
    check_content_type(response.headers())?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ExternalCatalogError::ApiError {
            status: status.as_u16(),
            message: body,
        });
    }
    Ok(response)
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ExternalCatalogError> {
    response
        .json()
        .await
        .map_err(|e| ExternalCatalogError::ParseError(e.to_string()))
}

#[async_trait]
impl RemoteCatalog for KitsuClient {
    async fn search(
        &self,
        query: &str,
        page: u32,
    ) -> Result<CatalogPage<RemoteAnimeRecord>, ExternalCatalogError> {
        validate_search_query(query)?;

        debug!("Kitsu search: query='{}', page={}", query, page);
        let document: JsonApiDocument<Vec<KitsuResource<KitsuAnimeAttributes>>> = self
            .fetch_listing("search", &self.search_url(query, page))
            .await?;

        Ok(document.into_anime_page())
    }

    async fn trending(&self, limit: u32) -> Result<Vec<RemoteAnimeRecord>, ExternalCatalogError> {
        let document: JsonApiDocument<Vec<KitsuResource<KitsuAnimeAttributes>>> = self
            .fetch_listing("trending", &self.trending_url(limit))
            .await?;

        Ok(document.data.into_iter().map(Into::into).collect())
    }

    async fn get_anime(&self, external_id: &str) -> Result<RemoteAnimeRecord, ExternalCatalogError> {
        let document: JsonApiDocument<KitsuResource<KitsuAnimeAttributes>> = self
            .fetch("get_anime", &self.anime_url(external_id), || {
                format!("Anime {}", external_id)
            })
            .await?;

        Ok(document.data.into())
    }

    async fn get_episodes(
        &self,
        external_id: &str,
        page: u32,
    ) -> Result<CatalogPage<RemoteEpisodeRecord>, ExternalCatalogError> {
        let document: JsonApiDocument<Vec<KitsuResource<KitsuEpisodeAttributes>>> = self
            .fetch("get_episodes", &self.episodes_url(external_id, page), || {
                format!("Episodes of anime {}", external_id)
            })
            .await?;

        Ok(document.into_episode_page(self.offset(page)))
    }

    async fn get_episode(
        &self,
        external_id: &str,
    ) -> Result<RemoteEpisodeRecord, ExternalCatalogError> {
        let document: JsonApiDocument<KitsuResource<KitsuEpisodeAttributes>> = self
            .fetch("get_episode", &self.episode_url(external_id), || {
                format!("Episode {}", external_id)
            })
            .await?;

        Ok(episode_from_resource(document.data, None))
    }
}

// ============================================================================
// Kitsu JSON:API Response Types (private)
// ============================================================================

#[derive(Debug, Deserialize)]
struct JsonApiDocument<T> {
    data: T,
    #[serde(default)]
    links: Option<JsonApiLinks>,
    #[serde(default)]
    meta: Option<JsonApiMeta>,
}

#[derive(Debug, Deserialize)]
struct JsonApiLinks {
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JsonApiMeta {
    count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct KitsuResource<A> {
    id: String,
    attributes: A,
}

#[derive(Debug, Default, Deserialize)]
struct KitsuTitles {
    en: Option<String>,
    en_jp: Option<String>,
    ja_jp: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct KitsuImage {
    small: Option<String>,
    medium: Option<String>,
    large: Option<String>,
    original: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KitsuAnimeAttributes {
    canonical_title: Option<String>,
    #[serde(default)]
    titles: KitsuTitles,
    synopsis: Option<String>,
    poster_image: Option<KitsuImage>,
    cover_image: Option<KitsuImage>,
    episode_count: Option<u32>,
    status: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    age_rating: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KitsuEpisodeAttributes {
    canonical_title: Option<String>,
    #[serde(default)]
    titles: KitsuTitles,
    synopsis: Option<String>,
    number: Option<u32>,
    season_number: Option<u32>,
    airdate: Option<String>,
    length: Option<u32>,
    thumbnail: Option<KitsuImage>,
}

// ============================================================================
// Conversions
// ============================================================================

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl JsonApiDocument<Vec<KitsuResource<KitsuAnimeAttributes>>> {
    fn into_anime_page(self) -> CatalogPage<RemoteAnimeRecord> {
        CatalogPage {
            has_next_page: self.links.and_then(|l| l.next).is_some(),
            total: self.meta.and_then(|m| m.count),
            items: self.data.into_iter().map(Into::into).collect(),
        }
    }
}

impl JsonApiDocument<Vec<KitsuResource<KitsuEpisodeAttributes>>> {
    /// A record without a number takes its list position, unless another
    /// record on the page already has that number.
    fn into_episode_page(self, offset: u32) -> CatalogPage<RemoteEpisodeRecord> {
        let claimed: HashSet<u32> = self
            .data
            .iter()
            .filter_map(|resource| resource.attributes.number)
            .filter(|n| *n > 0)
            .collect();

        CatalogPage {
            has_next_page: self.links.and_then(|l| l.next).is_some(),
            total: self.meta.and_then(|m| m.count),
            items: self
                .data
                .into_iter()
                .enumerate()
                .map(|(i, resource)| {
                    let position = offset.saturating_add(i as u32).saturating_add(1);
                    let fallback = (!claimed.contains(&position)).then_some(position);
                    episode_from_resource(resource, fallback)
                })
                .collect(),
        }
    }
}

impl From<KitsuResource<KitsuAnimeAttributes>> for RemoteAnimeRecord {
    fn from(resource: KitsuResource<KitsuAnimeAttributes>) -> Self {
        let KitsuResource { id, attributes: a } = resource;
        let titles = a.titles;

        let title = non_empty(a.canonical_title)
            .or_else(|| non_empty(titles.en.clone()))
            .or_else(|| non_empty(titles.en_jp.clone()))
            .or_else(|| non_empty(titles.ja_jp.clone()))
            .unwrap_or_else(|| format!("Anime {}", id));
        let original_title = non_empty(titles.ja_jp).or_else(|| non_empty(titles.en_jp));

        let poster = a.poster_image.unwrap_or_default();
        let cover = a.cover_image.unwrap_or_default();

        Self {
            external_id: id,
            title,
            original_title,
            synopsis: non_empty(a.synopsis),
            poster_image_url: poster.medium.or(poster.small).or(poster.large),
            cover_image_url: cover.large.or(cover.original),
            episode_count: a.episode_count,
            status: a
                .status
                .as_deref()
                .map(AnimeStatus::parse_lenient)
                .unwrap_or_default(),
            start_date: a.start_date,
            end_date: a.end_date,
            age_rating: a.age_rating,
        }
    }
}

/// `fallback_number` fills a missing episode number from the list position.
fn episode_from_resource(
    resource: KitsuResource<KitsuEpisodeAttributes>,
    fallback_number: Option<u32>,
) -> RemoteEpisodeRecord {
    let KitsuResource { id, attributes: a } = resource;

    RemoteEpisodeRecord {
        external_id: id,
        number: a.number.filter(|n| *n > 0).or(fallback_number),
        season_number: a.season_number,
        title: non_empty(a.canonical_title)
            .or_else(|| non_empty(a.titles.en))
            .or_else(|| non_empty(a.titles.en_jp)),
        synopsis: non_empty(a.synopsis),
        air_date: a.airdate,
        thumbnail_url: a.thumbnail.and_then(|t| t.original),
        length_minutes: a.length,
    }
}
