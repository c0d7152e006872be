//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that builds the router in-process
//! over a mock catalog and an in-memory library, so the HTTP surface can be
//! exercised without network access.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;

use anitrack_core::{
    create_writeback_system,
    library::Episode,
    testing::MockRemoteCatalog,
    AnimeTracker, Config, LibraryStore, RemoteAnimeRecord, RemoteCatalog, RemoteEpisodeRecord,
    SqliteLibrary, WritebackOutcome,
};

/// Re-export fixtures for test convenience
pub use anitrack_core::testing::fixtures;

/// Test fixture for API testing with mock dependencies.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_trending() {
///     let fixture = TestFixture::new();
///     fixture.catalog.add_anime(fixtures::remote_anime("1", "Cowboy Bebop", Some(26))).await;
///     fixture.catalog.set_trending(vec!["1".into()]).await;
///
///     let response = fixture.get("/api/v1/catalog/trending").await;
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock catalog - configure animes, episodes and failures
    pub catalog: Arc<MockRemoteCatalog>,
    /// The library behind the tracker
    pub library: Arc<SqliteLibrary>,
    /// The tracker behind the router, for seeding state directly
    pub tracker: Arc<AnimeTracker>,
    /// Outcomes of write-behind jobs
    pub outcomes: mpsc::UnboundedReceiver<WritebackOutcome>,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a new test fixture with default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Create a test fixture with custom configuration.
    pub fn with_config(config: Config) -> Self {
        let catalog = Arc::new(MockRemoteCatalog::with_page_limit(
            config.catalog.page_limit,
        ));
        let library = Arc::new(SqliteLibrary::in_memory().expect("Failed to create library"));
        let store: Arc<dyn LibraryStore> = library.clone();

        let (report_tx, outcomes) = mpsc::unbounded_channel();
        let (writeback, writer) = create_writeback_system(Arc::clone(&store), 16);
        tokio::spawn(writer.with_reports(report_tx).run());

        let tracker = Arc::new(AnimeTracker::new(
            Arc::clone(&catalog) as Arc<dyn RemoteCatalog>,
            store,
            writeback,
        ));

        let state = Arc::new(anitrack_server::state::AppState::new(
            config,
            Arc::clone(&tracker),
        ));
        let router = anitrack_server::api::create_router(state);

        Self {
            router,
            catalog,
            library,
            tracker,
            outcomes,
        }
    }

    /// Put an anime in the mock catalog together with its episodes.
    pub async fn add_remote_anime(
        &self,
        anime: RemoteAnimeRecord,
        episodes: Vec<RemoteEpisodeRecord>,
    ) {
        let external_id = anime.external_id.clone();
        self.catalog.add_anime(anime).await;
        self.catalog.set_episodes(&external_id, episodes).await;
    }

    /// Store an anime and its episodes locally. Returns the local anime id
    /// and the stored episodes by number.
    pub fn seed_library(
        &self,
        anime: &RemoteAnimeRecord,
        episodes: &[RemoteEpisodeRecord],
    ) -> (String, Vec<Episode>) {
        let persisted = self
            .tracker
            .save_remote(anime, episodes)
            .expect("Failed to seed library");
        let episodes = self
            .library
            .get_episodes(&persisted.anime_id)
            .expect("Failed to read seeded episodes");
        (persisted.anime_id, episodes)
    }

    /// Wait for the next write-behind job to finish.
    pub async fn next_outcome(&mut self) -> WritebackOutcome {
        tokio::time::timeout(std::time::Duration::from_secs(5), self.outcomes.recv())
            .await
            .expect("Timed out waiting for write-behind")
            .expect("Write-behind writer stopped")
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Send a PATCH request with JSON body.
    pub async fn patch(&self, path: &str, body: Value) -> TestResponse {
        self.request("PATCH", path, Some(body)).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Send a request and return the raw body as text.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
