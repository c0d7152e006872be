use std::sync::Arc;
use std::time::Instant;

use anitrack_core::{AnimeTracker, Config};

/// Shared application state
pub struct AppState {
    config: Config,
    tracker: Arc<AnimeTracker>,
    started_at: Instant,
}

impl AppState {
    pub fn new(config: Config, tracker: Arc<AnimeTracker>) -> Self {
        Self {
            config,
            tracker,
            started_at: Instant::now(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tracker(&self) -> &AnimeTracker {
        self.tracker.as_ref()
    }

    /// Trending size used when a request gives none.
    pub fn trending_limit(&self) -> u32 {
        self.config.catalog.trending_limit
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
