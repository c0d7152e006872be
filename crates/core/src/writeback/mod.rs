//! Write-behind persistence of catalog reads.
//!
//! The tracker returns remote data to its caller right away and hands a
//! [`WritebackJob`] to the [`WritebackWriter`] task, which upserts it into the
//! local library. Failures are logged and reported, never surfaced to the
//! caller that triggered the job.

mod handle;
mod writer;

pub use handle::*;
pub use writer::*;

use serde::{Deserialize, Serialize};

use crate::external_catalog::{RemoteAnimeRecord, RemoteEpisodeRecord};

/// A catalog anime (and optionally some of its episodes) to store locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WritebackJob {
    pub anime: RemoteAnimeRecord,
    #[serde(default)]
    pub episodes: Vec<RemoteEpisodeRecord>,
}

impl WritebackJob {
    pub fn anime(anime: RemoteAnimeRecord) -> Self {
        Self {
            anime,
            episodes: Vec::new(),
        }
    }

    pub fn with_episodes(anime: RemoteAnimeRecord, episodes: Vec<RemoteEpisodeRecord>) -> Self {
        Self { anime, episodes }
    }
}

/// What happened to one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WritebackOutcome {
    Persisted {
        external_id: String,
        anime_id: String,
        episodes: usize,
    },
    Failed {
        external_id: String,
        error: String,
    },
}
