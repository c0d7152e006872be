//! Core of anitrack: an anime watch-progress tracker that reads from the
//! Kitsu catalog and keeps working offline from a local SQLite library.

pub mod config;
pub mod external_catalog;
pub mod library;
pub mod metrics;
pub mod testing;
pub mod tracker;
pub mod writeback;

pub use config::{
    load_config, load_config_from_env, load_config_from_str, validate_config, CatalogConfig,
    Config, ConfigError,
};
pub use external_catalog::{
    CatalogPage, ExternalCatalogError, KitsuClient, RemoteAnimeRecord, RemoteCatalog,
    RemoteEpisodeRecord,
};
pub use library::{LibraryError, LibraryOpener, LibraryStore, SqliteLibrary, WatchedMark};
pub use tracker::{
    AnimeTracker, EpisodeDetails, EpisodeListing, EpisodeStub, EpisodeWithStatus, LoadedAnime,
    TrackerError,
};
pub use writeback::{
    create_writeback_system, WritebackHandle, WritebackJob, WritebackOutcome,
};
