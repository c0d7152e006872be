use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub writeback: WritebackConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([127, 0, 0, 1])
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("anitrack.db")
}

/// Remote catalog (Kitsu) configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CatalogConfig {
    /// API root (default: https://kitsu.io/api/edge).
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// The only host requests may go to.
    #[serde(default = "default_allowed_host")]
    pub allowed_host: String,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Results per search or episode page; Kitsu caps this at 20.
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,
    /// Default number of trending animes.
    #[serde(default = "default_trending_limit")]
    pub trending_limit: u32,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            allowed_host: default_allowed_host(),
            timeout_secs: default_timeout(),
            page_limit: default_page_limit(),
            trending_limit: default_trending_limit(),
        }
    }
}

fn default_base_url() -> String {
    "https://kitsu.io/api/edge".to_string()
}

fn default_allowed_host() -> String {
    "kitsu.io".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_page_limit() -> u32 {
    20
}

fn default_trending_limit() -> u32 {
    10
}

/// Write-behind queue configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WritebackConfig {
    /// Jobs that may wait before new ones are dropped.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl Default for WritebackConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
        }
    }
}

fn default_buffer_size() -> usize {
    256
}
