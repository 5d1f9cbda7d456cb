//! Indexer abstraction.
//!
//! An indexer turns a query into a list of candidate releases. Torznab-style
//! backends (Jackett, Prowlarr) support typed searches; RSS feeds are
//! read-only and carry no seeder information.

mod rss;
mod torznab;

pub use rss::RssIndexer;
pub use torznab::TorznabIndexer;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Request timeout")]
    Timeout,
}

/// Query construction hint per indexer source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum SearchMode {
    /// Free-text query; season/episode are folded into the query string.
    #[default]
    #[serde(rename = "search")]
    Search,
    /// Torznab `t=movie` category-typed search.
    #[serde(rename = "movie-search")]
    MovieSearch,
    /// Torznab `t=tvsearch` category-typed search.
    #[serde(rename = "tv-search")]
    TvSearch,
}

/// One row of an indexer's search result; a potential download source.
#[derive(Debug, Clone, Serialize)]
pub struct Release {
    pub title: String,
    pub size: u64,
    pub seeders: u32,
    pub leechers: u32,
    pub download_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_date: Option<DateTime<Utc>>,
    pub indexer: String,
    /// Filled in by the selector; zero until scored.
    pub score: i64,
}

impl Release {
    pub fn new(title: impl Into<String>, download_url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            size: 0,
            seeders: 0,
            leechers: 0,
            download_url: download_url.into(),
            publish_date: None,
            indexer: String::new(),
            score: 0,
        }
    }
}

/// Search backend contract.
#[async_trait]
pub trait Indexer: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    async fn search_movies(
        &self,
        query: &str,
        tmdb_id: &str,
        mode: SearchMode,
    ) -> Result<Vec<Release>, IndexerError>;

    async fn search_tv_shows(
        &self,
        query: &str,
        season: u32,
        episode: u32,
        mode: SearchMode,
    ) -> Result<Vec<Release>, IndexerError>;

    async fn health_check(&self) -> Result<bool, IndexerError>;
}
