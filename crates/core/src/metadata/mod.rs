//! Metadata provider abstraction.
//!
//! Providers resolve human titles into canonical metadata: ids, year,
//! overview, and for shows the full season/episode map the library skeleton
//! is built from.

mod tmdb;
mod tvmaze;

pub use tmdb::TmdbClient;
pub use tvmaze::TvmazeClient;

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("provider does not support {0}")]
    Unsupported(&'static str),

    #[error("Request timeout")]
    Timeout,
}

#[derive(Debug, Clone, Serialize)]
pub struct MovieResult {
    /// Provider-side identifier (TMDB id for tmdb).
    pub id: String,
    pub title: String,
    pub year: i32,
    pub overview: String,
    pub poster_url: String,
    pub rating: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EpisodeInfo {
    pub number: u32,
    pub title: String,
    /// `YYYY-MM-DD` when known.
    pub air_date: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TvShowResult {
    pub id: String,
    pub title: String,
    pub year: i32,
    pub overview: String,
    pub poster_url: String,
    pub rating: f64,
    /// Show-level status as reported upstream, lowercased
    /// ("running" / "ended").
    pub status: String,
    /// Episodes keyed by season number, each sorted by episode number.
    pub seasons: BTreeMap<u32, Vec<EpisodeInfo>>,
}

/// Metadata provider contract.
#[async_trait]
pub trait MetadataClient: Send + Sync {
    fn name(&self) -> &str;

    async fn search_movie(
        &self,
        title: &str,
        year: i32,
    ) -> Result<Vec<MovieResult>, MetadataError>;

    async fn search_tv_show(&self, title: &str) -> Result<Vec<TvShowResult>, MetadataError>;
}
