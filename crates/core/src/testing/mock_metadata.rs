//! Mock metadata provider for testing.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::metadata::{
    EpisodeInfo, MetadataClient, MetadataError, MovieResult, TvShowResult,
};

/// Mock implementation of the `MetadataClient` trait with canned results.
#[derive(Default)]
pub struct MockMetadataClient {
    movies: Arc<RwLock<Vec<MovieResult>>>,
    shows: Arc<RwLock<Vec<TvShowResult>>>,
}

impl MockMetadataClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_movies(&self, movies: Vec<MovieResult>) {
        *self.movies.write().await = movies;
    }

    pub async fn set_shows(&self, shows: Vec<TvShowResult>) {
        *self.shows.write().await = shows;
    }

    /// Build a one-season show result with the given episode air dates.
    pub fn show_with_episodes(
        title: &str,
        status: &str,
        air_dates: &[Option<&str>],
    ) -> TvShowResult {
        let episodes = air_dates
            .iter()
            .enumerate()
            .map(|(i, air_date)| EpisodeInfo {
                number: (i + 1) as u32,
                title: format!("Episode {}", i + 1),
                air_date: air_date.map(|d| d.to_string()),
            })
            .collect();

        let mut seasons = BTreeMap::new();
        seasons.insert(1, episodes);

        TvShowResult {
            id: "42".to_string(),
            title: title.to_string(),
            year: 2024,
            overview: String::new(),
            poster_url: String::new(),
            rating: 8.0,
            status: status.to_string(),
            seasons,
        }
    }
}

#[async_trait]
impl MetadataClient for MockMetadataClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn search_movie(
        &self,
        _title: &str,
        _year: i32,
    ) -> Result<Vec<MovieResult>, MetadataError> {
        Ok(self.movies.read().await.clone())
    }

    async fn search_tv_show(&self, _title: &str) -> Result<Vec<TvShowResult>, MetadataError> {
        Ok(self.shows.read().await.clone())
    }
}
