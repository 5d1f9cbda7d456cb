//! Mock indexer for testing.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::indexer::{Indexer, IndexerError, Release, SearchMode};

/// One recorded search call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSearch {
    pub query: String,
    pub season: u32,
    pub episode: u32,
}

/// Mock implementation of the `Indexer` trait: returns a canned release
/// list and records every query for assertions.
#[derive(Default)]
pub struct MockIndexer {
    releases: Arc<RwLock<Vec<Release>>>,
    searches: Arc<RwLock<Vec<RecordedSearch>>>,
    fail: Arc<RwLock<bool>>,
}

impl MockIndexer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_releases(&self, releases: Vec<Release>) {
        *self.releases.write().await = releases;
    }

    /// Make every subsequent search fail with an API error.
    pub async fn set_failing(&self, failing: bool) {
        *self.fail.write().await = failing;
    }

    pub async fn searches(&self) -> Vec<RecordedSearch> {
        self.searches.read().await.clone()
    }

    async fn record_and_answer(
        &self,
        query: &str,
        season: u32,
        episode: u32,
    ) -> Result<Vec<Release>, IndexerError> {
        self.searches.write().await.push(RecordedSearch {
            query: query.to_string(),
            season,
            episode,
        });

        if *self.fail.read().await {
            return Err(IndexerError::ApiError("mock indexer failure".to_string()));
        }
        Ok(self.releases.read().await.clone())
    }
}

#[async_trait]
impl Indexer for MockIndexer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn search_movies(
        &self,
        query: &str,
        _tmdb_id: &str,
        _mode: SearchMode,
    ) -> Result<Vec<Release>, IndexerError> {
        self.record_and_answer(query, 0, 0).await
    }

    async fn search_tv_shows(
        &self,
        query: &str,
        season: u32,
        episode: u32,
        _mode: SearchMode,
    ) -> Result<Vec<Release>, IndexerError> {
        self.record_and_answer(query, season, episode).await
    }

    async fn health_check(&self) -> Result<bool, IndexerError> {
        Ok(!*self.fail.read().await)
    }
}
