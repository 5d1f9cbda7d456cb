//! Mock notifier for testing.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::library::Media;
use crate::notify::{Notifier, NotifyError};

/// Mock implementation of the `Notifier` trait that records every event as
/// `"{event}:{title}"`.
#[derive(Default)]
pub struct MockNotifier {
    events: Arc<RwLock<Vec<String>>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<String> {
        self.events.read().await.clone()
    }

    async fn record(&self, event: &str, subject: &str) -> Result<(), NotifyError> {
        self.events
            .write()
            .await
            .push(format!("{}:{}", event, subject));
        Ok(())
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    fn name(&self) -> &str {
        "mock"
    }

    async fn notify_download_start(
        &self,
        media: &Media,
        _torrent_name: &str,
    ) -> Result<(), NotifyError> {
        self.record("download_start", &media.title).await
    }

    async fn notify_download_complete(
        &self,
        media: &Media,
        _torrent_name: &str,
    ) -> Result<(), NotifyError> {
        self.record("download_complete", &media.title).await
    }

    async fn notify_post_process_complete(
        &self,
        media: &Media,
        _torrent_name: &str,
    ) -> Result<(), NotifyError> {
        self.record("post_process_complete", &media.title).await
    }

    async fn notify_not_enough_space(
        &self,
        media: &Media,
        _path: &str,
    ) -> Result<(), NotifyError> {
        self.record("not_enough_space", &media.title).await
    }

    async fn notify_download_error(
        &self,
        media: &Media,
        _error: &str,
    ) -> Result<(), NotifyError> {
        self.record("download_error", &media.title).await
    }

    async fn test(&self) -> Result<(), NotifyError> {
        self.record("test", "test").await
    }
}
