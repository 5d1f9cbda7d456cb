//! Notification dispatch.
//!
//! Notifiers are fire-and-forget: the manager and post-processor spawn each
//! dispatch and log failures; a broken notifier never fails the core.

mod pushbullet;

pub use pushbullet::PushbulletNotifier;

use async_trait::async_trait;
use thiserror::Error;

use crate::library::Media;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Request timeout")]
    Timeout,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn notify_download_start(
        &self,
        media: &Media,
        torrent_name: &str,
    ) -> Result<(), NotifyError>;

    async fn notify_download_complete(
        &self,
        media: &Media,
        torrent_name: &str,
    ) -> Result<(), NotifyError>;

    async fn notify_post_process_complete(
        &self,
        media: &Media,
        torrent_name: &str,
    ) -> Result<(), NotifyError>;

    async fn notify_not_enough_space(&self, media: &Media, path: &str)
        -> Result<(), NotifyError>;

    async fn notify_download_error(&self, media: &Media, error: &str) -> Result<(), NotifyError>;

    /// Send a test notification to verify settings.
    async fn test(&self) -> Result<(), NotifyError>;
}
