//! Types for download client operations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during download client operations.
#[derive(Debug, Error)]
pub enum TorrentClientError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Torrent not found: {0}")]
    TorrentNotFound(String),

    #[error("Invalid torrent data: {0}")]
    InvalidTorrent(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Request timeout")]
    Timeout,
}

/// Snapshot of one torrent in the download client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TorrentStatus {
    /// Info hash (lowercase hex).
    pub hash: String,
    pub name: String,
    /// Download progress (0.0 - 1.0).
    pub progress: f64,
    /// File paths relative to `download_dir`.
    pub files: Vec<String>,
    pub download_dir: String,
    pub is_completed: bool,
    /// Current download speed in bytes/second.
    pub download_rate: i64,
    /// Current upload speed in bytes/second.
    pub upload_rate: i64,
    /// ETA in seconds (negative when unknown).
    pub eta: i64,
    /// Uploaded/downloaded ratio, used by the retention cleanup.
    pub upload_ratio: f64,
}

/// Trait for download client backends.
///
/// `add_torrent` takes either a magnet URI or a direct .torrent URL; the
/// returned string is the info-hash handle used by every other operation.
#[async_trait]
pub trait DownloadClient: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    async fn add_torrent(
        &self,
        magnet_or_url: &str,
        download_path: &str,
    ) -> Result<String, TorrentClientError>;

    async fn add_torrent_file(
        &self,
        data: &[u8],
        download_path: &str,
    ) -> Result<String, TorrentClientError>;

    async fn add_trackers(
        &self,
        hash: &str,
        trackers: &[String],
    ) -> Result<(), TorrentClientError>;

    async fn get_torrent_status(&self, hash: &str) -> Result<TorrentStatus, TorrentClientError>;

    async fn remove_torrent(&self, hash: &str) -> Result<(), TorrentClientError>;

    async fn health_check(&self) -> Result<bool, TorrentClientError>;
}
