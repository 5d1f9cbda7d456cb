//! Mock download client for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::magnet;
use crate::torrent_client::{DownloadClient, TorrentClientError, TorrentStatus};

/// One recorded add call.
#[derive(Debug, Clone)]
pub enum RecordedAdd {
    Magnet { uri: String, download_path: String },
    File { size: usize, download_path: String },
}

/// Mock implementation of the `DownloadClient` trait.
///
/// Added torrents start at zero progress; tests drive completion with
/// `set_progress` and inspect adds/removals afterwards.
#[derive(Default)]
pub struct MockDownloadClient {
    added: Arc<RwLock<Vec<RecordedAdd>>>,
    torrents: Arc<RwLock<HashMap<String, TorrentStatus>>>,
    removed: Arc<RwLock<Vec<String>>>,
    trackers: Arc<RwLock<Vec<(String, Vec<String>)>>>,
    fail_adds: AtomicBool,
    fail_status: AtomicBool,
    hash_counter: AtomicU32,
}

impl MockDownloadClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_adds(&self, fail: bool) {
        self.fail_adds.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_status(&self, fail: bool) {
        self.fail_status.store(fail, Ordering::SeqCst);
    }

    pub async fn added(&self) -> Vec<RecordedAdd> {
        self.added.read().await.clone()
    }

    pub async fn removed(&self) -> Vec<String> {
        self.removed.read().await.clone()
    }

    pub async fn trackers_added(&self) -> Vec<(String, Vec<String>)> {
        self.trackers.read().await.clone()
    }

    /// Drive a torrent's progress; 1.0 marks it completed.
    pub async fn set_progress(&self, hash: &str, progress: f64) {
        if let Some(status) = self.torrents.write().await.get_mut(hash) {
            status.progress = progress;
            status.is_completed = progress >= 1.0;
        }
    }

    /// Override the display name the client reports for a torrent.
    pub async fn set_name(&self, hash: &str, name: &str) {
        if let Some(status) = self.torrents.write().await.get_mut(hash) {
            status.name = name.to_string();
        }
    }

    pub async fn set_files(&self, hash: &str, download_dir: &str, files: &[&str]) {
        if let Some(status) = self.torrents.write().await.get_mut(hash) {
            status.download_dir = download_dir.to_string();
            status.files = files.iter().map(|f| f.to_string()).collect();
        }
    }

    pub async fn set_upload_ratio(&self, hash: &str, ratio: f64) {
        if let Some(status) = self.torrents.write().await.get_mut(hash) {
            status.upload_ratio = ratio;
        }
    }

    async fn register(&self, hash: String, name: String) -> String {
        self.torrents.write().await.insert(
            hash.clone(),
            TorrentStatus {
                hash: hash.clone(),
                name,
                ..Default::default()
            },
        );
        hash
    }
}

#[async_trait]
impl DownloadClient for MockDownloadClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn add_torrent(
        &self,
        magnet_or_url: &str,
        download_path: &str,
    ) -> Result<String, TorrentClientError> {
        if self.fail_adds.load(Ordering::SeqCst) {
            return Err(TorrentClientError::ApiError("mock add failure".to_string()));
        }

        self.added.write().await.push(RecordedAdd::Magnet {
            uri: magnet_or_url.to_string(),
            download_path: download_path.to_string(),
        });

        let hash = magnet::parse_info_hash(magnet_or_url).unwrap_or_else(|| {
            format!("mockhash{:04}", self.hash_counter.fetch_add(1, Ordering::SeqCst))
        });
        Ok(self.register(hash, magnet_or_url.to_string()).await)
    }

    async fn add_torrent_file(
        &self,
        data: &[u8],
        download_path: &str,
    ) -> Result<String, TorrentClientError> {
        if self.fail_adds.load(Ordering::SeqCst) {
            return Err(TorrentClientError::ApiError("mock add failure".to_string()));
        }

        self.added.write().await.push(RecordedAdd::File {
            size: data.len(),
            download_path: download_path.to_string(),
        });

        let hash = format!("mockfile{:04}", self.hash_counter.fetch_add(1, Ordering::SeqCst));
        Ok(self.register(hash, "mock.torrent".to_string()).await)
    }

    async fn add_trackers(
        &self,
        hash: &str,
        trackers: &[String],
    ) -> Result<(), TorrentClientError> {
        self.trackers
            .write()
            .await
            .push((hash.to_string(), trackers.to_vec()));
        Ok(())
    }

    async fn get_torrent_status(&self, hash: &str) -> Result<TorrentStatus, TorrentClientError> {
        if self.fail_status.load(Ordering::SeqCst) {
            return Err(TorrentClientError::ApiError(
                "mock status failure".to_string(),
            ));
        }
        self.torrents
            .read()
            .await
            .get(hash)
            .cloned()
            .ok_or_else(|| TorrentClientError::TorrentNotFound(hash.to_string()))
    }

    async fn remove_torrent(&self, hash: &str) -> Result<(), TorrentClientError> {
        self.torrents.write().await.remove(hash);
        self.removed.write().await.push(hash.to_string());
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, TorrentClientError> {
        Ok(true)
    }
}
