//! Subtitle provider abstraction and the SubDB implementation.

use async_trait::async_trait;
use reqwest::Client;
use std::io::SeekFrom;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

#[derive(Debug, Error)]
pub enum SubtitleError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Request timeout")]
    Timeout,
}

/// Fetches subtitles for a local video file.
///
/// An empty byte vector means "no subtitles available", which is not an
/// error.
#[async_trait]
pub trait SubtitleProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self, video_path: &Path, language: &str)
        -> Result<Vec<u8>, SubtitleError>;
}

const SUBDB_URL: &str = "http://api.thesubdb.com/";
const HASH_CHUNK: usize = 64 * 1024;

/// SubDB provider. Lookups are keyed by a hash of the video content (MD5 of
/// the first and last 64 KiB), so renames do not affect matching.
pub struct SubDbProvider {
    client: Client,
}

impl SubDbProvider {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .user_agent("SubDB/1.0 (reel/0.3; https://github.com/pixelotes/reel)")
                .build()
                .expect("reqwest client with static settings"),
        }
    }

    async fn content_hash(video_path: &Path) -> Result<String, SubtitleError> {
        let mut file = tokio::fs::File::open(video_path).await?;
        let len = file.metadata().await?.len();

        let mut head = vec![0u8; HASH_CHUNK.min(len as usize)];
        file.read_exact(&mut head).await?;

        let mut tail = vec![0u8; HASH_CHUNK.min(len as usize)];
        let tail_start = len.saturating_sub(tail.len() as u64);
        file.seek(SeekFrom::Start(tail_start)).await?;
        file.read_exact(&mut tail).await?;

        let mut context = md5::Context::new();
        context.consume(&head);
        context.consume(&tail);
        Ok(format!("{:x}", context.compute()))
    }
}

#[async_trait]
impl SubtitleProvider for SubDbProvider {
    fn name(&self) -> &str {
        "subdb"
    }

    async fn fetch(
        &self,
        video_path: &Path,
        language: &str,
    ) -> Result<Vec<u8>, SubtitleError> {
        let hash = Self::content_hash(video_path).await?;
        let url = format!(
            "{}?action=download&hash={}&language={}",
            SUBDB_URL,
            hash,
            urlencoding::encode(language)
        );

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                SubtitleError::Timeout
            } else if e.is_connect() {
                SubtitleError::ConnectionFailed(e.to_string())
            } else {
                SubtitleError::ApiError(e.to_string())
            }
        })?;

        // 404 means no subtitle in this language.
        if response.status().as_u16() == 404 {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(SubtitleError::ApiError(format!(
                "HTTP {}",
                response.status()
            )));
        }

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| SubtitleError::ApiError(e.to_string()))
    }
}
