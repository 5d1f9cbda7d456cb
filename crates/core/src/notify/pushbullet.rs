//! Pushbullet notifier.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

use crate::library::Media;

use super::{Notifier, NotifyError};

const PUSH_URL: &str = "https://api.pushbullet.com/v2/pushes";

pub struct PushbulletNotifier {
    client: Client,
    api_key: String,
}

impl PushbulletNotifier {
    pub fn new(api_key: &str, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .expect("reqwest client with static settings"),
            api_key: api_key.to_string(),
        }
    }

    async fn push(&self, title: &str, body: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(PUSH_URL)
            .header("Access-Token", &self.api_key)
            .json(&json!({ "type": "note", "title": title, "body": body }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NotifyError::Timeout
                } else if e.is_connect() {
                    NotifyError::ConnectionFailed(e.to_string())
                } else {
                    NotifyError::ApiError(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(NotifyError::ApiError(format!(
                "HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for PushbulletNotifier {
    fn name(&self) -> &str {
        "pushbullet"
    }

    async fn notify_download_start(
        &self,
        media: &Media,
        torrent_name: &str,
    ) -> Result<(), NotifyError> {
        self.push(
            "Reel: download started",
            &format!("{} ({})\n{}", media.title, media.year, torrent_name),
        )
        .await
    }

    async fn notify_download_complete(
        &self,
        media: &Media,
        torrent_name: &str,
    ) -> Result<(), NotifyError> {
        self.push(
            "Reel: download complete",
            &format!("{} ({})\n{}", media.title, media.year, torrent_name),
        )
        .await
    }

    async fn notify_post_process_complete(
        &self,
        media: &Media,
        torrent_name: &str,
    ) -> Result<(), NotifyError> {
        self.push(
            "Reel: ready to watch",
            &format!("{} ({})\n{}", media.title, media.year, torrent_name),
        )
        .await
    }

    async fn notify_not_enough_space(
        &self,
        media: &Media,
        path: &str,
    ) -> Result<(), NotifyError> {
        self.push(
            "Reel: not enough space",
            &format!("{} ({})\nDestination: {}", media.title, media.year, path),
        )
        .await
    }

    async fn notify_download_error(&self, media: &Media, error: &str) -> Result<(), NotifyError> {
        self.push(
            "Reel: download error",
            &format!("{} ({})\n{}", media.title, media.year, error),
        )
        .await
    }

    async fn test(&self) -> Result<(), NotifyError> {
        self.push("Reel: test notification", "Notifications are working.")
            .await
    }
}
