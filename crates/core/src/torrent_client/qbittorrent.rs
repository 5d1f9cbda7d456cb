//! qBittorrent download client implementation (Web API v2).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{multipart, Client};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::magnet;

use super::{DownloadClient, TorrentClientError, TorrentStatus};

pub struct QBittorrentClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
    /// Tracks whether the cookie jar holds a live session; refreshed on 403.
    session: Arc<RwLock<bool>>,
}

impl QBittorrentClient {
    pub fn new(url: &str, username: &str, password: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .cookie_store(true)
            .build()
            .expect("reqwest client with static settings");

        Self {
            client,
            base_url: url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
            session: Arc::new(RwLock::new(false)),
        }
    }

    async fn login(&self) -> Result<(), TorrentClientError> {
        let url = format!("{}/api/v2/auth/login", self.base_url);
        let params = [
            ("username", self.username.as_str()),
            ("password", self.password.as_str()),
        ];

        let response = self
            .client
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(request_err)?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if body.contains("Ok.") {
            debug!("qBittorrent login successful");
            *self.session.write().await = true;
            Ok(())
        } else if body.contains("Fails.") || status.as_u16() == 403 {
            Err(TorrentClientError::AuthenticationFailed(
                "Invalid credentials".to_string(),
            ))
        } else {
            Err(TorrentClientError::AuthenticationFailed(format!(
                "Unexpected response: {}",
                body.chars().take(100).collect::<String>()
            )))
        }
    }

    async fn ensure_authenticated(&self) -> Result<(), TorrentClientError> {
        if *self.session.read().await {
            return Ok(());
        }
        self.login().await
    }

    /// Authenticated GET, re-logging in once on session expiry.
    async fn get(&self, endpoint: &str) -> Result<String, TorrentClientError> {
        self.ensure_authenticated().await?;
        let url = format!("{}{}", self.base_url, endpoint);

        let response = self.client.get(&url).send().await.map_err(request_err)?;
        if response.status().as_u16() == 403 {
            warn!("qBittorrent session expired, re-authenticating");
            *self.session.write().await = false;
            self.login().await?;
            let response = self.client.get(&url).send().await.map_err(request_err)?;
            return read_success(response).await;
        }
        read_success(response).await
    }

    /// Authenticated POST with form data, re-logging in once on expiry.
    async fn post_form(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<String, TorrentClientError> {
        self.ensure_authenticated().await?;
        let url = format!("{}{}", self.base_url, endpoint);

        let response = self
            .client
            .post(&url)
            .form(params)
            .send()
            .await
            .map_err(request_err)?;
        if response.status().as_u16() == 403 {
            warn!("qBittorrent session expired, re-authenticating");
            *self.session.write().await = false;
            self.login().await?;
            let response = self
                .client
                .post(&url)
                .form(params)
                .send()
                .await
                .map_err(request_err)?;
            return read_success(response).await;
        }
        read_success(response).await
    }
}

async fn read_success(response: reqwest::Response) -> Result<String, TorrentClientError> {
    let status = response.status();
    if status.as_u16() == 404 {
        return Err(TorrentClientError::TorrentNotFound(status.to_string()));
    }
    if !status.is_success() {
        return Err(TorrentClientError::ApiError(format!("HTTP {}", status)));
    }
    response
        .text()
        .await
        .map_err(|e| TorrentClientError::ApiError(e.to_string()))
}

fn request_err(e: reqwest::Error) -> TorrentClientError {
    if e.is_timeout() {
        TorrentClientError::Timeout
    } else if e.is_connect() {
        TorrentClientError::ConnectionFailed(e.to_string())
    } else {
        TorrentClientError::ApiError(e.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct QbProperties {
    #[serde(default)]
    name: String,
    #[serde(default)]
    progress: f64,
    #[serde(default)]
    ratio: f64,
    #[serde(default)]
    save_path: String,
    #[serde(default)]
    dl_speed: i64,
    #[serde(default)]
    up_speed: i64,
    #[serde(default)]
    eta: i64,
}

#[derive(Debug, Deserialize)]
struct QbFile {
    name: String,
}

#[derive(Debug, Deserialize)]
struct QbTorrentInfo {
    hash: String,
}

#[async_trait]
impl DownloadClient for QBittorrentClient {
    fn name(&self) -> &str {
        "qbittorrent"
    }

    async fn add_torrent(
        &self,
        magnet_or_url: &str,
        download_path: &str,
    ) -> Result<String, TorrentClientError> {
        self.post_form(
            "/api/v2/torrents/add",
            &[("urls", magnet_or_url), ("savepath", download_path)],
        )
        .await?;

        // The add endpoint does not echo the hash back; for magnets the
        // btih in the link itself is the reliable handle.
        magnet::parse_info_hash(magnet_or_url).ok_or_else(|| {
            TorrentClientError::InvalidTorrent(
                "info hash (btih) not found in magnet link".to_string(),
            )
        })
    }

    async fn add_torrent_file(
        &self,
        data: &[u8],
        download_path: &str,
    ) -> Result<String, TorrentClientError> {
        self.ensure_authenticated().await?;

        // Tag the add so the new torrent can be found afterwards; the add
        // endpoint returns no identifier.
        let temp_tag = format!("reel-temp-{}", uuid::Uuid::new_v4());

        let form = multipart::Form::new()
            .part(
                "torrents",
                multipart::Part::bytes(data.to_vec()).file_name("file.torrent"),
            )
            .text("savepath", download_path.to_string())
            .text("tags", temp_tag.clone());

        let url = format!("{}/api/v2/torrents/add", self.base_url);
        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(request_err)?;
        read_success(response).await?;

        let body = self
            .get(&format!(
                "/api/v2/torrents/info?filter=all&tag={}",
                urlencoding::encode(&temp_tag)
            ))
            .await?;
        let torrents: Vec<QbTorrentInfo> = serde_json::from_str(&body)
            .map_err(|e| TorrentClientError::ApiError(format!("failed to find torrent by tag: {}", e)))?;

        let Some(first) = torrents.first() else {
            return Err(TorrentClientError::ApiError(
                "could not find added torrent by temporary tag".to_string(),
            ));
        };
        let hash = first.hash.to_lowercase();

        // Tag cleanup is best-effort.
        if let Err(e) = self
            .post_form(
                "/api/v2/torrents/removeTags",
                &[("hashes", hash.as_str()), ("tags", temp_tag.as_str())],
            )
            .await
        {
            warn!("Failed to remove temporary tag: {}", e);
        }

        Ok(hash)
    }

    async fn add_trackers(
        &self,
        hash: &str,
        trackers: &[String],
    ) -> Result<(), TorrentClientError> {
        let urls = trackers.join("\n");
        self.post_form(
            "/api/v2/torrents/addTrackers",
            &[("hash", hash), ("urls", urls.as_str())],
        )
        .await?;
        Ok(())
    }

    async fn get_torrent_status(&self, hash: &str) -> Result<TorrentStatus, TorrentClientError> {
        let body = self
            .get(&format!("/api/v2/torrents/properties?hash={}", hash))
            .await?;
        let props: QbProperties = serde_json::from_str(&body)
            .map_err(|e| TorrentClientError::ApiError(format!("failed to decode properties: {}", e)))?;

        let body = self
            .get(&format!("/api/v2/torrents/files?hash={}", hash))
            .await?;
        let files: Vec<QbFile> = serde_json::from_str(&body)
            .map_err(|e| TorrentClientError::ApiError(format!("failed to decode files: {}", e)))?;

        Ok(TorrentStatus {
            hash: hash.to_lowercase(),
            name: props.name,
            progress: props.progress,
            is_completed: props.progress >= 1.0,
            download_dir: props.save_path,
            files: files.into_iter().map(|f| f.name).collect(),
            download_rate: props.dl_speed,
            upload_rate: props.up_speed,
            eta: props.eta,
            upload_ratio: props.ratio,
        })
    }

    async fn remove_torrent(&self, hash: &str) -> Result<(), TorrentClientError> {
        self.post_form(
            "/api/v2/torrents/delete",
            &[("hashes", hash), ("deleteFiles", "false")],
        )
        .await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, TorrentClientError> {
        match self.get("/api/v2/app/version").await {
            Ok(_) => Ok(true),
            Err(TorrentClientError::ConnectionFailed(_)) | Err(TorrentClientError::Timeout) => {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
