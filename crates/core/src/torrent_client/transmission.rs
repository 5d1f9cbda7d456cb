//! Transmission download client implementation (RPC over HTTP).

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::debug;

use super::{DownloadClient, TorrentClientError, TorrentStatus};

const STATUS_FIELDS: &[&str] = &[
    "hashString",
    "name",
    "percentDone",
    "status",
    "rateDownload",
    "rateUpload",
    "eta",
    "downloadDir",
    "files",
    "uploadRatio",
];

pub struct TransmissionClient {
    client: Client,
    rpc_url: String,
    username: String,
    password: String,
    /// CSRF token handed out via the 409 handshake.
    session_id: RwLock<String>,
}

impl TransmissionClient {
    pub fn new(url: &str, username: &str, password: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client with static settings");

        Self {
            client,
            rpc_url: format!("{}/transmission/rpc", url.trim_end_matches('/')),
            username: username.to_string(),
            password: password.to_string(),
            session_id: RwLock::new(String::new()),
        }
    }

    async fn send(&self, body: &Value) -> Result<reqwest::Response, TorrentClientError> {
        let mut request = self.client.post(&self.rpc_url).json(body);
        if !self.username.is_empty() {
            request = request.basic_auth(&self.username, Some(&self.password));
        }
        let session_id = self.session_id.read().await.clone();
        if !session_id.is_empty() {
            request = request.header("X-Transmission-Session-Id", session_id);
        }
        request.send().await.map_err(request_err)
    }

    /// Execute one RPC call, performing the 409 session handshake when the
    /// token is missing or stale.
    async fn rpc(&self, method: &str, arguments: Value) -> Result<Value, TorrentClientError> {
        let body = json!({ "method": method, "arguments": arguments });

        let mut response = self.send(&body).await?;
        if response.status().as_u16() == 409 {
            let token = response
                .headers()
                .get("X-Transmission-Session-Id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            debug!("Transmission session handshake");
            *self.session_id.write().await = token;
            response = self.send(&body).await?;
        }

        let status = response.status();
        if status.as_u16() == 401 {
            return Err(TorrentClientError::AuthenticationFailed(
                "Invalid credentials".to_string(),
            ));
        }
        if !status.is_success() {
            return Err(TorrentClientError::ApiError(format!("HTTP {}", status)));
        }

        let envelope: RpcResponse = response
            .json()
            .await
            .map_err(|e| TorrentClientError::ApiError(e.to_string()))?;

        if envelope.result != "success" {
            return Err(TorrentClientError::ApiError(envelope.result));
        }
        Ok(envelope.arguments)
    }

    fn added_hash(arguments: &Value) -> Result<String, TorrentClientError> {
        for key in ["torrent-added", "torrent-duplicate"] {
            if let Some(hash) = arguments
                .get(key)
                .and_then(|t| t.get("hashString"))
                .and_then(|h| h.as_str())
            {
                return Ok(hash.to_lowercase());
            }
        }
        Err(TorrentClientError::ApiError(
            "torrent-add response carried no hashString".to_string(),
        ))
    }
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
struct RpcResponse {
    result: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct TransmissionTorrent {
    #[serde(rename = "hashString", default)]
    hash_string: String,
    #[serde(default)]
    name: String,
    #[serde(rename = "percentDone", default)]
    percent_done: f64,
    #[serde(rename = "rateDownload", default)]
    rate_download: i64,
    #[serde(rename = "rateUpload", default)]
    rate_upload: i64,
    #[serde(default)]
    eta: i64,
    #[serde(rename = "downloadDir", default)]
    download_dir: String,
    #[serde(default)]
    files: Vec<TransmissionFile>,
    #[serde(rename = "uploadRatio", default)]
    upload_ratio: f64,
}

#[derive(Debug, Deserialize)]
struct TransmissionFile {
    #[serde(default)]
    name: String,
}

impl From<TransmissionTorrent> for TorrentStatus {
    fn from(t: TransmissionTorrent) -> Self {
        TorrentStatus {
            hash: t.hash_string.to_lowercase(),
            name: t.name,
            progress: t.percent_done,
            is_completed: t.percent_done >= 1.0,
            download_dir: t.download_dir,
            files: t.files.into_iter().map(|f| f.name).collect(),
            download_rate: t.rate_download,
            upload_rate: t.rate_upload,
            eta: t.eta,
            upload_ratio: t.upload_ratio,
        }
    }
}

#[async_trait]
impl DownloadClient for TransmissionClient {
    fn name(&self) -> &str {
        "transmission"
    }

    async fn add_torrent(
        &self,
        magnet_or_url: &str,
        download_path: &str,
    ) -> Result<String, TorrentClientError> {
        let arguments = self
            .rpc(
                "torrent-add",
                json!({ "filename": magnet_or_url, "download-dir": download_path }),
            )
            .await?;
        Self::added_hash(&arguments)
    }

    async fn add_torrent_file(
        &self,
        data: &[u8],
        download_path: &str,
    ) -> Result<String, TorrentClientError> {
        let metainfo = base64::engine::general_purpose::STANDARD.encode(data);
        let arguments = self
            .rpc(
                "torrent-add",
                json!({ "metainfo": metainfo, "download-dir": download_path }),
            )
            .await?;
        Self::added_hash(&arguments)
    }

    async fn add_trackers(
        &self,
        hash: &str,
        trackers: &[String],
    ) -> Result<(), TorrentClientError> {
        self.rpc(
            "torrent-set",
            json!({ "ids": [hash], "trackerAdd": trackers }),
        )
        .await?;
        Ok(())
    }

    async fn get_torrent_status(&self, hash: &str) -> Result<TorrentStatus, TorrentClientError> {
        let arguments = self
            .rpc(
                "torrent-get",
                json!({ "ids": [hash], "fields": STATUS_FIELDS }),
            )
            .await?;

        let torrents: Vec<TransmissionTorrent> =
            serde_json::from_value(arguments.get("torrents").cloned().unwrap_or_else(|| json!([])))
                .map_err(|e| TorrentClientError::ApiError(e.to_string()))?;

        torrents
            .into_iter()
            .next()
            .map(TorrentStatus::from)
            .ok_or_else(|| TorrentClientError::TorrentNotFound(hash.to_string()))
    }

    async fn remove_torrent(&self, hash: &str) -> Result<(), TorrentClientError> {
        self.rpc(
            "torrent-remove",
            json!({ "ids": [hash], "delete-local-data": false }),
        )
        .await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, TorrentClientError> {
        match self.rpc("session-get", json!({})).await {
            Ok(_) => Ok(true),
            Err(TorrentClientError::ConnectionFailed(_)) | Err(TorrentClientError::Timeout) => {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
