//! Concrete client construction from configuration.
//!
//! The manager itself only sees trait objects; this is where config strings
//! turn into backends.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::{Config, SourceKind, TorrentClientBackend};
use crate::indexer::{Indexer, TorznabIndexer};
use crate::library::MediaType;
use crate::metadata::{MetadataClient, TmdbClient, TvmazeClient};
use crate::notify::{Notifier, PushbulletNotifier};
use crate::torrent_client::{DownloadClient, QBittorrentClient, TransmissionClient};

use super::IndexerWithMode;

const MEDIA_TYPES: [MediaType; 3] = [MediaType::Movie, MediaType::TvShow, MediaType::Anime];

pub fn build_download_client(config: &Config) -> Arc<dyn DownloadClient> {
    let tc = &config.torrent_client;
    let timeout = Duration::from_secs(tc.timeout_secs);
    match tc.backend {
        TorrentClientBackend::QBittorrent => Arc::new(QBittorrentClient::new(
            &tc.url,
            &tc.username,
            &tc.password,
            timeout,
        )),
        TorrentClientBackend::Transmission => Arc::new(TransmissionClient::new(
            &tc.url,
            &tc.username,
            &tc.password,
            timeout,
        )),
    }
}

/// Build the per-type indexer lists. RSS sources are handled by the RSS
/// sweep, not by the search path, so they are skipped here.
pub fn build_indexers(config: &Config) -> HashMap<MediaType, Vec<IndexerWithMode>> {
    let timeout = Duration::from_secs(config.app.http_timeout_secs);
    let mut map: HashMap<MediaType, Vec<IndexerWithMode>> = HashMap::new();

    for media_type in MEDIA_TYPES {
        let section = config.media_type_config(media_type);
        for source in &section.sources {
            if source.kind != SourceKind::Torznab {
                continue;
            }
            let indexer: Arc<dyn Indexer> =
                Arc::new(TorznabIndexer::new(&source.url, &source.api_key, timeout));
            map.entry(media_type).or_default().push(IndexerWithMode {
                indexer,
                mode: source.search_mode,
            });
        }
    }

    map
}

pub fn build_metadata_clients(config: &Config) -> HashMap<MediaType, Vec<Arc<dyn MetadataClient>>> {
    let timeout = Duration::from_secs(config.app.http_timeout_secs);

    // TMDB is shared across types so it keeps a single connection pool.
    let tmdb: Arc<dyn MetadataClient> = Arc::new(TmdbClient::new(
        &config.metadata.tmdb.api_key,
        &config.metadata.language,
        timeout,
    ));
    let tvmaze: Arc<dyn MetadataClient> = Arc::new(TvmazeClient::new(timeout));

    let mut map: HashMap<MediaType, Vec<Arc<dyn MetadataClient>>> = HashMap::new();
    for media_type in MEDIA_TYPES {
        let section = config.media_type_config(media_type);
        for provider in &section.providers {
            let client = match provider.as_str() {
                "tmdb" => Arc::clone(&tmdb),
                "tvmaze" => Arc::clone(&tvmaze),
                other => {
                    warn!(provider = other, "Unknown metadata provider, skipping");
                    continue;
                }
            };
            map.entry(media_type).or_default().push(client);
        }
    }

    map
}

pub fn build_notifiers(config: &Config) -> Vec<Arc<dyn Notifier>> {
    let timeout = Duration::from_secs(config.app.http_timeout_secs);
    let mut notifiers: Vec<Arc<dyn Notifier>> = Vec::new();

    for name in &config.automation.notifications {
        match name.as_str() {
            "pushbullet" => {
                if config.notifications.pushbullet.api_key.is_empty() {
                    warn!("Pushbullet notifier enabled but no api_key configured");
                    continue;
                }
                notifiers.push(Arc::new(PushbulletNotifier::new(
                    &config.notifications.pushbullet.api_key,
                    timeout,
                )));
                info!("Pushbullet notifier enabled");
            }
            other => warn!(notifier = other, "Unknown notifier, skipping"),
        }
    }

    notifiers
}
