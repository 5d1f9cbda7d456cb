//! Composition root of the acquisition core.
//!
//! The manager owns the state machine: it wires the library, the selector,
//! and the external clients together, and every status transition passes
//! through here. Periodic work is driven by the scheduler tasks in
//! [`scheduler`], serialised acquisition by the search queue worker.

mod factory;
mod scheduler;

pub use factory::{
    build_download_client, build_indexers, build_metadata_clients, build_notifiers,
};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{error, info, warn};

use crate::config::{Config, SourceKind};
use crate::indexer::{Indexer, Release, RssIndexer, SearchMode};
use crate::library::{Episode, Library, LibraryError, Media, MediaStatus, MediaType, TvShow};
use crate::magnet::MagnetConverter;
use crate::metadata::{MetadataClient, TvShowResult};
use crate::notify::Notifier;
use crate::post_process::PostProcessor;
use crate::selector::TorrentSelector;
use crate::subtitles::SubtitleProvider;
use crate::torrent_client::{DownloadClient, TorrentClientError, TorrentStatus};

const SEARCH_QUEUE_CAPACITY: usize = 100;
/// Cool-down between queue items.
const QUEUE_ITEM_DELAY: Duration = Duration::from_secs(30);
/// Politeness delay between distinct search terms and episode starts.
const SEARCH_TERM_DELAY: Duration = Duration::from_secs(5);
/// Grace period before extra trackers are injected into a fresh torrent.
const EXTRA_TRACKERS_DELAY: Duration = Duration::from_secs(10);
/// Pause between RSS-triggered downloads.
const RSS_MATCH_DELAY: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("media {0} not found")]
    MediaNotFound(i64),

    #[error("media {0} is not a tv show or anime")]
    NotASeries(i64),

    #[error("no metadata provider configured for '{0}'")]
    NoMetadataProvider(String),

    #[error(transparent)]
    Library(#[from] LibraryError),

    #[error("download client error: {0}")]
    DownloadClient(#[from] TorrentClientError),

    #[error("metadata error: {0}")]
    Metadata(#[from] crate::metadata::MetadataError),
}

/// Results of a free metadata lookup, shaped by the media type.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(untagged)]
pub enum MetadataSearchResults {
    Movies(Vec<crate::metadata::MovieResult>),
    Shows(Vec<TvShowResult>),
}

/// An indexer together with its configured query-construction mode.
#[derive(Clone)]
pub struct IndexerWithMode {
    pub indexer: Arc<dyn Indexer>,
    pub mode: SearchMode,
}

/// Health snapshot of one external client.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ClientStatus {
    pub kind: String,
    pub name: String,
    pub healthy: bool,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SystemStatus {
    pub torrent_client: ClientStatus,
    pub indexers: Vec<ClientStatus>,
    pub metadata_providers: Vec<String>,
}

/// Parameters for [`Manager::add_media`].
#[derive(Debug, Clone)]
pub struct AddMediaRequest {
    pub media_type: MediaType,
    pub title: String,
    pub year: i32,
    pub language: String,
    pub min_quality: String,
    pub max_quality: String,
    pub auto_download: bool,
    /// Episodes before this point are created as `skipped`.
    pub start_season: u32,
    pub start_episode: u32,
}

pub struct Manager {
    config: Config,
    library: Arc<dyn Library>,
    indexers: HashMap<MediaType, Vec<IndexerWithMode>>,
    metadata: HashMap<MediaType, Vec<Arc<dyn MetadataClient>>>,
    download_client: Arc<dyn DownloadClient>,
    selector: TorrentSelector,
    notifiers: Vec<Arc<dyn Notifier>>,
    post_processor: Arc<PostProcessor>,
    magnet_converter: Option<Arc<dyn MagnetConverter>>,
    queue_tx: mpsc::Sender<Media>,
    queue_rx: Mutex<Option<mpsc::Receiver<Media>>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Manager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        library: Arc<dyn Library>,
        download_client: Arc<dyn DownloadClient>,
        indexers: HashMap<MediaType, Vec<IndexerWithMode>>,
        metadata: HashMap<MediaType, Vec<Arc<dyn MetadataClient>>>,
        notifiers: Vec<Arc<dyn Notifier>>,
        subtitles: Option<Arc<dyn SubtitleProvider>>,
        magnet_converter: Option<Arc<dyn MagnetConverter>>,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(SEARCH_QUEUE_CAPACITY);
        let (shutdown_tx, _) = broadcast::channel(1);

        let selector = TorrentSelector::new(&config);
        let post_processor = Arc::new(PostProcessor::new(
            config.clone(),
            notifiers.clone(),
            subtitles,
        ));

        Self {
            config,
            library,
            indexers,
            metadata,
            download_client,
            selector,
            notifiers,
            post_processor,
            magnet_converter,
            queue_tx,
            queue_rx: Mutex::new(Some(queue_rx)),
            shutdown_tx,
        }
    }

    // ------------------------------------------------------------------
    // Library pass-throughs and manual operations
    // ------------------------------------------------------------------

    pub fn get_all_media(&self) -> Result<Vec<Media>, ManagerError> {
        Ok(self.library.get_all()?)
    }

    pub fn get_media(&self, id: i64) -> Result<Option<Media>, ManagerError> {
        Ok(self.library.get_by_id(id)?)
    }

    pub fn get_tv_show_details(&self, media_id: i64) -> Result<Option<TvShow>, ManagerError> {
        Ok(self.library.get_tv_show_by_media_id(media_id)?)
    }

    pub fn delete_media(&self, id: i64) -> Result<(), ManagerError> {
        Ok(self.library.delete(id)?)
    }

    pub fn update_media_settings(
        &self,
        id: i64,
        min_quality: &str,
        max_quality: &str,
        auto_download: bool,
    ) -> Result<(), ManagerError> {
        info!(
            id,
            min_quality, max_quality, auto_download, "Updating media settings"
        );
        Ok(self
            .library
            .update_settings(id, min_quality, max_quality, auto_download)?)
    }

    pub fn get_anime_search_terms(
        &self,
        media_id: i64,
    ) -> Result<Vec<crate::library::AnimeSearchTerm>, ManagerError> {
        Ok(self.library.get_anime_search_terms(media_id)?)
    }

    pub fn add_anime_search_term(
        &self,
        media_id: i64,
        term: &str,
    ) -> Result<crate::library::AnimeSearchTerm, ManagerError> {
        Ok(self.library.add_anime_search_term(media_id, term)?)
    }

    pub fn delete_anime_search_term(&self, id: i64) -> Result<(), ManagerError> {
        Ok(self.library.delete_anime_search_term(id)?)
    }

    /// Re-queue a pending or failed entry on user request.
    pub async fn retry_media(&self, id: i64) -> Result<(), ManagerError> {
        let media = self
            .library
            .get_by_id(id)?
            .ok_or(ManagerError::MediaNotFound(id))?;

        if media.status == MediaStatus::Failed || media.status == MediaStatus::Pending {
            self.library.update_status(media.id, MediaStatus::Pending)?;
            self.enqueue(media);
        }
        Ok(())
    }

    /// Drop every failed entry from the library.
    pub fn clear_failed_media(&self) -> Result<(), ManagerError> {
        for media in self.library.get_by_status(MediaStatus::Failed)? {
            if let Err(e) = self.library.delete(media.id) {
                error!(id = media.id, "Failed to delete media: {}", e);
            }
        }
        Ok(())
    }

    /// Manual search over all indexers, returning the filtered and scored
    /// candidate list instead of starting a download.
    pub async fn perform_manual_search(&self, id: i64) -> Result<Vec<Release>, ManagerError> {
        let media = self
            .library
            .get_by_id(id)?
            .ok_or(ManagerError::MediaNotFound(id))?;

        let results = self.perform_search(&media, 0, 0).await;
        let terms = self.search_terms(&media);
        let (filtered, _) = self.selector.filter_and_score(&media, results, 0, 0, &terms);
        Ok(filtered)
    }

    /// Manual search for one specific episode.
    pub async fn perform_episode_search(
        &self,
        media_id: i64,
        season: u32,
        episode: u32,
    ) -> Result<Vec<Release>, ManagerError> {
        let media = self
            .library
            .get_by_id(media_id)?
            .ok_or(ManagerError::MediaNotFound(media_id))?;
        if !media.media_type.is_series() {
            return Err(ManagerError::NotASeries(media_id));
        }

        let results = self.perform_search(&media, season, episode).await;
        let terms = self.search_terms(&media);
        let (filtered, _) = self
            .selector
            .filter_and_score(&media, results, season, episode, &terms);
        Ok(filtered)
    }

    /// Free metadata lookup for the add-media flow.
    pub async fn search_metadata(
        &self,
        query: &str,
        media_type: MediaType,
    ) -> Result<MetadataSearchResults, ManagerError> {
        let provider = self
            .metadata
            .get(&media_type)
            .and_then(|p| p.first())
            .ok_or_else(|| {
                ManagerError::NoMetadataProvider(media_type.as_str().to_string())
            })?;

        if media_type == MediaType::Movie {
            let movies = provider.search_movie(query, 0).await?;
            Ok(MetadataSearchResults::Movies(movies))
        } else {
            let shows = provider.search_tv_show(query).await?;
            Ok(MetadataSearchResults::Shows(shows))
        }
    }

    pub async fn system_status(&self) -> SystemStatus {
        let torrent_healthy = self
            .download_client
            .health_check()
            .await
            .unwrap_or(false);

        let mut indexers = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for entries in self.indexers.values() {
            for entry in entries {
                if !seen.insert(entry.indexer.name().to_string()) {
                    continue;
                }
                let healthy = entry.indexer.health_check().await.unwrap_or(false);
                indexers.push(ClientStatus {
                    kind: "indexer".to_string(),
                    name: entry.indexer.name().to_string(),
                    healthy,
                });
            }
        }

        let mut metadata_providers: Vec<String> = self
            .metadata
            .values()
            .flatten()
            .map(|c| c.name().to_string())
            .collect();
        metadata_providers.sort();
        metadata_providers.dedup();

        SystemStatus {
            torrent_client: ClientStatus {
                kind: "torrent_client".to_string(),
                name: self.download_client.name().to_string(),
                healthy: torrent_healthy,
            },
            indexers,
            metadata_providers,
        }
    }

    pub async fn test_torrent_connection(&self) -> Result<bool, ManagerError> {
        Ok(self.download_client.health_check().await?)
    }

    // ------------------------------------------------------------------
    // AddMedia
    // ------------------------------------------------------------------

    /// Create a library entry, pulling metadata and (for shows) the full
    /// season/episode skeleton from the first configured provider.
    pub async fn add_media(&self, request: AddMediaRequest) -> Result<Media, ManagerError> {
        let mut media = Media::new(request.media_type, request.title, request.year);
        media.language = request.language;
        media.min_quality = request.min_quality;
        media.max_quality = request.max_quality;
        media.auto_download = request.auto_download;

        let provider = self
            .metadata
            .get(&request.media_type)
            .and_then(|p| p.first());

        if let Some(provider) = provider {
            if request.media_type == MediaType::Movie {
                match provider.search_movie(&media.title, media.year).await {
                    Ok(results) => {
                        if let Some(movie) = results.first() {
                            media.tmdb_id = movie.id.parse().ok();
                            media.overview = Some(movie.overview.clone());
                            media.poster_url = Some(movie.poster_url.clone());
                            media.rating = Some(movie.rating);
                            if media.title.is_empty() {
                                media.title = movie.title.clone();
                            }
                            if media.year == 0 {
                                media.year = movie.year;
                            }
                        }
                    }
                    Err(e) => error!("Movie metadata search failed: {}", e),
                }
            } else {
                match provider.search_tv_show(&media.title).await {
                    Ok(results) => {
                        if let Some(show) = results.first() {
                            media.overview = Some(show.overview.clone());
                            media.poster_url = Some(show.poster_url.clone());
                            media.rating = Some(show.rating);
                            if media.title.is_empty() {
                                media.title = show.title.clone();
                            }
                            if media.year == 0 {
                                media.year = show.year;
                            }
                            let show_id = self.create_show_skeleton(
                                show,
                                request.start_season,
                                request.start_episode,
                            )?;
                            media.tv_show_id = Some(show_id);
                        }
                    }
                    Err(e) => error!("TV show metadata search failed: {}", e),
                }
            }
        }

        let id = self.library.create(&media)?;
        media.id = id;
        info!(id, title = %media.title, "Media added to library");

        if media.auto_download {
            self.enqueue(media.clone());
        }

        Ok(media)
    }

    fn create_show_skeleton(
        &self,
        show: &TvShowResult,
        start_season: u32,
        start_episode: u32,
    ) -> Result<i64, ManagerError> {
        let show_id = self.library.create_tv_show(&show.status, &show.id)?;

        for (&season_number, episodes) in &show.seasons {
            let season_id = self.library.create_season(show_id, season_number)?;
            for episode in episodes {
                let mut status = MediaStatus::Pending;
                if let Some(air_date) = &episode.air_date {
                    if is_future_date(air_date) {
                        status = MediaStatus::Tba;
                    }
                }
                if season_number < start_season
                    || (season_number == start_season && episode.number < start_episode)
                {
                    status = MediaStatus::Skipped;
                }
                self.library.create_episode(&Episode {
                    id: 0,
                    season_id,
                    episode_number: episode.number,
                    title: episode.title.clone(),
                    air_date: episode.air_date.clone(),
                    status,
                })?;
            }
        }

        Ok(show_id)
    }

    // ------------------------------------------------------------------
    // Search queue
    // ------------------------------------------------------------------

    /// Non-blocking enqueue; a full queue drops the item with a warning and
    /// the next scheduler sweep re-evaluates it.
    pub fn enqueue(&self, media: Media) {
        if let Err(e) = self.queue_tx.try_send(media) {
            warn!("Search queue is full, dropping enqueue: {}", e);
        }
    }

    // ------------------------------------------------------------------
    // Acquisition
    // ------------------------------------------------------------------

    pub async fn search_and_download_movie(&self, media: &Media) {
        info!(title = %media.title, "Starting automatic search for movie");
        if let Err(e) = self.library.update_status(media.id, MediaStatus::Searching) {
            error!("Failed to mark media as searching: {}", e);
            return;
        }

        let results = self.perform_search(media, 0, 0).await;
        let terms = self.search_terms(media);

        let Some(best) = self.selector.select_best(media, results, 0, 0, &terms) else {
            info!(title = %media.title, "No suitable torrent found");
            let _ = self.library.update_status(media.id, MediaStatus::Failed);
            return;
        };

        if let Err(e) = self.start_download(media.id, &best).await {
            error!(title = %media.title, "Failed to start download: {}", e);
        }
    }

    pub async fn search_and_download_next_episode(&self, media: &Media) {
        let show = match self.library.get_tv_show_by_media_id(media.id) {
            Ok(Some(show)) => show,
            Ok(None) => return,
            Err(e) => {
                error!(title = %media.title, "Could not get TV show details: {}", e);
                return;
            }
        };

        // One torrent handle per media entry, so never start an episode
        // while another is still in flight.
        if has_downloading_episode(&show) {
            info!(title = %media.title, "An episode is already downloading, skipping");
            return;
        }

        let terms = self.search_terms(media);
        let mut downloads_started = 0usize;

        'seasons: for season in &show.seasons {
            for episode in &season.episodes {
                if downloads_started >= self.config.automation.max_concurrent_downloads {
                    break 'seasons;
                }
                if episode.status != MediaStatus::Pending {
                    continue;
                }

                info!(
                    title = %media.title,
                    episode = %format!("S{:02}E{:02}", season.season_number, episode.episode_number),
                    "Searching for episode"
                );
                let results = self
                    .perform_search(media, season.season_number, episode.episode_number)
                    .await;

                let Some(best) = self.selector.select_best(
                    media,
                    results,
                    season.season_number,
                    episode.episode_number,
                    &terms,
                ) else {
                    continue;
                };

                match self
                    .start_episode_download(
                        media.id,
                        season.season_number,
                        episode.episode_number,
                        &best,
                    )
                    .await
                {
                    Ok(()) => {
                        downloads_started += 1;
                        // The handle is taken; further episodes wait for the
                        // next sweep.
                        break 'seasons;
                    }
                    Err(e) => {
                        error!("Failed to start episode download: {}", e);
                        tokio::time::sleep(SEARCH_TERM_DELAY).await;
                    }
                }
            }
        }

        if downloads_started == 0 {
            info!(title = %media.title, "No pending episodes to download");
        }
    }

    fn search_terms(&self, media: &Media) -> Vec<String> {
        let mut terms = vec![media.title.clone()];
        if media.media_type == MediaType::Anime {
            if let Ok(extra) = self.library.get_anime_search_terms(media.id) {
                terms.extend(extra.into_iter().map(|t| t.term));
            }
        }
        terms
    }

    /// Query every configured indexer for every search term, sequentially,
    /// with a politeness delay between terms. Indexer failures are logged
    /// and skipped.
    async fn perform_search(&self, media: &Media, season: u32, episode: u32) -> Vec<Release> {
        let Some(clients) = self.indexers.get(&media.media_type) else {
            warn!(media_type = ?media.media_type, "No search-based indexers configured");
            return Vec::new();
        };
        if clients.is_empty() {
            warn!(media_type = ?media.media_type, "No search-based indexers configured");
            return Vec::new();
        }

        let terms = self.search_terms(media);
        let tmdb_id = media.tmdb_id.map(|id| id.to_string()).unwrap_or_default();
        let mut all_results = Vec::new();

        for term in &terms {
            for entry in clients {
                let result = if media.media_type.is_series() {
                    let query = if entry.mode == SearchMode::Search && season > 0 && episode > 0 {
                        format!("{} S{:02}E{:02}", term, season, episode)
                    } else {
                        term.clone()
                    };
                    let mut results = match entry
                        .indexer
                        .search_tv_shows(&query, season, episode, entry.mode)
                        .await
                    {
                        Ok(r) => r,
                        Err(e) => {
                            error!(indexer = entry.indexer.name(), "Search failed: {}", e);
                            continue;
                        }
                    };

                    // Some free-text indexers only know the NxNN convention.
                    if results.is_empty()
                        && entry.mode == SearchMode::Search
                        && season > 0
                        && episode > 0
                    {
                        let fallback = format!("{} {}x{:02}", term, season, episode);
                        match entry
                            .indexer
                            .search_tv_shows(&fallback, season, episode, entry.mode)
                            .await
                        {
                            Ok(mut extra) => results.append(&mut extra),
                            Err(e) => {
                                error!(indexer = entry.indexer.name(), "Search failed: {}", e)
                            }
                        }
                    }
                    results
                } else {
                    let query = if media.year > 0 {
                        format!("{} {}", term, media.year)
                    } else {
                        term.clone()
                    };
                    match entry
                        .indexer
                        .search_movies(&query, &tmdb_id, entry.mode)
                        .await
                    {
                        Ok(r) => r,
                        Err(e) => {
                            error!(indexer = entry.indexer.name(), "Search failed: {}", e);
                            continue;
                        }
                    }
                };

                all_results.extend(result);
            }
            tokio::time::sleep(SEARCH_TERM_DELAY).await;
        }

        info!(
            count = all_results.len(),
            title = %media.title,
            "Search finished"
        );
        all_results
    }

    // ------------------------------------------------------------------
    // Starting downloads
    // ------------------------------------------------------------------

    fn download_folder(&self, media_type: MediaType) -> String {
        let folder = &self.config.media_type_config(media_type).download_folder;
        if folder.is_empty() {
            self.config.torrent_client.download_path.clone()
        } else {
            folder.clone()
        }
    }

    /// Hand a release to the download client, converting magnets to
    /// .torrent blobs when enabled and falling back to the raw magnet.
    async fn add_to_client(
        &self,
        media_type: MediaType,
        release: &Release,
    ) -> Result<String, TorrentClientError> {
        let download_path = self.download_folder(media_type);

        let is_magnet = release.download_url.starts_with("magnet:");
        if self.config.app.magnet_to_torrent_enabled && is_magnet {
            if let Some(converter) = &self.magnet_converter {
                let timeout_secs = self.config.app.magnet_to_torrent_timeout_secs;
                let timeout = Duration::from_secs(if timeout_secs == 0 { 60 } else { timeout_secs });

                info!(timeout_secs, "Attempting to convert magnet to .torrent");
                match converter.fetch_metainfo(&release.download_url, timeout).await {
                    Ok(bytes) => {
                        info!("Magnet conversion successful, adding as .torrent file");
                        return self
                            .download_client
                            .add_torrent_file(&bytes, &download_path)
                            .await;
                    }
                    Err(e) => {
                        warn!("Magnet conversion failed: {} - falling back to magnet link", e);
                    }
                }
            }
        }

        self.download_client
            .add_torrent(&release.download_url, &download_path)
            .await
    }

    /// Start a movie download and record its torrent handle.
    pub async fn start_download(&self, id: i64, release: &Release) -> Result<(), ManagerError> {
        let media = self
            .library
            .get_by_id(id)?
            .ok_or(ManagerError::MediaNotFound(id))?;

        let hash = match self.add_to_client(media.media_type, release).await {
            Ok(hash) => hash,
            Err(e) => {
                error!("Failed to add torrent to client: {}", e);
                let _ = self.library.update_status(id, MediaStatus::Failed);
                return Err(e.into());
            }
        };

        self.schedule_extra_trackers(&hash);
        self.notify_download_started(&media, &release.title);
        info!(hash = %hash, "Torrent sent to download client");

        self.library.update_download_info(
            id,
            MediaStatus::Downloading,
            Some(hash.as_str()),
            Some(release.title.as_str()),
        )?;
        Ok(())
    }

    /// Start a download for one specific episode.
    pub async fn start_episode_download(
        &self,
        media_id: i64,
        season: u32,
        episode: u32,
        release: &Release,
    ) -> Result<(), ManagerError> {
        let media = self
            .library
            .get_by_id(media_id)?
            .ok_or(ManagerError::MediaNotFound(media_id))?;
        if !media.media_type.is_series() {
            return Err(ManagerError::NotASeries(media_id));
        }

        info!(
            title = %media.title,
            episode = %format!("S{:02}E{:02}", season, episode),
            release = %release.title,
            "Starting episode download"
        );

        let hash = self.add_to_client(media.media_type, release).await?;

        self.schedule_extra_trackers(&hash);
        self.notify_download_started(&media, &release.title);
        info!(hash = %hash, "Episode torrent sent to download client");

        self.library.update_episode_download_info(
            media_id,
            season,
            episode,
            MediaStatus::Downloading,
            Some(hash.as_str()),
            Some(release.title.as_str()),
        )?;
        Ok(())
    }

    /// Inject the configured extra trackers shortly after the add, using
    /// the hash the client reported for the torrent.
    fn schedule_extra_trackers(&self, hash: &str) {
        if self.config.extra_trackers.is_empty() {
            return;
        }

        let client = Arc::clone(&self.download_client);
        let trackers = self.config.extra_trackers.clone();
        let hash = hash.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(EXTRA_TRACKERS_DELAY).await;
            info!(hash = %hash, "Adding extra trackers to torrent");
            if let Err(e) = client.add_trackers(&hash, &trackers).await {
                error!("Failed to add extra trackers: {}", e);
            }
        });
    }

    // ------------------------------------------------------------------
    // Download tracking and post-processing
    // ------------------------------------------------------------------

    /// One tracker tick: poll every downloading entry and drive completions
    /// into post-processing.
    pub async fn update_download_status(self: &Arc<Self>) {
        let downloading = match self.library.get_by_status(MediaStatus::Downloading) {
            Ok(list) => list,
            Err(e) => {
                error!("Failed to get downloading media: {}", e);
                return;
            }
        };

        for media in downloading {
            let Some(hash) = media.torrent_hash.clone() else {
                continue;
            };

            let status = match self.download_client.get_torrent_status(&hash).await {
                Ok(status) => status,
                Err(e) => {
                    error!(title = %media.title, "Failed to get torrent status: {}", e);
                    let _ = self.library.update_status(media.id, MediaStatus::Failed);
                    continue;
                }
            };

            if status.is_completed {
                self.handle_completion(media, status).await;
            } else {
                let _ = self.library.update_progress(
                    media.id,
                    MediaStatus::Downloading,
                    status.progress,
                    None,
                );
            }
        }
    }

    async fn handle_completion(self: &Arc<Self>, media: Media, status: TorrentStatus) {
        let episode_slot = if media.media_type.is_series() {
            match self.library.get_tv_show_by_media_id(media.id) {
                Ok(Some(show)) => find_downloading_episode(&show),
                _ => None,
            }
        } else {
            None
        };

        if media.media_type.is_series() && episode_slot.is_none() {
            // Stale handle: the completed torrent was already processed.
            // Keep the derived status fresh and re-arm acquisition if more
            // episodes are waiting.
            self.update_show_progress(media.id);
            if let Ok(Some(show)) = self.library.get_tv_show_by_media_id(media.id) {
                if has_pending_episode(&show) {
                    self.enqueue(media);
                }
            }
            return;
        }

        info!(title = %media.title, "Download complete");
        self.notify_download_complete(&media, &status.name);

        // Park the entry in post-processing so the next tick does not spawn
        // a second run; a failed run puts it back to downloading for retry.
        if self
            .library
            .update_status(media.id, MediaStatus::PostProcessing)
            .is_err()
        {
            return;
        }

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            manager.run_post_processing(media, status, episode_slot).await;
        });
    }

    async fn run_post_processing(
        self: Arc<Self>,
        media: Media,
        status: TorrentStatus,
        episode_slot: Option<(u32, u32)>,
    ) {
        let (season, episode) = episode_slot.unwrap_or((0, 0));
        let download_dir = status.download_dir.clone();

        match self
            .post_processor
            .process_download(&media, &status, season, episode, &download_dir)
            .await
        {
            Ok(()) => {
                if let Some((season, episode)) = episode_slot {
                    let _ = self.library.update_episode_download_info(
                        media.id,
                        season,
                        episode,
                        MediaStatus::Downloaded,
                        None,
                        None,
                    );
                    self.update_show_progress(media.id);

                    // More pending episodes mean more acquisition work.
                    if let Ok(Some(show)) = self.library.get_tv_show_by_media_id(media.id) {
                        if has_pending_episode(&show) {
                            if let Ok(Some(fresh)) = self.library.get_by_id(media.id) {
                                self.enqueue(fresh);
                            }
                        }
                    }
                } else {
                    let _ = self.library.update_progress(
                        media.id,
                        MediaStatus::Downloaded,
                        1.0,
                        Some(Utc::now()),
                    );
                }
            }
            Err(e) => {
                error!(title = %media.title, "Post-processing failed: {}", e);
                self.notify_download_error(&media, &e.to_string());
                // Partial renames are safer to rerun than to roll back; the
                // tracker re-detects the completed torrent next tick.
                let _ = self
                    .library
                    .update_status(media.id, MediaStatus::Downloading);
            }
        }
    }

    /// Recompute a show's progress and derived status from its episodes.
    pub fn update_show_progress(&self, media_id: i64) {
        let show = match self.library.get_tv_show_by_media_id(media_id) {
            Ok(Some(show)) => show,
            Ok(None) => return,
            Err(e) => {
                error!("Failed to get show for progress update: {}", e);
                return;
            }
        };

        let mut downloadable = 0usize;
        let mut downloaded = 0usize;
        let mut in_flight = 0usize;
        let mut tba = 0usize;

        for season in &show.seasons {
            for episode in &season.episodes {
                if episode.status != MediaStatus::Skipped && episode.status != MediaStatus::Tba {
                    downloadable += 1;
                    if episode.status == MediaStatus::Downloaded {
                        downloaded += 1;
                    }
                }
                if episode.status == MediaStatus::Pending
                    || episode.status == MediaStatus::Downloading
                {
                    in_flight += 1;
                }
                if episode.status == MediaStatus::Tba {
                    tba += 1;
                }
            }
        }

        let progress = if downloadable > 0 {
            downloaded as f64 / downloadable as f64
        } else {
            0.0
        };

        let new_status = if in_flight > 0 {
            MediaStatus::Downloading
        } else if tba > 0 || show.status.to_lowercase() == "running" {
            MediaStatus::Monitoring
        } else {
            MediaStatus::Downloaded
        };

        let completed_at = if new_status == MediaStatus::Downloaded {
            Some(Utc::now())
        } else {
            None
        };

        if let Err(e) = self
            .library
            .update_progress(media_id, new_status, progress, completed_at)
        {
            error!("Failed to update show progress: {}", e);
            return;
        }
        info!(
            media_id,
            status = new_status.as_str(),
            progress,
            "Updated show progress"
        );
    }

    // ------------------------------------------------------------------
    // Scheduled sweeps
    // ------------------------------------------------------------------

    /// Enqueue every pending or failed entry with auto-download enabled.
    pub async fn process_pending_media(&self) {
        let mut to_process = Vec::new();
        for status in [MediaStatus::Pending, MediaStatus::Failed] {
            match self.library.get_by_status(status) {
                Ok(mut list) => to_process.append(&mut list),
                Err(e) => {
                    error!("Failed to get {} media: {}", status.as_str(), e);
                    return;
                }
            }
        }

        if to_process.is_empty() {
            return;
        }
        info!(count = to_process.len(), "Processing pending and failed media");
        for media in to_process {
            if media.auto_download {
                self.enqueue(media);
            }
        }
    }

    /// Flip failed entries back to pending and re-queue them.
    pub async fn retry_failed_downloads(&self) {
        let failed = match self.library.get_by_status(MediaStatus::Failed) {
            Ok(list) => list,
            Err(e) => {
                error!("Failed to get failed media for retry: {}", e);
                return;
            }
        };

        if failed.is_empty() {
            return;
        }
        info!(count = failed.len(), "Retrying failed media");
        for mut media in failed {
            if !media.auto_download {
                continue;
            }
            if let Err(e) = self.library.update_status(media.id, MediaStatus::Pending) {
                error!("Failed to update status for retry: {}", e);
                continue;
            }
            media.status = MediaStatus::Pending;
            self.enqueue(media);
        }
    }

    /// Remove torrents whose retention expired and archive their entries.
    pub async fn cleanup_completed_torrents(&self) {
        let keep_days = self.config.automation.keep_torrents_for_days;
        let keep_ratio = self.config.automation.keep_torrents_seed_ratio;
        if keep_days <= 0 && keep_ratio <= 0.0 {
            return;
        }

        let downloaded = match self.library.get_by_status(MediaStatus::Downloaded) {
            Ok(list) => list,
            Err(e) => {
                error!("Failed to get downloaded media for cleanup: {}", e);
                return;
            }
        };

        let age_threshold = Utc::now() - chrono::Duration::days(keep_days.max(0));

        for media in downloaded {
            let (Some(completed_at), Some(hash)) = (media.completed_at, &media.torrent_hash)
            else {
                continue;
            };

            let status = match self.download_client.get_torrent_status(hash).await {
                Ok(status) => status,
                Err(e) => {
                    error!("Failed to get torrent status for cleanup: {}", e);
                    continue;
                }
            };

            let expired_by_age = keep_days > 0 && completed_at < age_threshold;
            let expired_by_ratio = keep_ratio > 0.0 && status.upload_ratio >= keep_ratio;
            if !expired_by_age && !expired_by_ratio {
                continue;
            }

            info!(title = %media.title, "Cleaning up torrent");
            match self.download_client.remove_torrent(hash).await {
                Ok(()) => {
                    // Archiving leaves the downloaded state behind, so the
                    // completion timestamp goes with it.
                    let _ = self.library.update_progress(
                        media.id,
                        MediaStatus::Archived,
                        media.progress,
                        None,
                    );
                }
                Err(e) => error!("Failed to remove torrent from client: {}", e),
            }
        }
    }

    /// Refresh show metadata: pick up new episodes and promote aired TBA
    /// episodes to pending.
    pub async fn check_for_new_episodes(&self) {
        info!("Checking for new episodes");
        let media = match self.library.get_all() {
            Ok(list) => list,
            Err(e) => {
                error!("Failed to get media for new episode check: {}", e);
                return;
            }
        };

        for item in media {
            if !item.media_type.is_series() {
                continue;
            }
            if item.status != MediaStatus::Monitoring && item.status != MediaStatus::Pending {
                continue;
            }

            let Some(provider) = self
                .metadata
                .get(&item.media_type)
                .and_then(|p| p.first())
            else {
                warn!(media_type = ?item.media_type, "No metadata provider configured");
                continue;
            };

            self.update_show_metadata(&item, provider.as_ref()).await;
        }
    }

    async fn update_show_metadata(&self, media: &Media, provider: &dyn MetadataClient) {
        info!(title = %media.title, "Updating metadata for show");

        let remote = match provider.search_tv_show(&media.title).await {
            Ok(results) => match results.into_iter().next() {
                Some(show) => show,
                None => {
                    error!(title = %media.title, "No remote show data found");
                    return;
                }
            },
            Err(e) => {
                error!(title = %media.title, "Failed to fetch remote show data: {}", e);
                return;
            }
        };

        let local = match self.library.get_tv_show_by_media_id(media.id) {
            Ok(Some(show)) => show,
            _ => {
                error!(title = %media.title, "Failed to get local show data");
                return;
            }
        };

        if local.status != remote.status {
            let _ = self.library.update_tv_show_status(local.id, &remote.status);
        }

        let delay = chrono::Duration::hours(self.config.automation.episode_download_delay_hours);

        for (&season_number, remote_episodes) in &remote.seasons {
            let local_season = local
                .seasons
                .iter()
                .find(|s| s.season_number == season_number);

            let season_id = match local_season {
                Some(season) => season.id,
                None => match self.library.create_season(local.id, season_number) {
                    Ok(id) => id,
                    Err(e) => {
                        error!("Failed to create season {}: {}", season_number, e);
                        continue;
                    }
                },
            };

            for remote_episode in remote_episodes {
                let local_episode = local_season.and_then(|s| {
                    s.episodes
                        .iter()
                        .find(|e| e.episode_number == remote_episode.number)
                });

                match local_episode {
                    None => {
                        let mut status = MediaStatus::Pending;
                        if let Some(air_date) = &remote_episode.air_date {
                            if is_future_date(air_date) {
                                status = MediaStatus::Tba;
                            }
                        }
                        if let Err(e) = self.library.create_episode(&Episode {
                            id: 0,
                            season_id,
                            episode_number: remote_episode.number,
                            title: remote_episode.title.clone(),
                            air_date: remote_episode.air_date.clone(),
                            status,
                        }) {
                            error!("Failed to create episode: {}", e);
                            continue;
                        }
                        if media.status == MediaStatus::Monitoring {
                            let _ = self.library.update_status(media.id, MediaStatus::Pending);
                        }
                    }
                    Some(local_episode) if local_episode.status == MediaStatus::Tba => {
                        let Some(air_date) = &remote_episode.air_date else {
                            continue;
                        };
                        if !aired_before(air_date, delay) {
                            continue;
                        }
                        if let Err(e) = self.library.update_episode_download_info(
                            media.id,
                            season_number,
                            local_episode.episode_number,
                            MediaStatus::Pending,
                            None,
                            None,
                        ) {
                            error!("Failed to promote episode: {}", e);
                            continue;
                        }
                        if media.status == MediaStatus::Monitoring {
                            let _ = self.library.update_status(media.id, MediaStatus::Pending);
                        }
                    }
                    Some(_) => {}
                }
            }
        }
    }

    /// Match RSS feed items against pending episodes of monitored shows and
    /// start downloads for hits.
    pub async fn process_rss_feeds(&self) {
        info!("Starting RSS feed processing");

        let sources: Vec<_> = self
            .config
            .tv_shows
            .sources
            .iter()
            .chain(self.config.anime.sources.iter())
            .filter(|s| s.kind == SourceKind::Rss)
            .cloned()
            .collect();

        let timeout = Duration::from_secs(self.config.app.http_timeout_secs);
        for source in sources {
            let indexer = RssIndexer::new(&source.url, timeout);
            match indexer.fetch_items().await {
                Ok(items) => self.match_feed_items(items).await,
                Err(e) => error!(url = %source.url, "Failed to fetch RSS feed: {}", e),
            }
        }

        info!("Finished RSS feed processing");
    }

    pub async fn match_feed_items(&self, items: Vec<Release>) {
        let mut candidates = Vec::new();
        for status in [MediaStatus::Monitoring, MediaStatus::Pending] {
            match self.library.get_by_status(status) {
                Ok(mut list) => candidates.append(&mut list),
                Err(e) => {
                    error!("Failed to get media for RSS check: {}", e);
                    return;
                }
            }
        }
        if candidates.is_empty() {
            return;
        }

        'items: for item in items {
            let item_title = item.title.to_lowercase();

            for media in &candidates {
                if !media.media_type.is_series() {
                    continue;
                }
                let terms = self.search_terms(media);
                if !terms.iter().any(|t| item_title.contains(&t.to_lowercase())) {
                    continue;
                }

                let Ok(Some(show)) = self.library.get_tv_show_by_media_id(media.id) else {
                    continue;
                };
                if has_downloading_episode(&show) {
                    continue;
                }

                for season in &show.seasons {
                    for episode in &season.episodes {
                        if episode.status != MediaStatus::Pending {
                            continue;
                        }
                        let Some(best) = self.selector.select_best(
                            media,
                            vec![item.clone()],
                            season.season_number,
                            episode.episode_number,
                            &terms,
                        ) else {
                            continue;
                        };

                        info!(
                            title = %media.title,
                            episode = %format!(
                                "S{:02}E{:02}",
                                season.season_number, episode.episode_number
                            ),
                            "Found match in RSS feed"
                        );
                        if let Err(e) = self
                            .start_episode_download(
                                media.id,
                                season.season_number,
                                episode.episode_number,
                                &best,
                            )
                            .await
                        {
                            error!("Failed to start RSS download: {}", e);
                        }
                        tokio::time::sleep(RSS_MATCH_DELAY).await;
                        continue 'items;
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Notifications
    // ------------------------------------------------------------------

    fn notify_download_started(&self, media: &Media, torrent_name: &str) {
        for notifier in &self.notifiers {
            let notifier = Arc::clone(notifier);
            let media = media.clone();
            let torrent_name = torrent_name.to_string();
            tokio::spawn(async move {
                if let Err(e) = notifier.notify_download_start(&media, &torrent_name).await {
                    error!(notifier = notifier.name(), "Notification failed: {}", e);
                }
            });
        }
    }

    fn notify_download_complete(&self, media: &Media, torrent_name: &str) {
        for notifier in &self.notifiers {
            let notifier = Arc::clone(notifier);
            let media = media.clone();
            let torrent_name = torrent_name.to_string();
            tokio::spawn(async move {
                if let Err(e) = notifier
                    .notify_download_complete(&media, &torrent_name)
                    .await
                {
                    error!(notifier = notifier.name(), "Notification failed: {}", e);
                }
            });
        }
    }

    fn notify_download_error(&self, media: &Media, message: &str) {
        for notifier in &self.notifiers {
            let notifier = Arc::clone(notifier);
            let media = media.clone();
            let message = message.to_string();
            tokio::spawn(async move {
                if let Err(e) = notifier.notify_download_error(&media, &message).await {
                    error!(notifier = notifier.name(), "Notification failed: {}", e);
                }
            });
        }
    }
}

fn is_future_date(date: &str) -> bool {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map(|d| d > Utc::now().date_naive())
        .unwrap_or(false)
}

/// True once `air_date + delay` lies in the past.
fn aired_before(air_date: &str, delay: chrono::Duration) -> bool {
    let Ok(date) = NaiveDate::parse_from_str(air_date, "%Y-%m-%d") else {
        return false;
    };
    let airing = date
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always valid")
        .and_utc();
    airing + delay < Utc::now()
}

fn find_downloading_episode(show: &TvShow) -> Option<(u32, u32)> {
    for season in &show.seasons {
        for episode in &season.episodes {
            if episode.status == MediaStatus::Downloading {
                return Some((season.season_number, episode.episode_number));
            }
        }
    }
    None
}

fn has_downloading_episode(show: &TvShow) -> bool {
    find_downloading_episode(show).is_some()
}

fn has_pending_episode(show: &TvShow) -> bool {
    show.seasons
        .iter()
        .flat_map(|s| &s.episodes)
        .any(|e| e.status == MediaStatus::Pending)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_future_date() {
        assert!(is_future_date("2999-01-01"));
        assert!(!is_future_date("2000-01-01"));
        assert!(!is_future_date("not a date"));
        assert!(!is_future_date(""));
    }

    #[test]
    fn test_aired_before_with_delay() {
        let two_days_ago = (Utc::now() - chrono::Duration::days(2))
            .date_naive()
            .format("%Y-%m-%d")
            .to_string();

        assert!(aired_before(&two_days_ago, chrono::Duration::hours(24)));
        assert!(!aired_before(&two_days_ago, chrono::Duration::hours(72)));
        assert!(!aired_before("garbage", chrono::Duration::zero()));
    }
}
