use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::indexer::SearchMode;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub torrent_client: TorrentClientConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub movies: MediaTypeConfig,
    #[serde(default, rename = "tv_shows")]
    pub tv_shows: MediaTypeConfig,
    #[serde(default)]
    pub anime: MediaTypeConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub automation: AutomationConfig,
    #[serde(default)]
    pub file_renaming: RenamingConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Trackers injected into every added torrent shortly after the add.
    #[serde(default)]
    pub extra_trackers: Vec<String>,
}

/// Application-level settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Directory for mutable application state (filter log, scratch files).
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,
    /// Filter log verbosity: "none" disables the log, "detail" records every
    /// per-candidate verdict.
    #[serde(default)]
    pub filter_log_level: FilterLogLevel,
    /// When enabled, magnet links are resolved to .torrent blobs before being
    /// handed to the download client. Falls back to the raw magnet on failure.
    #[serde(default)]
    pub magnet_to_torrent_enabled: bool,
    /// Deadline for magnet metadata resolution, in seconds.
    #[serde(default = "default_magnet_timeout")]
    pub magnet_to_torrent_timeout_secs: u64,
    /// Default timeout for outbound HTTP, in seconds.
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_path: default_data_path(),
            filter_log_level: FilterLogLevel::default(),
            magnet_to_torrent_enabled: false,
            magnet_to_torrent_timeout_secs: default_magnet_timeout(),
            http_timeout_secs: default_http_timeout(),
        }
    }
}

fn default_data_path() -> PathBuf {
    PathBuf::from("data")
}

fn default_magnet_timeout() -> u64 {
    60
}

fn default_http_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterLogLevel {
    #[default]
    None,
    Detail,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("reel.db")
}

/// Available download client backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TorrentClientBackend {
    #[serde(rename = "qbittorrent")]
    QBittorrent,
    Transmission,
}

/// Download client configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TorrentClientConfig {
    pub backend: TorrentClientBackend,
    /// Base URL of the client's API (e.g. "http://localhost:8080").
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Fallback download directory when a media type defines none.
    #[serde(default)]
    pub download_path: String,
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

/// Metadata provider configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MetadataConfig {
    /// Preferred metadata language (ISO 639-1), also the default subtitle
    /// language for media entries that do not set one.
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub tmdb: ApiKeyConfig,
    #[serde(default)]
    pub tvmaze: ApiKeyConfig,
}

fn default_language() -> String {
    "en".to_string()
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ApiKeyConfig {
    #[serde(default)]
    pub api_key: String,
}

/// One indexer source attached to a media type.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    /// Source kind: "torznab" or "rss".
    pub kind: SourceKind,
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    /// Query construction hint for torznab sources.
    #[serde(default)]
    pub search_mode: SearchMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Torznab,
    Rss,
}

/// File placement methods, tried in order until one succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveMethod {
    Hardlink,
    Symlink,
    Move,
    Copy,
}

/// Per-media-type settings (movies, tv_shows, anime).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MediaTypeConfig {
    /// Metadata provider names, first entry wins.
    #[serde(default)]
    pub providers: Vec<String>,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    /// Where the download client stores in-flight data for this type.
    #[serde(default)]
    pub download_folder: String,
    /// Root of the final on-disk library for this type.
    #[serde(default)]
    pub destination_folder: PathBuf,
    /// Ordered placement fallback chain.
    #[serde(default = "default_move_method")]
    pub move_method: Vec<MoveMethod>,
}

fn default_move_method() -> Vec<MoveMethod> {
    vec![MoveMethod::Hardlink, MoveMethod::Copy]
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NotificationsConfig {
    #[serde(default)]
    pub pushbullet: ApiKeyConfig,
}

/// Acquisition policy knobs.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AutomationConfig {
    /// Upper bound on episode downloads started in one acquisition sweep.
    /// The single torrent-handle-per-media rule stops a sweep after its
    /// first successful start, so values above 1 behave the same as 1.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,
    #[serde(default)]
    pub min_seeders: u32,
    /// Remove completed torrents from the client after this many days.
    /// Zero disables the age threshold.
    #[serde(default)]
    pub keep_torrents_for_days: i64,
    /// Remove completed torrents once this upload ratio is reached.
    /// Zero disables the ratio threshold.
    #[serde(default)]
    pub keep_torrents_seed_ratio: f64,
    /// Grace period after an episode airs before it becomes searchable.
    #[serde(default)]
    pub episode_download_delay_hours: i64,
    /// Case-insensitive regexes; matching releases are dropped outright.
    #[serde(default)]
    pub reject_patterns: Vec<String>,
    /// Enabled notifier names.
    #[serde(default)]
    pub notifications: Vec<String>,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: default_max_concurrent(),
            min_seeders: 0,
            keep_torrents_for_days: 0,
            keep_torrents_seed_ratio: 0.0,
            episode_download_delay_hours: 0,
            reject_patterns: Vec::new(),
            notifications: Vec::new(),
        }
    }
}

fn default_max_concurrent() -> usize {
    3
}

/// Rename templates. Substitutions: {title}, {year}, {season}, {episode},
/// {quality}. Empty template falls back to the built-in scheme.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RenamingConfig {
    #[serde(default)]
    pub movie_template: String,
    #[serde(default)]
    pub series_template: String,
    #[serde(default)]
    pub anime_template: String,
}

/// Periodic task cadences, in seconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_pending_secs")]
    pub process_pending_secs: u64,
    #[serde(default = "default_new_episodes_secs")]
    pub check_new_episodes_secs: u64,
    #[serde(default = "default_download_poll_secs")]
    pub download_poll_secs: u64,
    #[serde(default = "default_rss_secs")]
    pub rss_sweep_secs: u64,
    #[serde(default = "default_cleanup_secs")]
    pub torrent_cleanup_secs: u64,
    #[serde(default = "default_retry_secs")]
    pub retry_failed_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            process_pending_secs: default_pending_secs(),
            check_new_episodes_secs: default_new_episodes_secs(),
            download_poll_secs: default_download_poll_secs(),
            rss_sweep_secs: default_rss_secs(),
            torrent_cleanup_secs: default_cleanup_secs(),
            retry_failed_secs: default_retry_secs(),
        }
    }
}

fn default_pending_secs() -> u64 {
    1800
}

fn default_new_episodes_secs() -> u64 {
    21600
}

fn default_download_poll_secs() -> u64 {
    10
}

fn default_rss_secs() -> u64 {
    3600
}

fn default_cleanup_secs() -> u64 {
    86400
}

fn default_retry_secs() -> u64 {
    3600
}

impl Config {
    /// Per-type section lookup used all over the manager and post-processor.
    pub fn media_type_config(&self, media_type: crate::library::MediaType) -> &MediaTypeConfig {
        match media_type {
            crate::library::MediaType::Movie => &self.movies,
            crate::library::MediaType::TvShow => &self.tv_shows,
            crate::library::MediaType::Anime => &self.anime,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_minimal_config() {
        let toml = r#"
[torrent_client]
backend = "qbittorrent"
url = "http://localhost:8080"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.torrent_client.backend, TorrentClientBackend::QBittorrent);
        assert_eq!(config.torrent_client.timeout_secs, 30);
        assert_eq!(config.database.path.to_str().unwrap(), "reel.db");
        assert_eq!(config.scheduler.download_poll_secs, 10);
        assert_eq!(config.automation.max_concurrent_downloads, 3);
        assert!(config.extra_trackers.is_empty());
    }

    #[test]
    fn test_deserialize_missing_torrent_client_fails() {
        let toml = r#"
[database]
path = "/tmp/reel.db"
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_unknown_backend_fails() {
        let toml = r#"
[torrent_client]
backend = "rtorrent"
url = "http://localhost"
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_unknown_move_method_fails() {
        let toml = r#"
[torrent_client]
backend = "transmission"
url = "http://localhost:9091"

[movies]
move_method = ["teleport"]
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_media_sections() {
        let toml = r#"
[torrent_client]
backend = "transmission"
url = "http://localhost:9091"

[movies]
providers = ["tmdb"]
download_folder = "/downloads/movies"
destination_folder = "/library/movies"
move_method = ["hardlink", "copy"]

[[movies.sources]]
kind = "torznab"
url = "http://localhost:9117/api/v2.0/indexers/rarbg/results/torznab"
api_key = "secret"
search_mode = "movie-search"

[[tv_shows.sources]]
kind = "rss"
url = "https://example.org/feed.xml"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.movies.sources.len(), 1);
        assert_eq!(config.movies.sources[0].kind, SourceKind::Torznab);
        assert_eq!(config.movies.sources[0].search_mode, SearchMode::MovieSearch);
        assert_eq!(config.movies.move_method, vec![MoveMethod::Hardlink, MoveMethod::Copy]);
        assert_eq!(config.tv_shows.sources[0].kind, SourceKind::Rss);
        // RSS sources default to free-text mode.
        assert_eq!(config.tv_shows.sources[0].search_mode, SearchMode::Search);
    }

    #[test]
    fn test_deserialize_automation_section() {
        let toml = r#"
[torrent_client]
backend = "qbittorrent"
url = "http://localhost:8080"

[automation]
min_seeders = 5
max_concurrent_downloads = 2
keep_torrents_for_days = 14
keep_torrents_seed_ratio = 2.0
episode_download_delay_hours = 24
reject_patterns = ["\\bhdcam\\b", "\\bts\\b"]
notifications = ["pushbullet"]
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.automation.min_seeders, 5);
        assert_eq!(config.automation.keep_torrents_for_days, 14);
        assert_eq!(config.automation.reject_patterns.len(), 2);
        assert_eq!(config.automation.notifications, vec!["pushbullet"]);
    }
}
