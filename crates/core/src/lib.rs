pub mod config;
pub mod fsutil;
pub mod indexer;
pub mod library;
pub mod magnet;
pub mod manager;
pub mod metadata;
pub mod notify;
pub mod post_process;
pub mod selector;
pub mod subtitles;
pub mod testing;
pub mod torrent_client;

pub use config::{load_config, load_config_from_str, validate_config, Config, ConfigError};
pub use library::{
    AnimeSearchTerm, Episode, Library, LibraryError, Media, MediaStatus, MediaType, Season,
    SqliteLibrary, TvShow,
};
pub use manager::Manager;
