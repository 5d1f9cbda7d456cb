//! Durable storage for the media library.
//!
//! The repository performs no business logic beyond referential integrity;
//! which status transitions are legal is decided by the manager.

mod sqlite;
mod types;

pub use sqlite::SqliteLibrary;
pub use types::*;

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LibraryError {
    /// Uniqueness violation on create. Surfaced distinctly so the API layer
    /// can answer 409.
    #[error("entry already exists")]
    Duplicate,

    #[error("not found: {0}")]
    NotFound(String),

    /// The media entry has no show aggregate attached.
    #[error("media {0} is not a tv show")]
    NotAShow(i64),

    #[error("database error: {0}")]
    Database(String),
}

/// Storage contract for media, show aggregates, and anime search terms.
///
/// Implementations are synchronous; callers run on the tokio runtime and the
/// queries are short enough that blocking is acceptable (single-writer
/// SQLite, see `SqliteLibrary`).
pub trait Library: Send + Sync {
    /// Persist a new media row, returning its id.
    ///
    /// Uniqueness: movies collide on `tmdb_id` (when present), shows and
    /// anime on `(title, year, type)`. Collisions yield
    /// [`LibraryError::Duplicate`].
    fn create(&self, media: &Media) -> Result<i64, LibraryError>;

    fn get_by_id(&self, id: i64) -> Result<Option<Media>, LibraryError>;

    fn get_all(&self) -> Result<Vec<Media>, LibraryError>;

    /// Entries in the given status, most recently added first.
    fn get_by_status(&self, status: MediaStatus) -> Result<Vec<Media>, LibraryError>;

    fn update_status(&self, id: i64, status: MediaStatus) -> Result<(), LibraryError>;

    fn update_download_info(
        &self,
        id: i64,
        status: MediaStatus,
        hash: Option<&str>,
        name: Option<&str>,
    ) -> Result<(), LibraryError>;

    fn update_progress(
        &self,
        id: i64,
        status: MediaStatus,
        progress: f64,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<(), LibraryError>;

    fn update_settings(
        &self,
        id: i64,
        min_quality: &str,
        max_quality: &str,
        auto_download: bool,
    ) -> Result<(), LibraryError>;

    /// Delete the entry, cascading to its show aggregate and search terms.
    fn delete(&self, id: i64) -> Result<(), LibraryError>;

    fn create_tv_show(&self, status: &str, external_id: &str) -> Result<i64, LibraryError>;

    /// Refresh the upstream status ("running" / "ended") of a show.
    fn update_tv_show_status(&self, show_id: i64, status: &str) -> Result<(), LibraryError>;

    fn create_season(&self, show_id: i64, season_number: u32) -> Result<i64, LibraryError>;

    fn create_episode(&self, episode: &Episode) -> Result<i64, LibraryError>;

    /// Load the show aggregate for a media entry, seasons sorted by number
    /// and episodes sorted within each season. Returns `Ok(None)` when the
    /// media exists but is not a show.
    fn get_tv_show_by_media_id(&self, media_id: i64) -> Result<Option<TvShow>, LibraryError>;

    /// Update the `(season, episode)` under the show attached to `media_id`.
    /// When both `hash` and `name` are given, the parent media's torrent
    /// handle is set and its status flipped to `downloading` in the same
    /// transaction.
    fn update_episode_download_info(
        &self,
        media_id: i64,
        season_number: u32,
        episode_number: u32,
        status: MediaStatus,
        hash: Option<&str>,
        name: Option<&str>,
    ) -> Result<(), LibraryError>;

    fn get_anime_search_terms(&self, media_id: i64) -> Result<Vec<AnimeSearchTerm>, LibraryError>;

    fn add_anime_search_term(
        &self,
        media_id: i64,
        term: &str,
    ) -> Result<AnimeSearchTerm, LibraryError>;

    fn delete_anime_search_term(&self, id: i64) -> Result<(), LibraryError>;
}
