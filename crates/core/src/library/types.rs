use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of library entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    #[serde(rename = "tvshow")]
    TvShow,
    Anime,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::TvShow => "tvshow",
            MediaType::Anime => "anime",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "movie" => Some(MediaType::Movie),
            "tvshow" => Some(MediaType::TvShow),
            "anime" => Some(MediaType::Anime),
            _ => None,
        }
    }

    /// Shows and anime share the season/episode lifecycle.
    pub fn is_series(&self) -> bool {
        matches!(self, MediaType::TvShow | MediaType::Anime)
    }
}

/// Lifecycle state of a media entry or episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MediaStatus {
    Pending,
    Searching,
    Downloading,
    Downloaded,
    Failed,
    Skipped,
    Monitoring,
    Tba,
    PostProcessing,
    Archived,
}

impl MediaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaStatus::Pending => "pending",
            MediaStatus::Searching => "searching",
            MediaStatus::Downloading => "downloading",
            MediaStatus::Downloaded => "downloaded",
            MediaStatus::Failed => "failed",
            MediaStatus::Skipped => "skipped",
            MediaStatus::Monitoring => "monitoring",
            MediaStatus::Tba => "tba",
            MediaStatus::PostProcessing => "post-processing",
            MediaStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(MediaStatus::Pending),
            "searching" => Some(MediaStatus::Searching),
            "downloading" => Some(MediaStatus::Downloading),
            "downloaded" => Some(MediaStatus::Downloaded),
            "failed" => Some(MediaStatus::Failed),
            "skipped" => Some(MediaStatus::Skipped),
            "monitoring" => Some(MediaStatus::Monitoring),
            "tba" => Some(MediaStatus::Tba),
            "post-processing" => Some(MediaStatus::PostProcessing),
            "archived" => Some(MediaStatus::Archived),
        _ => None,
        }
    }
}

/// One library entry: a movie, or the media-level row of a show/anime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Media {
    pub id: i64,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imdb_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmdb_id: Option<i64>,
    /// Link to the show aggregate; always set for shows/anime, never for movies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tv_show_id: Option<i64>,
    pub title: String,
    pub year: i32,
    pub language: String,
    pub min_quality: String,
    pub max_quality: String,
    pub status: MediaStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub torrent_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub torrent_name: Option<String>,
    pub progress: f64,
    pub added_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poster_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    pub auto_download: bool,
}

impl Media {
    /// A blank entry with sensible defaults, ready for `Library::create`.
    pub fn new(media_type: MediaType, title: impl Into<String>, year: i32) -> Self {
        Self {
            id: 0,
            media_type,
            imdb_id: None,
            tmdb_id: None,
            tv_show_id: None,
            title: title.into(),
            year,
            language: String::new(),
            min_quality: "480p".to_string(),
            max_quality: "2160p".to_string(),
            status: MediaStatus::Pending,
            torrent_hash: None,
            torrent_name: None,
            progress: 0.0,
            added_at: Utc::now(),
            completed_at: None,
            overview: None,
            poster_url: None,
            rating: None,
            auto_download: true,
        }
    }
}

/// Show aggregate root. Seasons arrive sorted by number, episodes sorted
/// within each season.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TvShow {
    pub id: i64,
    /// Upstream show status as reported by the metadata provider
    /// (e.g. "running", "ended").
    pub status: String,
    /// Provider-side identifier of the show.
    pub external_id: String,
    pub seasons: Vec<Season>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Season {
    pub id: i64,
    pub show_id: i64,
    pub season_number: u32,
    pub episodes: Vec<Episode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub id: i64,
    pub season_id: i64,
    pub episode_number: u32,
    pub title: String,
    /// Air date as `YYYY-MM-DD`, when the provider knows it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub air_date: Option<String>,
    pub status: MediaStatus,
}

/// Alternative query string for an anime entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnimeSearchTerm {
    pub id: i64,
    pub media_id: i64,
    pub term: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_round_trip() {
        for t in [MediaType::Movie, MediaType::TvShow, MediaType::Anime] {
            assert_eq!(MediaType::parse(t.as_str()), Some(t));
        }
        assert_eq!(MediaType::parse("podcast"), None);
    }

    #[test]
    fn test_media_status_round_trip() {
        for s in [
            MediaStatus::Pending,
            MediaStatus::Searching,
            MediaStatus::Downloading,
            MediaStatus::Downloaded,
            MediaStatus::Failed,
            MediaStatus::Skipped,
            MediaStatus::Monitoring,
            MediaStatus::Tba,
            MediaStatus::PostProcessing,
            MediaStatus::Archived,
        ] {
            assert_eq!(MediaStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(MediaStatus::parse("paused"), None);
    }

    #[test]
    fn test_post_processing_serializes_kebab_case() {
        let json = serde_json::to_string(&MediaStatus::PostProcessing).unwrap();
        assert_eq!(json, "\"post-processing\"");
    }

    #[test]
    fn test_is_series() {
        assert!(!MediaType::Movie.is_series());
        assert!(MediaType::TvShow.is_series());
        assert!(MediaType::Anime.is_series());
    }

    #[test]
    fn test_new_media_defaults() {
        let media = Media::new(MediaType::Movie, "The Matrix", 1999);
        assert_eq!(media.status, MediaStatus::Pending);
        assert_eq!(media.progress, 0.0);
        assert!(media.auto_download);
        assert!(media.tv_show_id.is_none());
    }
}
