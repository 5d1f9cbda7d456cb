//! Post-processing of completed downloads: place files into the library
//! layout, rename them, fetch subtitles, and notify.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::fs;
use tracing::{error, info, warn};

use crate::config::{Config, MoveMethod};
use crate::fsutil::{sanitize_filename, wait_for_file};
use crate::library::{Media, MediaType};
use crate::notify::Notifier;
use crate::selector::quality::parse_quality_label;
use crate::subtitles::SubtitleProvider;
use crate::torrent_client::TorrentStatus;

const VIDEO_EXTENSIONS: &[&str] = &["mkv", "mp4", "avi", "mov"];
const SUBTITLE_EXTENSIONS: &[&str] = &["srt", "sub", "ass"];
const FILE_WAIT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum PostProcessError {
    #[error("failed to create destination folder {0}: {1}")]
    Destination(PathBuf, std::io::Error),

    #[error("no media files identified for: {0}")]
    NoMediaFiles(String),

    #[error("source file did not appear in time: {0}")]
    SourceMissing(PathBuf),

    #[error("failed to process file '{0}' after all fallbacks")]
    AllMethodsFailed(PathBuf),
}

pub struct PostProcessor {
    config: Config,
    notifiers: Vec<Arc<dyn Notifier>>,
    subtitles: Option<Arc<dyn SubtitleProvider>>,
}

impl PostProcessor {
    pub fn new(
        config: Config,
        notifiers: Vec<Arc<dyn Notifier>>,
        subtitles: Option<Arc<dyn SubtitleProvider>>,
    ) -> Self {
        Self {
            config,
            notifiers,
            subtitles,
        }
    }

    /// Main entry point for a completed download. `season`/`episode` are
    /// zero for movies; `download_path` is the torrent's download directory
    /// as reported by the client.
    pub async fn process_download(
        &self,
        media: &Media,
        torrent_status: &TorrentStatus,
        season: u32,
        episode: u32,
        download_path: &str,
    ) -> Result<(), PostProcessError> {
        info!(title = %media.title, "Starting post-processing");

        let destination = self.create_destination_folder(media, season).await?;

        let media_files = identify_media_files(download_path, &torrent_status.files);
        if media_files.is_empty() {
            return Err(PostProcessError::NoMediaFiles(media.title.clone()));
        }

        self.place_files_with_fallback(media, &media_files, &destination)
            .await?;

        let video_file = self
            .rename_files(
                media,
                &destination,
                season,
                episode,
                &torrent_status.name,
                &media_files,
            )
            .await;

        if let Some(video_file) = video_file {
            self.download_subtitles(media, &destination, &video_file).await;
        }

        self.notify_post_process_complete(media, &torrent_status.name);

        info!(title = %media.title, "Finished post-processing");
        Ok(())
    }

    async fn create_destination_folder(
        &self,
        media: &Media,
        season: u32,
    ) -> Result<PathBuf, PostProcessError> {
        let base = &self.config.media_type_config(media.media_type).destination_folder;

        let folder = format!("{} ({})", sanitize_filename(&media.title), media.year);
        let mut path = base.join(folder);

        if media.media_type.is_series() && season > 0 {
            path = path.join(format!("S{:02}", season));
        }

        fs::create_dir_all(&path)
            .await
            .map_err(|e| PostProcessError::Destination(path.clone(), e))?;

        Ok(path)
    }

    async fn place_files_with_fallback(
        &self,
        media: &Media,
        files: &[PathBuf],
        destination: &Path,
    ) -> Result<(), PostProcessError> {
        let methods = &self.config.media_type_config(media.media_type).move_method;

        for file in files {
            if !wait_for_file(file, FILE_WAIT).await {
                return Err(PostProcessError::SourceMissing(file.clone()));
            }

            let target = destination.join(file.file_name().unwrap_or_default());
            let mut placed = false;

            for method in methods {
                info!(method = ?method, file = %file.display(), "Attempting to place file");
                match apply_move_method(*method, file, &target).await {
                    Ok(()) => {
                        placed = true;
                        break;
                    }
                    Err(e) => {
                        warn!(
                            method = ?method,
                            file = %file.display(),
                            "Placement method failed: {}. Trying next method.",
                            e
                        );
                    }
                }
            }

            if !placed {
                error!(file = %file.display(), "All processing methods failed");
                return Err(PostProcessError::AllMethodsFailed(file.clone()));
            }
        }
        Ok(())
    }

    fn rename_template(&self, media_type: MediaType) -> &str {
        match media_type {
            MediaType::Movie => &self.config.file_renaming.movie_template,
            MediaType::TvShow => &self.config.file_renaming.series_template,
            MediaType::Anime => &self.config.file_renaming.anime_template,
        }
    }

    /// Rename the placed files into the library scheme. Returns the new path
    /// of the first video file, which drives the subtitle lookup.
    async fn rename_files(
        &self,
        media: &Media,
        destination: &Path,
        season: u32,
        episode: u32,
        torrent_name: &str,
        placed_sources: &[PathBuf],
    ) -> Option<PathBuf> {
        let quality = parse_quality_label(torrent_name);
        let template = self.rename_template(media.media_type);
        let mut video_file = None;

        for source in placed_sources {
            let moved_path = destination.join(source.file_name().unwrap_or_default());
            let ext = moved_path
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default();

            let stem = if template.is_empty() {
                if media.media_type == MediaType::Movie {
                    format!("{} ({}) [{}]", media.title, media.year, quality)
                } else {
                    format!(
                        "{} - S{:02}E{:02} [{}]",
                        media.title, season, episode, quality
                    )
                }
            } else {
                template
                    .replace("{title}", &media.title)
                    .replace("{year}", &media.year.to_string())
                    .replace("{season}", &format!("{:02}", season))
                    .replace("{episode}", &format!("{:02}", episode))
                    .replace("{quality}", quality)
            };

            let new_path = destination.join(format!("{}.{}", sanitize_filename(&stem), ext));

            if !moved_path.exists() {
                error!(path = %moved_path.display(), "Could not find file to rename");
                continue;
            }
            match fs::rename(&moved_path, &new_path).await {
                Ok(()) => {
                    if video_file.is_none() && VIDEO_EXTENSIONS.contains(&ext.as_str()) {
                        video_file = Some(new_path);
                    }
                }
                Err(e) => error!("Failed to rename file: {}", e),
            }
        }

        video_file
    }

    async fn download_subtitles(&self, media: &Media, destination: &Path, video_file: &Path) {
        let Some(provider) = &self.subtitles else {
            return;
        };

        let base_name = video_file
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        // Subtitles shipped inside the torrent (or fetched previously) win.
        if let Ok(mut entries) = fs::read_dir(destination).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                let name = entry.file_name().to_string_lossy().to_string();
                let ext = name.rsplit('.').next().unwrap_or_default().to_lowercase();
                if name.starts_with(&base_name) && SUBTITLE_EXTENSIONS.contains(&ext.as_str()) {
                    info!(file = %name, "Subtitle file already exists, skipping download");
                    return;
                }
            }
        }

        let language = if media.language.is_empty() {
            "en"
        } else {
            media.language.as_str()
        };

        info!(video = %video_file.display(), "Searching for subtitles");
        let content = match provider.fetch(video_file, language).await {
            Ok(content) => content,
            Err(e) => {
                error!("Error searching for subtitles: {}", e);
                return;
            }
        };

        if content.is_empty() {
            info!(title = %media.title, "No subtitles found");
            return;
        }

        let subtitle_path = destination.join(format!("{}.{}.srt", base_name, language));
        match fs::write(&subtitle_path, content).await {
            Ok(()) => info!(path = %subtitle_path.display(), "Subtitle saved"),
            Err(e) => error!("Error saving subtitle file: {}", e),
        }
    }

    fn notify_post_process_complete(&self, media: &Media, torrent_name: &str) {
        for notifier in &self.notifiers {
            let notifier = Arc::clone(notifier);
            let media = media.clone();
            let torrent_name = torrent_name.to_string();
            tokio::spawn(async move {
                if let Err(e) = notifier
                    .notify_post_process_complete(&media, &torrent_name)
                    .await
                {
                    error!(notifier = notifier.name(), "Notification failed: {}", e);
                }
            });
        }
    }
}

/// Select the video and subtitle entries from the torrent's file list and
/// join them with the download directory.
fn identify_media_files(download_path: &str, torrent_files: &[String]) -> Vec<PathBuf> {
    torrent_files
        .iter()
        .filter(|file| {
            let ext = Path::new(file)
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            VIDEO_EXTENSIONS.contains(&ext.as_str()) || SUBTITLE_EXTENSIONS.contains(&ext.as_str())
        })
        .map(|file| Path::new(download_path).join(file))
        .collect()
}

async fn apply_move_method(
    method: MoveMethod,
    source: &Path,
    target: &Path,
) -> std::io::Result<()> {
    match method {
        MoveMethod::Hardlink => fs::hard_link(source, target).await,
        MoveMethod::Symlink => symlink(source, target).await,
        MoveMethod::Move => fs::rename(source, target).await,
        MoveMethod::Copy => {
            fs::copy(source, target).await?;
            fs::remove_file(source).await
        }
    }
}

#[cfg(unix)]
async fn symlink(source: &Path, target: &Path) -> std::io::Result<()> {
    fs::symlink(source, target).await
}

#[cfg(not(unix))]
async fn symlink(_source: &Path, _target: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "symlink placement is only supported on unix",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;
    use tempfile::TempDir;

    fn config_with_destination(dest: &Path, methods: &str) -> Config {
        load_config_from_str(&format!(
            r#"
[torrent_client]
backend = "qbittorrent"
url = "http://localhost:8080"

[movies]
destination_folder = "{dest}/movies"
move_method = [{methods}]

[tv_shows]
destination_folder = "{dest}/tv"
move_method = [{methods}]

[anime]
destination_folder = "{dest}/anime"
move_method = [{methods}]
"#,
            dest = dest.display(),
            methods = methods,
        ))
        .unwrap()
    }

    fn processor(config: Config) -> PostProcessor {
        PostProcessor::new(config, Vec::new(), None)
    }

    fn status(name: &str, files: &[&str], download_dir: &str) -> TorrentStatus {
        TorrentStatus {
            hash: "abc123".to_string(),
            name: name.to_string(),
            progress: 1.0,
            files: files.iter().map(|f| f.to_string()).collect(),
            download_dir: download_dir.to_string(),
            is_completed: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_identify_media_files() {
        let files = vec![
            "Show/episode.mkv".to_string(),
            "Show/episode.en.srt".to_string(),
            "Show/readme.nfo".to_string(),
            "Show/sample.exe".to_string(),
        ];
        let selected = identify_media_files("/downloads", &files);
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0], Path::new("/downloads/Show/episode.mkv"));
    }

    #[tokio::test]
    async fn test_movie_end_to_end_layout() {
        let temp = TempDir::new().unwrap();
        let downloads = temp.path().join("downloads");
        std::fs::create_dir_all(downloads.join("The.Matrix.1999.1080p.BluRay")).unwrap();
        std::fs::write(
            downloads.join("The.Matrix.1999.1080p.BluRay/movie.mkv"),
            b"video",
        )
        .unwrap();

        let config = config_with_destination(temp.path(), "\"move\"");
        let pp = processor(config);

        let media = Media::new(MediaType::Movie, "The Matrix", 1999);
        let torrent = status(
            "The.Matrix.1999.1080p.BluRay",
            &["The.Matrix.1999.1080p.BluRay/movie.mkv"],
            downloads.to_str().unwrap(),
        );

        pp.process_download(&media, &torrent, 0, 0, downloads.to_str().unwrap())
            .await
            .unwrap();

        let expected = temp
            .path()
            .join("movies/The Matrix (1999)/The Matrix (1999) [1080p].mkv");
        assert!(expected.exists(), "expected {:?}", expected);
    }

    #[tokio::test]
    async fn test_episode_layout_with_season_folder() {
        let temp = TempDir::new().unwrap();
        let downloads = temp.path().join("downloads");
        std::fs::create_dir_all(&downloads).unwrap();
        std::fs::write(downloads.join("ep.mkv"), b"video").unwrap();
        std::fs::write(downloads.join("ep.srt"), b"subs").unwrap();

        let config = config_with_destination(temp.path(), "\"move\"");
        let pp = processor(config);

        let media = Media::new(MediaType::TvShow, "My Show", 2024);
        let torrent = status(
            "My.Show.S02E05.720p.HDTV",
            &["ep.mkv", "ep.srt"],
            downloads.to_str().unwrap(),
        );

        pp.process_download(&media, &torrent, 2, 5, downloads.to_str().unwrap())
            .await
            .unwrap();

        let season_dir = temp.path().join("tv/My Show (2024)/S02");
        assert!(season_dir.join("My Show - S02E05 [720p].mkv").exists());
        assert!(season_dir.join("My Show - S02E05 [720p].srt").exists());
    }

    #[tokio::test]
    async fn test_rename_template_substitution() {
        let temp = TempDir::new().unwrap();
        let downloads = temp.path().join("downloads");
        std::fs::create_dir_all(&downloads).unwrap();
        std::fs::write(downloads.join("movie.mkv"), b"video").unwrap();

        let mut config = config_with_destination(temp.path(), "\"move\"");
        config.file_renaming.movie_template = "{title} {year} - {quality}".to_string();
        let pp = processor(config);

        let media = Media::new(MediaType::Movie, "The Matrix", 1999);
        let torrent = status(
            "The.Matrix.WEB-DL",
            &["movie.mkv"],
            downloads.to_str().unwrap(),
        );

        pp.process_download(&media, &torrent, 0, 0, downloads.to_str().unwrap())
            .await
            .unwrap();

        assert!(temp
            .path()
            .join("movies/The Matrix (1999)/The Matrix 1999 - WEB-DL.mkv")
            .exists());
    }

    #[tokio::test]
    async fn test_sanitized_destination_folder() {
        let temp = TempDir::new().unwrap();
        let downloads = temp.path().join("downloads");
        std::fs::create_dir_all(&downloads).unwrap();
        std::fs::write(downloads.join("movie.mkv"), b"video").unwrap();

        let config = config_with_destination(temp.path(), "\"move\"");
        let pp = processor(config);

        let media = Media::new(MediaType::Movie, "What If...?", 2021);
        let torrent = status("What.If.2021.1080p", &["movie.mkv"], downloads.to_str().unwrap());

        pp.process_download(&media, &torrent, 0, 0, downloads.to_str().unwrap())
            .await
            .unwrap();

        assert!(temp.path().join("movies/What If (2021)").exists());
    }

    #[tokio::test]
    async fn test_fallback_to_next_method() {
        let temp = TempDir::new().unwrap();
        let downloads = temp.path().join("downloads");
        std::fs::create_dir_all(&downloads).unwrap();
        std::fs::write(downloads.join("movie.mkv"), b"new video").unwrap();

        let config = config_with_destination(temp.path(), "\"hardlink\", \"copy\"");
        let pp = processor(config);

        // Pre-create the placement target so the hardlink fails with EEXIST
        // and the copy fallback kicks in.
        let dest_dir = temp.path().join("movies/The Matrix (1999)");
        std::fs::create_dir_all(&dest_dir).unwrap();
        std::fs::write(dest_dir.join("movie.mkv"), b"stale").unwrap();

        let media = Media::new(MediaType::Movie, "The Matrix", 1999);
        let torrent = status(
            "The.Matrix.1999.1080p",
            &["movie.mkv"],
            downloads.to_str().unwrap(),
        );

        pp.process_download(&media, &torrent, 0, 0, downloads.to_str().unwrap())
            .await
            .unwrap();

        let placed = dest_dir.join("The Matrix (1999) [1080p].mkv");
        assert_eq!(std::fs::read(placed).unwrap(), b"new video");
        // Copy semantics: the source is deleted afterwards.
        assert!(!downloads.join("movie.mkv").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_source_aborts() {
        let temp = TempDir::new().unwrap();
        let config = config_with_destination(temp.path(), "\"move\"");
        let pp = processor(config);

        let media = Media::new(MediaType::Movie, "The Matrix", 1999);
        let torrent = status("The.Matrix", &["missing.mkv"], "/nonexistent");

        let result = pp
            .process_download(&media, &torrent, 0, 0, "/nonexistent")
            .await;
        assert!(matches!(result, Err(PostProcessError::SourceMissing(_))));
    }

    #[tokio::test]
    async fn test_no_media_files_is_an_error() {
        let temp = TempDir::new().unwrap();
        let config = config_with_destination(temp.path(), "\"move\"");
        let pp = processor(config);

        let media = Media::new(MediaType::Movie, "The Matrix", 1999);
        let torrent = status("The.Matrix", &["notes.nfo"], "/downloads");

        let result = pp.process_download(&media, &torrent, 0, 0, "/downloads").await;
        assert!(matches!(result, Err(PostProcessError::NoMediaFiles(_))));
    }
}
