use super::{types::Config, ConfigError};

/// Validate configuration beyond what serde enforces.
///
/// Unknown torrent client backends and unknown move methods already fail at
/// parse time (enum deserialization). This pass catches the structural
/// problems that would otherwise surface mid-flight.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.torrent_client.url.is_empty() {
        return Err(ConfigError::ValidationError(
            "torrent_client.url cannot be empty".to_string(),
        ));
    }

    for (name, section) in [
        ("movies", &config.movies),
        ("tv_shows", &config.tv_shows),
        ("anime", &config.anime),
    ] {
        if section.move_method.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "{}.move_method cannot be empty",
                name
            )));
        }
        for source in &section.sources {
            if source.url.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "{}.sources entry has an empty url",
                    name
                )));
            }
        }
    }

    if config.automation.keep_torrents_for_days < 0 {
        return Err(ConfigError::ValidationError(
            "automation.keep_torrents_for_days cannot be negative".to_string(),
        ));
    }
    if config.automation.keep_torrents_seed_ratio < 0.0 {
        return Err(ConfigError::ValidationError(
            "automation.keep_torrents_seed_ratio cannot be negative".to_string(),
        ));
    }

    if config.scheduler.download_poll_secs == 0 {
        return Err(ConfigError::ValidationError(
            "scheduler.download_poll_secs cannot be 0".to_string(),
        ));
    }

    Ok(())
}
