//! Release filter & scorer.
//!
//! Takes the raw candidate list returned by the indexers and reduces it to a
//! deterministically ranked subset: reject patterns, episode number, series
//! name, quality window, seeder floor, then score and a stable sort.

mod filter_log;
pub mod quality;

pub use filter_log::FilterLog;

use regex_lite::Regex;
use tracing::{debug, error, info};

use crate::config::{Config, FilterLogLevel};
use crate::indexer::Release;
use crate::library::{Media, MediaType};

use quality::{detect_resolution_rank, quality_score, resolution_rank};

/// Per-stage drop counts for one filter run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub initial: usize,
    pub reject_patterns: usize,
    pub episode_number: usize,
    pub series_name: usize,
    pub quality: usize,
    pub min_seeders: usize,
    pub final_count: usize,
}

pub struct TorrentSelector {
    reject_patterns: Vec<String>,
    min_seeders: u32,
    filter_log: Option<FilterLog>,
}

impl TorrentSelector {
    pub fn new(config: &Config) -> Self {
        let filter_log = match config.app.filter_log_level {
            FilterLogLevel::Detail => match FilterLog::open(&config.app.data_path) {
                Ok(log) => {
                    log.session_started();
                    Some(log)
                }
                Err(e) => {
                    error!("Could not create filter.log: {}", e);
                    None
                }
            },
            FilterLogLevel::None => None,
        };

        Self {
            reject_patterns: config.automation.reject_patterns.clone(),
            min_seeders: config.automation.min_seeders,
            filter_log,
        }
    }

    fn log_reject(&self, reason: &str, release: &Release) {
        if let Some(log) = &self.filter_log {
            log.reject(reason, &release.title);
        }
    }

    fn log_pass(&self, release: &Release) {
        if let Some(log) = &self.filter_log {
            log.pass(release.score, &release.title);
        }
    }

    /// Run the full pipeline and return the surviving releases sorted by
    /// score, best first, together with the per-stage drop counts.
    pub fn filter_and_score(
        &self,
        media: &Media,
        results: Vec<Release>,
        season: u32,
        episode: u32,
        search_terms: &[String],
    ) -> (Vec<Release>, FilterStats) {
        let mut stats = FilterStats {
            initial: results.len(),
            ..Default::default()
        };

        let query = if media.media_type.is_series() && season > 0 && episode > 0 {
            format!("{} S{:02}E{:02}", media.title, season, episode)
        } else if media.media_type == MediaType::Movie {
            format!("{} ({})", media.title, media.year)
        } else {
            media.title.clone()
        };

        if let Some(log) = &self.filter_log {
            log.filtering(&query);
        }

        let mut results = self.filter_by_reject_patterns(results, &mut stats);

        if media.media_type.is_series() && season > 0 && episode > 0 {
            results = self.filter_by_episode_number(results, season, episode, &mut stats);
            results = self.filter_by_series_name(results, search_terms, &mut stats);
        }

        results = self.filter_by_quality(results, &media.min_quality, &media.max_quality, &mut stats);
        results = self.filter_by_min_seeders(results, &mut stats);

        for release in &mut results {
            release.score = quality_score(&release.title) + release.seeders as i64;
        }
        // Stable by construction: ties keep indexer order.
        results.sort_by(|a, b| b.score.cmp(&a.score));

        for release in &results {
            self.log_pass(release);
        }

        stats.final_count = results.len();
        self.log_filter_stats(&query, &stats);

        (results, stats)
    }

    /// The winner, if any release survives the pipeline.
    pub fn select_best(
        &self,
        media: &Media,
        results: Vec<Release>,
        season: u32,
        episode: u32,
        search_terms: &[String],
    ) -> Option<Release> {
        let (filtered, _) = self.filter_and_score(media, results, season, episode, search_terms);
        let best = filtered.into_iter().next()?;
        info!(title = %best.title, score = best.score, "Best torrent selected");
        Some(best)
    }

    fn log_filter_stats(&self, query: &str, stats: &FilterStats) {
        if stats.initial == 0 {
            return;
        }

        let mut dropped = Vec::new();
        if stats.reject_patterns > 0 {
            dropped.push(format!("{} rejectFilter", stats.reject_patterns));
        }
        if stats.episode_number > 0 {
            dropped.push(format!("{} numberFilter", stats.episode_number));
        }
        if stats.series_name > 0 {
            dropped.push(format!("{} nameFilter", stats.series_name));
        }
        if stats.quality > 0 {
            dropped.push(format!("{} qualityFilter", stats.quality));
        }
        if stats.min_seeders > 0 {
            dropped.push(format!("{} seederFilter", stats.min_seeders));
        }

        debug!(
            "Filtering {} result(s) for '{}': {} drop ({}), {} pass",
            stats.initial,
            query,
            stats.initial - stats.final_count,
            dropped.join(", "),
            stats.final_count,
        );
    }

    fn filter_by_reject_patterns(
        &self,
        results: Vec<Release>,
        stats: &mut FilterStats,
    ) -> Vec<Release> {
        let patterns: Vec<(String, Regex)> = self
            .reject_patterns
            .iter()
            .filter_map(|p| match Regex::new(&format!("(?i){}", p)) {
                Ok(regex) => Some((p.clone(), regex)),
                Err(e) => {
                    error!(pattern = %p, "Invalid regex pattern: {}", e);
                    None
                }
            })
            .collect();

        let mut filtered = Vec::with_capacity(results.len());
        for release in results {
            match patterns.iter().find(|(_, r)| r.is_match(&release.title)) {
                Some((pattern, _)) => {
                    stats.reject_patterns += 1;
                    self.log_reject(&format!("Matches reject pattern '{}'", pattern), &release);
                }
                None => filtered.push(release),
            }
        }
        filtered
    }

    fn filter_by_episode_number(
        &self,
        results: Vec<Release>,
        season: u32,
        episode: u32,
        stats: &mut FilterStats,
    ) -> Vec<Release> {
        let patterns: Vec<Regex> = [
            format!(r"(?i)s0*{}e0*{}(?:\D|$)", season, episode),
            format!(r"(?i)(?:\D|^){}x0*{}(?:\D|$)", season, episode),
            format!(r"(?i)s{:02}e{:02}", season, episode),
            format!(r"(?i)s{}e{}", season, episode),
            format!(r"(?i){}x{:02}", season, episode),
            format!(r"(?i){}x{}", season, episode),
        ]
        .iter()
        .map(|p| Regex::new(p).expect("episode patterns are well-formed"))
        .collect();

        let mut filtered = Vec::with_capacity(results.len());
        for release in results {
            if patterns.iter().any(|p| p.is_match(&release.title)) {
                filtered.push(release);
            } else {
                stats.episode_number += 1;
                self.log_reject("Episode mismatch", &release);
            }
        }
        filtered
    }

    fn filter_by_series_name(
        &self,
        results: Vec<Release>,
        search_terms: &[String],
        stats: &mut FilterStats,
    ) -> Vec<Release> {
        let all_meaningful: Vec<String> = search_terms
            .iter()
            .flat_map(|t| extract_meaningful_words(t))
            .collect();

        // Nothing usable to match against; filtering here would drop
        // everything for titles made of stop words or single characters.
        if all_meaningful.is_empty() {
            return results;
        }

        let mut filtered = Vec::with_capacity(results.len());
        for release in results {
            let title_lower = release.title.to_lowercase();
            let mut matched = false;

            for term in search_terms {
                // Strategy 1: every meaningful word appears somewhere.
                let words = extract_meaningful_words(term);
                if !words.is_empty()
                    && words.iter().all(|w| title_lower.contains(&w.to_lowercase()))
                {
                    matched = true;
                    break;
                }

                // Strategy 2: the raw term appears verbatim.
                if title_lower.contains(&term.to_lowercase()) {
                    matched = true;
                    break;
                }

                // Strategy 3: the CamelCase term appears with spaces.
                let camel_parts = split_camel_case(term);
                if camel_parts.len() > 1 {
                    let spaced = camel_parts.join(" ").to_lowercase();
                    if title_lower.contains(&spaced) {
                        matched = true;
                        break;
                    }
                }
            }

            if matched {
                filtered.push(release);
            } else {
                stats.series_name += 1;
                self.log_reject(
                    &format!(
                        "Series name not found in title using terms: {}",
                        search_terms.join(", ")
                    ),
                    &release,
                );
            }
        }
        filtered
    }

    fn filter_by_quality(
        &self,
        results: Vec<Release>,
        min_quality: &str,
        max_quality: &str,
        stats: &mut FilterStats,
    ) -> Vec<Release> {
        let min_rank = resolution_rank(min_quality).unwrap_or(0);
        let max_rank = resolution_rank(max_quality).unwrap_or(i32::MAX);

        let mut filtered = Vec::with_capacity(results.len());
        for release in results {
            let rank = detect_resolution_rank(&release.title).unwrap_or(-1);
            if rank >= min_rank && rank <= max_rank {
                filtered.push(release);
            } else {
                stats.quality += 1;
                self.log_reject(
                    &format!(
                        "Quality rank {} is outside range [{}, {}]",
                        rank, min_rank, max_rank
                    ),
                    &release,
                );
            }
        }
        filtered
    }

    fn filter_by_min_seeders(&self, results: Vec<Release>, stats: &mut FilterStats) -> Vec<Release> {
        let mut filtered = Vec::with_capacity(results.len());
        for release in results {
            if release.seeders >= self.min_seeders {
                filtered.push(release);
            } else {
                stats.min_seeders += 1;
                self.log_reject(
                    &format!(
                        "Not enough seeders ({} < {})",
                        release.seeders, self.min_seeders
                    ),
                    &release,
                );
            }
        }
        filtered
    }
}

/// Split a CamelCase word on lower→upper boundaries. Words without a
/// boundary come back unchanged.
fn split_camel_case(word: &str) -> Vec<String> {
    let boundary = Regex::new("([a-z])([A-Z])").expect("static pattern");
    let spaced = boundary.replace_all(word, "$1 $2");
    let parts: Vec<String> = spaced.split_whitespace().map(str::to_string).collect();
    if parts.len() > 1 {
        parts
    } else {
        vec![word.to_string()]
    }
}

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "up", "about", "into",
];

fn is_stop_word(word: &str) -> bool {
    let lower = word.to_lowercase();
    STOP_WORDS.contains(&lower.as_str())
}

/// Extract the words worth matching on from a search term: punctuation
/// stripped, stop words and single characters dropped, CamelCase runs split
/// with both the joined and the split forms kept.
fn extract_meaningful_words(title: &str) -> Vec<String> {
    let punctuation = Regex::new(r"[^\w\s]").expect("static pattern");
    let clean = punctuation.replace_all(title, "");

    let mut words = Vec::new();
    for word in clean.split_whitespace() {
        if word.chars().count() <= 1 {
            continue;
        }

        if !is_stop_word(word) {
            words.push(word.to_string());
        }

        let camel_parts = split_camel_case(word);
        if camel_parts.len() > 1 {
            for part in camel_parts {
                if part.chars().count() > 1 && !is_stop_word(&part) {
                    words.push(part);
                }
            }
        }
    }

    // Case-insensitive dedup, first occurrence wins.
    let mut seen = std::collections::HashSet::new();
    words.retain(|w| seen.insert(w.to_lowercase()));
    words
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;
    use crate::library::MediaType;

    fn selector_with(reject: &[&str], min_seeders: u32) -> TorrentSelector {
        let mut config = load_config_from_str(
            r#"
[torrent_client]
backend = "qbittorrent"
url = "http://localhost:8080"
"#,
        )
        .unwrap();
        config.automation.reject_patterns = reject.iter().map(|s| s.to_string()).collect();
        config.automation.min_seeders = min_seeders;
        TorrentSelector::new(&config)
    }

    fn show(min_quality: &str, max_quality: &str) -> Media {
        let mut media = Media::new(MediaType::TvShow, "My Show", 2024);
        media.min_quality = min_quality.to_string();
        media.max_quality = max_quality.to_string();
        media
    }

    fn release(title: &str, seeders: u32) -> Release {
        let mut r = Release::new(title, format!("magnet:?xt=urn:btih:{}", seeders));
        r.seeders = seeders;
        r
    }

    #[test]
    fn test_episode_acceptance_scenario() {
        // Without a reject pattern the HDCAM release sneaks through: "hd" is
        // a 720p synonym and 100 seeders outscore the WEB-DL.
        let selector = selector_with(&[], 5);
        let media = show("720p", "1080p");
        let candidates = vec![
            release("My Show S02E05 1080p WEB-DL", 50),
            release("My Show 2x05 HDCAM", 100),
            release("Other Show S02E05 1080p", 200),
            release("My Show S02E06 1080p", 80),
        ];

        let terms = vec!["My Show".to_string()];
        let (result, stats) =
            selector.filter_and_score(&media, candidates.clone(), 2, 5, &terms);
        assert_eq!(stats.episode_number, 1);
        assert_eq!(stats.series_name, 1);
        assert_eq!(result.len(), 2);

        // With the reject pattern only the WEB-DL survives and wins.
        let selector = selector_with(&[r"\bhdcam\b"], 5);
        let (result, stats) = selector.filter_and_score(&media, candidates, 2, 5, &terms);
        assert_eq!(stats.reject_patterns, 1);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].title, "My Show S02E05 1080p WEB-DL");
    }

    #[test]
    fn test_reject_pattern_drops_candidate() {
        let selector = selector_with(&[r"\bhdcam\b"], 0);
        let media = show("480p", "1080p");
        let candidates = vec![
            release("My Show S02E05 1080p WEB-DL", 50),
            release("My Show S02E05 HDCAM 480p", 100),
        ];

        let terms = vec!["My Show".to_string()];
        let (result, stats) = selector.filter_and_score(&media, candidates, 2, 5, &terms);

        assert_eq!(stats.reject_patterns, 1);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].title, "My Show S02E05 1080p WEB-DL");
    }

    #[test]
    fn test_invalid_reject_pattern_is_skipped() {
        let selector = selector_with(&["[unclosed"], 0);
        let media = show("480p", "1080p");
        let candidates = vec![release("My Show S01E01 1080p", 10)];

        let terms = vec!["My Show".to_string()];
        let (result, stats) = selector.filter_and_score(&media, candidates, 1, 1, &terms);

        assert_eq!(stats.reject_patterns, 0);
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn test_episode_pattern_variants() {
        let selector = selector_with(&[], 0);
        let media = show("480p", "2160p");
        let terms = vec!["My Show".to_string()];

        for title in [
            "My Show S02E05 1080p",
            "My Show s2e5 1080p",
            "My Show 2x05 1080p",
            "My Show 2x5 1080p",
            "My Show S02E05v2 720p",
        ] {
            let (result, _) =
                selector.filter_and_score(&media, vec![release(title, 10)], 2, 5, &terms);
            assert_eq!(result.len(), 1, "expected '{}' to match S02E05", title);
        }

        // Same-season neighbours must not slip through.
        for title in ["My Show S02E50 1080p", "My Show S02E06 1080p"] {
            let (result, _) =
                selector.filter_and_score(&media, vec![release(title, 10)], 2, 5, &terms);
            assert!(result.is_empty(), "expected '{}' to be rejected", title);
        }
    }

    #[test]
    fn test_camel_case_series_match() {
        let selector = selector_with(&[], 0);
        let mut media = show("480p", "2160p");
        media.title = "SteinsGate".to_string();
        let terms = vec!["SteinsGate".to_string()];

        let (result, _) = selector.filter_and_score(
            &media,
            vec![release("Steins Gate S01E01 1080p", 40)],
            1,
            1,
            &terms,
        );
        assert_eq!(result.len(), 1);

        let (result, _) = selector.filter_and_score(
            &media,
            vec![release("Gate S01E01 1080p", 40)],
            1,
            1,
            &terms,
        );
        assert!(result.is_empty());
    }

    #[test]
    fn test_punctuated_title_matches() {
        let selector = selector_with(&[], 0);
        let mut media = show("480p", "2160p");
        media.title = "Dr. Stone".to_string();
        let terms = vec!["Dr. Stone".to_string()];

        let (result, _) = selector.filter_and_score(
            &media,
            vec![release("Dr Stone S01E03 720p", 25)],
            1,
            3,
            &terms,
        );
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn test_series_filter_noop_without_meaningful_words() {
        let selector = selector_with(&[], 0);
        let mut media = show("480p", "2160p");
        media.title = "A".to_string();
        let terms = vec!["A".to_string()];

        let (result, stats) = selector.filter_and_score(
            &media,
            vec![release("Completely Unrelated S01E01 720p", 5)],
            1,
            1,
            &terms,
        );
        assert_eq!(stats.series_name, 0);
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn test_quality_window() {
        let selector = selector_with(&[], 0);
        let media = show("720p", "1080p");
        let terms = vec!["My Show".to_string()];
        let candidates = vec![
            release("My Show S01E01 2160p", 10),
            release("My Show S01E01 1080p", 10),
            release("My Show S01E01 480p", 10),
            release("My Show S01E01", 10),
        ];

        let (result, stats) = selector.filter_and_score(&media, candidates, 1, 1, &terms);
        assert_eq!(result.len(), 1);
        assert!(result[0].title.contains("1080p"));
        assert_eq!(stats.quality, 3);
    }

    #[test]
    fn test_seeder_floor() {
        let selector = selector_with(&[], 5);
        let media = show("480p", "2160p");
        let terms = vec!["My Show".to_string()];
        let candidates = vec![
            release("My Show S01E01 1080p", 4),
            release("My Show S01E01 720p", 5),
        ];

        let (result, stats) = selector.filter_and_score(&media, candidates, 1, 1, &terms);
        assert_eq!(stats.min_seeders, 1);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].seeders, 5);
    }

    #[test]
    fn test_scoring_order_remux_over_webrip() {
        let selector = selector_with(&[], 0);
        let media = show("480p", "2160p");
        let terms = vec!["A".to_string()];
        let candidates = vec![
            release("A S01E01 1080p WEBRip x264 AAC", 10),
            release("A S01E01 1080p REMUX x265 ATMOS", 10),
        ];

        let (result, _) = selector.filter_and_score(&media, candidates, 1, 1, &terms);
        assert_eq!(result.len(), 2);
        assert!(result[0].title.contains("REMUX"));
        assert!(result[0].score > result[1].score);
    }

    #[test]
    fn test_sort_is_stable_on_ties() {
        let selector = selector_with(&[], 0);
        let media = show("480p", "2160p");
        let terms = vec!["My Show".to_string()];
        let candidates = vec![
            release("My Show S01E01 1080p", 10),
            release("My Show s01e01 1080p", 10),
        ];

        let (first, _) = selector.filter_and_score(&media, candidates.clone(), 1, 1, &terms);
        let (second, _) = selector.filter_and_score(&media, candidates, 1, 1, &terms);
        assert_eq!(first[0].title, "My Show S01E01 1080p");
        assert_eq!(first[0].title, second[0].title);
        assert_eq!(first[1].title, second[1].title);
    }

    #[test]
    fn test_select_best_empty_is_none() {
        let selector = selector_with(&[], 0);
        let media = show("720p", "1080p");
        let terms = vec!["My Show".to_string()];
        assert!(selector.select_best(&media, Vec::new(), 1, 1, &terms).is_none());
    }

    #[test]
    fn test_movie_skips_episode_filters() {
        let selector = selector_with(&[], 0);
        let mut media = Media::new(MediaType::Movie, "The Matrix", 1999);
        media.min_quality = "720p".to_string();
        media.max_quality = "2160p".to_string();
        let terms = vec!["The Matrix".to_string()];

        let (result, stats) = selector.filter_and_score(
            &media,
            vec![release("The.Matrix.1999.1080p.BluRay.x264", 100)],
            0,
            0,
            &terms,
        );
        assert_eq!(result.len(), 1);
        assert_eq!(stats.episode_number, 0);
        assert_eq!(stats.series_name, 0);
    }

    #[test]
    fn test_extract_meaningful_words() {
        let words = extract_meaningful_words("Dr. Stone");
        assert_eq!(words, vec!["Dr", "Stone"]);

        let words = extract_meaningful_words("Steins;Gate");
        assert_eq!(words, vec!["SteinsGate", "Steins", "Gate"]);

        let words = extract_meaningful_words("The Lord of the Rings");
        assert_eq!(words, vec!["Lord", "Rings"]);
    }

    #[test]
    fn test_split_camel_case() {
        assert_eq!(split_camel_case("SteinsGate"), vec!["Steins", "Gate"]);
        assert_eq!(split_camel_case("simple"), vec!["simple"]);
    }
}
