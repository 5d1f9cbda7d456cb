//! TMDB metadata provider.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

use super::{EpisodeInfo, MetadataClient, MetadataError, MovieResult, TvShowResult};

const BASE_URL: &str = "https://api.themoviedb.org/3";
const POSTER_BASE: &str = "https://image.tmdb.org/t/p/w500";

pub struct TmdbClient {
    client: Client,
    base_url: String,
    api_key: String,
    language: String,
}

impl TmdbClient {
    pub fn new(api_key: &str, language: &str, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .expect("reqwest client with static settings"),
            base_url: BASE_URL.to_string(),
            api_key: api_key.to_string(),
            language: if language.is_empty() {
                "en".to_string()
            } else {
                language.to_string()
            },
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        extra: &[(&str, &str)],
    ) -> Result<T, MetadataError> {
        let mut url = format!(
            "{}{}?api_key={}&language={}",
            self.base_url,
            path,
            urlencoding::encode(&self.api_key),
            urlencoding::encode(&self.language)
        );
        for (key, value) in extra {
            url.push('&');
            url.push_str(key);
            url.push('=');
            url.push_str(&urlencoding::encode(value));
        }

        let response = self.client.get(&url).send().await.map_err(request_err)?;
        if !response.status().is_success() {
            return Err(MetadataError::ApiError(format!(
                "HTTP {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| MetadataError::ApiError(e.to_string()))
    }
}

fn request_err(e: reqwest::Error) -> MetadataError {
    if e.is_timeout() {
        MetadataError::Timeout
    } else if e.is_connect() {
        MetadataError::ConnectionFailed(e.to_string())
    } else {
        MetadataError::ApiError(e.to_string())
    }
}

fn year_from_date(date: Option<&str>) -> i32 {
    date.and_then(|d| d.get(..4))
        .and_then(|y| y.parse().ok())
        .unwrap_or(0)
}

fn poster_url(path: Option<&str>) -> String {
    match path {
        Some(p) if !p.is_empty() => format!("{}{}", POSTER_BASE, p),
        _ => String::new(),
    }
}

/// TMDB reports "Returning Series" for shows still on the air; the rest of
/// the core only distinguishes "running" from anything else.
fn normalize_status(status: &str) -> String {
    let lower = status.to_lowercase();
    if lower.contains("returning") {
        "running".to_string()
    } else {
        lower
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct MovieSearchResult {
    id: i64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    overview: String,
    #[serde(default)]
    poster_path: Option<String>,
    #[serde(default)]
    vote_average: f64,
}

#[derive(Debug, Deserialize)]
struct TvSearchResult {
    id: i64,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct TvDetails {
    #[serde(default)]
    name: String,
    #[serde(default)]
    first_air_date: Option<String>,
    #[serde(default)]
    overview: String,
    #[serde(default)]
    poster_path: Option<String>,
    #[serde(default)]
    vote_average: f64,
    #[serde(default)]
    status: String,
    #[serde(default)]
    seasons: Vec<TvSeasonSummary>,
}

#[derive(Debug, Deserialize)]
struct TvSeasonSummary {
    season_number: u32,
}

#[derive(Debug, Deserialize)]
struct TvSeasonDetails {
    #[serde(default)]
    episodes: Vec<TvEpisode>,
}

#[derive(Debug, Deserialize)]
struct TvEpisode {
    episode_number: u32,
    #[serde(default)]
    name: String,
    #[serde(default)]
    air_date: Option<String>,
}

#[async_trait]
impl MetadataClient for TmdbClient {
    fn name(&self) -> &str {
        "tmdb"
    }

    async fn search_movie(
        &self,
        title: &str,
        year: i32,
    ) -> Result<Vec<MovieResult>, MetadataError> {
        let year_str = year.to_string();
        let mut extra = vec![("query", title)];
        if year > 0 {
            extra.push(("year", year_str.as_str()));
        }

        let response: SearchResponse<MovieSearchResult> =
            self.get_json("/search/movie", &extra).await?;

        Ok(response
            .results
            .into_iter()
            .map(|r| MovieResult {
                id: r.id.to_string(),
                year: year_from_date(r.release_date.as_deref()),
                overview: r.overview,
                poster_url: poster_url(r.poster_path.as_deref()),
                rating: r.vote_average,
                title: r.title,
            })
            .collect())
    }

    async fn search_tv_show(&self, title: &str) -> Result<Vec<TvShowResult>, MetadataError> {
        let response: SearchResponse<TvSearchResult> =
            self.get_json("/search/tv", &[("query", title)]).await?;

        let Some(hit) = response.results.into_iter().next() else {
            return Ok(Vec::new());
        };

        let details: TvDetails = self.get_json(&format!("/tv/{}", hit.id), &[]).await?;

        let mut seasons: BTreeMap<u32, Vec<EpisodeInfo>> = BTreeMap::new();
        for summary in &details.seasons {
            // Season 0 holds specials, which the library does not track.
            if summary.season_number == 0 {
                continue;
            }
            let season: TvSeasonDetails = match self
                .get_json(
                    &format!("/tv/{}/season/{}", hit.id, summary.season_number),
                    &[],
                )
                .await
            {
                Ok(s) => s,
                Err(e) => {
                    warn!(
                        season = summary.season_number,
                        "Failed to fetch TMDB season: {}", e
                    );
                    continue;
                }
            };

            let episodes: Vec<EpisodeInfo> = season
                .episodes
                .into_iter()
                .map(|e| EpisodeInfo {
                    number: e.episode_number,
                    title: e.name,
                    air_date: e.air_date.filter(|d| !d.is_empty()),
                })
                .collect();
            if !episodes.is_empty() {
                seasons.insert(summary.season_number, episodes);
            }
        }

        debug!(show = %details.name, seasons = seasons.len(), "TMDB show resolved");

        Ok(vec![TvShowResult {
            id: hit.id.to_string(),
            title: details.name,
            year: year_from_date(details.first_air_date.as_deref()),
            overview: details.overview,
            poster_url: poster_url(details.poster_path.as_deref()),
            rating: details.vote_average,
            status: normalize_status(&details.status),
            seasons,
        }])
    }
}
