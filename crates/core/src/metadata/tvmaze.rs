//! TVmaze metadata provider. No API key required.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use super::{EpisodeInfo, MetadataClient, MetadataError, MovieResult, TvShowResult};

const BASE_URL: &str = "https://api.tvmaze.com";

pub struct TvmazeClient {
    client: Client,
    base_url: String,
}

impl TvmazeClient {
    pub fn new(timeout: Duration) -> Self {
        Self::with_base_url(BASE_URL, timeout)
    }

    fn with_base_url(base_url: &str, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .expect("reqwest client with static settings"),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Option<T>, MetadataError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).send().await.map_err(request_err)?;

        // TVmaze answers 404 for "no such show", which is an empty result,
        // not an error.
        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(MetadataError::ApiError(format!(
                "HTTP {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map(Some)
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

#[derive(Debug, Deserialize)]
struct TvmazeShow {
    id: i64,
    name: String,
    #[serde(default)]
    premiered: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    image: Option<TvmazeImage>,
    #[serde(default)]
    rating: TvmazeRating,
}

#[derive(Debug, Deserialize)]
struct TvmazeImage {
    #[serde(default)]
    original: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TvmazeRating {
    #[serde(default)]
    average: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TvmazeEpisode {
    season: u32,
    number: Option<u32>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    airdate: Option<String>,
}

fn year_from_date(date: Option<&str>) -> i32 {
    date.and_then(|d| d.get(..4))
        .and_then(|y| y.parse().ok())
        .unwrap_or(0)
}

/// Strip the `<p>`-style markup TVmaze embeds in summaries.
fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.trim().to_string()
}

#[async_trait]
impl MetadataClient for TvmazeClient {
    fn name(&self) -> &str {
        "tvmaze"
    }

    async fn search_movie(
        &self,
        _title: &str,
        _year: i32,
    ) -> Result<Vec<MovieResult>, MetadataError> {
        Err(MetadataError::Unsupported("movie searches"))
    }

    async fn search_tv_show(&self, title: &str) -> Result<Vec<TvShowResult>, MetadataError> {
        let path = format!("/singlesearch/shows?q={}", urlencoding::encode(title));
        let Some(show) = self.get_json::<TvmazeShow>(&path).await? else {
            return Ok(Vec::new());
        };

        let episodes: Vec<TvmazeEpisode> = self
            .get_json(&format!("/shows/{}/episodes", show.id))
            .await?
            .unwrap_or_default();

        let mut seasons: BTreeMap<u32, Vec<EpisodeInfo>> = BTreeMap::new();
        for episode in episodes {
            let Some(number) = episode.number else {
                continue; // specials carry no episode number
            };
            seasons.entry(episode.season).or_default().push(EpisodeInfo {
                number,
                title: episode.name.unwrap_or_default(),
                air_date: episode.airdate.filter(|d| !d.is_empty()),
            });
        }
        for episodes in seasons.values_mut() {
            episodes.sort_by_key(|e| e.number);
        }

        debug!(show = %show.name, seasons = seasons.len(), "TVmaze show resolved");

        Ok(vec![TvShowResult {
            id: show.id.to_string(),
            title: show.name,
            year: year_from_date(show.premiered.as_deref()),
            overview: show.summary.as_deref().map(strip_tags).unwrap_or_default(),
            poster_url: show.image.and_then(|i| i.original).unwrap_or_default(),
            rating: show.rating.average.unwrap_or(0.0),
            status: show.status.unwrap_or_default().to_lowercase(),
            seasons,
        }])
    }
}
