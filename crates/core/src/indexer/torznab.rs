//! Torznab search backend (Jackett, Prowlarr, and compatible aggregators).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{Indexer, IndexerError, Release, SearchMode};

/// Torznab API client. One instance per configured endpoint; the endpoint
/// URL points at the indexer's torznab root (e.g.
/// `http://localhost:9117/api/v2.0/indexers/rarbg/results/torznab`).
pub struct TorznabIndexer {
    client: Client,
    base_url: String,
    api_key: String,
    name: String,
}

impl TorznabIndexer {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client with static settings");

        // The last path segment names the indexer; good enough for logs.
        let name = base_url
            .trim_end_matches('/')
            .rsplit('/')
            .find(|s| !s.is_empty() && *s != "torznab" && *s != "results" && *s != "api")
            .unwrap_or("torznab")
            .to_string();

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            name,
        }
    }

    fn build_url(&self, params: &[(&str, &str)]) -> String {
        let mut url = format!(
            "{}?apikey={}",
            self.base_url,
            urlencoding::encode(&self.api_key)
        );
        for (key, value) in params {
            url.push('&');
            url.push_str(key);
            url.push('=');
            url.push_str(&urlencoding::encode(value));
        }
        url
    }

    async fn fetch(&self, params: &[(&str, &str)]) -> Result<Vec<Release>, IndexerError> {
        let url = self.build_url(params);
        debug!(indexer = %self.name, "Searching torznab");

        let response = self.client.get(&url).send().await.map_err(request_err)?;

        if !response.status().is_success() {
            return Err(IndexerError::ApiError(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| IndexerError::ApiError(e.to_string()))?;

        let feed: TorznabFeed =
            quick_xml::de::from_str(&body).map_err(|e| IndexerError::Parse(e.to_string()))?;

        let releases = feed
            .channel
            .items
            .into_iter()
            .map(|item| {
                let seeders = item.int_attr("seeders");
                let peers = item.int_attr("peers");
                let download_url = item
                    .magnet_attr()
                    .or_else(|| item.link.clone())
                    .unwrap_or_default();
                let publish_date = item.pub_date.as_deref().and_then(parse_pub_date);
                Release {
                    title: item.title,
                    size: item.size.unwrap_or(0).max(0) as u64,
                    seeders: seeders.max(0) as u32,
                    leechers: peers.saturating_sub(seeders).max(0) as u32,
                    download_url,
                    publish_date,
                    indexer: self.name.clone(),
                    score: 0,
                }
            })
            .collect();

        Ok(releases)
    }
}

fn request_err(e: reqwest::Error) -> IndexerError {
    if e.is_timeout() {
        IndexerError::Timeout
    } else if e.is_connect() {
        IndexerError::ConnectionFailed(e.to_string())
    } else {
        IndexerError::ApiError(e.to_string())
    }
}

fn parse_pub_date(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| {
            DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        })
}

#[async_trait]
impl Indexer for TorznabIndexer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search_movies(
        &self,
        query: &str,
        tmdb_id: &str,
        mode: SearchMode,
    ) -> Result<Vec<Release>, IndexerError> {
        match mode {
            SearchMode::MovieSearch => {
                let mut params = vec![("t", "movie"), ("q", query)];
                if !tmdb_id.is_empty() {
                    params.push(("tmdbid", tmdb_id));
                }
                self.fetch(&params).await
            }
            _ => self.fetch(&[("t", "search"), ("q", query)]).await,
        }
    }

    async fn search_tv_shows(
        &self,
        query: &str,
        season: u32,
        episode: u32,
        mode: SearchMode,
    ) -> Result<Vec<Release>, IndexerError> {
        match mode {
            SearchMode::TvSearch => {
                let season_str = season.to_string();
                let episode_str = episode.to_string();
                let mut params = vec![("t", "tvsearch"), ("q", query)];
                if season > 0 {
                    params.push(("season", season_str.as_str()));
                }
                if episode > 0 {
                    params.push(("ep", episode_str.as_str()));
                }
                self.fetch(&params).await
            }
            // Free-text: the caller already folded SxxEyy into the query.
            _ => self.fetch(&[("t", "search"), ("q", query)]).await,
        }
    }

    async fn health_check(&self) -> Result<bool, IndexerError> {
        let url = self.build_url(&[("t", "caps")]);
        let response = self.client.get(&url).send().await.map_err(request_err)?;
        Ok(response.status().is_success())
    }
}

// Torznab feed structures. The attr elements carry the prefix in their
// qualified name, which is how quick-xml sees them.
#[derive(Debug, Deserialize)]
struct TorznabFeed {
    channel: TorznabChannel,
}

#[derive(Debug, Deserialize)]
struct TorznabChannel {
    #[serde(rename = "item", default)]
    items: Vec<TorznabItem>,
}

#[derive(Debug, Deserialize)]
struct TorznabItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: Option<String>,
    #[serde(rename = "pubDate", default)]
    pub_date: Option<String>,
    #[serde(default)]
    size: Option<i64>,
    #[serde(rename = "torznab:attr", default)]
    attrs: Vec<TorznabAttr>,
}

#[derive(Debug, Deserialize)]
struct TorznabAttr {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@value")]
    value: String,
}

impl TorznabItem {
    fn int_attr(&self, name: &str) -> i64 {
        self.attrs
            .iter()
            .find(|a| a.name == name)
            .and_then(|a| a.value.parse().ok())
            .unwrap_or(0)
    }

    fn magnet_attr(&self) -> Option<String> {
        self.attrs
            .iter()
            .find(|a| a.name == "magneturl")
            .map(|a| a.value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:torznab="http://torznab.com/schemas/2015/feed">
  <channel>
    <title>rarbg</title>
    <item>
      <title>My Show S02E05 1080p WEB-DL</title>
      <link>http://localhost:9117/dl/1</link>
      <pubDate>Mon, 02 Jan 2023 15:04:05 +0000</pubDate>
      <size>1073741824</size>
      <torznab:attr name="seeders" value="50" />
      <torznab:attr name="peers" value="62" />
    </item>
    <item>
      <title>My Show S02E05 720p HDTV</title>
      <link>http://localhost:9117/dl/2</link>
      <size>536870912</size>
      <torznab:attr name="seeders" value="12" />
      <torznab:attr name="peers" value="15" />
      <torznab:attr name="magneturl" value="magnet:?xt=urn:btih:cafe1234" />
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_parse_torznab_feed() {
        let feed: TorznabFeed = quick_xml::de::from_str(SAMPLE_FEED).unwrap();
        assert_eq!(feed.channel.items.len(), 2);

        let first = &feed.channel.items[0];
        assert_eq!(first.title, "My Show S02E05 1080p WEB-DL");
        assert_eq!(first.size, Some(1073741824));
        assert_eq!(first.int_attr("seeders"), 50);
        assert_eq!(first.int_attr("peers"), 62);
        assert!(first.magnet_attr().is_none());

        let second = &feed.channel.items[1];
        assert_eq!(
            second.magnet_attr().as_deref(),
            Some("magnet:?xt=urn:btih:cafe1234")
        );
    }

    #[test]
    fn test_parse_feed_without_items() {
        let xml = r#"<rss><channel><title>empty</title></channel></rss>"#;
        let feed: TorznabFeed = quick_xml::de::from_str(xml).unwrap();
        assert!(feed.channel.items.is_empty());
    }

    #[test]
    fn test_parse_pub_date_formats() {
        assert!(parse_pub_date("Mon, 02 Jan 2023 15:04:05 +0000").is_some());
        assert!(parse_pub_date("2023-01-02T15:04:05Z").is_some());
        assert!(parse_pub_date("not a date").is_none());
    }

    #[test]
    fn test_missing_attr_defaults_to_zero() {
        let item = TorznabItem {
            title: "x".into(),
            link: None,
            pub_date: None,
            size: None,
            attrs: Vec::new(),
        };
        assert_eq!(item.int_attr("seeders"), 0);
    }

    #[test]
    fn test_build_url_encodes_params() {
        let indexer = TorznabIndexer::new(
            "http://localhost:9117/api/v2.0/indexers/rarbg/results/torznab/",
            "secret key",
            Duration::from_secs(30),
        );
        let url = indexer.build_url(&[("t", "search"), ("q", "my show S02E05")]);
        assert!(url.starts_with(
            "http://localhost:9117/api/v2.0/indexers/rarbg/results/torznab?apikey=secret%20key"
        ));
        assert!(url.contains("q=my%20show%20S02E05"));
    }

    #[test]
    fn test_indexer_name_from_url() {
        let indexer = TorznabIndexer::new(
            "http://localhost:9117/api/v2.0/indexers/rarbg/results/torznab",
            "k",
            Duration::from_secs(30),
        );
        assert_eq!(indexer.name(), "rarbg");
    }
}
