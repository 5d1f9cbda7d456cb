//! Read-only RSS feed indexer.
//!
//! RSS sources carry no seeder information; their items are matched against
//! the library by title only.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{Indexer, IndexerError, Release, SearchMode};

pub struct RssIndexer {
    client: Client,
    url: String,
}

impl RssIndexer {
    pub fn new(url: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client with static settings");

        Self {
            client,
            url: url.to_string(),
        }
    }

    /// Fetch and parse the whole feed.
    pub async fn fetch_items(&self) -> Result<Vec<Release>, IndexerError> {
        debug!(url = %self.url, "Fetching RSS feed");

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    IndexerError::Timeout
                } else if e.is_connect() {
                    IndexerError::ConnectionFailed(e.to_string())
                } else {
                    IndexerError::ApiError(e.to_string())
                }
            })?;

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

        parse_feed(&body)
    }

    async fn filter_by_query(&self, query: &str) -> Result<Vec<Release>, IndexerError> {
        let items = self.fetch_items().await?;
        let query_lower = query.to_lowercase();
        Ok(items
            .into_iter()
            .filter(|r| r.title.to_lowercase().contains(&query_lower))
            .collect())
    }
}

fn parse_feed(body: &str) -> Result<Vec<Release>, IndexerError> {
    let feed: RssFeed =
        quick_xml::de::from_str(body).map_err(|e| IndexerError::Parse(e.to_string()))?;

    Ok(feed
        .channel
        .items
        .into_iter()
        .map(|item| {
            let publish_date = item
                .pub_date
                .as_deref()
                .and_then(|s| chrono::DateTime::parse_from_rfc2822(s).ok())
                .map(|dt| dt.with_timezone(&chrono::Utc));
            Release {
                title: item.title,
                size: 0,
                seeders: 0,
                leechers: 0,
                download_url: item.link.unwrap_or_default(),
                publish_date,
                indexer: "RSS".to_string(),
                score: 0,
            }
        })
        .collect())
}

#[async_trait]
impl Indexer for RssIndexer {
    fn name(&self) -> &str {
        "rss"
    }

    async fn search_movies(
        &self,
        query: &str,
        _tmdb_id: &str,
        _mode: SearchMode,
    ) -> Result<Vec<Release>, IndexerError> {
        self.filter_by_query(query).await
    }

    async fn search_tv_shows(
        &self,
        query: &str,
        _season: u32,
        _episode: u32,
        _mode: SearchMode,
    ) -> Result<Vec<Release>, IndexerError> {
        self.filter_by_query(query).await
    }

    async fn health_check(&self) -> Result<bool, IndexerError> {
        Ok(true)
    }
}

#[derive(Debug, Deserialize)]
struct RssFeed {
    channel: RssChannel,
}

#[derive(Debug, Deserialize)]
struct RssChannel {
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: Option<String>,
    #[serde(rename = "pubDate", default)]
    pub_date: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>nyaa</title>
    <item>
      <title>SteinsGate S01E01 1080p</title>
      <link>https://example.org/dl/1.torrent</link>
      <pubDate>Mon, 02 Jan 2023 15:04:05 +0000</pubDate>
    </item>
    <item>
      <title>Other Show S05E09 720p</title>
      <link>https://example.org/dl/2.torrent</link>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_parse_feed() {
        let releases = parse_feed(SAMPLE_FEED).unwrap();
        assert_eq!(releases.len(), 2);
        assert_eq!(releases[0].title, "SteinsGate S01E01 1080p");
        assert_eq!(releases[0].download_url, "https://example.org/dl/1.torrent");
        assert_eq!(releases[0].indexer, "RSS");
        assert_eq!(releases[0].seeders, 0);
        assert!(releases[0].publish_date.is_some());
        assert!(releases[1].publish_date.is_none());
    }

    #[test]
    fn test_parse_invalid_feed() {
        let result = parse_feed("this is not xml");
        assert!(matches!(result, Err(IndexerError::Parse(_))));
    }
}
