//! Magnet link helpers and the magnet-to-torrent conversion seam.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MagnetError {
    #[error("timeout reached while fetching metadata for magnet")]
    Timeout,

    #[error("magnet conversion unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Failed(String),
}

/// Extract the btih info-hash from a magnet URI, lowercased.
///
/// Example: `magnet:?xt=urn:btih:HASH&dn=...` yields `hash`.
pub fn parse_info_hash(magnet_uri: &str) -> Option<String> {
    let lower = magnet_uri.to_lowercase();
    let start = lower.find("btih:")? + "btih:".len();
    let rest = &lower[start..];
    let hash = match rest.find('&') {
        Some(end) => &rest[..end],
        None => rest,
    };
    if hash.is_empty() {
        return None;
    }
    Some(hash.to_string())
}

/// Resolves a magnet URI into the bytes of a .torrent file.
///
/// Conversion needs a DHT-capable peer, which lives outside the core;
/// callers must fall back to handing the raw magnet to the download client
/// when conversion errors or times out.
#[async_trait]
pub trait MagnetConverter: Send + Sync {
    async fn fetch_metainfo(
        &self,
        magnet_uri: &str,
        timeout: Duration,
    ) -> Result<Vec<u8>, MagnetError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_info_hash_with_trailing_params() {
        let hash = parse_info_hash("magnet:?xt=urn:btih:CAFE1234&dn=My.Show&tr=udp://t");
        assert_eq!(hash.as_deref(), Some("cafe1234"));
    }

    #[test]
    fn test_parse_info_hash_without_trailing_params() {
        let hash = parse_info_hash("magnet:?xt=urn:btih:cafe1234");
        assert_eq!(hash.as_deref(), Some("cafe1234"));
    }

    #[test]
    fn test_parse_info_hash_missing() {
        assert!(parse_info_hash("https://example.org/file.torrent").is_none());
        assert!(parse_info_hash("magnet:?xt=urn:btih:&dn=x").is_none());
    }
}
