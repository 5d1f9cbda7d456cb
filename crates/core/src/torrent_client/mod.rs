//! Download client abstraction.
//!
//! This module provides a `DownloadClient` trait for managing torrents across
//! various backends (qBittorrent, Transmission).

mod qbittorrent;
mod transmission;
mod types;

pub use qbittorrent::QBittorrentClient;
pub use transmission::TransmissionClient;
pub use types::*;
