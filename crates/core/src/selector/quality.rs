//! Quality tables: resolution ranks, synonyms, and the keyword score table.

/// Resolutions checked against release titles, highest first.
pub const SUPPORTED_RESOLUTIONS: [&str; 6] = ["2160p", "1440p", "1080p", "720p", "480p", "360p"];

/// Rank of a resolution inside the quality window. Higher is better.
pub fn resolution_rank(resolution: &str) -> Option<i32> {
    match resolution {
        "360p" => Some(0),
        "480p" => Some(1),
        "720p" => Some(2),
        "1080p" => Some(3),
        "1440p" => Some(4),
        "2160p" => Some(5),
        "4320p" => Some(6),
        _ => None,
    }
}

fn resolution_synonyms(resolution: &str) -> &'static [&'static str] {
    match resolution {
        "4320p" => &["4320p", "8k"],
        "2160p" => &["2160p", "4k", "uhd"],
        "1440p" => &["1440p", "2k"],
        "1080p" => &["1080p", "fhd"],
        "720p" => &["720p", "hd", "hdtv", "xvid"],
        "480p" => &["480p", "576p", "sd", "msd", "dvdrip", "ntsc", "pal"],
        "360p" => &["360p"],
        _ => &[],
    }
}

/// Find the resolution advertised in a title and return its rank.
///
/// Walks resolutions from highest to lowest so the best match wins; titles
/// with no recognisable resolution return `None` and get filtered out.
pub fn detect_resolution_rank(title: &str) -> Option<i32> {
    let lower = title.to_lowercase();
    for resolution in SUPPORTED_RESOLUTIONS {
        for synonym in resolution_synonyms(resolution) {
            if lower.contains(synonym) {
                return resolution_rank(resolution);
            }
        }
    }
    None
}

/// Keyword weights accumulated into the release score by substring match.
const QUALITY_SCORES: &[(&str, i64)] = &[
    // Resolution
    ("4k", 8),
    ("2160p", 8),
    ("uhd", 8),
    ("1440p", 6),
    ("2k", 6),
    ("1080p", 5),
    ("fhd", 5),
    ("720p", 4),
    ("hd", 4),
    ("480p", 3),
    ("sd", 2),
    ("360p", 1),
    ("xvid", 1),
    // Source quality
    ("remux", 10),
    ("bluray", 8),
    ("blu-ray", 8),
    ("bdrip", 8),
    ("brrip", 6),
    ("webdl", 7),
    ("web-dl", 7),
    ("web", 6),
    ("webrip", 5),
    ("hdtv", 4),
    ("dvdrip", 3),
    ("cam", 1),
    ("ts", 1),
    // Codec
    ("av1", 5),
    ("x265", 3),
    ("h265", 3),
    ("hevc", 3),
    ("x264", 2),
    ("h264", 2),
    ("avc", 2),
    // Audio
    ("atmos", 3),
    ("truehd", 3),
    ("dts-hd", 3),
    ("dts-x", 3),
    ("dts", 2),
    ("ac3", 1),
    ("aac", 1),
    // Special
    ("repack", 1),
    ("proper", 1),
    ("extended", 1),
    ("uncut", 1),
    ("directors", 1),
    ("hdr", 2),
    ("hdr10", 2),
    ("dolbyvision", 3),
    ("dv", 3),
    ("imax", 2),
];

/// Sum of all keyword weights found in the title.
pub fn quality_score(title: &str) -> i64 {
    let lower = title.to_lowercase();
    QUALITY_SCORES
        .iter()
        .filter(|(keyword, _)| lower.contains(keyword))
        .map(|(_, weight)| weight)
        .sum()
}

/// Human-readable quality token used by the renamer: the first resolution
/// found in the torrent name, falling back to the source tier.
pub fn parse_quality_label(torrent_name: &str) -> &'static str {
    let lower = torrent_name.to_lowercase();
    for resolution in SUPPORTED_RESOLUTIONS {
        if lower.contains(resolution) {
            return match resolution {
                "2160p" => "2160p",
                "1440p" => "1440p",
                "1080p" => "1080p",
                "720p" => "720p",
                "480p" => "480p",
                _ => "360p",
            };
        }
    }
    if lower.contains("web-dl") || lower.contains("webdl") {
        return "WEB-DL";
    }
    if lower.contains("bluray") {
        return "BluRay";
    }
    if lower.contains("webrip") {
        return "WEBRip";
    }
    if lower.contains("bdrip") {
        return "BDRip";
    }
    if lower.contains("brrip") {
        return "BRRip";
    }
    if lower.contains("hdtv") {
        return "HDTV";
    }
    if lower.contains("dvdrip") {
        return "DVDRip";
    }
    if lower.contains("xvid") {
        return "Xvid";
    }
    "Unknown"
}
