//! Source classification and MIME inference for playback URLs.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Schemes a player cannot open directly; they go through the relay.
const CONVERSION_SCHEMES: &[&str] = &["rtsp://", "rtsps://", "rtmp://"];

/// Whether a stream's origin can be handed to the player as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Direct,
    NeedsConversion,
}

pub fn classify_source(source: &str) -> SourceKind {
    let lower = source.trim().to_ascii_lowercase();
    if CONVERSION_SCHEMES.iter().any(|s| lower.starts_with(s)) {
        SourceKind::NeedsConversion
    } else {
        SourceKind::Direct
    }
}

/// MIME type handed to the player alongside a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MimeType {
    /// Adaptive streaming playlist.
    #[serde(rename = "application/x-mpegURL")]
    Hls,
    /// Progressive download.
    #[serde(rename = "video/mp4")]
    Mp4,
}

impl MimeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hls => "application/x-mpegURL",
            Self::Mp4 => "video/mp4",
        }
    }

    /// Infer from the URL suffix: `.m3u8` playlists are adaptive, anything
    /// else is treated as progressive. Query string and fragment are ignored.
    pub fn infer(url: &str) -> Self {
        let path = url
            .split(|c: char| c == '?' || c == '#')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        if path.ends_with(".m3u8") {
            Self::Hls
        } else {
            Self::Mp4
        }
    }
}

impl fmt::Display for MimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
