//! Wire types exchanged with the stream backend.
//!
//! Routes consumed by the client:
//!   GET  /api/streams        → `Vec<Stream>`
//!   POST /api/streams        → `NewStream` in, `Stream` out
//!   POST /api/play/{id}      → `PlayResponse`
//!   POST /api/stop/{id}      → empty body

use std::fmt;

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::media::{self, SourceKind};

/// Backend timestamp format for `last_update`.
const LAST_UPDATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Stable identity of a stream for the whole session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(String);

impl StreamId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StreamId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Backend-reported stream status.
///
/// The backend uses a handful of spellings for the same condition; they are
/// folded here so the client only deals with four states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamStatus {
    #[serde(alias = "Streaming", alias = "Converting")]
    Running,
    Starting,
    #[serde(alias = "Stopped")]
    Idle,
    Error,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Running => "Running",
            Self::Starting => "Starting",
            Self::Idle => "Idle",
            Self::Error => "Error",
            Self::Unknown => "Unknown",
        };
        f.write_str(label)
    }
}

/// One monitored video feed plus its detection metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stream {
    pub id: StreamId,
    pub name: String,
    pub source: String,
    pub status: StreamStatus,
    #[serde(default)]
    pub detections: u64,
    /// Oldest first, as appended by the backend.
    #[serde(default)]
    pub alerts: Vec<String>,
    #[serde(default)]
    pub last_update: String,
    /// Ready-to-play endpoint, present only while a playable session exists.
    #[serde(rename = "hls_url", default, skip_serializing_if = "Option::is_none")]
    pub playback_url: Option<String>,
}

impl Stream {
    pub fn source_kind(&self) -> SourceKind {
        media::classify_source(&self.source)
    }

    /// Parsed `last_update`, accepting the backend format or RFC 3339.
    pub fn last_update_at(&self) -> Option<NaiveDateTime> {
        let raw = self.last_update.trim();
        NaiveDateTime::parse_from_str(raw, LAST_UPDATE_FORMAT)
            .ok()
            .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.naive_local()))
    }
}

/// Body of `POST /api/streams`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStream {
    pub name: String,
    pub source: String,
}

/// Response of `POST /api/play/{id}`.
///
/// `hls_url` may still be null while the relay spins up; the URL then shows
/// up in a later directory poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayResponse {
    #[serde(default)]
    pub hls_url: Option<String>,
}
