//! Error types for the live-session engine.
//!
//! Every failure stays local to the operation that produced it; nothing
//! here is fatal to the session.

use feedwatch_common::protocol::StreamId;

use crate::conversion::ConversionState;
use crate::viewport::ViewportId;

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

/// A backend round-trip failed.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Transport failure or timeout
    #[error("request to {endpoint} failed: {source}")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// The backend answered with a non-success status
    #[error("{endpoint} returned {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// The response body did not match the expected shape
    #[error("cannot decode {endpoint} response: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
}

impl BackendError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }
}

/// The add-feed form is incomplete. Never sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Both name and source URL are required.")]
    MissingFields,
}

/// Conversion start/stop failed; the controller is back to `Inactive`.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("stream {0} is directly playable and needs no conversion")]
    NotRequired(StreamId),

    #[error("cannot {action} conversion for stream {stream} while {state:?}")]
    InvalidTransition {
        stream: StreamId,
        action: &'static str,
        state: ConversionState,
    },

    #[error("stream {0} is no longer known to the backend")]
    StreamGone(StreamId),

    #[error("conversion session for stream {0} ended on the backend")]
    SessionLost(StreamId),

    #[error("conversion request for stream {stream} failed: {source}")]
    Backend {
        stream: StreamId,
        #[source]
        source: BackendError,
    },
}

impl ConversionError {
    pub fn stream(&self) -> &StreamId {
        match self {
            Self::NotRequired(stream) | Self::StreamGone(stream) | Self::SessionLost(stream) => {
                stream
            }
            Self::InvalidTransition { stream, .. } | Self::Backend { stream, .. } => stream,
        }
    }
}

/// The player engine rejected an operation or reported a decoder error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlaybackError {
    #[error("player engine error: {0}")]
    Engine(String),

    #[error("adapter for {0} is not mounted")]
    NotMounted(String),

    #[error("adapter for {0} has been disposed")]
    Disposed(String),
}

/// Viewport assignment failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocationError {
    /// The stream is already shown in another viewport.
    #[error("stream {stream} is already assigned to viewport {held_by}")]
    Conflict { stream: StreamId, held_by: ViewportId },

    #[error("viewport {viewport} already shows stream {stream}")]
    Occupied { viewport: ViewportId, stream: StreamId },

    #[error("no viewport {0}")]
    UnknownViewport(ViewportId),

    #[error("stream {0} is not in the directory")]
    UnknownStream(StreamId),
}

/// Umbrella error for [`crate::session::Session`] operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),

    #[error(transparent)]
    Allocation(#[from] AllocationError),

    #[error("session is not running")]
    Stopped,
}
