//! Non-fatal failures surfaced to the policy layer.

use feedwatch_common::protocol::StreamId;
use tokio::sync::mpsc;

/// Events the hosting view reacts to (banner, placeholder, retry button).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The player bound to `container` reported a decoder error.
    PlaybackFailed { container: String, message: String },
    /// Conversion for `stream` could not start or stop; it is `Inactive` again.
    ConversionFailed { stream: StreamId, message: String },
}

pub type EventSender = mpsc::UnboundedSender<SessionEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
