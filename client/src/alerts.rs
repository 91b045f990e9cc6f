//! Consolidated alert feed across all streams.

use serde::Serialize;

use feedwatch_common::protocol::{Stream, StreamId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertEntry {
    pub stream_id: StreamId,
    pub stream_name: String,
    pub message: String,
}

/// Flatten every stream's alerts, most recent first.
///
/// Alerts are appended at the end of each stream's list, so the feed is the
/// reverse of the concatenation in stream order. Repeats are kept.
pub fn aggregate(streams: &[Stream]) -> Vec<AlertEntry> {
    let mut feed: Vec<AlertEntry> = streams
        .iter()
        .flat_map(|stream| {
            stream.alerts.iter().map(move |message| AlertEntry {
                stream_id: stream.id.clone(),
                stream_name: stream.name.clone(),
                message: message.clone(),
            })
        })
        .collect();
    feed.reverse();
    feed
}
