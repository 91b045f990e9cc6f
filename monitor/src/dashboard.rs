//! Text rendering of the dashboard, alert feed and viewport grid.

use feedwatch_client::alerts::AlertEntry;
use feedwatch_client::directory::DirectoryState;
use feedwatch_client::layout::ViewportView;
use feedwatch_client::viewport::ViewportId;
use feedwatch_common::protocol::{Stream, StreamStatus};

const NAME_LIMIT: usize = 20;

/// Stream name cut to [`NAME_LIMIT`] characters, with "..." when cut.
pub fn display_name(name: &str) -> String {
    if name.chars().count() > NAME_LIMIT {
        let cut: String = name.chars().take(NAME_LIMIT).collect();
        format!("{cut}...")
    } else {
        name.to_string()
    }
}

fn status_label(status: StreamStatus) -> StreamStatus {
    match status {
        StreamStatus::Unknown => StreamStatus::Idle,
        other => other,
    }
}

pub fn stream_card(stream: &Stream) -> String {
    let updated = stream
        .last_update_at()
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string());
    format!(
        "{:<23} {:<8} detections={:<5} alerts={:<3} updated={updated}",
        display_name(&stream.name),
        status_label(stream.status).to_string(),
        stream.detections,
        stream.alerts.len(),
    )
}

/// Dashboard lines for one directory state: banner, stream cards, then at
/// most `alert_limit` alerts.
pub fn render(state: &DirectoryState, alerts: &[AlertEntry], alert_limit: usize) -> Vec<String> {
    let mut lines = Vec::new();

    match (&state.streams, &state.last_error) {
        (None, None) => {
            lines.push("Loading streams...".to_string());
            return lines;
        }
        (None, Some(err)) => {
            lines.push(format!("Cannot load streams: {err}"));
            return lines;
        }
        (Some(_), Some(err)) => {
            lines.push(format!("Backend unreachable, showing last known data: {err}"));
        }
        (Some(_), None) => {}
    }

    let streams = state.snapshot();
    if streams.is_empty() {
        lines.push("No active feeds".to_string());
    } else {
        lines.push(format!("Streams ({})", streams.len()));
        lines.extend(streams.iter().map(|s| format!("  {}", stream_card(s))));
    }

    if alerts.is_empty() {
        lines.push("No alerts".to_string());
    } else {
        lines.push(format!("Alerts ({})", alerts.len()));
        lines.extend(
            alerts
                .iter()
                .take(alert_limit)
                .map(|a| format!("  [{}] {}", display_name(&a.stream_name), a.message)),
        );
        if alerts.len() > alert_limit {
            lines.push(format!("  ... {} older", alerts.len() - alert_limit));
        }
    }
    lines
}

pub fn viewport_line(viewport: ViewportId, view: &ViewportView) -> String {
    match view {
        ViewportView::Empty => format!("{viewport} empty"),
        ViewportView::Starting { stream } => format!("{viewport} stream {stream}: starting conversion"),
        ViewportView::Playing { stream, source } => format!(
            "{viewport} stream {stream}: playing {} ({})",
            source.url, source.mime_type
        ),
        ViewportView::Unavailable { stream } => {
            format!("{viewport} stream {stream}: unavailable (release or retry)")
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use feedwatch_client::playback::MediaSource;
    use feedwatch_common::protocol::StreamId;

    use super::*;

    fn stream(id: &str, name: &str) -> Stream {
        Stream {
            id: StreamId::from(id),
            name: name.to_string(),
            source: "cam.mp4".to_string(),
            status: StreamStatus::Running,
            detections: 3,
            alerts: vec!["crack detected".to_string()],
            last_update: "2024-06-15 10:30:00".to_string(),
            playback_url: None,
        }
    }

    fn loaded(streams: Vec<Stream>, last_error: Option<&str>) -> DirectoryState {
        DirectoryState {
            streams: Some(Arc::from(streams)),
            last_error: last_error.map(str::to_string),
            applied_seq: 1,
        }
    }

    fn alert(n: usize) -> AlertEntry {
        AlertEntry {
            stream_id: StreamId::from("1"),
            stream_name: "Route 5".to_string(),
            message: format!("alert {n}"),
        }
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("Route 5"), "Route 5");
        assert_eq!(display_name("12345678901234567890"), "12345678901234567890");
        assert_eq!(
            display_name("Highway 101 northbound exit"),
            "Highway 101 northbou..."
        );
    }

    #[test]
    fn test_stream_card() {
        let mut s = stream("1", "Route 5");
        s.status = StreamStatus::Unknown;
        let card = stream_card(&s);
        assert!(card.starts_with("Route 5"));
        assert!(card.contains("Idle"));
        assert!(card.contains("detections=3"));
        assert!(card.contains("alerts=1"));
        assert!(card.ends_with("updated=10:30:00"));
    }

    #[test]
    fn test_loading_and_first_failure() {
        assert_eq!(
            render(&DirectoryState::default(), &[], 20),
            ["Loading streams..."]
        );
        let failed = DirectoryState {
            last_error: Some("timeout".into()),
            ..DirectoryState::default()
        };
        assert_eq!(render(&failed, &[], 20), ["Cannot load streams: timeout"]);
    }

    #[test]
    fn test_empty_directory() {
        let lines = render(&loaded(Vec::new(), None), &[], 20);
        assert_eq!(lines, ["No active feeds", "No alerts"]);
    }

    #[test]
    fn test_stale_banner_keeps_cards() {
        let lines = render(&loaded(vec![stream("1", "Route 5")], Some("refused")), &[], 20);
        assert_eq!(lines[0], "Backend unreachable, showing last known data: refused");
        assert_eq!(lines[1], "Streams (1)");
        assert!(lines[2].contains("Route 5"));
    }

    #[test]
    fn test_alert_feed_is_bounded() {
        let alerts: Vec<AlertEntry> = (0..5).map(alert).collect();
        let lines = render(&loaded(vec![stream("1", "Route 5")], None), &alerts, 2);
        let feed: Vec<&str> = lines
            .iter()
            .skip_while(|l| !l.starts_with("Alerts"))
            .map(String::as_str)
            .collect();
        assert_eq!(
            feed,
            [
                "Alerts (5)",
                "  [Route 5] alert 0",
                "  [Route 5] alert 1",
                "  ... 3 older"
            ]
        );
    }

    #[test]
    fn test_viewport_lines() {
        assert_eq!(viewport_line(ViewportId(0), &ViewportView::Empty), "#0 empty");
        let playing = ViewportView::Playing {
            stream: StreamId::from("2"),
            source: MediaSource::infer("http://relay/2.m3u8"),
        };
        assert_eq!(
            viewport_line(ViewportId(1), &playing),
            "#1 stream 2: playing http://relay/2.m3u8 (application/x-mpegURL)"
        );
    }
}
