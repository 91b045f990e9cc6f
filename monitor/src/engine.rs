//! Headless player engine: sessions only log what they would render.

use tracing::{debug, info};

use feedwatch_client::error::PlaybackError;
use feedwatch_client::playback::{ErrorSink, MediaSource, PlayerConfig, PlayerEngine, PlayerSession};

pub struct LoggingEngine;

struct LoggingSession {
    container: String,
}

fn describe(sources: &[MediaSource]) -> String {
    sources
        .iter()
        .map(|s| format!("{} ({})", s.url, s.mime_type))
        .collect::<Vec<_>>()
        .join(", ")
}

impl PlayerEngine for LoggingEngine {
    fn create(
        &self,
        container: &str,
        config: &PlayerConfig,
        _errors: ErrorSink,
    ) -> Result<Box<dyn PlayerSession>, PlaybackError> {
        info!(
            "[{container}] player up: {} (autoplay={}, controls={})",
            describe(&config.sources),
            config.autoplay,
            config.controls
        );
        Ok(Box::new(LoggingSession {
            container: container.to_string(),
        }))
    }
}

impl PlayerSession for LoggingSession {
    fn set_source(&mut self, _autoplay: bool, sources: &[MediaSource]) -> Result<(), PlaybackError> {
        info!("[{}] source -> {}", self.container, describe(sources));
        Ok(())
    }

    fn dispose(self: Box<Self>) {
        debug!("[{}] player disposed", self.container);
    }
}

#[cfg(test)]
mod tests {
    use feedwatch_client::playback::PlayerOptions;
    use feedwatch_common::media::MimeType;

    use super::*;

    #[test]
    fn test_describe_sources() {
        let sources = [
            MediaSource::new("http://relay/1.m3u8", MimeType::Hls),
            MediaSource::new("cam.mp4", MimeType::Mp4),
        ];
        assert_eq!(
            describe(&sources),
            "http://relay/1.m3u8 (application/x-mpegURL), cam.mp4 (video/mp4)"
        );
    }

    #[test]
    fn test_config_sources_are_described() {
        let config = PlayerConfig::new(
            PlayerOptions::default(),
            vec![MediaSource::infer("cam.mp4")],
        );
        assert_eq!(describe(&config.sources), "cam.mp4 (video/mp4)");
    }
}
