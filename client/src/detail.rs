//! Single-stream detail view: one player plus start/stop conversion controls.

use std::sync::Arc;

use tracing::{debug, info};

use feedwatch_common::media::{MimeType, SourceKind};
use feedwatch_common::protocol::{Stream, StreamId};

use crate::backend::Backend;
use crate::conversion::{ConversionController, ConversionState};
use crate::directory::DirectoryState;
use crate::error::{ConversionError, PlaybackError, SessionError};
use crate::event::{EventSender, SessionEvent};
use crate::playback::{MediaSource, PlaybackAdapter, PlayerEngine, PlayerOptions};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetailPlayback {
    Playing(MediaSource),
    /// Conversion requested, no URL yet.
    Starting,
    /// Nothing plays; converted streams offer a start button here.
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetailView {
    Loading,
    NotFound,
    Ready {
        stream: Stream,
        playback: DetailPlayback,
    },
}

pub struct StreamDetail {
    stream: StreamId,
    player: PlaybackAdapter,
    conversion: Option<ConversionController>,
    events: EventSender,
}

impl StreamDetail {
    /// Mount a player for `stream` in the `detail-{id}` container.
    pub fn open(
        stream: StreamId,
        engine: Arc<dyn PlayerEngine>,
        options: PlayerOptions,
        events: EventSender,
    ) -> Result<Self, PlaybackError> {
        let mut player = PlaybackAdapter::new(engine, options, events.clone());
        player.mount(format!("detail-{stream}"))?;
        info!("Detail view opened for stream {stream}");
        Ok(Self {
            stream,
            player,
            conversion: None,
            events,
        })
    }

    pub fn stream(&self) -> &StreamId {
        &self.stream
    }

    pub fn conversion(&self) -> Option<&ConversionController> {
        self.conversion.as_ref()
    }

    /// Reconcile the player with `state` and describe what to show.
    pub fn render(&mut self, state: &DirectoryState) -> DetailView {
        if state.streams.is_none() {
            return DetailView::Loading;
        }
        let Some(stream) = state.find(&self.stream).cloned() else {
            self.observe(None);
            self.player.clear_source();
            return DetailView::NotFound;
        };

        let playback = match stream.source_kind() {
            SourceKind::Direct => {
                if let Some(c) = self.conversion.take() {
                    debug!("Stream {} became directly playable ({:?})", self.stream, c.state());
                }
                // Failures already went out as a playback event.
                let _ = self
                    .player
                    .set_source(&stream.source, MimeType::infer(&stream.source));
                self.current_playback()
            }
            SourceKind::NeedsConversion => {
                if self.conversion.is_none() {
                    self.player.clear_source();
                    self.conversion = Some(ConversionController::new(stream.id.clone()));
                }
                self.observe(Some(&stream));
                self.conversion_playback()
            }
        };
        DetailView::Ready { stream, playback }
    }

    fn observe(&mut self, stream: Option<&Stream>) {
        let Some(controller) = self.conversion.as_mut() else {
            return;
        };
        match controller.observe(stream) {
            Ok(_) => {
                // Also re-attaches a player cleared while the stream was
                // missing from the directory; an unchanged source is a no-op.
                let url = controller.playback_url().map(str::to_string);
                if let (Some(url), Some(_)) = (url, stream) {
                    let _ = self.player.set_source(&url, MimeType::infer(&url));
                }
            }
            Err(e) => {
                self.player.clear_source();
                let _ = self.events.send(SessionEvent::ConversionFailed {
                    stream: self.stream.clone(),
                    message: e.to_string(),
                });
            }
        }
    }

    fn current_playback(&self) -> DetailPlayback {
        match self.player.current_source() {
            Some(source) => DetailPlayback::Playing(source.clone()),
            None => DetailPlayback::Stopped,
        }
    }

    fn conversion_playback(&self) -> DetailPlayback {
        match self.conversion.as_ref().map(|c| c.state()) {
            Some(ConversionState::Starting) => DetailPlayback::Starting,
            Some(ConversionState::Active { .. }) => self.current_playback(),
            _ => DetailPlayback::Stopped,
        }
    }

    /// Ask the backend to convert this stream and play the result.
    ///
    /// Only available once [`Self::render`] has seen a converted source.
    pub async fn start_conversion(&mut self, backend: &dyn Backend) -> Result<(), SessionError> {
        let controller = self
            .conversion
            .as_mut()
            .ok_or_else(|| ConversionError::NotRequired(self.stream.clone()))?;
        controller.start(backend).await?;
        if let Some(url) = controller.playback_url() {
            self.player.set_source(url, MimeType::infer(url))?;
        }
        Ok(())
    }

    /// Dispose the player, then stop the backend conversion.
    pub async fn stop_conversion(&mut self, backend: &dyn Backend) -> Result<(), SessionError> {
        let controller = self
            .conversion
            .as_mut()
            .ok_or_else(|| ConversionError::NotRequired(self.stream.clone()))?;
        controller.stop(backend, &mut self.player).await?;
        Ok(())
    }

    /// Release the player. A running conversion is left to the backend.
    pub fn close(mut self) {
        if let Some(c) = &self.conversion {
            if c.state() != &ConversionState::Inactive {
                debug!("Detail view for {} closed with conversion {:?}", self.stream, c.state());
            }
        }
        self.player.unmount();
    }
}
