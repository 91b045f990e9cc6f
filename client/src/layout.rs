//! Multi-monitor layout: viewport slots, their players and conversions.
//!
//! All methods are synchronous. Anything that needs a backend round-trip is
//! handed back as [`Pending`] work so the owner can run it without holding
//! the layout lock, then feed the outcome back in.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use feedwatch_common::media::{MimeType, SourceKind};
use feedwatch_common::protocol::{PlayResponse, Stream, StreamId};

use crate::conversion::{Attempt, ConversionController, ConversionState};
use crate::error::{AllocationError, BackendError, ConversionError, SessionError};
use crate::event::EventSender;
use crate::playback::{MediaSource, PlaybackAdapter, PlayerEngine, PlayerOptions};
use crate::viewport::{ViewportAllocator, ViewportId};

/// What a viewport currently renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewportView {
    /// Stream picker.
    Empty,
    /// Conversion requested, waiting for a playable URL.
    Starting { stream: StreamId },
    Playing { stream: StreamId, source: MediaSource },
    /// Assigned but nothing plays: conversion failed or the player errored.
    Unavailable { stream: StreamId },
}

/// Backend work produced by a layout transition.
#[derive(Debug)]
pub enum Pending {
    Start { stream: StreamId, attempt: Attempt },
    /// Controller already in `Stopping`; its player is gone.
    Stop { controller: ConversionController },
}

/// What reconciling with a snapshot produced.
#[derive(Debug, Default)]
pub struct SyncOutcome {
    /// Conversions that ended or failed; their viewports show a placeholder.
    pub errors: Vec<ConversionError>,
    /// Backend work for streams whose source switched kind.
    pub pending: Vec<Pending>,
}

pub struct MonitorLayout {
    allocator: ViewportAllocator,
    players: Vec<Option<PlaybackAdapter>>,
    conversions: HashMap<StreamId, ConversionController>,
    engine: Arc<dyn PlayerEngine>,
    options: PlayerOptions,
    events: EventSender,
}

pub fn container_name(viewport: ViewportId) -> String {
    format!("viewport-{}", viewport.0)
}

impl MonitorLayout {
    pub fn new(
        count: usize,
        engine: Arc<dyn PlayerEngine>,
        options: PlayerOptions,
        events: EventSender,
    ) -> Self {
        Self {
            allocator: ViewportAllocator::new(count),
            players: (0..count).map(|_| None).collect(),
            conversions: HashMap::new(),
            engine,
            options,
            events,
        }
    }

    pub fn allocator(&self) -> &ViewportAllocator {
        &self.allocator
    }

    pub fn list_available<'a>(&self, streams: &'a [Stream]) -> Vec<&'a Stream> {
        self.allocator.list_available(streams)
    }

    pub fn conversion(&self, stream: &StreamId) -> Option<&ConversionController> {
        self.conversions.get(stream)
    }

    /// Show `stream` in `viewport`.
    ///
    /// Direct sources start playing immediately; converted sources enter
    /// `Starting` and return the backend request to issue.
    pub fn assign(
        &mut self,
        viewport: ViewportId,
        stream: &Stream,
    ) -> Result<Option<Pending>, SessionError> {
        self.allocator.assign(viewport, stream.id.clone())?;

        let mut player = PlaybackAdapter::new(self.engine.clone(), self.options, self.events.clone());
        player.mount(container_name(viewport))?;
        self.players[viewport.0] = Some(player);

        match stream.source_kind() {
            SourceKind::Direct => {
                // A failing player still leaves the assignment in place; the
                // view shows it as unavailable.
                let _ = self.push_source(viewport, &stream.source);
                Ok(None)
            }
            SourceKind::NeedsConversion => {
                let controller = self
                    .conversions
                    .entry(stream.id.clone())
                    .or_insert_with(|| ConversionController::new(stream.id.clone()));
                let attempt = controller.begin_start()?;
                Ok(Some(Pending::Start {
                    stream: stream.id.clone(),
                    attempt,
                }))
            }
        }
    }

    /// Apply the backend's answer to a start request.
    pub fn finish_start(
        &mut self,
        stream: &StreamId,
        attempt: Attempt,
        result: Result<PlayResponse, BackendError>,
    ) -> Result<(), ConversionError> {
        let Some(controller) = self.conversions.get_mut(stream) else {
            debug!("Start outcome for released stream {stream} dropped");
            return Ok(());
        };
        controller.finish_start(attempt, result)?;
        let url = controller.playback_url().map(str::to_string);
        if let Some(url) = url {
            if let Some(viewport) = self.allocator.holder(stream) {
                let _ = self.push_source(viewport, &url);
            }
        }
        Ok(())
    }

    /// Restart a failed conversion in `viewport`.
    pub fn retry(&mut self, viewport: ViewportId) -> Result<Option<Pending>, SessionError> {
        let stream = self
            .allocator
            .assigned(viewport)
            .cloned()
            .ok_or(AllocationError::UnknownViewport(viewport))?;
        match self.conversions.get_mut(&stream) {
            Some(controller) => {
                let attempt = controller.begin_start()?;
                Ok(Some(Pending::Start { stream, attempt }))
            }
            None => Ok(None),
        }
    }

    /// Empty `viewport`: its player is disposed before this returns, and a
    /// running conversion is handed back to be stopped.
    pub fn release(&mut self, viewport: ViewportId) -> Result<Option<Pending>, AllocationError> {
        let Some(stream) = self.allocator.release(viewport)? else {
            return Ok(None);
        };
        if let Some(mut player) = self.players[viewport.0].take() {
            player.unmount();
        }
        info!("Viewport {viewport} released stream {stream}");
        Ok(self.detach_conversion(&stream))
    }

    fn detach_conversion(&mut self, stream: &StreamId) -> Option<Pending> {
        let mut controller = self.conversions.remove(stream)?;
        match controller.begin_stop() {
            Ok(()) => Some(Pending::Stop { controller }),
            // Already inactive, nothing to tell the backend.
            Err(_) => None,
        }
    }

    /// Reconcile assigned viewports with a fresh snapshot.
    ///
    /// Conversions waiting for a URL pick it up here, and changed URLs are
    /// pushed to the existing players in place. A stream whose source
    /// switched between direct and converted has its old playback torn down
    /// and the new one started.
    pub fn sync(&mut self, streams: &[Stream]) -> SyncOutcome {
        let mut outcome = SyncOutcome::default();
        let assigned: Vec<(ViewportId, StreamId)> = self
            .allocator
            .ids()
            .filter_map(|v| self.allocator.assigned(v).map(|s| (v, s.clone())))
            .collect();

        for (viewport, id) in assigned {
            let current = streams.iter().find(|s| s.id == id);
            let converted = self.conversions.contains_key(&id);

            match current.map(Stream::source_kind) {
                Some(SourceKind::Direct) if converted => {
                    info!("Stream {id} in viewport {viewport} became directly playable");
                    self.clear_player(viewport);
                    outcome.pending.extend(self.detach_conversion(&id));
                }
                Some(SourceKind::NeedsConversion) if !converted => {
                    info!("Stream {id} in viewport {viewport} now needs conversion");
                    self.clear_player(viewport);
                    let mut controller = ConversionController::new(id.clone());
                    match controller.begin_start() {
                        Ok(attempt) => outcome.pending.push(Pending::Start {
                            stream: id.clone(),
                            attempt,
                        }),
                        Err(e) => outcome.errors.push(e),
                    }
                    self.conversions.insert(id.clone(), controller);
                    continue;
                }
                _ => {}
            }

            if let Some(controller) = self.conversions.get_mut(&id) {
                match controller.observe(current) {
                    Ok(true) => {
                        let url = controller.playback_url().map(str::to_string);
                        if let Some(url) = url {
                            let _ = self.push_source(viewport, &url);
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        self.clear_player(viewport);
                        outcome.errors.push(e);
                    }
                }
            } else if let Some(stream) = current {
                let _ = self.push_source(viewport, &stream.source);
            }
        }
        outcome
    }

    fn clear_player(&mut self, viewport: ViewportId) {
        if let Some(player) = self.players[viewport.0].as_mut() {
            player.clear_source();
        }
    }

    fn push_source(&mut self, viewport: ViewportId, url: &str) -> Result<(), SessionError> {
        let player = self.players[viewport.0]
            .as_mut()
            .ok_or(AllocationError::UnknownViewport(viewport))?;
        player.set_source(url, MimeType::infer(url))?;
        Ok(())
    }

    pub fn view(&self, viewport: ViewportId) -> ViewportView {
        let Some(stream) = self.allocator.assigned(viewport).cloned() else {
            return ViewportView::Empty;
        };
        let playing = self.players[viewport.0]
            .as_ref()
            .and_then(|p| p.current_source())
            .cloned();

        match (self.conversions.get(&stream).map(|c| c.state()), playing) {
            (Some(ConversionState::Starting), _) => ViewportView::Starting { stream },
            (_, Some(source)) => ViewportView::Playing { stream, source },
            _ => ViewportView::Unavailable { stream },
        }
    }

    pub fn views(&self) -> Vec<(ViewportId, ViewportView)> {
        self.allocator.ids().map(|v| (v, self.view(v))).collect()
    }

    /// Dispose every player and hand back conversions that must be stopped.
    pub fn shutdown(&mut self) -> Vec<Pending> {
        for (viewport, stream) in self.allocator.clear() {
            if let Some(mut player) = self.players[viewport.0].take() {
                player.unmount();
            }
            debug!("Viewport {viewport} cleared (stream {stream})");
        }
        let streams: Vec<StreamId> = self.conversions.keys().cloned().collect();
        let pending: Vec<Pending> = streams
            .iter()
            .filter_map(|s| self.detach_conversion(s))
            .collect();
        if !pending.is_empty() {
            warn!("{} conversion(s) still active at shutdown", pending.len());
        }
        pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::{self, stream};
    use crate::event::{self, EventReceiver};
    use crate::playback::fake::FakeEngine;

    fn layout(engine: &FakeEngine) -> (MonitorLayout, EventReceiver) {
        let (tx, rx) = event::channel();
        let layout = MonitorLayout::new(
            4,
            Arc::new(engine.clone()) as Arc<dyn PlayerEngine>,
            PlayerOptions::default(),
            tx,
        );
        (layout, rx)
    }

    fn start_attempt(pending: Option<Pending>) -> Attempt {
        match pending {
            Some(Pending::Start { attempt, .. }) => attempt,
            other => panic!("expected start, got {other:?}"),
        }
    }

    #[test]
    fn test_direct_stream_plays_immediately() {
        let engine = FakeEngine::new();
        let (mut layout, _rx) = layout(&engine);
        let s = stream("1", "http://cdn/cam.m3u8");

        assert!(layout.assign(ViewportId(0), &s).unwrap().is_none());
        assert_eq!(
            layout.view(ViewportId(0)),
            ViewportView::Playing {
                stream: s.id.clone(),
                source: MediaSource::new("http://cdn/cam.m3u8", MimeType::Hls),
            }
        );
        assert_eq!(layout.view(ViewportId(1)), ViewportView::Empty);
        assert!(layout.conversion(&s.id).is_none());
    }

    #[test]
    fn test_conversion_starting_then_playing() {
        let engine = FakeEngine::new();
        let (mut layout, _rx) = layout(&engine);
        let s = stream("2", "rtsp://cam/2");

        let attempt = start_attempt(layout.assign(ViewportId(1), &s).unwrap());
        assert_eq!(
            layout.view(ViewportId(1)),
            ViewportView::Starting {
                stream: s.id.clone()
            }
        );
        assert_eq!(engine.created(), 0);

        layout
            .finish_start(
                &s.id,
                attempt,
                Ok(PlayResponse {
                    hls_url: Some("http://relay/2/playlist.m3u8".into()),
                }),
            )
            .unwrap();
        assert!(matches!(
            layout.view(ViewportId(1)),
            ViewportView::Playing { .. }
        ));
        assert_eq!(engine.live(), 1);
    }

    #[test]
    fn test_snapshot_confirms_conversion_and_updates_in_place() {
        let engine = FakeEngine::new();
        let (mut layout, _rx) = layout(&engine);
        let mut s = stream("2", "rtsp://cam/2");

        let attempt = start_attempt(layout.assign(ViewportId(0), &s).unwrap());
        layout
            .finish_start(&s.id, attempt, Ok(PlayResponse { hls_url: None }))
            .unwrap();

        s.playback_url = Some("http://relay/2/a.m3u8".into());
        assert!(layout.sync(std::slice::from_ref(&s)).errors.is_empty());
        assert_eq!(engine.live(), 1);

        s.playback_url = Some("http://relay/2/b.m3u8".into());
        layout.sync(std::slice::from_ref(&s));
        assert_eq!(engine.created(), 1);
        assert_eq!(engine.log.lock().unwrap().updates.len(), 2);
    }

    #[test]
    fn test_start_failure_marks_unavailable_and_retry() {
        let engine = FakeEngine::new();
        let (mut layout, _rx) = layout(&engine);
        let s = stream("2", "rtsp://cam/2");

        let attempt = start_attempt(layout.assign(ViewportId(0), &s).unwrap());
        assert!(layout
            .finish_start(&s.id, attempt, Err(fake::unavailable("POST /api/play/2")))
            .is_err());
        assert_eq!(
            layout.view(ViewportId(0)),
            ViewportView::Unavailable {
                stream: s.id.clone()
            }
        );

        start_attempt(layout.retry(ViewportId(0)).unwrap());
        assert!(matches!(
            layout.view(ViewportId(0)),
            ViewportView::Starting { .. }
        ));
    }

    #[test]
    fn test_stream_gone_while_starting() {
        let engine = FakeEngine::new();
        let (mut layout, _rx) = layout(&engine);
        let s = stream("2", "rtsp://cam/2");
        layout.assign(ViewportId(0), &s).unwrap();

        let errors = layout.sync(&[]).errors;
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], ConversionError::StreamGone(_)));
        assert!(matches!(
            layout.view(ViewportId(0)),
            ViewportView::Unavailable { .. }
        ));
    }

    #[test]
    fn test_withdrawn_url_ends_playback() {
        let engine = FakeEngine::new();
        let (mut layout, _rx) = layout(&engine);
        let mut s = stream("2", "rtsp://cam/2");
        let attempt = start_attempt(layout.assign(ViewportId(0), &s).unwrap());
        layout
            .finish_start(
                &s.id,
                attempt,
                Ok(PlayResponse {
                    hls_url: Some("http://relay/2.m3u8".into()),
                }),
            )
            .unwrap();
        s.playback_url = Some("http://relay/2.m3u8".into());
        assert!(layout.sync(std::slice::from_ref(&s)).errors.is_empty());
        assert_eq!(engine.live(), 1);

        s.playback_url = None;
        let outcome = layout.sync(std::slice::from_ref(&s));
        assert_eq!(outcome.errors.len(), 1);
        assert!(matches!(outcome.errors[0], ConversionError::SessionLost(_)));
        assert_eq!(engine.live(), 0);
        assert_eq!(
            layout.view(ViewportId(0)),
            ViewportView::Unavailable {
                stream: s.id.clone()
            }
        );
        start_attempt(layout.retry(ViewportId(0)).unwrap());
    }

    #[test]
    fn test_direct_source_switching_to_conversion() {
        let engine = FakeEngine::new();
        let (mut layout, _rx) = layout(&engine);
        let mut s = stream("1", "http://cdn/cam.mp4");
        layout.assign(ViewportId(0), &s).unwrap();
        assert_eq!(engine.live(), 1);

        s.source = "rtsp://cam/1".into();
        let outcome = layout.sync(std::slice::from_ref(&s));
        assert!(outcome.errors.is_empty());
        assert!(matches!(
            outcome.pending.as_slice(),
            [Pending::Start { .. }]
        ));
        assert_eq!(engine.live(), 0);
        assert_eq!(
            layout.view(ViewportId(0)),
            ViewportView::Starting {
                stream: s.id.clone()
            }
        );
    }

    #[test]
    fn test_converted_source_switching_to_direct() {
        let engine = FakeEngine::new();
        let (mut layout, _rx) = layout(&engine);
        let mut s = stream("2", "rtsp://cam/2");
        let attempt = start_attempt(layout.assign(ViewportId(0), &s).unwrap());
        layout
            .finish_start(
                &s.id,
                attempt,
                Ok(PlayResponse {
                    hls_url: Some("http://relay/2.m3u8".into()),
                }),
            )
            .unwrap();

        s.source = "http://cdn/cam2.m3u8".into();
        let outcome = layout.sync(std::slice::from_ref(&s));
        match outcome.pending.as_slice() {
            [Pending::Stop { controller }] => {
                assert_eq!(controller.state(), &ConversionState::Stopping)
            }
            other => panic!("expected stop, got {other:?}"),
        }
        assert!(layout.conversion(&s.id).is_none());
        assert_eq!(
            layout.view(ViewportId(0)),
            ViewportView::Playing {
                stream: s.id.clone(),
                source: MediaSource::new("http://cdn/cam2.m3u8", MimeType::Hls),
            }
        );
        assert_eq!(engine.created(), 2);
    }

    #[test]
    fn test_release_disposes_player_and_stops_conversion() {
        let engine = FakeEngine::new();
        let (mut layout, _rx) = layout(&engine);
        let s = stream("2", "rtsp://cam/2");
        let attempt = start_attempt(layout.assign(ViewportId(3), &s).unwrap());
        layout
            .finish_start(
                &s.id,
                attempt,
                Ok(PlayResponse {
                    hls_url: Some("http://relay/2.m3u8".into()),
                }),
            )
            .unwrap();
        assert_eq!(engine.live(), 1);

        match layout.release(ViewportId(3)).unwrap() {
            Some(Pending::Stop { controller }) => {
                assert_eq!(controller.state(), &ConversionState::Stopping);
            }
            other => panic!("expected stop, got {other:?}"),
        }
        assert_eq!(engine.live(), 0);
        assert!(layout.conversion(&s.id).is_none());
        assert_eq!(layout.view(ViewportId(3)), ViewportView::Empty);
        assert_eq!(layout.list_available(std::slice::from_ref(&s)).len(), 1);
    }

    #[test]
    fn test_release_direct_stream_has_no_pending_work() {
        let engine = FakeEngine::new();
        let (mut layout, _rx) = layout(&engine);
        layout.assign(ViewportId(0), &stream("1", "cam.mp4")).unwrap();
        assert!(layout.release(ViewportId(0)).unwrap().is_none());
        assert!(layout.release(ViewportId(0)).unwrap().is_none());
        assert_eq!(engine.live(), 0);
    }

    #[test]
    fn test_conflicting_assignment_creates_no_player() {
        let engine = FakeEngine::new();
        let (mut layout, _rx) = layout(&engine);
        let s = stream("1", "cam.mp4");
        layout.assign(ViewportId(0), &s).unwrap();

        let err = layout.assign(ViewportId(1), &s).unwrap_err();
        assert!(matches!(
            err,
            SessionError::Allocation(AllocationError::Conflict { .. })
        ));
        assert_eq!(layout.view(ViewportId(1)), ViewportView::Empty);
        assert_eq!(engine.created(), 1);
    }

    #[test]
    fn test_shutdown_disposes_everything() {
        let engine = FakeEngine::new();
        let (mut layout, _rx) = layout(&engine);
        layout.assign(ViewportId(0), &stream("1", "cam.mp4")).unwrap();
        let attempt = start_attempt(
            layout
                .assign(ViewportId(1), &stream("2", "rtsp://cam/2"))
                .unwrap(),
        );
        layout
            .finish_start(
                &StreamId::from("2"),
                attempt,
                Ok(PlayResponse {
                    hls_url: Some("http://relay/2.m3u8".into()),
                }),
            )
            .unwrap();
        assert_eq!(engine.live(), 2);

        let pending = layout.shutdown();
        assert_eq!(pending.len(), 1);
        assert_eq!(engine.live(), 0);
        assert!(layout
            .views()
            .iter()
            .all(|(_, v)| *v == ViewportView::Empty));
    }
}
