//! Per-stream conversion state machine.
//!
//! Sources a player cannot open directly (camera protocols) are relayed by
//! the backend into a playable URL. The controller tracks that session:
//!
//! ```text
//! Inactive --start--> Starting --confirmed--> Active --stop--> Stopping --settled--> Inactive
//! ```
//!
//! A start is confirmed either by the start response carrying a URL or by a
//! later directory snapshot showing one. Any failure lands back in `Inactive`;
//! nothing is retried automatically.
//!
//! The transition methods are synchronous so a caller holding a lock can
//! flip state, release the lock for the backend round-trip, and apply the
//! outcome afterwards. [`ConversionController::start`] and
//! [`ConversionController::stop`] bundle both halves for exclusive owners.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info, warn};

use feedwatch_common::media::SourceKind;
use feedwatch_common::protocol::{PlayResponse, Stream, StreamId};

use crate::backend::Backend;
use crate::error::{BackendError, ConversionError};
use crate::playback::PlaybackAdapter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionState {
    Inactive,
    Starting,
    Active { url: String },
    Stopping,
}

/// Identifies one start request; outcomes of superseded requests are ignored.
///
/// Ids are unique across controllers, so a late response cannot be mistaken
/// for one addressed to a controller recreated for the same stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt(u64);

static NEXT_ATTEMPT: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
pub struct ConversionController {
    stream: StreamId,
    state: ConversionState,
    attempt: u64,
    /// The directory has listed the active URL at least once.
    listed: bool,
}

impl ConversionController {
    pub fn new(stream: StreamId) -> Self {
        Self {
            stream,
            state: ConversionState::Inactive,
            attempt: 0,
            listed: false,
        }
    }

    /// Controller for `stream`, refusing directly playable sources.
    pub fn for_stream(stream: &Stream) -> Result<Self, ConversionError> {
        match stream.source_kind() {
            SourceKind::NeedsConversion => Ok(Self::new(stream.id.clone())),
            SourceKind::Direct => Err(ConversionError::NotRequired(stream.id.clone())),
        }
    }

    pub fn stream(&self) -> &StreamId {
        &self.stream
    }

    pub fn state(&self) -> &ConversionState {
        &self.state
    }

    /// URL the player should use; only set while `Active`.
    pub fn playback_url(&self) -> Option<&str> {
        match &self.state {
            ConversionState::Active { url } => Some(url),
            _ => None,
        }
    }

    fn invalid(&self, action: &'static str) -> ConversionError {
        ConversionError::InvalidTransition {
            stream: self.stream.clone(),
            action,
            state: self.state.clone(),
        }
    }

    /// `Inactive -> Starting`. The caller then issues the backend request.
    pub fn begin_start(&mut self) -> Result<Attempt, ConversionError> {
        if self.state != ConversionState::Inactive {
            return Err(self.invalid("start"));
        }
        self.attempt = NEXT_ATTEMPT.fetch_add(1, Ordering::Relaxed);
        self.state = ConversionState::Starting;
        info!("Conversion for stream {} starting", self.stream);
        Ok(Attempt(self.attempt))
    }

    /// Apply the start response of `attempt`.
    ///
    /// A response without a URL keeps the machine in `Starting` until a
    /// snapshot confirms it. Outcomes for a stale attempt are dropped.
    pub fn finish_start(
        &mut self,
        attempt: Attempt,
        result: Result<PlayResponse, BackendError>,
    ) -> Result<(), ConversionError> {
        if attempt.0 != self.attempt || self.state != ConversionState::Starting {
            debug!("Dropping stale start outcome for stream {}", self.stream);
            return Ok(());
        }
        match result {
            Ok(PlayResponse { hls_url: Some(url) }) => {
                self.activate(url, false);
                Ok(())
            }
            Ok(PlayResponse { hls_url: None }) => {
                debug!("Conversion for stream {} accepted, awaiting URL", self.stream);
                Ok(())
            }
            Err(source) => {
                warn!("Conversion for stream {} failed to start: {source}", self.stream);
                self.state = ConversionState::Inactive;
                Err(ConversionError::Backend {
                    stream: self.stream.clone(),
                    source,
                })
            }
        }
    }

    fn activate(&mut self, url: String, listed: bool) {
        info!("Conversion for stream {} active at {url}", self.stream);
        self.listed = listed;
        self.state = ConversionState::Active { url };
    }

    /// Reconcile with the latest directory entry for this stream.
    ///
    /// Returns `true` when the playback URL changed and the player must be
    /// updated. A stream that vanished while starting fails the start.
    ///
    /// Once the directory has listed the active URL, a later entry without
    /// one means the backend ended the session: the controller goes back to
    /// `Inactive`. Entries predating the start response are not listed yet
    /// and do not count.
    pub fn observe(&mut self, stream: Option<&Stream>) -> Result<bool, ConversionError> {
        match (&self.state, stream) {
            (ConversionState::Starting, None) => {
                warn!("Stream {} vanished while its conversion was starting", self.stream);
                self.state = ConversionState::Inactive;
                Err(ConversionError::StreamGone(self.stream.clone()))
            }
            (ConversionState::Starting, Some(s)) => match &s.playback_url {
                Some(url) => {
                    self.activate(url.clone(), true);
                    Ok(true)
                }
                None => Ok(false),
            },
            (ConversionState::Active { url }, Some(s)) => match &s.playback_url {
                Some(new_url) if new_url != url => {
                    info!("Conversion for stream {} moved to {new_url}", self.stream);
                    self.activate(new_url.clone(), true);
                    Ok(true)
                }
                Some(_) => {
                    self.listed = true;
                    Ok(false)
                }
                None if self.listed => {
                    warn!("Conversion for stream {} ended on the backend", self.stream);
                    self.state = ConversionState::Inactive;
                    Err(ConversionError::SessionLost(self.stream.clone()))
                }
                None => Ok(false),
            },
            _ => Ok(false),
        }
    }

    /// `Starting | Active -> Stopping`. The caller disposes the player, then
    /// issues the backend request.
    pub fn begin_stop(&mut self) -> Result<(), ConversionError> {
        match self.state {
            ConversionState::Starting | ConversionState::Active { .. } => {
                info!("Conversion for stream {} stopping", self.stream);
                self.state = ConversionState::Stopping;
                Ok(())
            }
            _ => Err(self.invalid("stop")),
        }
    }

    /// `Stopping -> Inactive`, whatever the backend said.
    pub fn finish_stop(&mut self, result: Result<(), BackendError>) -> Result<(), ConversionError> {
        self.state = ConversionState::Inactive;
        match result {
            Ok(()) => {
                info!("Conversion for stream {} stopped", self.stream);
                Ok(())
            }
            Err(source) => {
                warn!("Conversion for stream {} failed to stop cleanly: {source}", self.stream);
                Err(ConversionError::Backend {
                    stream: self.stream.clone(),
                    source,
                })
            }
        }
    }

    /// Request a conversion session and apply the response.
    pub async fn start(&mut self, backend: &dyn Backend) -> Result<(), ConversionError> {
        let attempt = self.begin_start()?;
        let result = backend.start_conversion(&self.stream).await;
        self.finish_start(attempt, result)
    }

    /// Stop the conversion session. `player` is disposed before the backend
    /// is asked to stop, so no session outlives the conversion.
    pub async fn stop(
        &mut self,
        backend: &dyn Backend,
        player: &mut PlaybackAdapter,
    ) -> Result<(), ConversionError> {
        self.begin_stop()?;
        player.clear_source();
        let result = backend.stop_conversion(&self.stream).await;
        self.finish_stop(result)
    }
}
