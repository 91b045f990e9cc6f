//! Playback adapter – binds one player session to one container.
//!
//! The adapter turns a declarative "play this URL" into create/update/dispose
//! calls on a [`PlayerEngine`]. Its lifecycle is an explicit state machine:
//!
//! ```text
//! Unmounted --mount--> Mounted --unmount--> Disposed
//! ```
//!
//! While `Mounted` it owns at most one [`PlayerSession`]; the session is
//! created on the first `set_source` and updated in place afterwards.
//! Disposal consumes the session, so it can only happen once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use feedwatch_common::config::Config;
use feedwatch_common::media::MimeType;

use crate::error::PlaybackError;
use crate::event::{EventSender, SessionEvent};

/// One playable URL and its MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSource {
    pub url: String,
    pub mime_type: MimeType,
}

impl MediaSource {
    pub fn new(url: impl Into<String>, mime_type: MimeType) -> Self {
        Self {
            url: url.into(),
            mime_type,
        }
    }

    /// MIME type inferred from the URL suffix.
    pub fn infer(url: impl Into<String>) -> Self {
        let url = url.into();
        let mime_type = MimeType::infer(&url);
        Self { url, mime_type }
    }
}

/// Player behaviour switches shared by every viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerOptions {
    pub autoplay: bool,
    pub controls: bool,
    pub responsive: bool,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            autoplay: true,
            controls: true,
            responsive: true,
        }
    }
}

impl From<&Config> for PlayerOptions {
    fn from(config: &Config) -> Self {
        Self {
            autoplay: config.autoplay,
            controls: config.controls,
            responsive: config.responsive,
        }
    }
}

/// Everything an engine is told when creating a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerConfig {
    pub autoplay: bool,
    pub controls: bool,
    pub responsive: bool,
    pub sources: Vec<MediaSource>,
}

impl PlayerConfig {
    pub fn new(options: PlayerOptions, sources: Vec<MediaSource>) -> Self {
        Self {
            autoplay: options.autoplay,
            controls: options.controls,
            responsive: options.responsive,
            sources,
        }
    }
}

/// Factory for player sessions (the video decoding/rendering engine).
pub trait PlayerEngine: Send + Sync {
    /// Create a session rendering into `container`. Asynchronous decoder
    /// errors are reported through `errors` for as long as the session lives.
    fn create(
        &self,
        container: &str,
        config: &PlayerConfig,
        errors: ErrorSink,
    ) -> Result<Box<dyn PlayerSession>, PlaybackError>;
}

/// A live handle to one player instance.
pub trait PlayerSession: Send {
    fn set_source(&mut self, autoplay: bool, sources: &[MediaSource]) -> Result<(), PlaybackError>;

    fn dispose(self: Box<Self>);
}

/// Channel through which an engine reports decoder errors for one session.
///
/// Reports from a session that has since been disposed are dropped.
#[derive(Debug, Clone)]
pub struct ErrorSink {
    container: String,
    live: Arc<AtomicBool>,
    events: EventSender,
}

impl ErrorSink {
    /// Returns `false` when the report was dropped.
    pub fn report(&self, message: impl Into<String>) -> bool {
        if !self.live.load(Ordering::Acquire) {
            return false;
        }
        let message = message.into();
        warn!("Playback error in {}: {message}", self.container);
        self.events
            .send(SessionEvent::PlaybackFailed {
                container: self.container.clone(),
                message,
            })
            .is_ok()
    }
}

/// Coarse lifecycle phase of a [`PlaybackAdapter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterPhase {
    Unmounted,
    Mounted,
    Disposed,
}

struct ActivePlayer {
    session: Box<dyn PlayerSession>,
    source: MediaSource,
    live: Arc<AtomicBool>,
}

impl ActivePlayer {
    fn dispose(self) {
        self.live.store(false, Ordering::Release);
        self.session.dispose();
    }
}

enum AdapterState {
    Unmounted,
    Mounted {
        container: String,
        player: Option<ActivePlayer>,
    },
    Disposed,
}

pub struct PlaybackAdapter {
    engine: Arc<dyn PlayerEngine>,
    options: PlayerOptions,
    events: EventSender,
    state: AdapterState,
}

impl PlaybackAdapter {
    pub fn new(engine: Arc<dyn PlayerEngine>, options: PlayerOptions, events: EventSender) -> Self {
        Self {
            engine,
            options,
            events,
            state: AdapterState::Unmounted,
        }
    }

    pub fn phase(&self) -> AdapterPhase {
        match self.state {
            AdapterState::Unmounted => AdapterPhase::Unmounted,
            AdapterState::Mounted { .. } => AdapterPhase::Mounted,
            AdapterState::Disposed => AdapterPhase::Disposed,
        }
    }

    pub fn container(&self) -> Option<&str> {
        match &self.state {
            AdapterState::Mounted { container, .. } => Some(container),
            _ => None,
        }
    }

    pub fn has_session(&self) -> bool {
        matches!(
            self.state,
            AdapterState::Mounted {
                player: Some(_),
                ..
            }
        )
    }

    /// Source the current session is playing.
    pub fn current_source(&self) -> Option<&MediaSource> {
        match &self.state {
            AdapterState::Mounted {
                player: Some(p), ..
            } => Some(&p.source),
            _ => None,
        }
    }

    /// Attach to `container`. Mounting twice to the same container is a no-op.
    pub fn mount(&mut self, container: impl Into<String>) -> Result<(), PlaybackError> {
        let container = container.into();
        match &self.state {
            AdapterState::Unmounted => {}
            AdapterState::Mounted { container: c, .. } if *c == container => return Ok(()),
            AdapterState::Mounted { container: c, .. } => {
                return Err(PlaybackError::Engine(format!(
                    "adapter already mounted on {c}, cannot mount on {container}"
                )))
            }
            AdapterState::Disposed => return Err(PlaybackError::Disposed(container)),
        }

        debug!("Player adapter mounted on {container}");
        self.state = AdapterState::Mounted {
            container,
            player: None,
        };
        Ok(())
    }

    /// Point the player at `url`. Creates the session on first use and
    /// updates it in place afterwards; an unchanged source is a no-op.
    pub fn set_source(&mut self, url: &str, mime_type: MimeType) -> Result<(), PlaybackError> {
        let source = MediaSource::new(url, mime_type);
        let (container, player) = match &mut self.state {
            AdapterState::Mounted { container, player } => (container, player),
            AdapterState::Unmounted => return Err(PlaybackError::NotMounted(url.to_string())),
            AdapterState::Disposed => return Err(PlaybackError::Disposed(url.to_string())),
        };

        if let Some(active) = player {
            if active.source == source {
                return Ok(());
            }
            debug!("{container}: switching source to {} ({})", source.url, source.mime_type);
            if let Err(e) = active
                .session
                .set_source(self.options.autoplay, std::slice::from_ref(&source))
            {
                report(&self.events, container, &e);
                return Err(e);
            }
            active.source = source;
            return Ok(());
        }

        let live = Arc::new(AtomicBool::new(true));
        let sink = ErrorSink {
            container: container.clone(),
            live: live.clone(),
            events: self.events.clone(),
        };
        let config = PlayerConfig::new(self.options, vec![source.clone()]);
        match self.engine.create(container, &config, sink) {
            Ok(session) => {
                info!("{container}: player created for {} ({})", source.url, source.mime_type);
                *player = Some(ActivePlayer {
                    session,
                    source,
                    live,
                });
                Ok(())
            }
            Err(e) => {
                live.store(false, Ordering::Release);
                report(&self.events, container, &e);
                Err(e)
            }
        }
    }

    /// Drop the session but stay mounted, e.g. while a conversion restarts.
    pub fn clear_source(&mut self) {
        if let AdapterState::Mounted { container, player } = &mut self.state {
            if let Some(active) = player.take() {
                debug!("{container}: player disposed, placeholder shown");
                active.dispose();
            }
        }
    }

    /// Release the session and detach. Safe to call any number of times.
    pub fn unmount(&mut self) {
        match std::mem::replace(&mut self.state, AdapterState::Disposed) {
            AdapterState::Mounted { container, player } => {
                if let Some(active) = player {
                    active.dispose();
                }
                debug!("Player adapter unmounted from {container}");
            }
            AdapterState::Unmounted | AdapterState::Disposed => {}
        }
    }
}

impl Drop for PlaybackAdapter {
    fn drop(&mut self) {
        self.unmount();
    }
}

fn report(events: &EventSender, container: &str, error: &PlaybackError) {
    warn!("Playback error in {container}: {error}");
    let _ = events.send(SessionEvent::PlaybackFailed {
        container: container.to_string(),
        message: error.to_string(),
    });
}

// ─── test double ─────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod fake {
    use std::sync::Mutex;

    use super::*;

    /// Book-keeping shared by a [`FakeEngine`] and its sessions.
    #[derive(Default)]
    pub struct EngineLog {
        pub created: usize,
        pub disposed: usize,
        pub updates: Vec<(String, MediaSource)>,
        pub sinks: Vec<ErrorSink>,
        pub fail_create: bool,
    }

    impl EngineLog {
        pub fn live(&self) -> usize {
            self.created - self.disposed
        }
    }

    #[derive(Default, Clone)]
    pub struct FakeEngine {
        pub log: Arc<Mutex<EngineLog>>,
    }

    impl FakeEngine {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn live(&self) -> usize {
            self.log.lock().unwrap().live()
        }

        pub fn created(&self) -> usize {
            self.log.lock().unwrap().created
        }

        pub fn last_sink(&self) -> ErrorSink {
            self.log.lock().unwrap().sinks.last().cloned().unwrap()
        }
    }

    struct FakeSession {
        container: String,
        log: Arc<Mutex<EngineLog>>,
    }

    impl PlayerEngine for FakeEngine {
        fn create(
            &self,
            container: &str,
            config: &PlayerConfig,
            errors: ErrorSink,
        ) -> Result<Box<dyn PlayerSession>, PlaybackError> {
            let mut log = self.log.lock().unwrap();
            if log.fail_create {
                return Err(PlaybackError::Engine("no decoder".into()));
            }
            log.created += 1;
            log.sinks.push(errors);
            for source in &config.sources {
                log.updates.push((container.to_string(), source.clone()));
            }
            Ok(Box::new(FakeSession {
                container: container.to_string(),
                log: self.log.clone(),
            }))
        }
    }

    impl PlayerSession for FakeSession {
        fn set_source(&mut self, _autoplay: bool, sources: &[MediaSource]) -> Result<(), PlaybackError> {
            let mut log = self.log.lock().unwrap();
            for source in sources {
                log.updates.push((self.container.clone(), source.clone()));
            }
            Ok(())
        }

        fn dispose(self: Box<Self>) {
            self.log.lock().unwrap().disposed += 1;
        }
    }
}

// ─── tests ───────────────────────────────────────────────────────────────
