//! Session – the one context object owning a live monitoring session.
//!
//! A session holds the stream directory, the multi-viewport layout and the
//! background tasks that keep them fresh:
//!
//! - **poller**: runs [`StreamDirectory::run`] at the configured interval.
//! - **syncer**: waits for new snapshots and reconciles the layout with them.
//!
//! The layout sits behind one async mutex. User actions take it only for the
//! synchronous transition; backend round-trips happen with the lock released
//! and their outcome is applied afterwards.
//!
//! `stop()` cancels both tasks, disposes every player and stops any
//! conversion still running. A stopped session cannot be restarted.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use feedwatch_common::config::Config;
use feedwatch_common::protocol::{Stream, StreamId};

use crate::alerts::{self, AlertEntry};
use crate::backend::Backend;
use crate::detail::StreamDetail;
use crate::directory::StreamDirectory;
use crate::error::{AllocationError, ConversionError, PlaybackError, Result, SessionError};
use crate::event::{self, EventReceiver, EventSender, SessionEvent};
use crate::form::NewStreamForm;
use crate::layout::{MonitorLayout, Pending, ViewportView};
use crate::playback::{PlayerEngine, PlayerOptions};
use crate::viewport::ViewportId;

pub struct Session {
    config: Config,
    backend: Arc<dyn Backend>,
    engine: Arc<dyn PlayerEngine>,
    options: PlayerOptions,
    directory: StreamDirectory,
    layout: Arc<Mutex<MonitorLayout>>,
    events: EventSender,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Session {
    /// Build a session; nothing runs until [`Session::start`].
    ///
    /// The receiver yields playback and conversion failures for the hosting
    /// view to act on.
    pub fn new(
        config: &Config,
        backend: Arc<dyn Backend>,
        engine: Arc<dyn PlayerEngine>,
    ) -> (Self, EventReceiver) {
        let (events, rx) = event::channel();
        let cancel = CancellationToken::new();
        let options = PlayerOptions::from(config);
        let layout = MonitorLayout::new(
            config.viewport_count,
            engine.clone(),
            options,
            events.clone(),
        );
        let session = Self {
            config: config.clone(),
            directory: StreamDirectory::new(backend.clone(), cancel.clone()),
            backend,
            engine,
            options,
            layout: Arc::new(Mutex::new(layout)),
            events,
            cancel,
            tasks: Vec::new(),
        };
        (session, rx)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn directory(&self) -> &StreamDirectory {
        &self.directory
    }

    pub fn is_running(&self) -> bool {
        !self.tasks.is_empty() && !self.cancel.is_cancelled()
    }

    /// Spawn the poller and the syncer. Calling it again is a no-op.
    pub fn start(&mut self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(SessionError::Stopped);
        }
        if !self.tasks.is_empty() {
            return Ok(());
        }

        // ── poller ───────────────────────────────────────────────────────
        let directory = self.directory.clone();
        let period = self.config.poll_interval();
        self.tasks.push(tokio::spawn(async move {
            directory.run(period, |_| {}).await;
        }));

        // ── syncer ───────────────────────────────────────────────────────
        let mut rx = self.directory.subscribe();
        let backend = self.backend.clone();
        let layout = self.layout.clone();
        let events = self.events.clone();
        let cancel = self.cancel.clone();
        self.tasks.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                // Nothing to reconcile against before the first good poll.
                let streams = match rx.borrow_and_update().streams.clone() {
                    Some(streams) => streams,
                    None => continue,
                };
                let outcome = layout.lock().await.sync(&streams);
                for e in &outcome.errors {
                    report_conversion(&events, e);
                }
                for work in outcome.pending {
                    if let Err(SessionError::Conversion(e)) =
                        settle(backend.as_ref(), &layout, Some(work)).await
                    {
                        report_conversion(&events, &e);
                    }
                }
            }
            debug!("Layout syncer stopped");
        }));

        info!(
            "Session started against {} ({} viewports)",
            self.config.backend_url, self.config.viewport_count
        );
        Ok(())
    }

    /// Cancel background work, dispose every player and stop running
    /// conversions. Safe to call more than once.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("Session task ended abnormally: {e}");
            }
        }

        let pending = self.layout.lock().await.shutdown();
        for work in pending {
            if let Err(e) = settle(self.backend.as_ref(), &self.layout, Some(work)).await {
                warn!("Cleanup at shutdown failed: {e}");
            }
        }
        info!("Session stopped");
    }

    fn ensure_running(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(SessionError::Stopped)
        } else {
            Ok(())
        }
    }

    /// Streams no viewport currently shows, in directory order.
    pub async fn available(&self) -> Vec<Stream> {
        let snapshot = self.directory.snapshot();
        let layout = self.layout.lock().await;
        layout
            .list_available(&snapshot)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn alerts(&self) -> Vec<AlertEntry> {
        alerts::aggregate(&self.directory.snapshot())
    }

    pub async fn viewports(&self) -> Vec<(ViewportId, ViewportView)> {
        self.layout.lock().await.views()
    }

    /// Show `stream` in `viewport`, starting its conversion if needed.
    pub async fn assign(&self, viewport: ViewportId, stream: &StreamId) -> Result<()> {
        self.ensure_running()?;
        let stream = self
            .directory
            .state()
            .find(stream)
            .cloned()
            .ok_or_else(|| AllocationError::UnknownStream(stream.clone()))?;

        let pending = self.layout.lock().await.assign(viewport, &stream)?;
        settle(self.backend.as_ref(), &self.layout, pending).await
    }

    /// Restart a conversion that failed in `viewport`.
    pub async fn retry(&self, viewport: ViewportId) -> Result<()> {
        self.ensure_running()?;
        let pending = self.layout.lock().await.retry(viewport)?;
        settle(self.backend.as_ref(), &self.layout, pending).await
    }

    /// Empty `viewport`, stopping its conversion if one runs.
    pub async fn release(&self, viewport: ViewportId) -> Result<()> {
        let pending = self.layout.lock().await.release(viewport)?;
        settle(self.backend.as_ref(), &self.layout, pending).await
    }

    /// Validate `form`, register the stream and refresh the directory.
    ///
    /// An invalid form never reaches the backend and is left untouched; a
    /// successful submission clears it.
    pub async fn register_stream(&self, form: &mut NewStreamForm) -> Result<Stream> {
        self.ensure_running()?;
        let body = form.validate()?;
        let created = self.backend.create_stream(&body).await?;
        info!("Registered stream {} ({})", created.name, created.id);
        form.clear();
        self.directory.refresh().await;
        Ok(created)
    }

    /// Detail view for `stream`, sharing this session's player engine.
    pub fn open_detail(&self, stream: StreamId) -> std::result::Result<StreamDetail, PlaybackError> {
        StreamDetail::open(stream, self.engine.clone(), self.options, self.events.clone())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Run backend work handed back by the layout, without the layout lock.
async fn settle(
    backend: &dyn Backend,
    layout: &Mutex<MonitorLayout>,
    pending: Option<Pending>,
) -> Result<()> {
    match pending {
        None => Ok(()),
        Some(Pending::Start { stream, attempt }) => {
            let result = backend.start_conversion(&stream).await;
            layout.lock().await.finish_start(&stream, attempt, result)?;
            Ok(())
        }
        Some(Pending::Stop { mut controller }) => {
            let result = backend.stop_conversion(controller.stream()).await;
            controller.finish_stop(result)?;
            Ok(())
        }
    }
}

fn report_conversion(events: &EventSender, error: &ConversionError) {
    warn!("Conversion for stream {} failed: {error}", error.stream());
    let _ = events.send(SessionEvent::ConversionFailed {
        stream: error.stream().clone(),
        message: error.to_string(),
    });
}
