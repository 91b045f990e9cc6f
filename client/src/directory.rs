//! Stream directory – polls the backend for the full stream list.
//!
//! The snapshot is published through a `watch` channel and always replaced
//! wholesale, so observers can compare `Arc` pointers to detect change.
//! Every request carries a sequence number; a response older than the last
//! applied one is discarded, which keeps a slow early request from
//! overwriting fresher data. A failed poll keeps the last-known-good list
//! and only records the error.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use feedwatch_common::protocol::{Stream, StreamId};

use crate::backend::Backend;

/// What observers see of the directory.
#[derive(Debug, Clone, Default)]
pub struct DirectoryState {
    /// `None` until the first successful poll.
    pub streams: Option<Arc<[Stream]>>,
    /// Message of the most recent failed poll, cleared by the next success.
    pub last_error: Option<String>,
    /// Sequence number of the last applied response.
    pub applied_seq: u64,
}

impl DirectoryState {
    /// Snapshot, or an empty list before the first successful poll.
    pub fn snapshot(&self) -> Arc<[Stream]> {
        self.streams.clone().unwrap_or_else(|| Arc::from(Vec::new()))
    }

    pub fn is_loading(&self) -> bool {
        self.streams.is_none() && self.last_error.is_none()
    }

    /// Data is shown but the latest poll failed.
    pub fn is_stale(&self) -> bool {
        self.streams.is_some() && self.last_error.is_some()
    }

    pub fn find(&self, id: &StreamId) -> Option<&Stream> {
        self.streams.as_deref()?.iter().find(|s| &s.id == id)
    }
}

/// Result of one refresh call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Applied { streams: usize },
    Failed(String),
    /// A newer response was applied first.
    Superseded,
    /// Another refresh was still in flight.
    Skipped,
    /// The directory was shut down before the response arrived.
    Cancelled,
}

struct Inner {
    backend: Arc<dyn Backend>,
    tx: watch::Sender<DirectoryState>,
    next_seq: AtomicU64,
    in_flight: AtomicUsize,
    cancel: CancellationToken,
}

/// Cheap-to-clone handle on the shared directory.
#[derive(Clone)]
pub struct StreamDirectory {
    inner: Arc<Inner>,
}

struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl StreamDirectory {
    pub fn new(backend: Arc<dyn Backend>, cancel: CancellationToken) -> Self {
        let (tx, _rx) = watch::channel(DirectoryState::default());
        Self {
            inner: Arc::new(Inner {
                backend,
                tx,
                next_seq: AtomicU64::new(1),
                in_flight: AtomicUsize::new(0),
                cancel,
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<DirectoryState> {
        self.inner.tx.subscribe()
    }

    pub fn state(&self) -> DirectoryState {
        self.inner.tx.borrow().clone()
    }

    pub fn snapshot(&self) -> Arc<[Stream]> {
        self.inner.tx.borrow().snapshot()
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.in_flight.load(Ordering::SeqCst) > 0
    }

    /// Fetch the stream list now, even if another fetch is in flight.
    pub async fn refresh(&self) -> RefreshOutcome {
        let inner = &self.inner;
        if inner.cancel.is_cancelled() {
            return RefreshOutcome::Cancelled;
        }
        let _guard = InFlight::enter(&inner.in_flight);
        let seq = inner.next_seq.fetch_add(1, Ordering::SeqCst);

        let result = tokio::select! {
            _ = inner.cancel.cancelled() => return RefreshOutcome::Cancelled,
            r = inner.backend.list_streams() => r,
        };
        if inner.cancel.is_cancelled() {
            return RefreshOutcome::Cancelled;
        }
        self.apply(seq, result.map_err(|e| e.to_string()))
    }

    /// Timer-driven refresh: skipped while any other fetch is in flight.
    pub async fn tick(&self) -> RefreshOutcome {
        if self.is_refreshing() {
            debug!("Directory refresh still in flight – skipping tick");
            return RefreshOutcome::Skipped;
        }
        self.refresh().await
    }

    fn apply(&self, seq: u64, result: Result<Vec<Stream>, String>) -> RefreshOutcome {
        let mut outcome = RefreshOutcome::Superseded;
        self.inner.tx.send_if_modified(|state| {
            if seq <= state.applied_seq {
                return false;
            }
            state.applied_seq = seq;
            outcome = match &result {
                Ok(streams) => {
                    state.streams = Some(Arc::from(streams.as_slice()));
                    state.last_error = None;
                    RefreshOutcome::Applied {
                        streams: streams.len(),
                    }
                }
                Err(message) => {
                    state.last_error = Some(message.clone());
                    RefreshOutcome::Failed(message.clone())
                }
            };
            true
        });

        match &outcome {
            RefreshOutcome::Applied { streams } => debug!("Directory #{seq}: {streams} stream(s)"),
            RefreshOutcome::Failed(message) => {
                warn!("Directory #{seq} failed, keeping last-known-good data: {message}")
            }
            RefreshOutcome::Superseded => debug!("Directory #{seq} superseded – discarded"),
            _ => {}
        }
        outcome
    }

    /// Poll every `period` until cancelled. The first poll runs immediately.
    ///
    /// `on_update` runs after every applied or failed poll.
    pub async fn run<F>(&self, period: Duration, mut on_update: F)
    where
        F: FnMut(&RefreshOutcome),
    {
        info!("Polling stream directory every {}s", period.as_secs_f32());
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.inner.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let outcome = self.tick().await;
            match outcome {
                RefreshOutcome::Cancelled => break,
                RefreshOutcome::Applied { .. } | RefreshOutcome::Failed(_) => on_update(&outcome),
                RefreshOutcome::Superseded | RefreshOutcome::Skipped => {}
            }
        }
        info!("Directory polling stopped");
    }
}

// ─── tests ───────────────────────────────────────────────────────────────
