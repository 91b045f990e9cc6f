//! Feedwatch Monitor – headless host for a live monitoring session.
//!
//! This binary:
//! 1. Reads configuration from `feedwatch.conf`
//! 2. Starts a session against the stream backend (directory polling,
//!    viewport layout, conversions)
//! 3. Renders the dashboard, alert feed and viewport grid to the log on
//!    every directory change, optionally filling empty viewports
//! 4. Logs playback and conversion failures; affected viewports keep their
//!    placeholder until released or retried.

mod dashboard;
mod engine;

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use feedwatch_client::directory::DirectoryState;
use feedwatch_client::event::{EventReceiver, SessionEvent};
use feedwatch_client::layout::ViewportView;
use feedwatch_client::{HttpBackend, Session};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── load config ──────────────────────────────────────────────────
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| feedwatch_common::config::Config::default_path().to_string());
    let config = feedwatch_common::config::load(&PathBuf::from(&config_path))
        .context("Config load failed")?;

    info!(
        "Feedwatch Monitor starting (backend={}, viewports={})",
        config.backend_url, config.viewport_count
    );

    // ── ctrl-c ───────────────────────────────────────────────────────
    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    ctrlc::set_handler(move || {
        info!("Shutdown signal received");
        signal.cancel();
    })
    .context("Cannot set Ctrl-C handler")?;

    // ── start session ────────────────────────────────────────────────
    let backend = HttpBackend::from_config(&config).context("Cannot build HTTP client")?;
    let (mut session, mut events) =
        Session::new(&config, Arc::new(backend), Arc::new(engine::LoggingEngine));
    session.start().context("Cannot start session")?;

    run(&session, &mut events, &shutdown).await;

    session.stop().await;
    info!("Feedwatch Monitor stopped");

    Ok(())
}

/// React to directory changes and session events until `shutdown` fires.
async fn run(session: &Session, events: &mut EventReceiver, shutdown: &CancellationToken) {
    let auto = session.config().auto_assign;
    let mut directory = session.directory().subscribe();
    // Auto-assign round-trips to the backend; it runs beside the loop so
    // shutdown and events are still handled meanwhile.
    let mut assigning: Option<Pin<Box<dyn Future<Output = ()> + '_>>> = None;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            changed = directory.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = directory.borrow_and_update().clone();
                render(session, &state).await;
                if auto && state.streams.is_some() && assigning.is_none() {
                    assigning = Some(Box::pin(auto_assign(session)));
                }
            }
            _ = async {
                if let Some(task) = assigning.as_mut() {
                    task.await;
                }
            }, if assigning.is_some() => {
                assigning = None;
            }
            Some(event) = events.recv() => handle_event(event),
        }
    }
}

/// Give every empty viewport the first stream nobody shows yet.
async fn auto_assign(session: &Session) {
    for (viewport, view) in session.viewports().await {
        if view != ViewportView::Empty {
            continue;
        }
        let Some(stream) = session.available().await.into_iter().next() else {
            break;
        };
        match session.assign(viewport, &stream.id).await {
            Ok(()) => info!("Auto-assigned stream {} to viewport {viewport}", stream.id),
            Err(e) => warn!("Auto-assign of stream {} to viewport {viewport} failed: {e}", stream.id),
        }
    }
}

async fn render(session: &Session, state: &DirectoryState) {
    let alerts = session.alerts();
    for line in dashboard::render(state, &alerts, session.config().alert_feed_limit) {
        info!("{line}");
    }
    for (viewport, view) in session.viewports().await {
        info!("{}", dashboard::viewport_line(viewport, &view));
    }
}

fn handle_event(event: SessionEvent) {
    match event {
        SessionEvent::PlaybackFailed { container, message } => {
            warn!("Playback failed in {container}: {message} (placeholder kept)");
        }
        SessionEvent::ConversionFailed { stream, message } => {
            warn!("Conversion for stream {stream} failed: {message} (retry available)");
        }
    }
}
