//! Configuration parsing – reads a KEY=VALUE file (`feedwatch.conf`).
//!
//! The same file drives the client library and the monitor binary; each
//! ignores fields it does not need.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_VIEWPORT_COUNT: usize = 4;
const DEFAULT_ALERT_FEED_LIMIT: usize = 20;

/// Application configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    // ── backend ──────────────────────────────────────────────────────
    /// Base URL of the stream backend, without a trailing slash.
    pub backend_url: String,
    /// Directory polling period (seconds).
    pub poll_interval_secs: u64,
    /// Per-request timeout for every backend call (seconds).
    pub request_timeout_secs: u64,

    // ── monitor layout ───────────────────────────────────────────────
    pub viewport_count: usize,
    /// Fill empty viewports with the first available stream after each poll.
    pub auto_assign: bool,
    pub alert_feed_limit: usize,

    // ── player options ───────────────────────────────────────────────
    pub autoplay: bool,
    pub controls: bool,
    pub responsive: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            viewport_count: DEFAULT_VIEWPORT_COUNT,
            auto_assign: false,
            alert_feed_limit: DEFAULT_ALERT_FEED_LIMIT,
            autoplay: true,
            controls: true,
            responsive: true,
        }
    }
}

impl Config {
    /// Default config path.
    pub fn default_path() -> &'static str {
        "/etc/feedwatch/feedwatch.conf"
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Load the configuration file at `path`.
pub fn load(path: &Path) -> Result<Config> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read config: {}", path.display()))?;

    let config = from_text(&text);
    info!("Loaded config from {}", path.display());
    Ok(config)
}

/// Build a [`Config`] from `KEY=VALUE` text, falling back to defaults for
/// missing, unparsable or zero values.
pub fn from_text(text: &str) -> Config {
    let map = parse_conf(text);
    let defaults = Config::default();

    let get = |key: &str| -> Option<String> { map.get(key).cloned() };
    let get_nonzero_u64 = |key: &str, default: u64| -> u64 {
        get(key)
            .and_then(|v| v.parse().ok())
            .filter(|v| *v > 0)
            .unwrap_or(default)
    };
    let get_bool = |key: &str, default: bool| -> bool {
        get(key)
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes"))
            .unwrap_or(default)
    };

    Config {
        backend_url: get("BACKEND_URL")
            .filter(|s| !s.is_empty())
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or(defaults.backend_url),
        poll_interval_secs: get_nonzero_u64("POLL_INTERVAL_SECS", defaults.poll_interval_secs),
        request_timeout_secs: get_nonzero_u64(
            "REQUEST_TIMEOUT_SECS",
            defaults.request_timeout_secs,
        ),
        viewport_count: get_nonzero_u64("VIEWPORT_COUNT", defaults.viewport_count as u64)
            as usize,
        auto_assign: get_bool("AUTO_ASSIGN", defaults.auto_assign),
        alert_feed_limit: get("ALERT_FEED_LIMIT")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.alert_feed_limit),
        autoplay: get_bool("AUTOPLAY", defaults.autoplay),
        controls: get_bool("CONTROLS", defaults.controls),
        responsive: get_bool("RESPONSIVE", defaults.responsive),
    }
}

/// Parse `KEY=VALUE` lines into a map, stripping optional double-quotes.
fn parse_conf(text: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, val)) = line.split_once('=') {
            let key = key.trim();
            let val = val.trim().trim_matches('"');
            map.insert(key.to_string(), val.to_string());
        }
    }
    map
}

// ─── tests ───────────────────────────────────────────────────────────────
