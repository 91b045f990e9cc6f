//! Live-session engine for the feedwatch monitoring client.
//!
//! Polls the backend's stream directory, assigns streams to viewports,
//! drives conversion sessions for camera protocols and keeps one player
//! session per mounted container. Hosts embed a [`session::Session`] and
//! supply a [`playback::PlayerEngine`] for their rendering surface.

pub mod alerts;
pub mod backend;
pub mod conversion;
pub mod detail;
pub mod directory;
pub mod error;
pub mod event;
pub mod form;
pub mod layout;
pub mod playback;
pub mod session;
pub mod viewport;

pub use backend::{Backend, HttpBackend};
pub use error::SessionError;
pub use session::Session;
