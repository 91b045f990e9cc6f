//! Types shared by the feedwatch client library and the monitor binary.

pub mod config;
pub mod media;
pub mod protocol;
