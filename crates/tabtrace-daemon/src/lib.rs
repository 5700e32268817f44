//! # tabtrace daemon
//!
//! Long-lived network capture daemon for a Chromium remote-debugging
//! endpoint, plus the client helpers short-lived CLI processes use to talk
//! to it.
//!
//! The daemon keeps one multiplexed CDP connection, attaches to every page
//! target (including tabs opened later), assembles request records from the
//! `Network.*` event stream, and answers `list` / `get` / `clear` queries
//! over a unix domain socket. All protocol event handling runs on a single
//! worker task; the per-tab request store is the only state shared with the
//! IPC side.

pub mod attach;
pub mod client;
pub mod config;
pub mod correlator;
pub mod daemon;
pub mod error;
pub mod events;
pub mod health;
pub mod identity;
pub mod ipc;
pub mod session;
pub mod signal;
pub mod store;

pub use client::{DaemonClient, NetworkFilter};
pub use config::CaptureConfig;
pub use daemon::NetworkDaemon;
pub use error::DaemonError;
pub use identity::DaemonIdentity;
pub use store::{NetworkRequest, RequestStore, ResourceType};
