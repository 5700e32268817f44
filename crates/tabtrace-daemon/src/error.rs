//! Daemon error types.

use std::path::PathBuf;

use thiserror::Error;

use tabtrace_cdp::CdpError;

/// Errors from the capture daemon and its client helpers.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Browser endpoint unreachable. At startup this is not a daemon
    /// fault; the binary maps it to a distinct exit code.
    #[error("Browser endpoint unreachable: {0}")]
    BrowserUnavailable(String),

    /// CDP failure other than endpoint loss.
    #[error("CDP error: {0}")]
    Cdp(CdpError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Identity file could not be written or removed.
    #[error("Identity file error at {path}: {reason}")]
    Identity { path: PathBuf, reason: String },

    /// IPC socket could not be bound.
    #[error("Failed to bind IPC socket at {path}: {reason}")]
    SocketBind { path: PathBuf, reason: String },

    /// No daemon answered within the client timeout. Retryable; distinct
    /// from a query that answered "not found".
    #[error("Network capture daemon not reachable")]
    DaemonUnreachable,

    /// Query answered, but the record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// OS signal handler installation failed.
    #[error("Signal setup failed: {0}")]
    SignalSetup(String),

    /// Configuration rejected by validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<CdpError> for DaemonError {
    fn from(e: CdpError) -> Self {
        match e {
            CdpError::BrowserUnavailable(msg) => DaemonError::BrowserUnavailable(msg),
            other => DaemonError::Cdp(other),
        }
    }
}
