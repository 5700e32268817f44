//! Daemon identity file: `{pid, socketPath}` at a well-known path.
//!
//! Clients read it to detect a running daemon and locate its socket. It is
//! written only after the browser endpoint check passes and removed on
//! clean shutdown.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::DaemonError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonIdentity {
    pub pid: u32,
    #[serde(rename = "socketPath")]
    pub socket_path: PathBuf,
}

impl DaemonIdentity {
    /// Identity for the current process.
    pub fn current(socket_path: PathBuf) -> Self {
        Self {
            pid: std::process::id(),
            socket_path,
        }
    }

    /// Write the identity file, creating parent directories as needed.
    pub fn write(&self, path: &Path) -> Result<(), DaemonError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DaemonError::Identity {
                path: path.to_path_buf(),
                reason: format!("failed to create parent directory: {}", e),
            })?;
        }

        let json = serde_json::to_string(self)?;
        std::fs::write(path, json).map_err(|e| DaemonError::Identity {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        info!("Identity file written: {} (PID {})", path.display(), self.pid);
        Ok(())
    }

    /// Read an identity file. Missing or corrupt files read as `None`; a
    /// client treats both as "no daemon running".
    pub fn read(path: &Path) -> Option<Self> {
        let contents = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&contents) {
            Ok(identity) => Some(identity),
            Err(e) => {
                debug!("Ignoring corrupt identity file {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Remove the identity file. Idempotent.
    pub fn remove(path: &Path) -> Result<(), DaemonError> {
        match std::fs::remove_file(path) {
            Ok(()) => {
                info!("Identity file removed: {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DaemonError::Identity {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }),
        }
    }
}

/// Check whether a process with the given PID is running.
#[cfg(unix)]
pub fn is_process_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    // Signal 0: existence check without delivering anything.
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

#[cfg(not(unix))]
pub fn is_process_alive(_pid: u32) -> bool {
    // No cheap probe available; assume alive.
    true
}

#[cfg(test)]
#[path = "identity_tests.rs"]
mod tests;
