//! Client side of the IPC protocol, used by the CLI.
//!
//! Talks to a running daemon over its unix socket and knows how to start
//! one when none is running.

use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tracing::{debug, info};

use crate::config::CaptureConfig;
use crate::error::DaemonError;
use crate::identity::{is_process_alive, DaemonIdentity};
use crate::ipc::{IpcRequest, IpcResponse};
use crate::signal::send_shutdown_to_pid;
use crate::store::{NetworkRequest, ResourceType};

/// Per-request deadline covering connect, write, and read.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// How long `ensure_daemon` waits for a freshly spawned daemon to answer.
const SPAWN_POLL_ATTEMPTS: u32 = 30;
const SPAWN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// One request, one connection, one response.
pub async fn send_request(
    socket_path: &Path,
    request: &IpcRequest,
) -> Result<IpcResponse, DaemonError> {
    let exchange = async {
        let mut stream = UnixStream::connect(socket_path).await?;
        stream.write_all(&serde_json::to_vec(request)?).await?;
        stream.shutdown().await?;

        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await?;
        Ok::<_, DaemonError>(serde_json::from_slice::<IpcResponse>(&buf)?)
    };

    tokio::time::timeout(REQUEST_TIMEOUT, exchange)
        .await
        .map_err(|_| DaemonError::DaemonUnreachable)?
        .map_err(|_: DaemonError| DaemonError::DaemonUnreachable)
}

pub struct DaemonClient {
    config: CaptureConfig,
}

impl DaemonClient {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    /// True if an identity file points at a live process that answers on
    /// its socket.
    pub async fn daemon_running(&self) -> bool {
        let Some(identity) = DaemonIdentity::read(&self.config.identity_path) else {
            return false;
        };
        if !is_process_alive(identity.pid) {
            return false;
        }
        send_request(&identity.socket_path, &IpcRequest::list(None))
            .await
            .is_ok()
    }

    /// Start a daemon if none is running, then wait for it to answer.
    ///
    /// The daemon is re-exec'd from the current binary in its own process
    /// group so it survives the launching terminal.
    pub async fn ensure_daemon(&self) -> Result<(), DaemonError> {
        if self.daemon_running().await {
            debug!("Daemon already running");
            return Ok(());
        }

        let exe = std::env::current_exe()?;
        info!("Starting capture daemon: {} daemon run", exe.display());

        let mut command = std::process::Command::new(exe);
        command
            .args(["daemon", "run"])
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        command.spawn()?;

        for _ in 0..SPAWN_POLL_ATTEMPTS {
            tokio::time::sleep(SPAWN_POLL_INTERVAL).await;
            if self.daemon_running().await {
                return Ok(());
            }
        }
        Err(DaemonError::DaemonUnreachable)
    }

    fn socket_path(&self) -> std::path::PathBuf {
        DaemonIdentity::read(&self.config.identity_path)
            .map(|identity| identity.socket_path)
            .unwrap_or_else(|| self.config.socket_path.clone())
    }

    /// List captured requests, optionally scoped to one tab.
    pub async fn list(&self, tab_id: Option<&str>) -> Result<Vec<NetworkRequest>, DaemonError> {
        let response = send_request(
            &self.socket_path(),
            &IpcRequest::list(tab_id.map(str::to_string)),
        )
        .await?;
        if !response.success {
            return Ok(Vec::new());
        }
        let data = response.data.unwrap_or_else(|| serde_json::json!([]));
        Ok(serde_json::from_value(data)?)
    }

    /// Fetch one record by tab and id.
    pub async fn get(&self, tab_id: &str, request_id: u64) -> Result<NetworkRequest, DaemonError> {
        let response = send_request(
            &self.socket_path(),
            &IpcRequest::get(tab_id.to_string(), request_id),
        )
        .await?;
        match response.data {
            Some(data) if response.success => Ok(serde_json::from_value(data)?),
            _ => Err(DaemonError::NotFound(format!(
                "request {} in tab {}",
                request_id, tab_id
            ))),
        }
    }

    /// Discard captured records, optionally scoped to one tab.
    pub async fn clear(&self, tab_id: Option<&str>) -> Result<(), DaemonError> {
        let response = send_request(
            &self.socket_path(),
            &IpcRequest::clear(tab_id.map(str::to_string)),
        )
        .await?;
        if !response.success {
            return Err(DaemonError::DaemonUnreachable);
        }
        Ok(())
    }

    /// Ask a running daemon to shut down. No daemon is not an error.
    pub fn stop_daemon(&self) -> Result<bool, DaemonError> {
        let Some(identity) = DaemonIdentity::read(&self.config.identity_path) else {
            return Ok(false);
        };
        if !is_process_alive(identity.pid) {
            // Stale identity from a crashed daemon.
            DaemonIdentity::remove(&self.config.identity_path)?;
            return Ok(false);
        }
        send_shutdown_to_pid(identity.pid)?;
        Ok(true)
    }
}

/// Client-side record filtering for `list` output.
#[derive(Debug, Default, Clone)]
pub struct NetworkFilter {
    /// Case-insensitive substring match against the URL.
    pub pattern: Option<String>,
    /// Keep only these resource types; empty keeps all.
    pub types: Vec<ResourceType>,
    /// Keep only failed requests.
    pub failed: bool,
}

impl NetworkFilter {
    pub fn is_empty(&self) -> bool {
        self.pattern.is_none() && self.types.is_empty() && !self.failed
    }

    pub fn matches(&self, record: &NetworkRequest) -> bool {
        if let Some(pattern) = &self.pattern {
            let url = record.url.to_ascii_lowercase();
            if !url.contains(&pattern.to_ascii_lowercase()) {
                return false;
            }
        }
        if !self.types.is_empty() && !self.types.contains(&record.resource_type) {
            return false;
        }
        if self.failed && !record.failed {
            return false;
        }
        true
    }

    pub fn apply(&self, records: Vec<NetworkRequest>) -> Vec<NetworkRequest> {
        if self.is_empty() {
            return records;
        }
        records.into_iter().filter(|r| self.matches(r)).collect()
    }
}
