//! IPC query server: list / get / clear over a unix domain socket.
//!
//! One request per connection. A client writes a single JSON request,
//! shuts down its write half, and reads a single JSON response; the server
//! closes the connection after answering. Malformed requests get a
//! `{success:false}` answer, never a dropped connection.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::daemon::WorkerCommand;
use crate::error::DaemonError;
use crate::store::RequestStore;

/// How long a query waits for the pre-answer discovery sweep before
/// answering from current state anyway.
const SWEEP_WAIT: Duration = Duration::from_secs(2);

/// Wire request: `{"type": "list"|"get"|"clear", "tabId"?, "requestId"?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcRequest {
    #[serde(rename = "type")]
    pub op: String,
    #[serde(rename = "tabId", skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<String>,
    #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
}

impl IpcRequest {
    pub fn list(tab_id: Option<String>) -> Self {
        Self {
            op: "list".to_string(),
            tab_id,
            request_id: None,
        }
    }

    pub fn get(tab_id: String, request_id: u64) -> Self {
        Self {
            op: "get".to_string(),
            tab_id: Some(tab_id),
            request_id: Some(request_id),
        }
    }

    pub fn clear(tab_id: Option<String>) -> Self {
        Self {
            op: "clear".to_string(),
            tab_id,
            request_id: None,
        }
    }
}

/// Wire response: `{"success": bool, "data"?, "error"?}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct IpcResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IpcResponse {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn ok_empty() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

pub struct IpcServer {
    listener: UnixListener,
    store: Arc<RequestStore>,
    worker: mpsc::UnboundedSender<WorkerCommand>,
}

impl IpcServer {
    /// Bind the listener, replacing a stale socket file from a previous
    /// daemon instance.
    pub fn bind(
        path: &Path,
        store: Arc<RequestStore>,
        worker: mpsc::UnboundedSender<WorkerCommand>,
    ) -> Result<Self, DaemonError> {
        if path.exists() {
            std::fs::remove_file(path).map_err(|e| DaemonError::SocketBind {
                path: path.to_path_buf(),
                reason: format!("failed to remove stale socket: {}", e),
            })?;
        }

        let listener = UnixListener::bind(path).map_err(|e| DaemonError::SocketBind {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        info!("IPC server listening on {}", path.display());
        Ok(Self {
            listener,
            store,
            worker,
        })
    }

    /// Accept loop; each connection is answered on its own task.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, _)) => {
                            let store = Arc::clone(&self.store);
                            let worker = self.worker.clone();
                            tokio::spawn(async move {
                                handle_connection(stream, store, worker).await;
                            });
                        }
                        Err(e) => {
                            warn!("IPC accept failed: {}", e);
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("IPC server shutting down");
                    break;
                }
            }
        }
    }
}

async fn handle_connection(
    mut stream: UnixStream,
    store: Arc<RequestStore>,
    worker: mpsc::UnboundedSender<WorkerCommand>,
) {
    let mut buf = Vec::new();
    if let Err(e) = stream.read_to_end(&mut buf).await {
        warn!("IPC read failed: {}", e);
        return;
    }

    let response = match serde_json::from_slice::<IpcRequest>(&buf) {
        Ok(request) => dispatch(request, &store, &worker).await,
        Err(e) => IpcResponse::err(format!("Invalid request: {}", e)),
    };

    match serde_json::to_vec(&response) {
        Ok(bytes) => {
            if let Err(e) = stream.write_all(&bytes).await {
                debug!("IPC write failed: {}", e);
            }
        }
        Err(e) => warn!("Failed to serialize IPC response: {}", e),
    }
    let _ = stream.shutdown().await;
}

async fn dispatch(
    request: IpcRequest,
    store: &RequestStore,
    worker: &mpsc::UnboundedSender<WorkerCommand>,
) -> IpcResponse {
    match request.op.as_str() {
        "list" => {
            sweep(worker).await;
            let records = match request.tab_id.as_deref() {
                Some(tab) => store.list(tab),
                None => store.list_all(),
            };
            match serde_json::to_value(records) {
                Ok(data) => IpcResponse::ok(data),
                Err(e) => IpcResponse::err(e.to_string()),
            }
        }
        "get" => {
            sweep(worker).await;
            let (Some(tab), Some(id)) = (request.tab_id.as_deref(), request.request_id) else {
                return IpcResponse::err("tabId and requestId required");
            };
            match store.get(tab, id) {
                Some(record) => match serde_json::to_value(record) {
                    Ok(data) => IpcResponse::ok(data),
                    Err(e) => IpcResponse::err(e.to_string()),
                },
                None => IpcResponse::err("Request not found"),
            }
        }
        "clear" => {
            store.clear(request.tab_id.as_deref());
            IpcResponse::ok_empty()
        }
        other => IpcResponse::err(format!("Unknown request type: {}", other)),
    }
}

/// Ask the worker for a discovery sweep so tabs opened since the last
/// query become queryable; bounded so a busy worker cannot stall reads.
async fn sweep(worker: &mpsc::UnboundedSender<WorkerCommand>) {
    let (ack_tx, ack_rx) = oneshot::channel();
    if worker.send(WorkerCommand::Sweep(ack_tx)).is_ok() {
        let _ = tokio::time::timeout(SWEEP_WAIT, ack_rx).await;
    }
}

#[cfg(test)]
#[path = "ipc_tests.rs"]
mod tests;
