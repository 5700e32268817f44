//! CDP WebSocket client.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, trace, warn};

use crate::error::CdpError;
use crate::protocol::{BrowserVersion, CdpEvent, CdpMessage, CdpRequest, PageInfo};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Pending command waiting for its response.
struct PendingCommand {
    tx: oneshot::Sender<Result<Value, CdpError>>,
}

/// Probe the browser debugging endpoint.
///
/// A cheap liveness check: fetches `/json/version` with a bounded timeout.
/// Used at daemon startup and by the periodic health monitor.
pub async fn probe(endpoint: &str) -> Result<BrowserVersion, CdpError> {
    let url = format!("{}/json/version", endpoint.trim_end_matches('/'));
    let client = reqwest::Client::new();

    let version = client
        .get(&url)
        .timeout(PROBE_TIMEOUT)
        .send()
        .await
        .map_err(|e| CdpError::BrowserUnavailable(format!("{}: {}", endpoint, e)))?
        .json::<BrowserVersion>()
        .await
        .map_err(|e| CdpError::BrowserUnavailable(format!("{}: {}", endpoint, e)))?;

    Ok(version)
}

/// CDP client owning the single WebSocket connection to the browser.
///
/// Exactly one instance connects to a given endpoint; a second connection
/// would cause duplicate event delivery.
pub struct CdpClient {
    /// HTTP endpoint for target discovery.
    http_endpoint: String,
    /// WebSocket sender.
    ws_tx: Arc<tokio::sync::Mutex<WsSink>>,
    /// Command ID counter.
    command_id: Arc<AtomicU64>,
    /// Commands waiting for responses.
    pending: Arc<Mutex<HashMap<u64, PendingCommand>>>,
    /// Background receive task handle.
    _recv_task: tokio::task::JoinHandle<()>,
}

impl CdpClient {
    /// Connect to the browser at the given endpoint.
    ///
    /// All protocol events are forwarded to `event_tx` in the order the
    /// browser delivers them.
    pub async fn connect(
        endpoint: &str,
        event_tx: mpsc::UnboundedSender<CdpEvent>,
    ) -> Result<Self, CdpError> {
        let http_endpoint = endpoint.trim_end_matches('/').to_string();

        let version = probe(&http_endpoint).await?;
        debug!("Connected to browser: {}", version.browser);

        let ws_url = url::Url::parse(&version.web_socket_debugger_url)?;
        let (ws_stream, _) = tokio_tungstenite::connect_async(ws_url.as_str())
            .await
            .map_err(|e| CdpError::ConnectionFailed(format!("WebSocket: {}", e)))?;

        let (ws_sink, ws_source) = ws_stream.split();
        let ws_tx = Arc::new(tokio::sync::Mutex::new(ws_sink));
        let pending: Arc<Mutex<HashMap<u64, PendingCommand>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let recv_task = {
            let pending = pending.clone();
            tokio::spawn(async move {
                Self::receive_loop(ws_source, pending, event_tx).await;
            })
        };

        debug!("CDP client connected to {}", version.web_socket_debugger_url);

        Ok(Self {
            http_endpoint,
            ws_tx,
            command_id: Arc::new(AtomicU64::new(1)),
            pending,
            _recv_task: recv_task,
        })
    }

    /// WebSocket receive loop.
    async fn receive_loop(
        mut ws_source: WsSource,
        pending: Arc<Mutex<HashMap<u64, PendingCommand>>>,
        event_tx: mpsc::UnboundedSender<CdpEvent>,
    ) {
        while let Some(msg) = ws_source.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    trace!("CDP recv: {}", text);
                    match serde_json::from_str::<CdpMessage>(&text) {
                        Ok(msg) => {
                            if let Some(id) = msg.id {
                                let pending_cmd = pending.lock().remove(&id);
                                if let Some(cmd) = pending_cmd {
                                    let result = if let Some(err) = msg.error {
                                        Err(CdpError::Protocol {
                                            code: err.code,
                                            message: err.message,
                                        })
                                    } else {
                                        Ok(msg.result.unwrap_or(Value::Null))
                                    };
                                    let _ = cmd.tx.send(result);
                                }
                            } else if let Some(method) = msg.method {
                                // Event: forward in arrival order, routing
                                // by session is the consumer's job.
                                let _ = event_tx.send(CdpEvent {
                                    method,
                                    session_id: msg.session_id,
                                    params: msg.params.unwrap_or(Value::Null),
                                });
                            }
                        }
                        Err(e) => {
                            warn!("Failed to parse CDP message: {}", e);
                        }
                    }
                }
                Ok(Message::Close(_)) => {
                    debug!("WebSocket closed");
                    break;
                }
                Err(e) => {
                    error!("WebSocket error: {}", e);
                    break;
                }
                _ => {}
            }
        }
    }

    /// Send a CDP command and wait for its response.
    pub async fn call(
        &self,
        method: &str,
        params: Option<Value>,
        session_id: Option<&str>,
    ) -> Result<Value, CdpError> {
        let id = self.command_id.fetch_add(1, Ordering::SeqCst);

        let request = CdpRequest {
            id,
            method: method.to_string(),
            params,
            session_id: session_id.map(|s| s.to_string()),
        };

        let json = serde_json::to_string(&request)?;
        trace!("CDP send: {}", json);

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, PendingCommand { tx });

        {
            let mut ws = self.ws_tx.lock().await;
            ws.send(Message::Text(json.into())).await?;
        }

        match tokio::time::timeout(COMMAND_TIMEOUT, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CdpError::ConnectionClosed),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(CdpError::Timeout(format!("Command {} timed out", method)))
            }
        }
    }

    /// List all targets via the `/json/list` endpoint.
    pub async fn list_pages(&self) -> Result<Vec<PageInfo>, CdpError> {
        let url = format!("{}/json/list", self.http_endpoint);
        let pages: Vec<PageInfo> = reqwest::get(&url).await?.json().await?;
        Ok(pages)
    }

    /// Attach to a target and return the new session id.
    pub async fn attach_to_target(&self, target_id: &str) -> Result<String, CdpError> {
        let result = self
            .call(
                "Target.attachToTarget",
                Some(json!({
                    "targetId": target_id,
                    "flatten": true
                })),
                None,
            )
            .await?;

        result["sessionId"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| CdpError::InvalidResponse("Missing sessionId".to_string()))
    }

    /// Subscribe to target lifecycle notifications.
    pub async fn set_discover_targets(&self) -> Result<(), CdpError> {
        self.call(
            "Target.setDiscoverTargets",
            Some(json!({"discover": true})),
            None,
        )
        .await?;
        Ok(())
    }

    /// Resume a target that paused waiting for a debugger.
    pub async fn run_if_waiting_for_debugger(&self, session_id: &str) -> Result<(), CdpError> {
        self.call("Runtime.runIfWaitingForDebugger", None, Some(session_id))
            .await?;
        Ok(())
    }

    /// Fetch the response body for a finished request.
    ///
    /// Returns the body text and whether it was base64-encoded.
    pub async fn get_response_body(
        &self,
        session_id: &str,
        request_id: &str,
    ) -> Result<(String, bool), CdpError> {
        let result = self
            .call(
                "Network.getResponseBody",
                Some(json!({"requestId": request_id})),
                Some(session_id),
            )
            .await?;

        let body = result["body"]
            .as_str()
            .ok_or_else(|| CdpError::InvalidResponse("Missing response body".to_string()))?
            .to_string();
        let base64 = result["base64Encoded"].as_bool().unwrap_or(false);
        Ok((body, base64))
    }
}

impl Drop for CdpClient {
    fn drop(&mut self) {
        self._recv_task.abort();
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
