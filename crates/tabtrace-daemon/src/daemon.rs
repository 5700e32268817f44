//! Daemon lifecycle and the single-worker event loop.
//!
//! All protocol events and discovery sweeps are handled on one worker
//! task, in arrival order. That serialization is what makes the
//! correlator's pending map lock-free and keeps record ids in event
//! order; nothing else in the process may touch the correlator.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use tabtrace_cdp::{CdpClient, CdpEvent};

use crate::attach::{CdpTargetOps, TabAttacher, TargetOps};
use crate::config::CaptureConfig;
use crate::correlator::{BodyFetcher, CdpBodyFetcher, Correlator};
use crate::error::DaemonError;
use crate::identity::DaemonIdentity;
use crate::ipc::IpcServer;
use crate::session::SessionRegistry;
use crate::signal::SignalHandler;
use crate::store::RequestStore;

/// Work the IPC side hands to the worker task.
pub enum WorkerCommand {
    /// Run a discovery sweep, then ack. Queries wait on the ack so that
    /// tabs opened since the last sweep are attached before answering.
    Sweep(oneshot::Sender<()>),
}

pub struct NetworkDaemon {
    config: CaptureConfig,
}

impl NetworkDaemon {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    /// Run until shutdown. Returns after cleanup has finished.
    pub async fn run(self) -> Result<(), DaemonError> {
        let endpoint = self.config.endpoint();

        // No browser, no daemon. Checked before any state file exists so a
        // failed start leaves nothing behind.
        let version = tabtrace_cdp::probe(&endpoint).await?;
        info!("Browser found: {} ({})", version.browser, endpoint);

        let (event_tx, event_rx) = mpsc::unbounded_channel::<CdpEvent>();
        let client = Arc::new(CdpClient::connect(&endpoint, event_tx).await?);

        let store = Arc::new(RequestStore::new());
        let registry = Arc::new(SessionRegistry::new());
        let ops: Arc<dyn TargetOps> = Arc::new(CdpTargetOps::new(Arc::clone(&client)));
        let attacher = TabAttacher::new(ops, Arc::clone(&registry), &self.config);
        let fetcher: Arc<dyn BodyFetcher> = Arc::new(CdpBodyFetcher::new(Arc::clone(&client)));
        let correlator = Correlator::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            fetcher,
            self.config.body_fetch_grace(),
        );

        // The main receiver must exist before signal handlers or any task
        // that can request shutdown: the broadcast only reaches receivers
        // alive at send time.
        let signals = SignalHandler::new();
        let mut shutdown = signals.subscribe();
        signals.setup_os_signals()?;

        let (worker_tx, worker_rx) = mpsc::unbounded_channel::<WorkerCommand>();

        let identity = DaemonIdentity::current(self.config.socket_path.clone());
        identity.write(&self.config.identity_path)?;

        let ipc = IpcServer::bind(&self.config.socket_path, Arc::clone(&store), worker_tx.clone())?;
        let ipc_task = tokio::spawn(ipc.run(signals.subscribe()));

        // Initial attach pass, then lifecycle notifications keep us current.
        attacher.subscribe_targets().await?;
        attacher.discover_and_attach_all().await;

        let worker_task = tokio::spawn(worker_loop(
            correlator,
            attacher,
            event_rx,
            worker_rx,
            signals.clone(),
        ));

        let health = crate::health::HealthMonitor::new(
            endpoint,
            self.config.health_interval(),
            worker_tx,
            signals.clone(),
        );
        let health_task = tokio::spawn(health.run());

        info!("Network capture daemon running (PID {})", identity.pid);

        if !signals.is_shutdown_requested() {
            let _ = shutdown.recv().await;
        }
        info!("Shutting down");

        // Re-broadcast so tasks whose receivers were created after an
        // early shutdown request still see it.
        signals.request_shutdown();

        for task in [ipc_task, worker_task, health_task] {
            if let Err(e) = task.await {
                warn!("Task did not shut down cleanly: {}", e);
            }
        }

        self.cleanup();
        Ok(())
    }

    /// Remove socket and identity files. Every step is idempotent, so a
    /// second invocation (or a crash between steps) is harmless.
    fn cleanup(&self) {
        if let Err(e) = std::fs::remove_file(&self.config.socket_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    "Failed to remove socket {}: {}",
                    self.config.socket_path.display(),
                    e
                );
            }
        }
        if let Err(e) = DaemonIdentity::remove(&self.config.identity_path) {
            warn!("Failed to remove identity file: {}", e);
        }
        info!("Cleanup complete");
    }
}

/// The single worker task: protocol events and IPC commands, one at a time.
async fn worker_loop(
    mut correlator: Correlator,
    attacher: TabAttacher,
    mut events: mpsc::UnboundedReceiver<CdpEvent>,
    mut commands: mpsc::UnboundedReceiver<WorkerCommand>,
    signals: SignalHandler,
) {
    let mut shutdown = signals.subscribe();
    // A shutdown requested before this subscription only left the flag.
    if signals.is_shutdown_requested() {
        info!("Worker shutting down ({} requests still pending)", correlator.pending_len());
        return;
    }
    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(event) => handle_event(&mut correlator, &attacher, event).await,
                    None => {
                        // The connection's receive loop ended; the browser
                        // side of the socket is gone.
                        warn!("Event stream closed, requesting shutdown");
                        signals.request_shutdown();
                        break;
                    }
                }
            }
            command = commands.recv() => {
                match command {
                    Some(WorkerCommand::Sweep(ack)) => {
                        attacher.discover_and_attach_all().await;
                        let _ = ack.send(());
                    }
                    None => break,
                }
            }
            _ = shutdown.recv() => {
                info!("Worker shutting down ({} requests still pending)", correlator.pending_len());
                break;
            }
        }
    }
}

async fn handle_event(correlator: &mut Correlator, attacher: &TabAttacher, event: CdpEvent) {
    match event.method.as_str() {
        "Network.requestWillBeSent" => {
            let Some(session_id) = event.session_id else {
                return;
            };
            match serde_json::from_value(event.params) {
                Ok(ev) => correlator.on_request_sent(&session_id, ev),
                Err(e) => debug!("Malformed requestWillBeSent: {}", e),
            }
        }
        "Network.responseReceived" => match serde_json::from_value(event.params) {
            Ok(ev) => correlator.on_response_received(ev),
            Err(e) => debug!("Malformed responseReceived: {}", e),
        },
        "Network.loadingFinished" => {
            let Some(session_id) = event.session_id else {
                return;
            };
            match serde_json::from_value(event.params) {
                Ok(ev) => correlator.on_loading_finished(&session_id, ev),
                Err(e) => debug!("Malformed loadingFinished: {}", e),
            }
        }
        "Network.loadingFailed" => match serde_json::from_value(event.params) {
            Ok(ev) => correlator.on_loading_failed(ev),
            Err(e) => debug!("Malformed loadingFailed: {}", e),
        },
        "Target.targetCreated" => match serde_json::from_value(event.params) {
            Ok(ev) => attacher.on_target_created(ev).await,
            Err(e) => debug!("Malformed targetCreated: {}", e),
        },
        "Target.targetDestroyed" => match serde_json::from_value(event.params) {
            Ok(ev) => attacher.on_target_destroyed(ev),
            Err(e) => debug!("Malformed targetDestroyed: {}", e),
        },
        "Target.attachedToTarget" => match serde_json::from_value(event.params) {
            Ok(ev) => attacher.on_attached_to_target(ev).await,
            Err(e) => debug!("Malformed attachedToTarget: {}", e),
        },
        "Target.detachedFromTarget" => match serde_json::from_value(event.params) {
            Ok(ev) => attacher.on_detached(ev),
            Err(e) => debug!("Malformed detachedFromTarget: {}", e),
        },
        other => {
            debug!("Ignoring event {}", other);
        }
    }
}

#[cfg(test)]
#[path = "daemon_tests.rs"]
mod tests;
