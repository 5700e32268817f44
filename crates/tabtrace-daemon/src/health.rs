//! Periodic browser health checks.
//!
//! The daemon has no reason to outlive the browser it watches: every
//! interval the monitor probes the debugging endpoint, requests shutdown
//! when the browser has gone away, and otherwise asks the worker for a
//! discovery sweep so tab attachments stay current between queries.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::daemon::WorkerCommand;
use crate::signal::SignalHandler;

pub struct HealthMonitor {
    endpoint: String,
    interval: Duration,
    worker: mpsc::UnboundedSender<WorkerCommand>,
    signals: SignalHandler,
}

impl HealthMonitor {
    pub fn new(
        endpoint: String,
        interval: Duration,
        worker: mpsc::UnboundedSender<WorkerCommand>,
        signals: SignalHandler,
    ) -> Self {
        Self {
            endpoint,
            interval,
            worker,
            signals,
        }
    }

    /// Run until shutdown. One failed probe is enough to stop the daemon;
    /// a dead browser does not come back with the same targets.
    pub async fn run(self) {
        info!("Health monitor started (interval: {:?})", self.interval);
        let mut shutdown = self.signals.subscribe();
        if self.signals.is_shutdown_requested() {
            info!("Health monitor shutting down");
            return;
        }

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    match tabtrace_cdp::probe(&self.endpoint).await {
                        Ok(version) => {
                            debug!("Browser healthy: {}", version.browser);
                            let (ack_tx, _ack_rx) = oneshot::channel();
                            let _ = self.worker.send(WorkerCommand::Sweep(ack_tx));
                        }
                        Err(e) => {
                            warn!("Browser unreachable, shutting down: {}", e);
                            self.signals.request_shutdown();
                            break;
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("Health monitor shutting down");
                    break;
                }
            }
        }
    }
}
