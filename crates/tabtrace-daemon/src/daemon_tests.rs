use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tabtrace_cdp::{CdpError, PageInfo};

use super::*;

struct NoopOps;

impl TargetOps for NoopOps {
    fn list_pages<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<PageInfo>, CdpError>> + Send + 'a>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    fn attach_to_target<'a>(
        &'a self,
        _target_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, CdpError>> + Send + 'a>> {
        Box::pin(async { Ok("S1".to_string()) })
    }

    fn enable_network<'a>(
        &'a self,
        _session_id: &'a str,
        _max_total_buffer_size: u64,
        _max_resource_buffer_size: u64,
    ) -> Pin<Box<dyn Future<Output = Result<(), CdpError>> + Send + 'a>> {
        Box::pin(async { Ok(()) })
    }

    fn resume(&self, _session_id: &str) {}

    fn subscribe_targets<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<(), CdpError>> + Send + 'a>> {
        Box::pin(async { Ok(()) })
    }
}

struct NoopFetcher;

impl BodyFetcher for NoopFetcher {
    fn fetch<'a>(
        &'a self,
        _session_id: &'a str,
        _request_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        Box::pin(async { None })
    }
}

fn worker_parts() -> (Correlator, TabAttacher) {
    let store = Arc::new(RequestStore::new());
    let registry = Arc::new(SessionRegistry::new());
    let correlator = Correlator::new(
        Arc::clone(&store),
        Arc::clone(&registry),
        Arc::new(NoopFetcher),
        Duration::from_secs(1),
    );
    let attacher = TabAttacher::new(Arc::new(NoopOps), registry, &CaptureConfig::default());
    (correlator, attacher)
}

#[tokio::test]
async fn worker_exits_when_shutdown_was_requested_before_it_started() {
    let signals = SignalHandler::new();
    signals.request_shutdown();

    let (correlator, attacher) = worker_parts();
    let (_event_tx, event_rx) = mpsc::unbounded_channel::<tabtrace_cdp::CdpEvent>();
    let (_cmd_tx, cmd_rx) = mpsc::unbounded_channel::<WorkerCommand>();

    let worker = tokio::spawn(worker_loop(
        correlator,
        attacher,
        event_rx,
        cmd_rx,
        signals.clone(),
    ));
    tokio::time::timeout(Duration::from_secs(1), worker)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn worker_requests_shutdown_when_event_stream_closes() {
    let signals = SignalHandler::new();
    let mut shutdown = signals.subscribe();

    let (correlator, attacher) = worker_parts();
    let (event_tx, event_rx) = mpsc::unbounded_channel::<tabtrace_cdp::CdpEvent>();
    let (_cmd_tx, cmd_rx) = mpsc::unbounded_channel::<WorkerCommand>();
    drop(event_tx);

    let worker = tokio::spawn(worker_loop(
        correlator,
        attacher,
        event_rx,
        cmd_rx,
        signals.clone(),
    ));
    tokio::time::timeout(Duration::from_secs(1), worker)
        .await
        .unwrap()
        .unwrap();

    assert!(signals.is_shutdown_requested());
    assert!(shutdown.recv().await.is_ok());
}

#[tokio::test]
async fn worker_acks_sweep_commands() {
    let signals = SignalHandler::new();

    let (correlator, attacher) = worker_parts();
    let (_event_tx, event_rx) = mpsc::unbounded_channel::<tabtrace_cdp::CdpEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<WorkerCommand>();

    let worker = tokio::spawn(worker_loop(
        correlator,
        attacher,
        event_rx,
        cmd_rx,
        signals.clone(),
    ));

    let (ack_tx, ack_rx) = oneshot::channel();
    cmd_tx.send(WorkerCommand::Sweep(ack_tx)).unwrap();
    tokio::time::timeout(Duration::from_secs(1), ack_rx)
        .await
        .unwrap()
        .unwrap();

    signals.request_shutdown();
    tokio::time::timeout(Duration::from_secs(1), worker)
        .await
        .unwrap()
        .unwrap();
}
