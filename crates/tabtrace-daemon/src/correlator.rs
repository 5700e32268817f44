//! Request correlator: assembles request records from the event stream.
//!
//! Four independent, session-scoped event kinds are folded into consistent
//! per-tab records. Handlers are only ever invoked from the daemon's single
//! worker task, so the pending map needs no lock; the request store carries
//! its own synchronization for the IPC side.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use tabtrace_cdp::CdpClient;

use crate::events::{
    LoadingFailed, LoadingFinished, RequestWillBeSent, ResponseReceived, NAVIGATION_ABORT,
};
use crate::session::SessionRegistry;
use crate::store::{Headers, NetworkRequest, RequestStore, ResourceType};

/// How much of a base64 body survives in the truncated marker.
const BASE64_PREVIEW_CHARS: usize = 100;

/// Best-effort response body retrieval.
///
/// Failure only leaves `responseBody` unset on an otherwise valid record;
/// it never fails the request and never holds up finalization.
pub trait BodyFetcher: Send + Sync {
    fn fetch<'a>(
        &'a self,
        session_id: &'a str,
        request_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>>;
}

/// Fetches bodies over the live CDP connection.
pub struct CdpBodyFetcher {
    client: Arc<CdpClient>,
}

impl CdpBodyFetcher {
    pub fn new(client: Arc<CdpClient>) -> Self {
        Self { client }
    }
}

impl BodyFetcher for CdpBodyFetcher {
    fn fetch<'a>(
        &'a self,
        session_id: &'a str,
        request_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        Box::pin(async move {
            let (body, base64) = self
                .client
                .get_response_body(session_id, request_id)
                .await
                .ok()?;
            if base64 {
                let preview: String = body.chars().take(BASE64_PREVIEW_CHARS).collect();
                Some(format!("[base64] {}...", preview))
            } else {
                Some(body)
            }
        })
    }
}

/// Per-request state machine: Sent, then optionally Responded, then the
/// entry is consumed by finished/failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingPhase {
    Sent,
    Responded,
}

/// Everything needed to materialize a record once a response or failure
/// arrives. Keyed by the protocol's own per-request identifier.
struct PendingEntry {
    record_id: u64,
    tab_id: String,
    url: String,
    method: String,
    resource_type: ResourceType,
    start_time: f64,
    request_headers: Headers,
    post_data: Option<String>,
    phase: PendingPhase,
}

pub struct Correlator {
    store: Arc<RequestStore>,
    registry: Arc<SessionRegistry>,
    fetcher: Arc<dyn BodyFetcher>,
    pending: HashMap<String, PendingEntry>,
    body_grace: Duration,
}

impl Correlator {
    pub fn new(
        store: Arc<RequestStore>,
        registry: Arc<SessionRegistry>,
        fetcher: Arc<dyn BodyFetcher>,
        body_grace: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            fetcher,
            pending: HashMap::new(),
            body_grace,
        }
    }

    /// Number of requests currently awaiting a response or failure.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// "request sent": allocate the next id and remember the entry.
    ///
    /// Events for sessions without a binding (a race with detach) are
    /// dropped, not queued. Redirects re-send with the same wire id; the
    /// newer entry supersedes the old one.
    pub fn on_request_sent(&mut self, session_id: &str, ev: RequestWillBeSent) {
        let Some(tab_id) = self.registry.tab_for(session_id) else {
            debug!(
                "Dropping requestWillBeSent for unknown session {}",
                session_id
            );
            return;
        };

        let resource_type = ev
            .resource_type
            .as_deref()
            .map(ResourceType::from_cdp)
            .unwrap_or(ResourceType::Other);

        self.pending.insert(
            ev.request_id.clone(),
            PendingEntry {
                record_id: self.store.next_id(),
                tab_id,
                url: ev.request.url,
                method: ev.request.method,
                resource_type,
                start_time: ev.timestamp * 1000.0,
                request_headers: ev.request.headers,
                post_data: ev.request.post_data,
                phase: PendingPhase::Sent,
            },
        );
    }

    /// "response received": append the record; the pending entry stays so
    /// that finished can supply timing and body.
    pub fn on_response_received(&mut self, ev: ResponseReceived) {
        let Some(entry) = self.pending.get_mut(&ev.request_id) else {
            debug!("Dropping responseReceived for untracked {}", ev.request_id);
            return;
        };

        let record = NetworkRequest {
            id: entry.record_id,
            tab_id: entry.tab_id.clone(),
            url: entry.url.clone(),
            method: entry.method.clone(),
            status: Some(ev.response.status),
            status_text: Some(ev.response.status_text),
            resource_type: entry.resource_type,
            start_time: entry.start_time,
            end_time: None,
            duration: None,
            request_headers: entry.request_headers.clone(),
            response_headers: Some(ev.response.headers),
            request_body: entry.post_data.clone(),
            response_body: None,
            error: None,
            failed: false,
        };
        entry.phase = PendingPhase::Responded;
        self.store.append(record);
    }

    /// "finished": finalize timing, then try for the body in the background.
    pub fn on_loading_finished(&mut self, session_id: &str, ev: LoadingFinished) {
        let Some(entry) = self.pending.remove(&ev.request_id) else {
            debug!("Dropping loadingFinished for untracked {}", ev.request_id);
            return;
        };

        let end_time = ev.timestamp * 1000.0;
        if self.store.finish(&entry.tab_id, entry.record_id, end_time) {
            self.spawn_body_fetch(session_id, &ev.request_id, &entry.tab_id, entry.record_id);
        }
    }

    fn spawn_body_fetch(&self, session_id: &str, request_id: &str, tab_id: &str, record_id: u64) {
        let fetcher = Arc::clone(&self.fetcher);
        let store = Arc::clone(&self.store);
        let session_id = session_id.to_string();
        let request_id = request_id.to_string();
        let tab_id = tab_id.to_string();
        let grace = self.body_grace;

        tokio::spawn(async move {
            match tokio::time::timeout(grace, fetcher.fetch(&session_id, &request_id)).await {
                Ok(Some(body)) => store.set_response_body(&tab_id, record_id, body),
                Ok(None) => debug!("No response body for request {}", request_id),
                Err(_) => debug!("Body fetch timed out for request {}", request_id),
            }
        });
    }

    /// "failed": update the finalized record if one exists, otherwise
    /// append a failed record from the pending fields.
    ///
    /// A navigation abort after a normal response is not an error; it only
    /// closes out the timing.
    pub fn on_loading_failed(&mut self, ev: LoadingFailed) {
        let Some(entry) = self.pending.remove(&ev.request_id) else {
            debug!("Dropping loadingFailed for untracked {}", ev.request_id);
            return;
        };

        let end_time = ev.timestamp * 1000.0;
        match entry.phase {
            PendingPhase::Responded => {
                let error = if ev.error_text == NAVIGATION_ABORT {
                    None
                } else {
                    Some(ev.error_text)
                };
                self.store.fail(&entry.tab_id, entry.record_id, end_time, error);
            }
            PendingPhase::Sent => {
                if ev.error_text != NAVIGATION_ABORT {
                    warn!("Request {} {} failed: {}", entry.method, entry.url, ev.error_text);
                }
                self.store.append(NetworkRequest {
                    id: entry.record_id,
                    tab_id: entry.tab_id,
                    url: entry.url,
                    method: entry.method,
                    status: None,
                    status_text: None,
                    resource_type: entry.resource_type,
                    start_time: entry.start_time,
                    end_time: Some(end_time),
                    duration: Some(end_time - entry.start_time),
                    request_headers: entry.request_headers,
                    response_headers: None,
                    request_body: entry.post_data,
                    response_body: None,
                    error: Some(ev.error_text),
                    failed: true,
                });
            }
        }
    }
}

#[cfg(test)]
#[path = "correlator_tests.rs"]
mod tests;
