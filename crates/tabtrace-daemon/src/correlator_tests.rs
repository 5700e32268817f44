use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::json;

use super::*;

/// Returns a canned body, counting calls.
struct StubFetcher {
    body: Option<String>,
    calls: AtomicUsize,
}

impl StubFetcher {
    fn with_body(body: &str) -> Arc<Self> {
        Arc::new(Self {
            body: Some(body.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            body: None,
            calls: AtomicUsize::new(0),
        })
    }
}

impl BodyFetcher for StubFetcher {
    fn fetch<'a>(
        &'a self,
        _session_id: &'a str,
        _request_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let body = self.body.clone();
        Box::pin(async move { body })
    }
}

struct Fixture {
    store: Arc<RequestStore>,
    registry: Arc<SessionRegistry>,
    fetcher: Arc<StubFetcher>,
    correlator: Correlator,
}

fn fixture(fetcher: Arc<StubFetcher>) -> Fixture {
    let store = Arc::new(RequestStore::new());
    let registry = Arc::new(SessionRegistry::new());
    registry.bind("S1", "tab1");
    let correlator = Correlator::new(
        store.clone(),
        registry.clone(),
        fetcher.clone() as Arc<dyn BodyFetcher>,
        Duration::from_secs(3),
    );
    Fixture {
        store,
        registry,
        fetcher,
        correlator,
    }
}

fn sent(request_id: &str, url: &str, resource_type: &str, timestamp: f64) -> RequestWillBeSent {
    serde_json::from_value(json!({
        "requestId": request_id,
        "request": {
            "url": url,
            "method": "GET",
            "headers": {"Accept": "*/*"}
        },
        "timestamp": timestamp,
        "type": resource_type
    }))
    .unwrap()
}

fn responded(request_id: &str, status: u32) -> ResponseReceived {
    serde_json::from_value(json!({
        "requestId": request_id,
        "response": {
            "status": status,
            "statusText": if status == 200 { "OK" } else { "" },
            "headers": {"Content-Type": "text/html"}
        }
    }))
    .unwrap()
}

fn finished(request_id: &str, timestamp: f64) -> LoadingFinished {
    serde_json::from_value(json!({"requestId": request_id, "timestamp": timestamp})).unwrap()
}

fn failed(request_id: &str, timestamp: f64, error: &str) -> LoadingFailed {
    serde_json::from_value(json!({
        "requestId": request_id,
        "timestamp": timestamp,
        "errorText": error
    }))
    .unwrap()
}

#[tokio::test]
async fn basic_request_produces_one_complete_record() {
    let mut f = fixture(StubFetcher::with_body("<html></html>"));

    f.correlator
        .on_request_sent("S1", sent("R1", "https://example.test/", "Document", 10.0));
    f.correlator.on_response_received(responded("R1", 200));
    f.correlator.on_loading_finished("S1", finished("R1", 10.25));

    // Let the detached body fetch land.
    tokio::task::yield_now().await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let records = f.store.list("tab1");
    assert_eq!(records.len(), 1);
    let r = &records[0];
    assert_eq!(r.method, "GET");
    assert_eq!(r.status, Some(200));
    assert_eq!(r.duration, Some(250.0));
    assert!(!r.failed);
    assert_eq!(r.response_body.as_deref(), Some("<html></html>"));
    assert_eq!(f.correlator.pending_len(), 0);
}

#[tokio::test]
async fn failed_request_records_error_without_status() {
    let mut f = fixture(StubFetcher::failing());

    f.correlator.on_request_sent(
        "S1",
        sent("R1", "https://no-such-host.test/", "Document", 5.0),
    );
    f.correlator
        .on_loading_failed(failed("R1", 5.5, "net::ERR_NAME_NOT_RESOLVED"));

    let records = f.store.list("tab1");
    assert_eq!(records.len(), 1);
    let r = &records[0];
    assert!(r.failed);
    assert_eq!(r.error.as_deref(), Some("net::ERR_NAME_NOT_RESOLVED"));
    assert!(r.status.is_none());
    assert_eq!(r.duration, Some(500.0));
}

#[tokio::test]
async fn navigation_abort_after_response_is_not_a_failure() {
    let mut f = fixture(StubFetcher::failing());

    f.correlator
        .on_request_sent("S1", sent("R1", "https://example.test/slow", "Xhr", 1.0));
    f.correlator.on_response_received(responded("R1", 200));
    f.correlator
        .on_loading_failed(failed("R1", 1.2, "net::ERR_ABORTED"));

    let r = &f.store.list("tab1")[0];
    assert!(!r.failed);
    assert!(r.error.is_none());
    assert_eq!(r.status, Some(200));
    // Timing is still closed out.
    assert!(r.end_time.is_some());
}

#[tokio::test]
async fn navigation_abort_without_response_is_a_failure() {
    let mut f = fixture(StubFetcher::failing());

    f.correlator
        .on_request_sent("S1", sent("R1", "https://example.test/gone", "Document", 1.0));
    f.correlator
        .on_loading_failed(failed("R1", 1.1, "net::ERR_ABORTED"));

    // The request never got a response, so the abort is the whole story.
    let r = &f.store.list("tab1")[0];
    assert!(r.failed);
    assert_eq!(r.error.as_deref(), Some("net::ERR_ABORTED"));
    assert!(r.status.is_none());
}

#[tokio::test]
async fn genuine_failure_after_response_marks_record() {
    let mut f = fixture(StubFetcher::failing());

    f.correlator
        .on_request_sent("S1", sent("R1", "https://example.test/cut", "Fetch", 1.0));
    f.correlator.on_response_received(responded("R1", 200));
    f.correlator
        .on_loading_failed(failed("R1", 1.5, "net::ERR_CONNECTION_RESET"));

    let r = &f.store.list("tab1")[0];
    assert!(r.failed);
    assert_eq!(r.error.as_deref(), Some("net::ERR_CONNECTION_RESET"));
}

#[tokio::test]
async fn duplicate_finalization_events_are_ignored() {
    let mut f = fixture(StubFetcher::with_body("ok"));

    f.correlator
        .on_request_sent("S1", sent("R1", "https://example.test/", "Document", 10.0));
    f.correlator.on_response_received(responded("R1", 200));
    f.correlator.on_loading_finished("S1", finished("R1", 10.1));

    // Late duplicates for the same wire id must not alter the record.
    f.correlator.on_loading_finished("S1", finished("R1", 99.0));
    f.correlator
        .on_loading_failed(failed("R1", 99.0, "net::ERR_FAILED"));

    let records = f.store.list("tab1");
    assert_eq!(records.len(), 1);
    let r = &records[0];
    assert_eq!(r.end_time, Some(10_100.0));
    assert!(!r.failed);
}

#[tokio::test]
async fn events_for_unknown_session_are_dropped() {
    let mut f = fixture(StubFetcher::failing());

    f.correlator.on_request_sent(
        "S-detached",
        sent("R1", "https://example.test/", "Document", 1.0),
    );

    assert_eq!(f.correlator.pending_len(), 0);
    assert!(f.store.is_empty());
}

#[tokio::test]
async fn response_without_pending_entry_is_dropped() {
    let mut f = fixture(StubFetcher::failing());

    f.correlator.on_response_received(responded("R-gone", 200));
    f.correlator
        .on_loading_finished("S1", finished("R-gone", 1.0));

    assert!(f.store.is_empty());
}

#[tokio::test]
async fn finished_without_response_produces_no_record() {
    let mut f = fixture(StubFetcher::with_body("x"));

    f.correlator
        .on_request_sent("S1", sent("R1", "https://example.test/", "Document", 1.0));
    f.correlator.on_loading_finished("S1", finished("R1", 1.5));

    assert!(f.store.is_empty());
    assert_eq!(f.correlator.pending_len(), 0);
    assert_eq!(f.fetcher.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn body_fetch_failure_leaves_record_valid() {
    let mut f = fixture(StubFetcher::failing());

    f.correlator
        .on_request_sent("S1", sent("R1", "https://example.test/img", "Image", 2.0));
    f.correlator.on_response_received(responded("R1", 200));
    f.correlator.on_loading_finished("S1", finished("R1", 2.5));

    tokio::task::yield_now().await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let r = &f.store.list("tab1")[0];
    assert!(r.response_body.is_none());
    assert!(!r.failed);
    assert_eq!(r.duration, Some(500.0));
    assert_eq!(f.fetcher.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn ids_follow_sent_order_across_tabs() {
    let mut f = fixture(StubFetcher::failing());
    f.registry.bind("S2", "tab2");

    f.correlator
        .on_request_sent("S1", sent("R1", "https://example.test/a", "Document", 1.0));
    f.correlator
        .on_request_sent("S2", sent("R2", "https://example.test/b", "Document", 1.1));
    // Responses arrive out of order; ids still reflect sent order.
    f.correlator.on_response_received(responded("R2", 200));
    f.correlator.on_response_received(responded("R1", 200));

    let a = &f.store.list("tab1")[0];
    let b = &f.store.list("tab2")[0];
    assert!(a.id < b.id);
}

#[tokio::test]
async fn tab_close_keeps_captured_records() {
    let mut f = fixture(StubFetcher::failing());

    for (rid, url) in [("R1", "/a"), ("R2", "/b"), ("R3", "/c")] {
        f.correlator.on_request_sent(
            "S1",
            sent(rid, &format!("https://example.test{}", url), "Xhr", 1.0),
        );
        f.correlator.on_response_received(responded(rid, 200));
    }

    // Tab closed: only the live attachment is dropped.
    f.registry.unbind_tab("tab1");

    assert_eq!(f.store.list("tab1").len(), 3);
}
