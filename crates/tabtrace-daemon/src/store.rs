//! In-memory request store: per-tab, insertion-ordered records.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Header map in wire order; duplicate keys are last-wins, as in the
/// protocol's own JSON objects.
pub type Headers = serde_json::Map<String, serde_json::Value>;

/// Browser-classified category of a network fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Document,
    Stylesheet,
    Script,
    Image,
    Font,
    Xhr,
    Fetch,
    Websocket,
    Other,
}

impl ResourceType {
    /// Map a CDP `type` string (case-insensitive); unknown kinds become
    /// `Other`.
    pub fn from_cdp(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "document" => ResourceType::Document,
            "stylesheet" => ResourceType::Stylesheet,
            "script" => ResourceType::Script,
            "image" => ResourceType::Image,
            "font" => ResourceType::Font,
            "xhr" => ResourceType::Xhr,
            "fetch" => ResourceType::Fetch,
            "websocket" => ResourceType::Websocket,
            _ => ResourceType::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Document => "document",
            ResourceType::Stylesheet => "stylesheet",
            ResourceType::Script => "script",
            ResourceType::Image => "image",
            ResourceType::Font => "font",
            ResourceType::Xhr => "xhr",
            ResourceType::Fetch => "fetch",
            ResourceType::Websocket => "websocket",
            ResourceType::Other => "other",
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strict parse for user input; unlike [`ResourceType::from_cdp`], unknown
/// names are an error rather than `Other`.
impl std::str::FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match ResourceType::from_cdp(s) {
            ResourceType::Other if !s.eq_ignore_ascii_case("other") => {
                Err(format!("unknown resource type: {}", s))
            }
            parsed => Ok(parsed),
        }
    }
}

/// One captured request/response cycle, finalized or in-flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRequest {
    /// Monotonically increasing, unique for one daemon lifetime.
    pub id: u64,
    pub tab_id: String,
    pub url: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    /// Milliseconds (CDP monotonic seconds scaled by 1000).
    pub start_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    pub request_headers: Headers,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_headers: Option<Headers>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub failed: bool,
}

#[derive(Default)]
struct StoreInner {
    tabs: HashMap<String, Vec<NetworkRequest>>,
    next_id: u64,
}

/// The system of record queried by IPC clients.
///
/// All access goes through synchronized methods; the single mutex also
/// guarantees that cross-tab operations (clear-all, list-all) never observe
/// a half-updated set of stores. Stores survive tab detach; only `clear`
/// drops records.
pub struct RequestStore {
    inner: Mutex<StoreInner>,
}

impl RequestStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                tabs: HashMap::new(),
                next_id: 1,
            }),
        }
    }

    /// Allocate the next record id, in "request sent" observation order.
    pub fn next_id(&self) -> u64 {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        id
    }

    /// Append a record to its tab's store, creating the store on demand.
    pub fn append(&self, record: NetworkRequest) {
        let mut inner = self.inner.lock();
        inner
            .tabs
            .entry(record.tab_id.clone())
            .or_default()
            .push(record);
    }

    /// Records for one tab, in insertion order. Unknown tabs yield an
    /// empty list.
    pub fn list(&self, tab_id: &str) -> Vec<NetworkRequest> {
        self.inner
            .lock()
            .tabs
            .get(tab_id)
            .cloned()
            .unwrap_or_default()
    }

    /// All tabs' records. Order within a tab is preserved; order across
    /// tabs is unspecified.
    pub fn list_all(&self) -> Vec<NetworkRequest> {
        let inner = self.inner.lock();
        let mut all = Vec::new();
        for records in inner.tabs.values() {
            all.extend(records.iter().cloned());
        }
        all
    }

    /// Single record lookup within one tab's store.
    pub fn get(&self, tab_id: &str, id: u64) -> Option<NetworkRequest> {
        self.inner
            .lock()
            .tabs
            .get(tab_id)?
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    /// Set end time and duration on a stored record. Returns false when the
    /// record does not exist (e.g. finished arrived without a response).
    pub fn finish(&self, tab_id: &str, id: u64, end_time: f64) -> bool {
        let mut inner = self.inner.lock();
        let Some(record) = inner
            .tabs
            .get_mut(tab_id)
            .and_then(|records| records.iter_mut().find(|r| r.id == id))
        else {
            return false;
        };
        record.end_time = Some(end_time);
        record.duration = Some(end_time - record.start_time);
        true
    }

    /// Set end timing and, if an error is given, mark the record failed.
    /// A `None` error updates timing only (navigation-abort suppression).
    pub fn fail(&self, tab_id: &str, id: u64, end_time: f64, error: Option<String>) {
        let mut inner = self.inner.lock();
        let Some(record) = inner
            .tabs
            .get_mut(tab_id)
            .and_then(|records| records.iter_mut().find(|r| r.id == id))
        else {
            return;
        };
        record.end_time = Some(end_time);
        record.duration = Some(end_time - record.start_time);
        if let Some(error) = error {
            record.error = Some(error);
            record.failed = true;
        }
    }

    /// Attach a late-arriving response body to a finalized record.
    pub fn set_response_body(&self, tab_id: &str, id: u64, body: String) {
        let mut inner = self.inner.lock();
        if let Some(record) = inner
            .tabs
            .get_mut(tab_id)
            .and_then(|records| records.iter_mut().find(|r| r.id == id))
        {
            record.response_body = Some(body);
        }
    }

    /// Drop one tab's store, or every store when `tab_id` is `None`.
    /// Idempotent: clearing an empty or unknown tab succeeds with no effect.
    pub fn clear(&self, tab_id: Option<&str>) {
        let mut inner = self.inner.lock();
        match tab_id {
            Some(tab) => {
                inner.tabs.remove(tab);
            }
            None => {
                inner.tabs.clear();
            }
        }
    }

    /// Total record count across all tabs.
    pub fn len(&self) -> usize {
        self.inner.lock().tabs.values().map(|r| r.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RequestStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
