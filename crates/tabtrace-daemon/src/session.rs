//! Session registry: protocol session ids mapped to stable tab ids.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::debug;

#[derive(Default)]
struct Bindings {
    by_session: HashMap<String, String>,
    by_tab: HashMap<String, String>,
}

/// Maps the wire protocol's session identifiers to the daemon's stable tab
/// identifiers. One tab has at most one active binding; re-attachment after
/// a detach replaces it.
pub struct SessionRegistry {
    inner: Mutex<Bindings>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Bindings::default()),
        }
    }

    /// Bind a session to a tab, replacing any previous binding for the tab.
    pub fn bind(&self, session_id: &str, tab_id: &str) {
        let mut inner = self.inner.lock();
        if let Some(old_session) = inner.by_tab.insert(tab_id.to_string(), session_id.to_string())
        {
            inner.by_session.remove(&old_session);
        }
        inner
            .by_session
            .insert(session_id.to_string(), tab_id.to_string());
        debug!("Bound session {} to tab {}", session_id, tab_id);
    }

    /// Resolve the owning tab for a session.
    pub fn tab_for(&self, session_id: &str) -> Option<String> {
        self.inner.lock().by_session.get(session_id).cloned()
    }

    pub fn is_attached(&self, tab_id: &str) -> bool {
        self.inner.lock().by_tab.contains_key(tab_id)
    }

    /// Drop a binding by session id; returns the tab it belonged to.
    pub fn unbind_session(&self, session_id: &str) -> Option<String> {
        let mut inner = self.inner.lock();
        let tab_id = inner.by_session.remove(session_id)?;
        inner.by_tab.remove(&tab_id);
        debug!("Unbound session {} (tab {})", session_id, tab_id);
        Some(tab_id)
    }

    /// Drop a binding by tab id; returns the session it was attached with.
    pub fn unbind_tab(&self, tab_id: &str) -> Option<String> {
        let mut inner = self.inner.lock();
        let session_id = inner.by_tab.remove(tab_id)?;
        inner.by_session.remove(&session_id);
        debug!("Unbound tab {} (session {})", tab_id, session_id);
        Some(session_id)
    }

    pub fn attached_count(&self) -> usize {
        self.inner.lock().by_tab.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
