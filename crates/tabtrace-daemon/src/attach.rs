//! Tab attachment manager.
//!
//! Keeps the session registry and protocol subscriptions synchronized with
//! the live tab set: every open page target gets exactly one session with
//! the Network domain enabled, and tabs opened later (including by page
//! script) are attached in the same event-handling turn that announced
//! them. All methods here run on the daemon's worker task.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, warn};

use tabtrace_cdp::{CdpClient, CdpError, PageInfo};

use crate::config::CaptureConfig;
use crate::error::DaemonError;
use crate::events::{AttachedToTarget, DetachedFromTarget, TargetCreated, TargetDestroyed};
use crate::session::SessionRegistry;

const PAGE_TARGET: &str = "page";

/// Protocol operations the attachment manager performs, behind a seam so
/// the attach flow can be exercised without a live connection.
pub trait TargetOps: Send + Sync {
    fn list_pages<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<PageInfo>, CdpError>> + Send + 'a>>;

    fn attach_to_target<'a>(
        &'a self,
        target_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, CdpError>> + Send + 'a>>;

    fn enable_network<'a>(
        &'a self,
        session_id: &'a str,
        max_total_buffer_size: u64,
        max_resource_buffer_size: u64,
    ) -> Pin<Box<dyn Future<Output = Result<(), CdpError>> + Send + 'a>>;

    /// Resume a target paused waiting for a debugger. Fire-and-forget: a
    /// stalled resume must not block event processing.
    fn resume(&self, session_id: &str);

    fn subscribe_targets<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<(), CdpError>> + Send + 'a>>;
}

/// Production ops over the live CDP connection.
pub struct CdpTargetOps {
    client: Arc<CdpClient>,
}

impl CdpTargetOps {
    pub fn new(client: Arc<CdpClient>) -> Self {
        Self { client }
    }
}

impl TargetOps for CdpTargetOps {
    fn list_pages<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<PageInfo>, CdpError>> + Send + 'a>> {
        Box::pin(self.client.list_pages())
    }

    fn attach_to_target<'a>(
        &'a self,
        target_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, CdpError>> + Send + 'a>> {
        Box::pin(self.client.attach_to_target(target_id))
    }

    fn enable_network<'a>(
        &'a self,
        session_id: &'a str,
        max_total_buffer_size: u64,
        max_resource_buffer_size: u64,
    ) -> Pin<Box<dyn Future<Output = Result<(), CdpError>> + Send + 'a>> {
        Box::pin(async move {
            self.client
                .call(
                    "Network.enable",
                    Some(json!({
                        "maxTotalBufferSize": max_total_buffer_size,
                        "maxResourceBufferSize": max_resource_buffer_size,
                    })),
                    Some(session_id),
                )
                .await?;
            Ok(())
        })
    }

    fn resume(&self, session_id: &str) {
        let client = Arc::clone(&self.client);
        let session_id = session_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = client.run_if_waiting_for_debugger(&session_id).await {
                debug!("Resume failed for session {}: {}", session_id, e);
            }
        });
    }

    fn subscribe_targets<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<(), CdpError>> + Send + 'a>> {
        Box::pin(self.client.set_discover_targets())
    }
}

pub struct TabAttacher {
    ops: Arc<dyn TargetOps>,
    registry: Arc<SessionRegistry>,
    max_total_buffer_size: u64,
    max_resource_buffer_size: u64,
}

impl TabAttacher {
    pub fn new(
        ops: Arc<dyn TargetOps>,
        registry: Arc<SessionRegistry>,
        config: &CaptureConfig,
    ) -> Self {
        Self {
            ops,
            registry,
            max_total_buffer_size: config.max_total_buffer_size,
            max_resource_buffer_size: config.max_resource_buffer_size,
        }
    }

    /// Enumerate current targets and attach every page tab that has no
    /// binding yet. One tab's attach failure never affects the others; it
    /// is logged and retried on the next sweep.
    pub async fn discover_and_attach_all(&self) {
        let pages = match self.ops.list_pages().await {
            Ok(pages) => pages,
            Err(e) => {
                warn!("Target discovery failed: {}", e);
                return;
            }
        };

        for page in pages.iter().filter(|p| p.page_type == PAGE_TARGET) {
            if self.registry.is_attached(&page.id) {
                continue;
            }
            if let Err(e) = self.attach(&page.id).await {
                warn!("Failed to attach to tab {}: {}", page.id, e);
            }
        }
        debug!(
            "Discovery sweep done, {} tabs attached",
            self.registry.attached_count()
        );
    }

    /// Attach a session to one tab and enable network tracking.
    pub async fn attach(&self, tab_id: &str) -> Result<(), DaemonError> {
        let session_id = self.ops.attach_to_target(tab_id).await?;
        self.registry.bind(&session_id, tab_id);
        self.enable_network(&session_id).await?;
        self.ops.resume(&session_id);
        info!("Attached to tab {} (session {})", tab_id, session_id);
        Ok(())
    }

    async fn enable_network(&self, session_id: &str) -> Result<(), DaemonError> {
        self.ops
            .enable_network(
                session_id,
                self.max_total_buffer_size,
                self.max_resource_buffer_size,
            )
            .await?;
        Ok(())
    }

    /// Subscribe to target lifecycle notifications.
    pub async fn subscribe_targets(&self) -> Result<(), DaemonError> {
        self.ops.subscribe_targets().await?;
        Ok(())
    }

    /// New page target announced: attach now, within this handling turn.
    pub async fn on_target_created(&self, ev: TargetCreated) {
        let info = ev.target_info;
        if info.target_type != PAGE_TARGET || self.registry.is_attached(&info.target_id) {
            return;
        }
        if let Err(e) = self.attach(&info.target_id).await {
            warn!("Failed to attach to new tab {}: {}", info.target_id, e);
        }
    }

    /// Browser-initiated attach (auto-attach): adopt the session the
    /// browser already created instead of opening a second one.
    pub async fn on_attached_to_target(&self, ev: AttachedToTarget) {
        let info = &ev.target_info;
        if info.target_type != PAGE_TARGET
            || self.registry.tab_for(&ev.session_id).is_some()
            || self.registry.is_attached(&info.target_id)
        {
            return;
        }

        self.registry.bind(&ev.session_id, &info.target_id);
        if let Err(e) = self.enable_network(&ev.session_id).await {
            warn!(
                "Failed to enable network on adopted session {}: {}",
                ev.session_id, e
            );
        }
        self.ops.resume(&ev.session_id);
        info!(
            "Adopted session {} for tab {}",
            ev.session_id, info.target_id
        );
    }

    /// Target gone: drop the binding, keep the captured records.
    pub fn on_target_destroyed(&self, ev: TargetDestroyed) {
        if let Some(session_id) = self.registry.unbind_tab(&ev.target_id) {
            info!("Tab {} destroyed (session {})", ev.target_id, session_id);
        }
    }

    /// Session detached: drop the binding, keep the captured records.
    pub fn on_detached(&self, ev: DetachedFromTarget) {
        if let Some(tab_id) = self.registry.unbind_session(&ev.session_id) {
            info!("Session {} detached from tab {}", ev.session_id, tab_id);
        }
    }
}

#[cfg(test)]
#[path = "attach_tests.rs"]
mod tests;
