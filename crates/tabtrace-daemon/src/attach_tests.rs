use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tabtrace_cdp::TargetInfo;

use super::*;

/// Records every call and hands out session ids "S1", "S2", ...
/// Targets listed in `fail_attach` reject the attach call.
#[derive(Default)]
struct StubOps {
    pages: Mutex<Vec<PageInfo>>,
    fail_attach: Mutex<Vec<String>>,
    attach_calls: Mutex<Vec<String>>,
    enable_calls: Mutex<Vec<String>>,
    resume_calls: Mutex<Vec<String>>,
    next_session: AtomicUsize,
}

impl TargetOps for StubOps {
    fn list_pages<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<PageInfo>, CdpError>> + Send + 'a>> {
        Box::pin(async move { Ok(self.pages.lock().clone()) })
    }

    fn attach_to_target<'a>(
        &'a self,
        target_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, CdpError>> + Send + 'a>> {
        Box::pin(async move {
            self.attach_calls.lock().push(target_id.to_string());
            if self.fail_attach.lock().iter().any(|t| t == target_id) {
                return Err(CdpError::Timeout(format!(
                    "Command Target.attachToTarget timed out for {}",
                    target_id
                )));
            }
            let n = self.next_session.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("S{}", n))
        })
    }

    fn enable_network<'a>(
        &'a self,
        session_id: &'a str,
        _max_total_buffer_size: u64,
        _max_resource_buffer_size: u64,
    ) -> Pin<Box<dyn Future<Output = Result<(), CdpError>> + Send + 'a>> {
        Box::pin(async move {
            self.enable_calls.lock().push(session_id.to_string());
            Ok(())
        })
    }

    fn resume(&self, session_id: &str) {
        self.resume_calls.lock().push(session_id.to_string());
    }

    fn subscribe_targets<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<(), CdpError>> + Send + 'a>> {
        Box::pin(async move { Ok(()) })
    }
}

fn page(id: &str, page_type: &str) -> PageInfo {
    PageInfo {
        id: id.to_string(),
        page_type: page_type.to_string(),
        title: "t".to_string(),
        url: "about:blank".to_string(),
        web_socket_debugger_url: None,
    }
}

fn target(id: &str, target_type: &str) -> TargetInfo {
    TargetInfo {
        target_id: id.to_string(),
        target_type: target_type.to_string(),
        title: "t".to_string(),
        url: "about:blank".to_string(),
        attached: None,
        browser_context_id: None,
    }
}

fn attacher(ops: Arc<StubOps>) -> (TabAttacher, Arc<SessionRegistry>) {
    let registry = Arc::new(SessionRegistry::new());
    let attacher = TabAttacher::new(ops, Arc::clone(&registry), &CaptureConfig::default());
    (attacher, registry)
}

#[tokio::test]
async fn discovery_attaches_only_unbound_page_targets() {
    let ops = Arc::new(StubOps::default());
    *ops.pages.lock() = vec![
        page("tab1", "page"),
        page("tab2", "page"),
        page("dt1", "devtools"),
    ];
    let (attacher, registry) = attacher(Arc::clone(&ops));
    registry.bind("S-old", "tab2");

    attacher.discover_and_attach_all().await;

    assert_eq!(*ops.attach_calls.lock(), vec!["tab1"]);
    assert!(registry.is_attached("tab1"));
    assert_eq!(registry.attached_count(), 2);
}

#[tokio::test]
async fn created_page_target_is_attached_and_bound() {
    let ops = Arc::new(StubOps::default());
    let (attacher, registry) = attacher(Arc::clone(&ops));

    attacher
        .on_target_created(TargetCreated {
            target_info: target("tab1", "page"),
        })
        .await;

    assert!(registry.is_attached("tab1"));
    assert_eq!(registry.tab_for("S1").as_deref(), Some("tab1"));
    assert_eq!(*ops.enable_calls.lock(), vec!["S1"]);
    assert_eq!(*ops.resume_calls.lock(), vec!["S1"]);
}

#[tokio::test]
async fn created_non_page_targets_are_ignored() {
    let ops = Arc::new(StubOps::default());
    let (attacher, registry) = attacher(Arc::clone(&ops));

    for target_type in ["service_worker", "background_page", "browser"] {
        attacher
            .on_target_created(TargetCreated {
                target_info: target("x1", target_type),
            })
            .await;
    }

    assert!(ops.attach_calls.lock().is_empty());
    assert_eq!(registry.attached_count(), 0);
}

#[tokio::test]
async fn attach_failure_does_not_block_other_tabs() {
    let ops = Arc::new(StubOps::default());
    *ops.pages.lock() = vec![page("bad", "page"), page("good", "page")];
    *ops.fail_attach.lock() = vec!["bad".to_string()];
    let (attacher, registry) = attacher(Arc::clone(&ops));

    attacher.discover_and_attach_all().await;

    assert_eq!(*ops.attach_calls.lock(), vec!["bad", "good"]);
    assert!(!registry.is_attached("bad"));
    assert!(registry.is_attached("good"));
}

#[tokio::test]
async fn adopted_session_is_bound_without_a_second_attach() {
    let ops = Arc::new(StubOps::default());
    let (attacher, registry) = attacher(Arc::clone(&ops));

    attacher
        .on_attached_to_target(AttachedToTarget {
            session_id: "S-browser".to_string(),
            target_info: target("tab1", "page"),
        })
        .await;

    assert!(ops.attach_calls.lock().is_empty());
    assert_eq!(registry.tab_for("S-browser").as_deref(), Some("tab1"));
    assert_eq!(*ops.enable_calls.lock(), vec!["S-browser"]);
    assert_eq!(*ops.resume_calls.lock(), vec!["S-browser"]);
}

#[tokio::test]
async fn already_attached_tab_is_not_adopted_twice() {
    let ops = Arc::new(StubOps::default());
    let (attacher, registry) = attacher(Arc::clone(&ops));

    attacher
        .on_attached_to_target(AttachedToTarget {
            session_id: "S-a".to_string(),
            target_info: target("tab1", "page"),
        })
        .await;
    attacher
        .on_attached_to_target(AttachedToTarget {
            session_id: "S-b".to_string(),
            target_info: target("tab1", "page"),
        })
        .await;

    assert_eq!(*ops.enable_calls.lock(), vec!["S-a"]);
    assert_eq!(registry.tab_for("S-a").as_deref(), Some("tab1"));
    assert!(registry.tab_for("S-b").is_none());
}

#[tokio::test]
async fn destroyed_target_is_unbound() {
    let ops = Arc::new(StubOps::default());
    let (attacher, registry) = attacher(Arc::clone(&ops));
    attacher
        .on_target_created(TargetCreated {
            target_info: target("tab1", "page"),
        })
        .await;

    attacher.on_target_destroyed(TargetDestroyed {
        target_id: "tab1".to_string(),
    });

    assert!(!registry.is_attached("tab1"));
    assert!(registry.tab_for("S1").is_none());
}

#[tokio::test]
async fn detached_session_is_unbound() {
    let ops = Arc::new(StubOps::default());
    let (attacher, registry) = attacher(Arc::clone(&ops));
    attacher
        .on_target_created(TargetCreated {
            target_info: target("tab1", "page"),
        })
        .await;

    attacher.on_detached(DetachedFromTarget {
        session_id: "S1".to_string(),
    });

    assert!(!registry.is_attached("tab1"));
}
