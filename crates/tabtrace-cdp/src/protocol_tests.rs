use serde_json::json;

use super::*;

#[test]
fn request_serializes_without_optional_fields() {
    let request = CdpRequest {
        id: 7,
        method: "Target.getTargets".to_string(),
        params: None,
        session_id: None,
    };

    let json = serde_json::to_string(&request).unwrap();
    assert!(json.contains("\"id\":7"));
    assert!(json.contains("Target.getTargets"));
    assert!(!json.contains("params"));
    assert!(!json.contains("sessionId"));
}

#[test]
fn request_serializes_session_id_camel_case() {
    let request = CdpRequest {
        id: 1,
        method: "Network.enable".to_string(),
        params: Some(json!({"maxTotalBufferSize": 100})),
        session_id: Some("SESSION".to_string()),
    };

    let json = serde_json::to_string(&request).unwrap();
    assert!(json.contains("\"sessionId\":\"SESSION\""));
    assert!(json.contains("maxTotalBufferSize"));
}

#[test]
fn message_parses_command_response() {
    let msg: CdpMessage = serde_json::from_str(
        r#"{"id":3,"result":{"sessionId":"abc"}}"#,
    )
    .unwrap();

    assert_eq!(msg.id, Some(3));
    assert!(msg.method.is_none());
    assert_eq!(msg.result.unwrap()["sessionId"], "abc");
}

#[test]
fn message_parses_error_response() {
    let msg: CdpMessage = serde_json::from_str(
        r#"{"id":4,"error":{"code":-32000,"message":"No resource with given identifier found"}}"#,
    )
    .unwrap();

    let err = msg.error.unwrap();
    assert_eq!(err.code, -32000);
    assert!(err.message.contains("No resource"));
}

#[test]
fn message_parses_session_scoped_event() {
    let msg: CdpMessage = serde_json::from_str(
        r#"{"method":"Network.loadingFinished","sessionId":"S1","params":{"requestId":"99.1","timestamp":12.5}}"#,
    )
    .unwrap();

    assert!(msg.id.is_none());
    assert_eq!(msg.method.as_deref(), Some("Network.loadingFinished"));
    assert_eq!(msg.session_id.as_deref(), Some("S1"));
    assert_eq!(msg.params.unwrap()["requestId"], "99.1");
}

#[test]
fn target_info_parses_camel_case() {
    let info: TargetInfo = serde_json::from_value(json!({
        "targetId": "TAB1",
        "type": "page",
        "title": "Example",
        "url": "https://example.test/",
        "attached": false
    }))
    .unwrap();

    assert_eq!(info.target_id, "TAB1");
    assert_eq!(info.target_type, "page");
    assert_eq!(info.attached, Some(false));
}

#[test]
fn browser_version_parses_chrome_field_names() {
    let version: BrowserVersion = serde_json::from_value(json!({
        "Browser": "Chrome/131.0.0.0",
        "Protocol-Version": "1.3",
        "User-Agent": "Mozilla/5.0",
        "V8-Version": "13.1",
        "webSocketDebuggerUrl": "ws://127.0.0.1:9222/devtools/browser/xyz"
    }))
    .unwrap();

    assert_eq!(version.browser, "Chrome/131.0.0.0");
    assert!(version.web_socket_debugger_url.starts_with("ws://"));
}

#[test]
fn page_info_parses_list_entry() {
    let info: PageInfo = serde_json::from_value(json!({
        "id": "TAB2",
        "type": "page",
        "title": "t",
        "url": "about:blank",
        "webSocketDebuggerUrl": "ws://127.0.0.1:9222/devtools/page/TAB2"
    }))
    .unwrap();

    assert_eq!(info.id, "TAB2");
    assert_eq!(info.page_type, "page");
}
