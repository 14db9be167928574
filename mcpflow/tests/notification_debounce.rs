//! Coalescing of parameterless list-changed notifications.

use mcpflow::prelude::*;
use mcpflow_testing::ScriptedTransport;
use serde_json::json;

async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

fn debouncing_protocol() -> (Protocol<ScriptedTransport>, ScriptedTransport) {
    let transport = ScriptedTransport::new();
    let handle = transport.clone();
    let protocol = Protocol::new(
        ProtocolOptions::new()
            .capabilities(Capabilities::new().with_tools_and_changes())
            .debounce_notification("notifications/tools/list_changed"),
    );
    (protocol, handle)
}

#[tokio::test]
async fn duplicate_parameterless_notifications_coalesce() {
    let (protocol, handle) = debouncing_protocol();
    protocol.connect(handle.clone()).await.unwrap();

    for _ in 0..5 {
        protocol
            .notify("notifications/tools/list_changed", None)
            .await
            .unwrap();
    }
    settle().await;

    assert_eq!(
        handle
            .sent_notifications("notifications/tools/list_changed")
            .len(),
        1
    );
}

#[tokio::test]
async fn each_flush_window_sends_once() {
    let (protocol, handle) = debouncing_protocol();
    protocol.connect(handle.clone()).await.unwrap();

    protocol
        .notify("notifications/tools/list_changed", None)
        .await
        .unwrap();
    settle().await;
    protocol
        .notify("notifications/tools/list_changed", None)
        .await
        .unwrap();
    settle().await;

    assert_eq!(
        handle
            .sent_notifications("notifications/tools/list_changed")
            .len(),
        2
    );
}

#[tokio::test]
async fn notifications_with_params_bypass_debouncing() {
    let (protocol, handle) = debouncing_protocol();
    protocol.connect(handle.clone()).await.unwrap();

    for i in 0..3 {
        protocol
            .notify(
                "notifications/tools/list_changed",
                Some(json!({ "hint": i })),
            )
            .await
            .unwrap();
    }
    settle().await;

    assert_eq!(
        handle
            .sent_notifications("notifications/tools/list_changed")
            .len(),
        3
    );
}

#[tokio::test]
async fn unlisted_methods_bypass_debouncing() {
    let (protocol, handle) = debouncing_protocol();
    protocol.connect(handle.clone()).await.unwrap();

    for _ in 0..3 {
        protocol
            .notify("notifications/prompts/list_changed", None)
            .await
            .unwrap();
    }
    settle().await;

    assert_eq!(
        handle
            .sent_notifications("notifications/prompts/list_changed")
            .len(),
        3
    );
}
