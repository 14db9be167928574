//! Cancellation in both directions, and malformed-notification handling.

use mcpflow::prelude::*;
use mcpflow_testing::ScriptedTransport;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

fn error_sink(protocol: &Protocol<ScriptedTransport>) -> Arc<Mutex<Vec<String>>> {
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    protocol.on_error(move |err| {
        if let Ok(mut sink) = sink.lock() {
            sink.push(err.to_string());
        }
    });
    errors
}

#[tokio::test]
async fn caller_abort_sends_cancelled_and_fails_with_abort_error() {
    let transport = ScriptedTransport::new(); // never answers
    let handle = transport.clone();
    let protocol = Protocol::new(ProtocolOptions::new());
    let errors = error_sink(&protocol);
    protocol.connect(transport).await.unwrap();

    let signal = CancellationToken::new();
    let request_signal = signal.clone();
    let requester = protocol.clone();
    let fut = tokio::spawn(async move {
        requester
            .request::<EmptyResult>(
                "tools/call",
                Some(json!({ "name": "slow" })),
                RequestOptions::new().signal(request_signal),
            )
            .await
    });
    settle().await;

    signal.cancel_with_reason("changed my mind");
    let err = fut.await.unwrap().unwrap_err();
    let McpError::Aborted { reason } = err else {
        panic!("expected abort error");
    };
    assert_eq!(reason.as_deref(), Some("changed my mind"));

    settle().await;
    let cancelled = handle.sent_notifications("notifications/cancelled");
    assert_eq!(cancelled.len(), 1);
    let Message::Notification(notification) = &cancelled[0] else {
        panic!("expected notification");
    };
    let params = notification.params.clone().unwrap();
    assert!(params["requestId"].is_i64());
    assert_eq!(params["reason"], "changed my mind");

    // A late response for the cancelled id is reported, not dispatched.
    let id = params["requestId"].as_i64().unwrap();
    handle.inject(Message::Response(Response::new(id, json!({}))));
    settle().await;
    let errors = errors.lock().unwrap();
    assert!(
        errors.iter().any(|e| e.contains("unknown request id")),
        "late response was not surfaced: {errors:?}"
    );
}

#[tokio::test]
async fn remote_cancel_aborts_handler_and_drops_its_reply() {
    let transport = ScriptedTransport::new();
    let handle = transport.clone();
    let protocol = Protocol::new(ProtocolOptions::new());
    protocol
        .set_request_handler("vendor/slow", |_params: Value, ctx| async move {
            // run until cancelled, then try to answer anyway
            ctx.cancelled().await;
            Ok::<_, McpError>(json!({ "done": true }))
        })
        .unwrap();
    protocol.connect(transport).await.unwrap();

    handle.inject(Message::Request(Request::with_params(
        "vendor/slow",
        7,
        json!({}),
    )));
    settle().await;

    handle.inject(Message::Notification(Notification::with_params(
        "notifications/cancelled",
        json!({ "requestId": 7, "reason": "peer gave up" }),
    )));
    settle().await;

    // The handler finished after its token fired, so its reply was dropped.
    let replies: Vec<Message> = handle
        .sent()
        .into_iter()
        .filter(|msg| msg.is_response() || msg.is_error())
        .collect();
    assert!(replies.is_empty(), "cancelled request got a reply: {replies:?}");
}

#[tokio::test]
async fn non_integer_cancel_request_id_goes_to_error_hook() {
    let transport = ScriptedTransport::new();
    let handle = transport.clone();
    let protocol = Protocol::new(ProtocolOptions::new());
    let errors = error_sink(&protocol);
    protocol.connect(transport).await.unwrap();

    handle.inject(Message::Notification(Notification::with_params(
        "notifications/cancelled",
        json!({ "requestId": "seven" }),
    )));
    settle().await;

    let errors = errors.lock().unwrap();
    assert!(errors.iter().any(|e| e.contains("cancelled")));
}

#[tokio::test(start_paused = true)]
async fn non_integer_progress_token_is_reported_and_not_dispatched() {
    let transport = ScriptedTransport::new(); // silent: the request will time out
    let handle = transport.clone();
    let protocol = Protocol::new(ProtocolOptions::new());
    let errors = error_sink(&protocol);
    protocol.connect(transport).await.unwrap();

    let invocations = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&invocations);
    let fut = protocol.request::<EmptyResult>(
        "tools/call",
        None,
        RequestOptions::new()
            .timeout(Duration::from_millis(100))
            .on_progress(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
    );
    tokio::pin!(fut);

    tokio::select! {
        _ = &mut fut => panic!("request completed before the injection"),
        () = tokio::time::sleep(Duration::from_millis(10)) => {}
    }
    handle.inject(Message::Notification(Notification::with_params(
        "notifications/progress",
        json!({ "progressToken": "abc", "progress": 1 }),
    )));
    settle().await;

    {
        let errors = errors.lock().unwrap();
        assert!(
            errors.iter().any(|e| e.contains("progress")),
            "malformed progress not surfaced: {errors:?}"
        );
    }
    assert_eq!(invocations.load(Ordering::SeqCst), 0);

    // the request itself still times out normally
    let err = fut.await.unwrap_err();
    assert!(matches!(err, McpError::RequestTimeout { .. }));
}

#[tokio::test]
async fn close_fails_pending_requests_with_connection_closed() {
    let transport = ScriptedTransport::new();
    let protocol = Protocol::new(ProtocolOptions::new());
    let closed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&closed);
    protocol.on_close(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    protocol.connect(transport).await.unwrap();

    let requester = protocol.clone();
    let fut = tokio::spawn(async move {
        requester
            .request::<EmptyResult>("ping", None, RequestOptions::new())
            .await
    });
    settle().await;

    protocol.close().await.unwrap();
    let err = fut.await.unwrap().unwrap_err();
    assert!(matches!(err, McpError::ConnectionClosed));
    assert_eq!(closed.load(Ordering::SeqCst), 1);

    // closing again is a no-op and does not re-fire the hook
    protocol.close().await.unwrap();
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}
