//! Timeout behavior: plain expiry, progress-based re-arming, and the
//! max-total ceiling.

use mcpflow::prelude::*;
use mcpflow_testing::ScriptedTransport;
use serde_json::json;
use std::time::Duration;

fn progress_notification(token: i64, progress: f64) -> Message {
    Message::Notification(Notification::with_params(
        "notifications/progress",
        json!({ "progressToken": token, "progress": progress }),
    ))
}

fn first_request_id(handle: &ScriptedTransport, method: &str) -> i64 {
    let sent = handle.sent_requests(method);
    let Some(Message::Request(request)) = sent.first() else {
        panic!("no {method} request sent");
    };
    request.id.as_number().expect("engine emits integer ids")
}

#[tokio::test(start_paused = true)]
async fn timeout_fires_with_millis_data() {
    let transport = ScriptedTransport::new(); // never answers
    let protocol = Protocol::new(ProtocolOptions::new());
    protocol.connect(transport).await.unwrap();

    let err = protocol
        .request::<EmptyResult>(
            "ping",
            None,
            RequestOptions::new().timeout(Duration::from_millis(100)),
        )
        .await
        .unwrap_err();

    let McpError::RequestTimeout { timeout } = &err else {
        panic!("expected timeout, got {err:?}");
    };
    assert_eq!(*timeout, Duration::from_millis(100));

    let wire: JsonRpcError = err.into();
    assert_eq!(wire.code, codes::REQUEST_TIMEOUT);
    assert_eq!(wire.data.unwrap()["timeout"], 100);
}

#[tokio::test(start_paused = true)]
async fn progress_resets_the_timeout() {
    let transport = ScriptedTransport::new();
    let handle = transport.clone();
    let protocol = Protocol::new(ProtocolOptions::new());
    protocol.connect(transport).await.unwrap();

    let started = tokio::time::Instant::now();
    let fut = protocol.request::<EmptyResult>(
        "tools/call",
        Some(json!({ "name": "slow" })),
        RequestOptions::new()
            .timeout(Duration::from_millis(100))
            .reset_timeout_on_progress()
            .max_total_timeout(Duration::from_secs(1))
            .on_progress(|_| {}),
    );
    tokio::pin!(fut);

    // At t=60ms, inject a progress notification for the request's token.
    tokio::select! {
        _ = &mut fut => panic!("request completed before progress"),
        () = tokio::time::sleep(Duration::from_millis(60)) => {}
    }
    let id = first_request_id(&handle, "tools/call");
    handle.inject(progress_notification(id, 0.5));

    let err = fut.await.unwrap_err();
    assert!(matches!(err, McpError::RequestTimeout { .. }));

    // Re-armed at t=60ms for another 100ms: fires near t=160ms, not t=100ms.
    let elapsed = started.elapsed();
    assert!(
        elapsed >= Duration::from_millis(155) && elapsed <= Duration::from_millis(200),
        "timeout fired at {elapsed:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn max_total_timeout_caps_re_arming() {
    let transport = ScriptedTransport::new();
    let handle = transport.clone();
    let protocol = Protocol::new(ProtocolOptions::new());
    protocol.connect(transport).await.unwrap();

    let started = tokio::time::Instant::now();
    let fut = protocol.request::<EmptyResult>(
        "tools/call",
        Some(json!({ "name": "slow" })),
        RequestOptions::new()
            .timeout(Duration::from_millis(100))
            .reset_timeout_on_progress()
            .max_total_timeout(Duration::from_millis(250))
            .on_progress(|_| {}),
    );
    tokio::pin!(fut);

    // Keep progress flowing every 60ms; the total ceiling must still win.
    let err = loop {
        tokio::select! {
            result = &mut fut => break result.unwrap_err(),
            () = tokio::time::sleep(Duration::from_millis(60)) => {
                let id = first_request_id(&handle, "tools/call");
                handle.inject(progress_notification(id, 0.1));
            }
        }
    };

    assert!(matches!(err, McpError::RequestTimeout { .. }));
    let elapsed = started.elapsed();
    assert!(
        elapsed >= Duration::from_millis(245) && elapsed <= Duration::from_millis(270),
        "timeout fired at {elapsed:?}, expected ~250ms"
    );
}

#[tokio::test(start_paused = true)]
async fn timer_does_not_fire_after_response() {
    let transport = ScriptedTransport::new().reply("ping", json!({}));
    let protocol = Protocol::new(ProtocolOptions::new());
    let errors = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = std::sync::Arc::clone(&errors);
    protocol.on_error(move |err| {
        if let Ok(mut sink) = sink.lock() {
            sink.push(err.to_string());
        }
    });
    protocol.connect(transport).await.unwrap();

    let result: EmptyResult = protocol
        .request(
            "ping",
            None,
            RequestOptions::new().timeout(Duration::from_millis(100)),
        )
        .await
        .unwrap();
    assert_eq!(result, EmptyResult {});

    // Long after the original deadline, nothing else fires.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(errors.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn without_reset_flag_progress_leaves_the_timer_alone() {
    let transport = ScriptedTransport::new();
    let handle = transport.clone();
    let protocol = Protocol::new(ProtocolOptions::new());
    protocol.connect(transport).await.unwrap();

    let started = tokio::time::Instant::now();
    let fut = protocol.request::<EmptyResult>(
        "tools/call",
        None,
        RequestOptions::new()
            .timeout(Duration::from_millis(100))
            .on_progress(|_| {}),
    );
    tokio::pin!(fut);

    tokio::select! {
        _ = &mut fut => panic!("request completed before progress"),
        () = tokio::time::sleep(Duration::from_millis(60)) => {}
    }
    let id = first_request_id(&handle, "tools/call");
    handle.inject(progress_notification(id, 0.5));

    let err = fut.await.unwrap_err();
    assert!(matches!(err, McpError::RequestTimeout { .. }));
    let elapsed = started.elapsed();
    assert!(
        elapsed <= Duration::from_millis(140),
        "timer was re-armed without the flag: {elapsed:?}"
    );
}
