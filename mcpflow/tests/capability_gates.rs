//! Capability gating and the initialize handshake.

use mcpflow::prelude::*;
use mcpflow_testing::{fixtures, ScriptedTransport};
use serde_json::json;

async fn connected_pair(
    server_caps: Capabilities,
    client_options: ProtocolOptions,
) -> (Protocol<MemoryTransport>, Protocol<MemoryTransport>) {
    let (client_side, server_side) = MemoryTransport::pair();

    let server = Protocol::new(ProtocolOptions::new().capabilities(server_caps));
    server
        .serve(Implementation::new("gate-server", "1.0.0"), None)
        .unwrap();
    server.connect(server_side).await.unwrap();

    let client = Protocol::new(client_options);
    client.connect(client_side).await.unwrap();
    client
        .initialize(Implementation::new("gate-client", "1.0.0"))
        .await
        .unwrap();

    (client, server)
}

#[tokio::test]
async fn strict_client_rejects_undeclared_capability() {
    let (client, _server) = connected_pair(
        Capabilities::new().with_prompts(),
        ProtocolOptions::new().strict(),
    )
    .await;

    let err = client
        .request::<CallToolResult>(
            "tools/call",
            Some(json!({ "name": "demo" })),
            RequestOptions::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.code(), codes::METHOD_NOT_FOUND);
    assert!(
        err.to_string().contains("tools"),
        "error does not name the capability: {err}"
    );
}

#[tokio::test]
async fn strict_client_allows_declared_capability() {
    let (client, server) = connected_pair(
        Capabilities::new().with_tools(),
        ProtocolOptions::new().strict(),
    )
    .await;

    server
        .set_request_handler("tools/list", |_params: ListToolsParams, _ctx| async move {
            Ok::<_, McpError>(ListToolsResult {
                tools: vec![Tool::new("demo")],
                next_cursor: None,
            })
        })
        .unwrap();

    let result: ListToolsResult = client
        .request("tools/list", None, RequestOptions::new())
        .await
        .unwrap();
    assert_eq!(result.tools.len(), 1);
}

#[tokio::test]
async fn unknown_methods_pass_the_gate_advisorily() {
    let (client, server) = connected_pair(
        Capabilities::new(),
        ProtocolOptions::new().strict(),
    )
    .await;

    server.set_fallback_request_handler(|request, _ctx| async move {
        Ok(json!({ "echoed": request.method().to_string() }))
    });

    // No capability mapping: the gate logs and lets it through.
    let result = client
        .request_value("vendor/custom", None, RequestOptions::new())
        .await
        .unwrap();
    assert_eq!(result["echoed"], "vendor/custom");
}

#[tokio::test]
async fn strict_mode_gates_task_augmentation() {
    let (client, _server) = connected_pair(
        Capabilities::new().with_tools().with_tasks(),
        ProtocolOptions::new().strict(),
    )
    .await;

    // tasks declared, but tools/call not listed under tasks.requests
    let err = client
        .request::<CreateTaskResult>(
            "tools/call",
            Some(json!({ "name": "demo" })),
            RequestOptions::new().task(TaskMetadata::with_ttl(1000)),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("tasks.requests"));
}

#[tokio::test]
async fn handshake_records_peer_identity_and_capabilities() {
    let (client, server) = connected_pair(
        Capabilities::new().with_tools_and_changes().with_tasks_for(["tools/call"]),
        ProtocolOptions::new().capabilities(Capabilities::new().with_sampling()),
    )
    .await;

    let peer = client.peer_capabilities().expect("client saw server caps");
    assert!(peer.has_tools());
    assert!(peer.has_tasks());
    assert_eq!(client.peer_info().unwrap().name, "gate-server");

    let peer = server.peer_capabilities().expect("server saw client caps");
    assert!(peer.sampling.is_some());
    assert_eq!(server.peer_info().unwrap().name, "gate-client");
}

#[tokio::test]
async fn scripted_handshake_captures_declared_capabilities() {
    let declared = Capabilities::new()
        .with_tools_and_changes()
        .with_tasks_for(["tools/call"]);
    let transport =
        ScriptedTransport::new().reply("initialize", fixtures::initialize_result(declared));
    let handle = transport.clone();

    let client = Protocol::new(ProtocolOptions::new().strict());
    client.connect(transport).await.unwrap();
    let init = client
        .initialize(Implementation::new("gate-client", "1.0.0"))
        .await
        .unwrap();
    assert!(init.capabilities.has_tools());

    // The recorded peer record drives the gates from here on.
    let peer = client.peer_capabilities().expect("peer caps recorded");
    assert!(peer.ensure_task_augmentation("tools/call").is_ok());
    assert!(peer.ensure_peer_capability("tools/call").is_ok());
    assert!(peer.ensure_peer_capability("prompts/get").is_err());
    assert_eq!(
        handle
            .sent_notifications("notifications/initialized")
            .len(),
        1
    );
}

#[tokio::test]
async fn client_rejects_unsupported_server_version() {
    let mut init = fixtures::bare_initialize_result();
    init["protocolVersion"] = json!("1999-01-01");
    let transport = ScriptedTransport::new().reply("initialize", init);

    let client = Protocol::new(ProtocolOptions::new());
    client.connect(transport).await.unwrap();

    let err = client
        .initialize(Implementation::new("c", "1"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("1999-01-01"));
}

#[tokio::test]
async fn server_counter_offers_its_latest_version() {
    let (client_side, server_side) = MemoryTransport::pair();
    let server = Protocol::new(ProtocolOptions::new());
    server
        .serve(Implementation::new("s", "1"), Some("read the docs".into()))
        .unwrap();
    server.connect(server_side).await.unwrap();

    let client = Protocol::new(ProtocolOptions::new());
    client.connect(client_side).await.unwrap();

    // Drive initialize by hand with an unknown version: the server answers
    // with its own preferred version, which this client does support.
    let result: InitializeResult = client
        .request(
            "initialize",
            Some(json!({
                "protocolVersion": "1998-07-15",
                "capabilities": {},
                "clientInfo": { "name": "old-client", "version": "0.1" }
            })),
            RequestOptions::new(),
        )
        .await
        .unwrap();
    assert_eq!(result.protocol_version, PROTOCOL_VERSION);
    assert_eq!(result.instructions.as_deref(), Some("read the docs"));
}

#[tokio::test]
async fn handler_registration_requires_local_capability() {
    let protocol: Protocol<MemoryTransport> =
        Protocol::new(ProtocolOptions::new().capabilities(Capabilities::new().with_prompts()));

    // prompts declared: fine
    protocol
        .set_request_handler("prompts/list", |_params: serde_json::Value, _ctx| async move {
            Ok::<_, McpError>(json!({ "prompts": [] }))
        })
        .unwrap();

    // resources not declared: configuration error
    let err = protocol
        .set_request_handler("resources/list", |_params: serde_json::Value, _ctx| async move {
            Ok::<_, McpError>(json!({ "resources": [] }))
        })
        .unwrap_err();
    assert!(err.to_string().contains("resources"));
}
