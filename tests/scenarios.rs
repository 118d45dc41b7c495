// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! End-to-end scenarios exercising the orchestrators, transports, and
//! safety filter together against a mock HTTP target.

use std::sync::Arc;
use std::time::Duration;

use mcp_fuzzer_core::application::invariant_checker;
use mcp_fuzzer_core::application::mutators::ProtocolKind;
use mcp_fuzzer_core::application::orchestrator::{
    BatchOrchestrator, OrchestratorContext, ProtocolOrchestrator, ToolOrchestrator,
};
use mcp_fuzzer_core::application::safety_filter::SafetyFilter;
use mcp_fuzzer_core::application::seed_pool::SeedPool;
use mcp_fuzzer_core::domain::jsonrpc::{JsonRpcMessage, RpcId};
use mcp_fuzzer_core::domain::tool::{Phase, ToolDescriptor};
use mcp_fuzzer_core::infrastructure::transport::http::HttpTransport;
use serde_json::json;

fn context(transport: Arc<HttpTransport>, safety: SafetyFilter) -> Arc<OrchestratorContext> {
    Arc::new(OrchestratorContext::new(
        transport,
        Arc::new(safety),
        Arc::new(SeedPool::with_default_capacity(99)),
        99,
    ))
}

/// S1: a tool call whose arguments trip the dangerous-pattern detector is
/// blocked before the transport is ever touched.
#[tokio::test]
async fn blocked_dangerous_tool_call_never_reaches_the_server() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/rpc")
        .expect(0)
        .create_async()
        .await;

    let transport = Arc::new(HttpTransport::new(&format!("{}/rpc", server.url()), 2_000, None).unwrap());
    let safety = SafetyFilter::new("/tmp/fuzz-sandbox", vec![], true);
    let ctx = context(transport, safety);
    let orchestrator = ToolOrchestrator::new(ctx, Duration::from_secs(2));

    let tool = ToolDescriptor {
        name: "shell_tool".into(),
        description: None,
        input_schema: json!({
            "type": "object",
            "properties": {"command": {"type": "string", "const": "sudo rm -rf /"}},
            "required": ["command"]
        }),
    };

    let result = orchestrator.run(&tool, 0, Phase::Realistic).await;
    assert!(result.safety_blocked);
    assert!(result.response.is_none());
    mock.assert_async().await;
}

/// S2 (abridged): a realistic `ping` round-trip over plain HTTP produces a
/// clean response with no invariant violations.
#[tokio::test]
async fn protocol_round_trip_over_http_has_no_violations() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/rpc")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"jsonrpc":"2.0","id":0,"result":{}}"#)
        .create_async()
        .await;

    let transport = Arc::new(HttpTransport::new(&format!("{}/rpc", server.url()), 2_000, None).unwrap());
    let safety = SafetyFilter::new("/tmp/fuzz-sandbox", vec![], true);
    let ctx = context(transport, safety);
    let orchestrator = ProtocolOrchestrator::new(ctx, false);

    let result = orchestrator.run(ProtocolKind::PingRequest, 0, Phase::Realistic).await;
    assert!(result.invariant_violations.is_empty());
    mock.assert_async().await;
}

/// S3: a batch response that duplicates one id and drops another is flagged
/// with both violation kinds.
#[tokio::test]
async fn batch_duplicate_and_missing_ids_are_flagged() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/rpc")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"[{"jsonrpc":"2.0","id":1,"result":{}},{"jsonrpc":"2.0","id":1,"result":{}}]"#,
        )
        .create_async()
        .await;

    let transport = Arc::new(HttpTransport::new(&format!("{}/rpc", server.url()), 2_000, None).unwrap());
    let safety = SafetyFilter::new("/tmp/fuzz-sandbox", vec![], true);
    let ctx = context(transport, safety);
    let orchestrator = BatchOrchestrator::new(ctx);

    let kinds = [ProtocolKind::PingRequest, ProtocolKind::ListToolsRequest];
    let result = orchestrator.run(&kinds, 0, Phase::Realistic).await;
    assert!(!result.invariant_violations.is_empty());
}

/// S4: aggressive-phase tool generation over several cycles surfaces at
/// least one adversarial-literal payload without ever erroring on a
/// well-formed schema.
#[tokio::test]
async fn aggressive_phase_generates_adversarial_payloads_without_erroring() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/rpc")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#)
        .expect_at_least(1)
        .create_async()
        .await;

    let transport = Arc::new(HttpTransport::new(&format!("{}/rpc", server.url()), 2_000, None).unwrap());
    let safety = SafetyFilter::new("/tmp/fuzz-sandbox", vec![], true);
    let ctx = context(transport, safety);
    let orchestrator = ToolOrchestrator::new(ctx, Duration::from_secs(2));

    let tool = ToolDescriptor {
        name: "search_tool".into(),
        description: None,
        input_schema: json!({
            "type": "object",
            "properties": {"query": {"type": "string", "minLength": 1, "maxLength": 40}},
            "required": ["query"]
        }),
    };

    for cycle in 0..8u64 {
        let result = orchestrator.run(&tool, cycle, Phase::Aggressive).await;
        assert!(!result.safety_blocked || result.response.is_none());
    }
}

/// Universal property: every checked response's violations are a subset of
/// the checker's known variants, and a well-formed echo never violates the
/// id-echo invariant.
#[test]
fn well_formed_echo_has_no_id_mismatch() {
    let request = JsonRpcMessage::request(RpcId::Number(7.into()), "ping", None);
    let response = JsonRpcMessage::Success {
        jsonrpc: "2.0".into(),
        id: RpcId::Number(7.into()),
        result: json!(null),
    };
    assert!(invariant_checker::check_response(&request, &response).is_empty());
}
