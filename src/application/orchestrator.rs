// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Fuzz orchestrator: the per-run composition of mutate -> gate -> transport
//! -> invariant-check -> result, specialized for tool calls, raw protocol
//! messages, and batches. Generalized from the orchestrator's own
//! `ToolInvocationService::invoke_tool` mutate/gate/route/execute pipeline.

use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info_span, warn, Instrument};

use crate::application::invariant_checker;
use crate::application::mutators::{BatchMutator, ProtocolKind, ProtocolMutator, ToolMutator};
use crate::application::safety_filter::{SafetyDecision, SafetyFilter};
use crate::application::seed_pool::SeedPool;
use crate::domain::jsonrpc::{JsonRpcMessage, RpcId};
use crate::domain::result::{Classification, FuzzResult};
use crate::domain::seed::{SeedEntry, Signature};
use crate::domain::tool::{FuzzInput, Phase, RunKind, ToolDescriptor};
use crate::infrastructure::transport::Transport;

/// Shared dependencies every orchestrator specialization composes over.
pub struct OrchestratorContext {
    pub transport: Arc<dyn Transport>,
    pub safety_filter: Arc<SafetyFilter>,
    pub seed_pool: Arc<SeedPool>,
    pub rng: Mutex<StdRng>,
}

impl OrchestratorContext {
    pub fn new(transport: Arc<dyn Transport>, safety_filter: Arc<SafetyFilter>, seed_pool: Arc<SeedPool>, rng_seed: u64) -> Self {
        Self {
            transport,
            safety_filter,
            seed_pool,
            rng: Mutex::new(StdRng::seed_from_u64(rng_seed)),
        }
    }
}

pub struct ToolOrchestrator {
    ctx: Arc<OrchestratorContext>,
    tool_timeout: std::time::Duration,
}

impl ToolOrchestrator {
    pub fn new(ctx: Arc<OrchestratorContext>, tool_timeout: std::time::Duration) -> Self {
        Self { ctx, tool_timeout }
    }

    /// One run of the tool-orchestrator pipeline: mutate, gate, send,
    /// classify, offer back to the seed pool.
    pub async fn run(&self, tool: &ToolDescriptor, run_index: u64, phase: Phase) -> FuzzResult {
        let span = info_span!("fuzz_run", kind = "tool", run_index, tool = %tool.name);
        self.run_inner(tool, run_index, phase).instrument(span).await
    }

    async fn run_inner(&self, tool: &ToolDescriptor, run_index: u64, phase: Phase) -> FuzzResult {
        let started = Instant::now();
        let mutator = ToolMutator::new(&self.ctx.seed_pool);
        let mut rng_guard = self.ctx.rng.lock().await;
        let input = match mutator.mutate(tool, phase, run_index, &mut *rng_guard).await {
            Ok(input) => input,
            Err(e) => {
                drop(rng_guard);
                return self.error_result(run_index, FuzzInput::ToolCall { tool_name: tool.name.clone(), arguments: json!({}) }, started, format!("generation failed: {e}"));
            }
        };
        drop(rng_guard);

        let FuzzInput::ToolCall { tool_name, arguments } = &input else {
            unreachable!("ToolMutator always produces FuzzInput::ToolCall")
        };

        let decision = self.ctx.safety_filter.evaluate_tool_call(arguments);
        let (final_args, safety_blocked, safety_sanitized, block_reason) = match decision {
            SafetyDecision::Allow => (arguments.clone(), false, false, None),
            SafetyDecision::Sanitize { sanitized_args, reason } => (sanitized_args, false, true, Some(reason)),
            SafetyDecision::Block { reason } => (arguments.clone(), true, false, Some(reason)),
        };

        if safety_blocked {
            warn!(
                tool = %tool.name,
                reason = block_reason.as_deref().unwrap_or("unspecified"),
                "tool call blocked by safety filter"
            );
            let elapsed_ms = started.elapsed().as_millis() as u64;
            return FuzzResult {
                run_kind: RunKind::Tool,
                run_index,
                success: false,
                input,
                response: None,
                classification: None,
                safety_blocked: true,
                safety_sanitized: false,
                invariant_violations: vec![],
                elapsed_ms,
            };
        }

        if let Some(reason) = &block_reason {
            debug!(tool = %tool.name, reason = %reason, "tool call arguments sanitized before send");
        }

        let call_result = tokio::time::timeout(
            self.tool_timeout,
            self.ctx
                .transport
                .send_request("tools/call", Some(json!({"name": tool_name, "arguments": final_args}))),
        )
        .await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let (success, response, classification) = match call_result {
            Err(_) => {
                warn!(tool = %tool.name, timeout_ms = self.tool_timeout.as_millis() as u64, "tool call timed out");
                (false, None, Some(Classification::Timeout))
            }
            Ok(Err(e)) => {
                warn!(tool = %tool.name, error = %e, "tool call transport error");
                (false, None, Some(classify_transport_error(&e)))
            }
            Ok(Ok(value)) => (true, Some(value), None),
        };

        let result = FuzzResult {
            run_kind: RunKind::Tool,
            run_index,
            success,
            input: FuzzInput::ToolCall {
                tool_name: tool_name.clone(),
                arguments: final_args.clone(),
            },
            response,
            classification: classification.clone(),
            safety_blocked: false,
            safety_sanitized,
            invariant_violations: vec![],
            elapsed_ms,
        };

        self.offer_to_seed_pool(&final_args, &classification).await;
        result
    }

    async fn offer_to_seed_pool(&self, args: &Value, classification: &Option<Classification>) {
        let tag = match classification {
            Some(Classification::ServerError { code, .. }) => code.to_string(),
            Some(Classification::TransportError { .. }) => "transport_error".to_string(),
            Some(Classification::Timeout) => "timeout".to_string(),
            None => "ok".to_string(),
        };
        let signature = Signature::compute("tool_call", &tag, &Signature::shape_fingerprint(args));
        self.ctx.seed_pool.offer(SeedEntry::new(args.clone(), signature)).await;
    }

    fn error_result(&self, run_index: u64, input: FuzzInput, started: Instant, detail: String) -> FuzzResult {
        FuzzResult {
            run_kind: RunKind::Tool,
            run_index,
            success: false,
            input,
            response: None,
            classification: Some(Classification::TransportError { detail }),
            safety_blocked: false,
            safety_sanitized: false,
            invariant_violations: vec![],
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// `generate_only` skips the transport entirely, emitting only the
/// generated input — useful for corpus generation without a live target.
pub struct ProtocolOrchestrator {
    ctx: Arc<OrchestratorContext>,
    generate_only: bool,
}

impl ProtocolOrchestrator {
    pub fn new(ctx: Arc<OrchestratorContext>, generate_only: bool) -> Self {
        Self { ctx, generate_only }
    }

    pub async fn run(&self, kind: ProtocolKind, run_index: u64, phase: Phase) -> FuzzResult {
        let span = info_span!("fuzz_run", kind = "protocol", run_index, message_kind = ?kind);
        self.run_inner(kind, run_index, phase).instrument(span).await
    }

    async fn run_inner(&self, kind: ProtocolKind, run_index: u64, phase: Phase) -> FuzzResult {
        let started = Instant::now();
        let mutator = ProtocolMutator::new(&self.ctx.seed_pool);
        let mut rng_guard = self.ctx.rng.lock().await;
        let envelope = match mutator.mutate(kind, phase, &mut *rng_guard).await {
            Ok(e) => e,
            Err(e) => {
                drop(rng_guard);
                return protocol_error_result(run_index, started, format!("generation failed: {e}"));
            }
        };
        drop(rng_guard);

        if self.generate_only {
            return FuzzResult {
                run_kind: RunKind::Protocol,
                run_index,
                success: true,
                input: FuzzInput::Protocol { message: envelope },
                response: None,
                classification: None,
                safety_blocked: false,
                safety_sanitized: false,
                invariant_violations: vec![],
                elapsed_ms: started.elapsed().as_millis() as u64,
            };
        }

        let payload = serde_json::to_value(&envelope).unwrap_or(Value::Null);
        let send_result = self.ctx.transport.send_raw(payload).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match send_result {
            Err(e) => {
                warn!(kind = ?kind, error = %e, "protocol message send failed");
                let mut result = protocol_error_result(run_index, started, e.to_string());
                result.input = FuzzInput::Protocol { message: envelope };
                result.elapsed_ms = elapsed_ms;
                result
            }
            Ok(response) => {
                let violations = invariant_checker::check_response(&envelope, &response);
                if !violations.is_empty() {
                    debug!(kind = ?kind, violations = violations.len(), "protocol response failed invariant check");
                }
                let response_value = serde_json::to_value(&response).ok();
                let result = FuzzResult {
                    run_kind: RunKind::Protocol,
                    run_index,
                    success: violations.is_empty(),
                    input: FuzzInput::Protocol { message: envelope },
                    response: response_value,
                    classification: None,
                    safety_blocked: false,
                    safety_sanitized: false,
                    invariant_violations: violations,
                    elapsed_ms,
                };
                self.offer_if_interesting(&result).await;
                result
            }
        }
    }

    async fn offer_if_interesting(&self, result: &FuzzResult) {
        if !result.is_interesting() {
            return;
        }
        if let FuzzInput::Protocol { message } = &result.input {
            if let Some(payload) = serde_json::to_value(message).ok() {
                let tag = result
                    .invariant_violations
                    .first()
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "novel".to_string());
                let signature = Signature::compute("protocol", &tag, &Signature::shape_fingerprint(&payload));
                self.ctx.seed_pool.offer(SeedEntry::new(payload, signature)).await;
            }
        }
    }
}

pub struct BatchOrchestrator {
    ctx: Arc<OrchestratorContext>,
}

impl BatchOrchestrator {
    pub fn new(ctx: Arc<OrchestratorContext>) -> Self {
        Self { ctx }
    }

    pub async fn run(&self, kinds: &[ProtocolKind], run_index: u64, phase: Phase) -> FuzzResult {
        let span = info_span!("fuzz_run", kind = "batch", run_index, batch_size = kinds.len());
        self.run_inner(kinds, run_index, phase).instrument(span).await
    }

    async fn run_inner(&self, kinds: &[ProtocolKind], run_index: u64, phase: Phase) -> FuzzResult {
        let started = Instant::now();
        let batch_mutator = BatchMutator::new(&self.ctx.seed_pool);
        let mut rng_guard = self.ctx.rng.lock().await;
        let messages = match batch_mutator.mutate(kinds, phase, &mut *rng_guard).await {
            Ok(m) => m,
            Err(e) => {
                drop(rng_guard);
                return protocol_error_result(run_index, started, format!("generation failed: {e}"));
            }
        };
        drop(rng_guard);

        let send_result = self.ctx.transport.send_batch(messages.clone()).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match send_result {
            Err(e) => {
                warn!(batch_size = messages.len(), error = %e, "batch send failed");
                FuzzResult {
                    run_kind: RunKind::Batch,
                    run_index,
                    success: false,
                    input: FuzzInput::Batch { messages },
                    response: None,
                    classification: Some(classify_transport_error(&e)),
                    safety_blocked: false,
                    safety_sanitized: false,
                    invariant_violations: vec![],
                    elapsed_ms,
                }
            }
            Ok(responses) => {
                let violations = invariant_checker::check_batch(&messages, &responses);
                if !violations.is_empty() {
                    debug!(batch_size = messages.len(), violations = violations.len(), "batch response failed invariant check");
                }
                let response_value = serde_json::to_value(&responses).ok();
                FuzzResult {
                    run_kind: RunKind::Batch,
                    run_index,
                    success: violations.is_empty(),
                    input: FuzzInput::Batch { messages },
                    response: response_value,
                    classification: None,
                    safety_blocked: false,
                    safety_sanitized: false,
                    invariant_violations: violations,
                    elapsed_ms,
                }
            }
        }
    }
}

fn classify_transport_error(error: &crate::domain::errors::TransportError) -> Classification {
    use crate::domain::errors::TransportError::*;
    match error {
        Connection { .. } | Closed => Classification::TransportError { detail: error.to_string() },
        Response(detail) => {
            // Best-effort extraction of a JSON-RPC error code embedded in
            // the transport's response-parse failure message.
            Classification::ServerError {
                code: -32603,
                message: detail.clone(),
            }
        }
        Authentication(detail) => Classification::TransportError { detail: detail.clone() },
        NetworkPolicy { host } => Classification::TransportError {
            detail: format!("network policy denied host {host}"),
        },
        Payload(detail) => Classification::TransportError { detail: detail.clone() },
    }
}

fn protocol_error_result(run_index: u64, started: Instant, detail: String) -> FuzzResult {
    FuzzResult {
        run_kind: RunKind::Protocol,
        run_index,
        success: false,
        input: FuzzInput::Protocol {
            message: JsonRpcMessage::request(RpcId::Null, "unknown", None),
        },
        response: None,
        classification: Some(Classification::TransportError { detail }),
        safety_blocked: false,
        safety_sanitized: false,
        invariant_violations: vec![],
        elapsed_ms: started.elapsed().as_millis() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tool::SchemaError;
    use crate::infrastructure::transport::StreamChunk;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockTransport {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn connect(&self) -> Result<(), crate::domain::errors::TransportError> {
            Ok(())
        }
        async fn disconnect(&self) -> Result<(), crate::domain::errors::TransportError> {
            Ok(())
        }
        async fn send_request(&self, _method: &str, _params: Option<Value>) -> Result<Value, crate::domain::errors::TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"ok": true}))
        }
        async fn send_raw(&self, payload: Value) -> Result<JsonRpcMessage, crate::domain::errors::TransportError> {
            let id = payload.get("id").cloned().unwrap_or(Value::Null);
            Ok(JsonRpcMessage::Raw(json!({"jsonrpc": "2.0", "id": id, "result": null})))
        }
        async fn send_notification(&self, _method: &str, _params: Option<Value>) -> Result<(), crate::domain::errors::TransportError> {
            Ok(())
        }
        async fn send_batch(&self, requests: Vec<JsonRpcMessage>) -> Result<Vec<JsonRpcMessage>, crate::domain::errors::TransportError> {
            Ok(requests
                .iter()
                .filter(|m| !m.is_notification())
                .map(|m| JsonRpcMessage::Raw(json!({"jsonrpc": "2.0", "id": m.id().map(|i| i.to_string()), "result": null})))
                .collect())
        }
        async fn stream_request(&self, payload: Value) -> Result<Vec<StreamChunk>, crate::domain::errors::TransportError> {
            Ok(vec![StreamChunk(payload)])
        }
    }

    fn context(transport: MockTransport) -> Arc<OrchestratorContext> {
        Arc::new(OrchestratorContext::new(
            Arc::new(transport),
            Arc::new(SafetyFilter::new("/tmp/sbx", vec![], true)),
            Arc::new(SeedPool::new(16, 1)),
            7,
        ))
    }

    #[tokio::test]
    async fn tool_run_with_dangerous_args_is_blocked_without_calling_transport() {
        let ctx = context(MockTransport { calls: AtomicUsize::new(0) });
        let orchestrator = ToolOrchestrator::new(ctx.clone(), std::time::Duration::from_secs(5));
        let tool = ToolDescriptor {
            name: "web_tool".into(),
            description: None,
            input_schema: json!({
                "type": "object",
                "properties": {"url": {"type": "string", "const": "https://evil.example/x"}},
                "required": ["url"]
            }),
        };
        let result = orchestrator.run(&tool, 0, Phase::Realistic).await;
        assert!(result.safety_blocked);
    }

    #[tokio::test]
    async fn protocol_generate_only_never_calls_transport() {
        let ctx = context(MockTransport { calls: AtomicUsize::new(0) });
        let orchestrator = ProtocolOrchestrator::new(ctx, true);
        let result = orchestrator.run(ProtocolKind::PingRequest, 0, Phase::Realistic).await;
        assert!(result.response.is_none());
        assert!(result.success);
    }

    #[tokio::test]
    async fn batch_run_collates_responses() {
        let ctx = context(MockTransport { calls: AtomicUsize::new(0) });
        let orchestrator = BatchOrchestrator::new(ctx);
        let kinds = [ProtocolKind::PingRequest, ProtocolKind::ListToolsRequest];
        let result = orchestrator.run(&kinds, 0, Phase::Realistic).await;
        assert_eq!(result.run_kind, RunKind::Batch);
    }

    #[test]
    fn schema_error_displays() {
        let e = SchemaError::Unsupported("x".into());
        assert!(e.to_string().contains('x'));
    }
}
