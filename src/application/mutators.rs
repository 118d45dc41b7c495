// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Tool, protocol, and batch mutators. Each wraps schema generation to
//! produce a complete [`FuzzInput`], consulting the seed pool with
//! probability `p` before falling back to fresh generation.

use rand::Rng;
use serde_json::{json, Value};

use crate::application::schema_generator;
use crate::application::seed_pool::SeedPool;
use crate::domain::jsonrpc::{JsonRpcMessage, RpcId};
use crate::domain::tool::{FuzzInput, Phase, SchemaError, ToolDescriptor};

/// Probability that a mutator consults the seed pool instead of generating
/// a fresh value, per the component design.
pub const SEED_CONSULT_PROBABILITY: f64 = 0.2;

/// The ~30-kind MCP protocol message surface the protocol mutator covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolKind {
    InitializeRequest,
    InitializedNotification,
    PingRequest,
    CancelNotification,
    ListResourcesRequest,
    ListResourceTemplatesRequest,
    ReadResourceRequest,
    SubscribeRequest,
    UnsubscribeRequest,
    ListPromptsRequest,
    GetPromptRequest,
    ListToolsRequest,
    CallToolRequest,
    SetLevelRequest,
    CreateMessageRequest,
    ListRootsRequest,
    CompleteRequest,
    ElicitRequest,
    ProgressNotification,
    ResourceUpdatedNotification,
    ResourceListChangedNotification,
    ToolListChangedNotification,
    PromptListChangedNotification,
    RootsListChangedNotification,
    LoggingMessageNotification,
    TextContent,
    ImageContent,
    AudioContent,
    EmbeddedResourceContent,
    ListToolsResult,
}

impl ProtocolKind {
    pub fn method(self) -> &'static str {
        use ProtocolKind::*;
        match self {
            InitializeRequest => "initialize",
            InitializedNotification => "notifications/initialized",
            PingRequest => "ping",
            CancelNotification => "notifications/cancelled",
            ListResourcesRequest => "resources/list",
            ListResourceTemplatesRequest => "resources/templates/list",
            ReadResourceRequest => "resources/read",
            SubscribeRequest => "resources/subscribe",
            UnsubscribeRequest => "resources/unsubscribe",
            ListPromptsRequest => "prompts/list",
            GetPromptRequest => "prompts/get",
            ListToolsRequest => "tools/list",
            CallToolRequest => "tools/call",
            SetLevelRequest => "logging/setLevel",
            CreateMessageRequest => "sampling/createMessage",
            ListRootsRequest => "roots/list",
            CompleteRequest => "completion/complete",
            ElicitRequest => "elicitation/create",
            ProgressNotification => "notifications/progress",
            ResourceUpdatedNotification => "notifications/resources/updated",
            ResourceListChangedNotification => "notifications/resources/list_changed",
            ToolListChangedNotification => "notifications/tools/list_changed",
            PromptListChangedNotification => "notifications/prompts/list_changed",
            RootsListChangedNotification => "notifications/roots/list_changed",
            LoggingMessageNotification => "notifications/message",
            TextContent | ImageContent | AudioContent | EmbeddedResourceContent | ListToolsResult => "tools/call",
        }
    }

    pub fn is_notification(self) -> bool {
        self.method().starts_with("notifications/")
    }

    fn params_schema(self) -> Value {
        use ProtocolKind::*;
        match self {
            InitializeRequest => json!({
                "type": "object",
                "properties": {
                    "protocolVersion": {"type": "string"},
                    "capabilities": {"type": "object"},
                    "clientInfo": {"type": "object", "properties": {"name": {"type": "string"}, "version": {"type": "string"}}}
                },
                "required": ["protocolVersion", "capabilities", "clientInfo"]
            }),
            CallToolRequest => json!({
                "type": "object",
                "properties": {"name": {"type": "string"}, "arguments": {"type": "object"}},
                "required": ["name"]
            }),
            ReadResourceRequest | SubscribeRequest | UnsubscribeRequest => json!({
                "type": "object",
                "properties": {"uri": {"type": "string", "format": "uri"}},
                "required": ["uri"]
            }),
            GetPromptRequest => json!({
                "type": "object",
                "properties": {"name": {"type": "string"}, "arguments": {"type": "object"}},
                "required": ["name"]
            }),
            _ => json!({"type": "object", "properties": {}}),
        }
    }
}

/// Generates realistic or aggressive tool-call arguments for a discovered
/// tool and wraps them as a [`FuzzInput::ToolCall`].
pub struct ToolMutator<'a> {
    pub seed_pool: &'a SeedPool,
}

impl<'a> ToolMutator<'a> {
    pub fn new(seed_pool: &'a SeedPool) -> Self {
        Self { seed_pool }
    }

    pub async fn mutate(
        &self,
        tool: &ToolDescriptor,
        phase: Phase,
        cycle: u64,
        rng: &mut impl Rng,
    ) -> Result<FuzzInput, SchemaError> {
        let arguments = if rng.random_bool(SEED_CONSULT_PROBABILITY) {
            if let Some(seeded) = self.seed_pool.sample(rng).await {
                mutate_structurally(seeded.payload, rng)
            } else {
                schema_generator::generate(&tool.input_schema, phase, cycle, rng)?
            }
        } else {
            schema_generator::generate(&tool.input_schema, phase, cycle, rng)?
        };
        Ok(FuzzInput::ToolCall {
            tool_name: tool.name.clone(),
            arguments,
        })
    }
}

/// Generates a complete JSON-RPC envelope for a given protocol message kind.
pub struct ProtocolMutator<'a> {
    pub seed_pool: &'a SeedPool,
}

impl<'a> ProtocolMutator<'a> {
    pub fn new(seed_pool: &'a SeedPool) -> Self {
        Self { seed_pool }
    }

    pub async fn mutate(&self, kind: ProtocolKind, phase: Phase, rng: &mut impl Rng) -> Result<JsonRpcMessage, SchemaError> {
        let params = if rng.random_bool(SEED_CONSULT_PROBABILITY) {
            if let Some(seeded) = self.seed_pool.sample(rng).await {
                mutate_structurally(seeded.payload, rng)
            } else {
                schema_generator::generate(&kind.params_schema(), phase, 0, rng)?
            }
        } else {
            schema_generator::generate(&kind.params_schema(), phase, 0, rng)?
        };

        if kind.is_notification() {
            return Ok(JsonRpcMessage::notification(kind.method(), Some(params)));
        }

        let id = pick_id(phase, rng);
        Ok(JsonRpcMessage::request(id, kind.method(), Some(params)))
    }
}

/// Composes 2-5 messages into a single batch, occasionally duplicating ids
/// to probe collation handling.
pub struct BatchMutator<'a> {
    pub protocol: ProtocolMutator<'a>,
}

impl<'a> BatchMutator<'a> {
    pub fn new(seed_pool: &'a SeedPool) -> Self {
        Self {
            protocol: ProtocolMutator::new(seed_pool),
        }
    }

    pub async fn mutate(&self, kinds: &[ProtocolKind], phase: Phase, rng: &mut impl Rng) -> Result<Vec<JsonRpcMessage>, SchemaError> {
        let count = rng.random_range(2..=5).min(kinds.len().max(2));
        let mut messages = Vec::with_capacity(count);
        let mut reused_id: Option<RpcId> = None;
        for i in 0..count {
            let kind = kinds[i % kinds.len()];
            let mut msg = self.protocol.mutate(kind, phase, rng).await?;
            if matches!(phase, Phase::Aggressive) && rng.random_bool(0.3) {
                if let (JsonRpcMessage::Request { id, .. }, Some(prior)) = (&mut msg, &reused_id) {
                    *id = prior.clone();
                }
            }
            if let JsonRpcMessage::Request { id, .. } = &msg {
                reused_id = Some(id.clone());
            }
            messages.push(msg);
        }
        Ok(messages)
    }
}

fn pick_id(phase: Phase, rng: &mut impl Rng) -> RpcId {
    match phase {
        Phase::Realistic => RpcId::Number(rng.random_range(1..10_000).into()),
        Phase::Aggressive => match rng.random_range(0..4) {
            0 => RpcId::Null,
            1 => RpcId::String(format!("req-{}", rng.random_range(0..1000))),
            2 => {
                // Advisory-only per the float-id decision in DESIGN.md.
                let f = rng.random_range(1..1000) as f64 + 0.5;
                RpcId::Number(serde_json::Number::from_f64(f).unwrap_or_else(|| 1.into()))
            }
            _ => RpcId::Number(rng.random_range(1..10_000).into()),
        },
    }
}

fn mutate_structurally(mut payload: Value, rng: &mut impl Rng) -> Value {
    if let Value::Object(ref mut map) = payload {
        if map.is_empty() {
            return payload;
        }
        let keys: Vec<String> = map.keys().cloned().collect();
        let idx = rng.random_range(0..keys.len());
        match rng.random_range(0..3) {
            0 => {
                map.remove(&keys[idx]);
            }
            1 => {
                map.insert(keys[idx].clone(), json!(null));
            }
            _ => {
                map.insert(keys[idx].clone(), json!(rng.random_range(-1_000_000..1_000_000)));
            }
        }
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(7)
    }

    #[tokio::test]
    async fn tool_mutator_produces_tool_call() {
        let pool = SeedPool::new(16, 1);
        let mutator = ToolMutator::new(&pool);
        let tool = ToolDescriptor {
            name: "web_tool".into(),
            description: None,
            input_schema: json!({"type": "object", "properties": {"url": {"type": "string"}}, "required": ["url"]}),
        };
        let mut rng = rng();
        let input = mutator.mutate(&tool, Phase::Realistic, 0, &mut rng).await.unwrap();
        match input {
            FuzzInput::ToolCall { tool_name, arguments } => {
                assert_eq!(tool_name, "web_tool");
                assert!(arguments.get("url").is_some());
            }
            _ => panic!("expected ToolCall"),
        }
    }

    #[tokio::test]
    async fn protocol_mutator_notification_has_no_id() {
        let pool = SeedPool::new(16, 1);
        let mutator = ProtocolMutator::new(&pool);
        let mut rng = rng();
        let msg = mutator
            .mutate(ProtocolKind::CancelNotification, Phase::Realistic, &mut rng)
            .await
            .unwrap();
        assert!(msg.is_notification());
    }

    #[tokio::test]
    async fn batch_mutator_produces_two_to_five_messages() {
        let pool = SeedPool::new(16, 1);
        let batch = BatchMutator::new(&pool);
        let kinds = [ProtocolKind::PingRequest, ProtocolKind::ListToolsRequest];
        let mut rng = rng();
        let messages = batch.mutate(&kinds, Phase::Realistic, &mut rng).await.unwrap();
        assert!((2..=5).contains(&messages.len()));
    }
}
