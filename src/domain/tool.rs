// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Tool descriptors and the fuzz input envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use super::jsonrpc::JsonRpcMessage;

/// Identifies a single fuzz run across the lifetime of an orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

/// A tool as discovered via `tools/list`. Immutable for the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
}

/// Errors raised while generating values from a schema document.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("unsupported schema construct: {0}")]
    Unsupported(String),

    #[error("schema document is not an object or boolean: {0}")]
    InvalidDocument(String),

    #[error("remote $ref is not supported: {0}")]
    RemoteRef(String),
}

/// The phase a generator or mutator operates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Realistic,
    Aggressive,
}

/// What kind of fuzz run produced a given envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Tool,
    Protocol,
    Batch,
}

/// The input to a single fuzz run: a tool call, a raw protocol message, or a
/// batch of protocol messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FuzzInput {
    ToolCall {
        tool_name: String,
        arguments: Value,
    },
    Protocol {
        message: JsonRpcMessage,
    },
    Batch {
        messages: Vec<JsonRpcMessage>,
    },
}

impl FuzzInput {
    pub fn kind(&self) -> RunKind {
        match self {
            FuzzInput::ToolCall { .. } => RunKind::Tool,
            FuzzInput::Protocol { .. } => RunKind::Protocol,
            FuzzInput::Batch { .. } => RunKind::Batch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_is_unique() {
        assert_ne!(RunId::new(), RunId::new());
    }

    #[test]
    fn fuzz_input_kind_matches_variant() {
        let input = FuzzInput::ToolCall {
            tool_name: "web_tool".into(),
            arguments: serde_json::json!({"url": "https://example.com"}),
        };
        assert_eq!(input.kind(), RunKind::Tool);
    }
}
