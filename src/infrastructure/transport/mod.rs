// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Transport driver contract, implemented by the HTTP, streamable-HTTP, SSE,
//! and stdio drivers.

pub mod http;
pub mod sse;
pub mod stdio;
pub mod streamable_http;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::errors::TransportError;
use crate::domain::jsonrpc::JsonRpcMessage;

/// A single chunk of a streamed response.
#[derive(Debug, Clone)]
pub struct StreamChunk(pub Value);

/// The polymorphic transport contract every driver implements. `send_raw`
/// accepts arbitrary, possibly malformed JSON and performs no envelope
/// validation — that laxness is the point for protocol fuzzing.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;

    async fn disconnect(&self) -> Result<(), TransportError>;

    async fn send_request(&self, method: &str, params: Option<Value>) -> Result<Value, TransportError>;

    async fn send_raw(&self, payload: Value) -> Result<JsonRpcMessage, TransportError>;

    async fn send_notification(&self, method: &str, params: Option<Value>) -> Result<(), TransportError>;

    async fn send_batch(&self, requests: Vec<JsonRpcMessage>) -> Result<Vec<JsonRpcMessage>, TransportError>;

    async fn stream_request(&self, payload: Value) -> Result<Vec<StreamChunk>, TransportError>;
}
