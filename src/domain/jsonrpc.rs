// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! JSON-RPC 2.0 envelope types and invariant-violation classification.
//!
//! Envelopes are modeled as a tagged enum over a `serde_json::Value` tree
//! rather than typed request/response DTOs: the mutators need to construct
//! both well-formed and deliberately malformed shapes, and a strongly typed
//! `params`/`result` would fight that.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// An `id` value as it appears on the wire: string, number, or null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcId {
    String(String),
    Number(serde_json::Number),
    Null,
}

impl fmt::Display for RpcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcId::String(s) => write!(f, "{s:?}"),
            RpcId::Number(n) => write!(f, "{n}"),
            RpcId::Null => write!(f, "null"),
        }
    }
}

/// A single JSON-RPC 2.0 message. `jsonrpc` is implicit ("2.0") on every
/// constructed variant; malformed-`jsonrpc` probes are represented as
/// [`JsonRpcMessage::Raw`] so the protocol mutator can still emit them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    Request {
        jsonrpc: String,
        id: RpcId,
        method: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        params: Option<Value>,
    },
    Notification {
        jsonrpc: String,
        method: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        params: Option<Value>,
    },
    Success {
        jsonrpc: String,
        id: RpcId,
        result: Value,
    },
    Error {
        jsonrpc: String,
        id: RpcId,
        error: RpcErrorObject,
    },
    /// An arbitrary JSON value that does not fit any of the above — used by
    /// the protocol mutator's aggressive phase to probe malformed envelopes.
    Raw(Value),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcMessage {
    pub fn request(id: RpcId, method: impl Into<String>, params: Option<Value>) -> Self {
        JsonRpcMessage::Request {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.into(),
            params,
        }
    }

    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        JsonRpcMessage::Notification {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params,
        }
    }

    pub fn id(&self) -> Option<&RpcId> {
        match self {
            JsonRpcMessage::Request { id, .. }
            | JsonRpcMessage::Success { id, .. }
            | JsonRpcMessage::Error { id, .. } => Some(id),
            JsonRpcMessage::Notification { .. } | JsonRpcMessage::Raw(_) => None,
        }
    }

    pub fn is_notification(&self) -> bool {
        matches!(self, JsonRpcMessage::Notification { .. })
    }
}

/// A property of a (request, response) pair that contradicts JSON-RPC 2.0
/// rules, or an advisory observation short of a confirmed violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvariantViolation {
    /// Response carried both `result` and `error`.
    DualResult,
    /// Response carried neither `result` nor `error`.
    NoResult,
    /// `jsonrpc` field was missing or not `"2.0"`.
    BadVersion { found: String },
    /// Response `id` did not echo the request `id`.
    IdMismatch { expected: String, found: String },
    /// Error object's `code` was not an integer or `message` was not a string.
    MalformedErrorObject(String),
    /// A batch response contained the same `id` more than once.
    DuplicateId(String),
    /// A batch request's `id` had no corresponding response entry.
    UnmatchedRequestId(String),
    /// A batch response entry's `id` matched no request.
    UnmatchedResponseId(String),
    /// Advisory only: a numeric `id` was generated as a float. Per the
    /// decision recorded in DESIGN.md this is a candidate, not a confirmed
    /// violation, since some servers round-trip floats without issue.
    SuspiciousId { reason: String },
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvariantViolation::DualResult => write!(f, "response carried both result and error"),
            InvariantViolation::NoResult => write!(f, "response carried neither result nor error"),
            InvariantViolation::BadVersion { found } => write!(f, "jsonrpc version was {found:?}, not \"2.0\""),
            InvariantViolation::IdMismatch { expected, found } => {
                write!(f, "response id {found} did not match request id {expected}")
            }
            InvariantViolation::MalformedErrorObject(reason) => write!(f, "malformed error object: {reason}"),
            InvariantViolation::DuplicateId(id) => write!(f, "duplicate id {id} in batch response"),
            InvariantViolation::UnmatchedRequestId(id) => write!(f, "request id {id} had no response"),
            InvariantViolation::UnmatchedResponseId(id) => write!(f, "response id {id} matched no request"),
            InvariantViolation::SuspiciousId { reason } => write!(f, "suspicious id: {reason}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips_through_json() {
        let msg = JsonRpcMessage::request(
            RpcId::Number(1.into()),
            "tools/call",
            Some(serde_json::json!({"name": "ping"})),
        );
        let s = serde_json::to_string(&msg).unwrap();
        assert!(s.contains("\"jsonrpc\":\"2.0\""));
        assert!(s.contains("\"method\":\"tools/call\""));
    }

    #[test]
    fn notification_has_no_id() {
        let msg = JsonRpcMessage::notification("notifications/initialized", None);
        assert!(msg.id().is_none());
        assert!(msg.is_notification());
    }

    #[test]
    fn violation_display_is_human_readable() {
        let v = InvariantViolation::DuplicateId("1".into());
        assert_eq!(v.to_string(), "duplicate id 1 in batch response");
    }
}
