// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Validates JSON-RPC 2.0 response shape and batch collation rules against
//! the requests that produced them. Violations accumulate on the result
//! record; they never raise.

use std::collections::HashSet;

use crate::domain::jsonrpc::{InvariantViolation, JsonRpcMessage, RpcId};

/// Checks a single (request, response) pair.
pub fn check_response(request: &JsonRpcMessage, response: &JsonRpcMessage) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    match response {
        JsonRpcMessage::Success { jsonrpc, id, .. } => {
            check_version(jsonrpc, &mut violations);
            check_id_echo(request.id(), Some(id), &mut violations);
        }
        JsonRpcMessage::Error { jsonrpc, id, error } => {
            check_version(jsonrpc, &mut violations);
            check_id_echo(request.id(), Some(id), &mut violations);
            if error.message.is_empty() {
                violations.push(InvariantViolation::MalformedErrorObject("empty message".into()));
            }
        }
        JsonRpcMessage::Raw(value) => {
            let has_result = value.get("result").is_some();
            let has_error = value.get("error").is_some();
            if has_result && has_error {
                violations.push(InvariantViolation::DualResult);
            } else if !has_result && !has_error {
                violations.push(InvariantViolation::NoResult);
            }
        }
        JsonRpcMessage::Request { .. } | JsonRpcMessage::Notification { .. } => {
            violations.push(InvariantViolation::NoResult);
        }
    }

    check_float_id(response, &mut violations);
    violations
}

/// Checks a batch of requests against a batch of responses: every request
/// id must have exactly one response entry, and every response id must
/// match some request.
pub fn check_batch(requests: &[JsonRpcMessage], responses: &[JsonRpcMessage]) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    let request_ids: Vec<RpcId> = requests
        .iter()
        .filter(|m| !m.is_notification())
        .filter_map(|m| m.id().cloned())
        .collect();

    let mut seen = HashSet::new();
    let mut response_ids = Vec::new();
    for response in responses {
        if let Some(id) = response.id() {
            response_ids.push(id.clone());
            let key = id.to_string();
            if !seen.insert(key.clone()) {
                violations.push(InvariantViolation::DuplicateId(key));
            }
        }
        check_float_id(response, &mut violations);
    }

    for id in &request_ids {
        let key = id.to_string();
        if !response_ids.iter().any(|r| r.to_string() == key) {
            violations.push(InvariantViolation::UnmatchedRequestId(key));
        }
    }
    for id in &response_ids {
        let key = id.to_string();
        if !request_ids.iter().any(|r| r.to_string() == key) {
            violations.push(InvariantViolation::UnmatchedResponseId(key));
        }
    }

    violations
}

fn check_version(jsonrpc: &str, violations: &mut Vec<InvariantViolation>) {
    if jsonrpc != "2.0" {
        violations.push(InvariantViolation::BadVersion { found: jsonrpc.to_string() });
    }
}

fn check_id_echo(request_id: Option<&RpcId>, response_id: Option<&RpcId>, violations: &mut Vec<InvariantViolation>) {
    match (request_id, response_id) {
        (Some(req), Some(resp)) if req.to_string() != resp.to_string() => {
            violations.push(InvariantViolation::IdMismatch {
                expected: req.to_string(),
                found: resp.to_string(),
            });
        }
        (None, None) | (Some(_), Some(_)) => {}
        _ => {}
    }
}

fn check_float_id(message: &JsonRpcMessage, violations: &mut Vec<InvariantViolation>) {
    if let Some(RpcId::Number(n)) = message.id() {
        if n.is_f64() && !n.is_i64() && !n.is_u64() {
            violations.push(InvariantViolation::SuspiciousId {
                reason: "id was generated as a non-integral float".to_string(),
            });
        }
    }
}
