// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Fuzz result records and the aggregate summary built from them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::jsonrpc::InvariantViolation;
use super::tool::{FuzzInput, RunKind};

/// How a run's outcome was classified when it did not simply succeed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Classification {
    Timeout,
    TransportError { detail: String },
    ServerError { code: i64, message: String },
}

/// The outcome of a single fuzz run. Immutable once emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuzzResult {
    pub run_kind: RunKind,
    pub run_index: u64,
    pub success: bool,
    pub input: FuzzInput,
    pub response: Option<Value>,
    pub classification: Option<Classification>,
    pub safety_blocked: bool,
    pub safety_sanitized: bool,
    pub invariant_violations: Vec<InvariantViolation>,
    pub elapsed_ms: u64,
}

impl FuzzResult {
    pub fn is_interesting(&self) -> bool {
        !self.invariant_violations.is_empty()
            || matches!(self.classification, Some(Classification::ServerError { .. }))
    }
}

/// Per-category counters folded from a stream of [`FuzzResult`]s.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryStats {
    pub total_runs: u64,
    pub successes: u64,
    pub safety_blocked: u64,
    pub safety_sanitized: u64,
    pub invariant_violations: u64,
    pub server_rejections: u64,
    pub exceptions: u64,
}

/// The final, whole-run aggregate emitted after the last result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FuzzSummary {
    pub per_tool: std::collections::HashMap<String, CategoryStats>,
    pub per_protocol_kind: std::collections::HashMap<String, CategoryStats>,
    pub overall: CategoryStats,
}

impl FuzzSummary {
    /// Folds a single result into the running summary. `label` is the tool
    /// name for tool runs, or the protocol message kind for protocol/batch
    /// runs.
    pub fn record(&mut self, result: &FuzzResult, label: &str) {
        let bucket = match result.run_kind {
            RunKind::Tool => self.per_tool.entry(label.to_string()).or_default(),
            RunKind::Protocol | RunKind::Batch => {
                self.per_protocol_kind.entry(label.to_string()).or_default()
            }
        };
        Self::fold_into(bucket, result);
        Self::fold_into(&mut self.overall, result);
    }

    fn fold_into(stats: &mut CategoryStats, result: &FuzzResult) {
        stats.total_runs += 1;
        if result.success {
            stats.successes += 1;
        }
        if result.safety_blocked {
            stats.safety_blocked += 1;
        }
        if result.safety_sanitized {
            stats.safety_sanitized += 1;
        }
        stats.invariant_violations += result.invariant_violations.len() as u64;
        match &result.classification {
            Some(Classification::ServerError { .. }) => stats.server_rejections += 1,
            Some(Classification::TransportError { .. }) | Some(Classification::Timeout) => {
                stats.exceptions += 1
            }
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result(success: bool) -> FuzzResult {
        FuzzResult {
            run_kind: RunKind::Tool,
            run_index: 0,
            success,
            input: FuzzInput::ToolCall {
                tool_name: "web_tool".into(),
                arguments: serde_json::json!({}),
            },
            response: None,
            classification: None,
            safety_blocked: false,
            safety_sanitized: false,
            invariant_violations: vec![],
            elapsed_ms: 10,
        }
    }

    #[test]
    fn summary_tracks_per_tool_and_overall() {
        let mut summary = FuzzSummary::default();
        summary.record(&sample_result(true), "web_tool");
        summary.record(&sample_result(false), "web_tool");
        assert_eq!(summary.per_tool["web_tool"].total_runs, 2);
        assert_eq!(summary.per_tool["web_tool"].successes, 1);
        assert_eq!(summary.overall.total_runs, 2);
    }

    #[test]
    fn interesting_result_has_violations_or_server_error() {
        let mut result = sample_result(false);
        result.invariant_violations.push(InvariantViolation::DualResult);
        assert!(result.is_interesting());
    }
}
