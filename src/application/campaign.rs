// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Campaign-level composition: runs a plan of tool/protocol/batch
//! operations under bounded concurrency, streaming each [`FuzzResult`] out
//! as it completes, and exposes the whole-run [`FuzzSummary`] once the
//! stream is drained.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use crate::application::executor::BoundedExecutor;
use crate::application::mutators::ProtocolKind;
use crate::application::orchestrator::{BatchOrchestrator, OrchestratorContext, ProtocolOrchestrator, ToolOrchestrator};
use crate::domain::result::{FuzzResult, FuzzSummary};
use crate::domain::tool::{Phase, ToolDescriptor};

/// A single scheduled unit of work within a campaign.
#[derive(Clone)]
pub enum CampaignOp {
    Tool(Arc<ToolDescriptor>),
    Protocol(ProtocolKind),
    Batch(Arc<Vec<ProtocolKind>>),
}

impl CampaignOp {
    /// The bucket a result folds into under [`FuzzSummary`]: a tool's name,
    /// or a protocol message's method name.
    fn label(&self) -> String {
        match self {
            CampaignOp::Tool(tool) => tool.name.clone(),
            CampaignOp::Protocol(kind) => kind.method().to_string(),
            CampaignOp::Batch(kinds) => kinds.first().map(|k| k.method()).unwrap_or("batch").to_string(),
        }
    }
}

/// Ties the three per-kind orchestrators to a shared context so a campaign
/// can dispatch any mix of operations against one target.
pub struct Campaign {
    tool_orchestrator: Arc<ToolOrchestrator>,
    protocol_orchestrator: Arc<ProtocolOrchestrator>,
    batch_orchestrator: Arc<BatchOrchestrator>,
    executor: BoundedExecutor,
}

impl Campaign {
    pub fn new(ctx: Arc<OrchestratorContext>, tool_timeout: std::time::Duration, max_concurrency: usize) -> Self {
        Self {
            tool_orchestrator: Arc::new(ToolOrchestrator::new(ctx.clone(), tool_timeout)),
            protocol_orchestrator: Arc::new(ProtocolOrchestrator::new(ctx.clone(), false)),
            batch_orchestrator: Arc::new(BatchOrchestrator::new(ctx)),
            executor: BoundedExecutor::new(max_concurrency),
        }
    }

    pub fn cancellation_token(&self) -> tokio_util::sync::CancellationToken {
        self.executor.cancellation_token()
    }

    /// Runs every op in `plan` under bounded concurrency, assigning each a
    /// `run_index` matching its position in `plan`. Results are streamed out
    /// through the returned receiver as each run completes, in completion
    /// order rather than plan order; the join handle resolves once every op
    /// has been dispatched and its result sent.
    pub fn run_all(self: Arc<Self>, plan: Vec<(CampaignOp, Phase)>) -> (mpsc::UnboundedReceiver<FuzzResult>, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let campaign = self;
        let total = plan.len();
        let handle = tokio::spawn(async move {
            info!(total, "starting fuzz campaign");
            let campaign_for_ops = campaign.clone();
            let plan = Arc::new(plan);
            let (_, _failures): (Vec<()>, Vec<()>) = campaign
                .executor
                .run_all(total, move |i| {
                    let campaign = campaign_for_ops.clone();
                    let plan = plan.clone();
                    let tx = tx.clone();
                    async move {
                        let (op, phase) = plan[i].clone();
                        let result = campaign.dispatch(&op, i as u64, phase).await;
                        let _ = tx.send(result);
                        Ok::<(), ()>(())
                    }
                })
                .await;
            info!(total, "fuzz campaign finished");
        });
        (rx, handle)
    }

    async fn dispatch(&self, op: &CampaignOp, run_index: u64, phase: Phase) -> FuzzResult {
        match op {
            CampaignOp::Tool(tool) => self.tool_orchestrator.run(tool, run_index, phase).await,
            CampaignOp::Protocol(kind) => self.protocol_orchestrator.run(*kind, run_index, phase).await,
            CampaignOp::Batch(kinds) => self.batch_orchestrator.run(kinds, run_index, phase).await,
        }
    }
}

/// Drains `rx` to completion, folding every emitted result into a
/// [`FuzzSummary`] keyed by [`CampaignOp::label`]. Intended to be awaited
/// alongside the join handle returned by [`Campaign::run_all`].
pub async fn fold_to_summary(mut rx: mpsc::UnboundedReceiver<FuzzResult>, plan: &[(CampaignOp, Phase)]) -> FuzzSummary {
    let mut summary = FuzzSummary::default();
    while let Some(result) = rx.recv().await {
        let label = plan
            .get(result.run_index as usize)
            .map(|(op, _)| op.label())
            .unwrap_or_else(|| "unknown".to_string());
        summary.record(&result, &label);
    }
    summary
}
