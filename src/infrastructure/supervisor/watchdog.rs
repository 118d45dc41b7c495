// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Background task polling the process registry at a fixed interval,
//! escalating stalled processes from warn to graceful-terminate to
//! force-kill. Generalized from the orchestrator's own
//! `health_check_loop()`, which polled server health on the same
//! `tokio::time::interval` pattern.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::domain::process::{HealthAssessment, ProcessState};

use super::registry::ProcessRegistry;
use super::signal::{SignalDispatcher, SignalKind};

pub struct Watchdog {
    registry: ProcessRegistry,
    dispatcher: SignalDispatcher,
    check_interval: Duration,
    auto_kill: bool,
}

impl Watchdog {
    pub fn new(registry: ProcessRegistry, dispatcher: SignalDispatcher, check_interval: Duration, auto_kill: bool) -> Self {
        Self {
            registry,
            dispatcher,
            check_interval,
            auto_kill,
        }
    }

    /// Runs until `cancellation` fires. Each tick snapshots the registry,
    /// classifies every record's idle duration, and escalates.
    pub async fn run(&self, cancellation: CancellationToken) {
        let mut interval = tokio::time::interval(self.check_interval);
        loop {
            tokio::select! {
                _ = cancellation.cancelled() => break,
                _ = interval.tick() => self.tick().await,
            }
        }
    }

    async fn tick(&self) {
        for record in self.registry.snapshot().await {
            if record.state != ProcessState::Running {
                continue;
            }
            match record.assess_health() {
                HealthAssessment::Ok => {}
                HealthAssessment::Warn => {
                    tracing::warn!(pid = record.pid, "process approaching timeout threshold");
                }
                HealthAssessment::GracefulTerminate => {
                    tracing::warn!(pid = record.pid, "process exceeded timeout, requesting graceful termination");
                    if self.auto_kill {
                        let _ = self.registry.transition(record.pid, ProcessState::Stopping).await;
                        let _ = self.dispatcher.dispatch(record.pid, SignalKind::Timeout).await;
                    }
                }
                HealthAssessment::ForceKill => {
                    tracing::error!(pid = record.pid, "process exceeded max hang time, force-killing");
                    if self.auto_kill {
                        let _ = self.dispatcher.dispatch(record.pid, SignalKind::Force).await;
                        let _ = self.registry.transition(record.pid, ProcessState::Failed).await;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::process::ProcessConfig;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct RecordingStrategy {
        force_kills: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl crate::infrastructure::supervisor::signal::SignalStrategy for RecordingStrategy {
        async fn dispatch(&self, _pid: u32, kind: SignalKind) -> Result<(), crate::domain::errors::SupervisorError> {
            if kind == SignalKind::Force {
                self.force_kills.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn tick_leaves_fresh_process_alone() {
        let registry = ProcessRegistry::new();
        registry
            .register(
                1,
                ProcessConfig {
                    command: "true".into(),
                    args: vec![],
                    process_timeout_ms: 60_000,
                    extra_buffer_ms: 60_000,
                    max_hang_time_ms: 120_000,
                },
            )
            .await
            .unwrap();
        registry.transition(1, ProcessState::Running).await.unwrap();

        let force_kills = Arc::new(AtomicUsize::new(0));
        let dispatcher = SignalDispatcher::new(Box::new(RecordingStrategy { force_kills: force_kills.clone() }));
        let watchdog = Watchdog::new(registry.clone(), dispatcher, Duration::from_millis(10), true);
        watchdog.tick().await;

        assert_eq!(force_kills.load(Ordering::SeqCst), 0);
        assert_eq!(registry.snapshot().await[0].state, ProcessState::Running);
    }

    #[tokio::test]
    async fn tick_force_kills_long_hung_process() {
        let registry = ProcessRegistry::new();
        registry
            .register(
                1,
                ProcessConfig {
                    command: "true".into(),
                    args: vec![],
                    process_timeout_ms: 0,
                    extra_buffer_ms: 0,
                    max_hang_time_ms: 0,
                },
            )
            .await
            .unwrap();
        registry.transition(1, ProcessState::Running).await.unwrap();

        let force_kills = Arc::new(AtomicUsize::new(0));
        let dispatcher = SignalDispatcher::new(Box::new(RecordingStrategy { force_kills: force_kills.clone() }));
        let watchdog = Watchdog::new(registry.clone(), dispatcher, Duration::from_millis(10), true);
        watchdog.tick().await;

        assert_eq!(force_kills.load(Ordering::SeqCst), 1);
        assert_eq!(registry.snapshot().await[0].state, ProcessState::Failed);
    }
}
