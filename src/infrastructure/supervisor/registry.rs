// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Single owning map from pid to process record. Generalized from the
//! orchestrator's `Arc<RwLock<HashMap<..>>>` server-registry pattern.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::domain::errors::SupervisorError;
use crate::domain::process::{ProcessConfig, ProcessRecord, ProcessState};

/// Registry of supervised processes. The sole owner of each process
/// record; watchdog and signal dispatcher only ever see a snapshot.
#[derive(Clone)]
pub struct ProcessRegistry {
    inner: Arc<RwLock<HashMap<u32, ProcessRecord>>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn register(&self, pid: u32, config: ProcessConfig) -> Result<(), SupervisorError> {
        let mut guard = self.inner.write().await;
        if guard.contains_key(&pid) {
            return Err(SupervisorError::RegistryConflict { pid });
        }
        guard.insert(pid, ProcessRecord::new(pid, config));
        Ok(())
    }

    pub async fn unregister(&self, pid: u32) -> Option<ProcessRecord> {
        self.inner.write().await.remove(&pid)
    }

    pub async fn transition(&self, pid: u32, to: ProcessState) -> Result<(), SupervisorError> {
        let mut guard = self.inner.write().await;
        let record = guard.get_mut(&pid).ok_or(SupervisorError::ProcessStop {
            pid,
            reason: "process not registered".into(),
        })?;
        record.transition(to)
    }

    pub async fn touch(&self, pid: u32) {
        if let Some(record) = self.inner.write().await.get_mut(&pid) {
            record.touch();
        }
    }

    /// Read-only snapshot for the watchdog, breaking the
    /// process/watchdog/registry reference cycle named in the design notes.
    pub async fn snapshot(&self) -> Vec<ProcessRecord> {
        self.inner.read().await.values().cloned().collect()
    }

    pub async fn running_count(&self) -> usize {
        self.inner
            .read()
            .await
            .values()
            .filter(|r| r.state == ProcessState::Running)
            .count()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for ProcessRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ProcessConfig {
        ProcessConfig {
            command: "true".into(),
            args: vec![],
            process_timeout_ms: 2_000,
            extra_buffer_ms: 1_000,
            max_hang_time_ms: 5_000,
        }
    }

    #[tokio::test]
    async fn register_then_unregister_round_trips() {
        let registry = ProcessRegistry::new();
        registry.register(1, config()).await.unwrap();
        assert_eq!(registry.len().await, 1);
        let removed = registry.unregister(1).await;
        assert!(removed.is_some());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let registry = ProcessRegistry::new();
        registry.register(1, config()).await.unwrap();
        assert!(registry.register(1, config()).await.is_err());
    }

    #[tokio::test]
    async fn snapshot_reflects_current_state() {
        let registry = ProcessRegistry::new();
        registry.register(1, config()).await.unwrap();
        registry.transition(1, ProcessState::Running).await.unwrap();
        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].state, ProcessState::Running);
    }
}
