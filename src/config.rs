// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration accepted by the fuzzer core. Loading this from YAML, a CLI,
//! or anywhere else is the embedding binary's job; this crate only consumes
//! the assembled struct and validates its internal bounds.

use serde::{Deserialize, Serialize};

use crate::domain::errors::ConfigurationError;
use crate::domain::tool::Phase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Http,
    StreamableHttp,
    Sse,
    Stdio,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    pub kind: TransportKind,
    pub endpoint: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FuzzMode {
    Tools,
    Protocol,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseSelection {
    Realistic,
    Aggressive,
    Both,
}

impl PhaseSelection {
    pub fn phases(self) -> Vec<Phase> {
        match self {
            PhaseSelection::Realistic => vec![Phase::Realistic],
            PhaseSelection::Aggressive => vec![Phase::Aggressive],
            PhaseSelection::Both => vec![Phase::Realistic, Phase::Aggressive],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuzzConfig {
    pub mode: FuzzMode,
    pub phase: PhaseSelection,
    pub runs: u32,
    pub runs_per_type: u32,
    pub max_concurrency: usize,
    pub tool_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    pub enabled: bool,
    pub fs_root: String,
    pub allowed_hosts: Vec<String>,
    pub no_network: bool,
    pub enable_system_blocking: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogConfig {
    pub check_interval_ms: u64,
    pub process_timeout_ms: u64,
    pub extra_buffer_ms: u64,
    pub max_hang_time_ms: u64,
    pub auto_kill: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    pub headers: std::collections::HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuzzerConfig {
    pub transport: TransportConfig,
    pub fuzz: FuzzConfig,
    pub safety: SafetyConfig,
    pub watchdog: WatchdogConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

impl FuzzerConfig {
    /// Validates runtime bounds not expressible in the type system. Returns
    /// the first violated field rather than accumulating every error, since
    /// this is a flat struct, not a nested manifest.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.fuzz.max_concurrency == 0 {
            return Err(ConfigurationError::Validation {
                field: "fuzz.max_concurrency".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.fuzz.runs == 0 {
            return Err(ConfigurationError::Validation {
                field: "fuzz.runs".into(),
                reason: "must be at least 1".into(),
            });
        }
        if !std::path::Path::new(&self.safety.fs_root).is_absolute() {
            return Err(ConfigurationError::Validation {
                field: "safety.fs_root".into(),
                reason: "must be an absolute path".into(),
            });
        }
        if self.watchdog.check_interval_ms == 0 {
            return Err(ConfigurationError::Validation {
                field: "watchdog.check_interval_ms".into(),
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FuzzerConfig {
        FuzzerConfig {
            transport: TransportConfig {
                kind: TransportKind::Http,
                endpoint: "http://127.0.0.1:8080".into(),
                timeout_ms: 30_000,
            },
            fuzz: FuzzConfig {
                mode: FuzzMode::All,
                phase: PhaseSelection::Both,
                runs: 100,
                runs_per_type: 10,
                max_concurrency: 5,
                tool_timeout_ms: 5_000,
            },
            safety: SafetyConfig {
                enabled: true,
                fs_root: "/tmp/sbx".into(),
                allowed_hosts: vec!["127.0.0.1".into(), "localhost".into()],
                no_network: false,
                enable_system_blocking: true,
            },
            watchdog: WatchdogConfig {
                check_interval_ms: 1_000,
                process_timeout_ms: 2_000,
                extra_buffer_ms: 1_000,
                max_hang_time_ms: 5_000,
                auto_kill: true,
            },
            auth: AuthConfig::default(),
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn zero_concurrency_rejected() {
        let mut config = sample();
        config.fuzz.max_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn relative_fs_root_rejected() {
        let mut config = sample();
        config.safety.fs_root = "relative/path".into();
        assert!(config.validate().is_err());
    }
}
