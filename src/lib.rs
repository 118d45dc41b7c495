// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # mcp-fuzzer-core
//!
//! Protocol-level fuzzer core for servers implementing the Model Context
//! Protocol. This crate owns the domain model, the mutation and strategy
//! engine, transport drivers, process supervision, and the orchestrators
//! that tie a fuzzing run together; it does not ship a CLI or a report
//! renderer.
//!
//! ## Layer structure
//!
//! ```text
//! application/    <- mutators, schema generator, seed pool, safety filter,
//!                     invariant checker, executor, orchestrators
//!     v
//! domain/         <- tool/JSON-RPC/process/result value types, error enums
//!     v
//! infrastructure/ <- HTTP/streamable-HTTP/SSE/stdio transports,
//!                     process supervisor (registry, watchdog, signals)
//! ```
//!
//! `config` sits alongside these layers and defines the struct an embedding
//! binary assembles and validates before constructing an orchestrator.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use domain::errors::FuzzError;
