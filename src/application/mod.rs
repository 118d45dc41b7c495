// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Application layer: generation, mutation, safety gating, invariant
//! checking, concurrency, and orchestration.

pub mod campaign;
pub mod executor;
pub mod invariant_checker;
pub mod mutators;
pub mod orchestrator;
pub mod safety_filter;
pub mod schema_generator;
pub mod seed_pool;
