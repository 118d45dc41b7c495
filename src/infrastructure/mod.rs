// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Infrastructure layer: transport drivers and process supervision.

pub mod supervisor;
pub mod transport;
