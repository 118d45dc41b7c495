// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod errors;
pub mod jsonrpc;
pub mod path_sanitizer;
pub mod process;
pub mod result;
pub mod seed;
pub mod tool;
