// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Seed pool entry and signature types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A stable hash summarizing an input's "interestingness" class, used as the
/// seed pool's dedup key: `H(kind, error_code_or_violation, shape_fingerprint)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature(pub [u8; 32]);

impl Signature {
    /// Computes a signature from the three components named in the data
    /// model: a run-kind tag, an error-code-or-violation tag, and a shape
    /// fingerprint (a hash of the payload's key set, ignoring values).
    pub fn compute(kind: &str, error_or_violation: &str, shape_fingerprint: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(kind.as_bytes());
        hasher.update(b"\0");
        hasher.update(error_or_violation.as_bytes());
        hasher.update(b"\0");
        hasher.update(shape_fingerprint.as_bytes());
        Signature(*hasher.finalize().as_bytes())
    }

    /// A stable fingerprint of a JSON value's key set, independent of values,
    /// used as the shape component fed into [`Signature::compute`].
    pub fn shape_fingerprint(value: &Value) -> String {
        fn collect_keys(value: &Value, prefix: &str, keys: &mut Vec<String>) {
            match value {
                Value::Object(map) => {
                    for (k, v) in map {
                        let path = if prefix.is_empty() {
                            k.clone()
                        } else {
                            format!("{prefix}.{k}")
                        };
                        keys.push(path.clone());
                        collect_keys(v, &path, keys);
                    }
                }
                Value::Array(items) => {
                    if let Some(first) = items.first() {
                        collect_keys(first, &format!("{prefix}[]"), keys);
                    }
                }
                _ => {}
            }
        }
        let mut keys = Vec::new();
        collect_keys(value, "", &mut keys);
        keys.sort();
        keys.join(",")
    }
}

impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex_encode(&self.0))
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// A payload retained in the seed pool because it produced something
/// interesting: an invariant violation, a server error, or a novel shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedEntry {
    pub payload: Value,
    pub signature: Signature,
    pub score: u32,
    pub created_at: DateTime<Utc>,
}

impl SeedEntry {
    pub fn new(payload: Value, signature: Signature) -> Self {
        Self {
            payload,
            signature,
            score: 1,
            created_at: Utc::now(),
        }
    }
}
