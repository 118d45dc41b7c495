// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Bounded, deduplicated cache of "interesting" fuzz inputs, consulted by
//! the mutators and fed by the orchestrator after each run.

use std::num::NonZeroUsize;

use lru::LruCache;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;

use crate::domain::seed::{SeedEntry, Signature};

const DEFAULT_CAPACITY: usize = 256;

struct Inner {
    cache: LruCache<Signature, SeedEntry>,
    rng: StdRng,
}

/// Bounded LRU keyed by [`Signature`], capacity ~256 by default, behind a
/// single mutex per the shared-resource discipline in the component design.
/// Holds its own deterministic RNG so sampling is reproducible within one
/// orchestrator instance given a fixed seed.
pub struct SeedPool {
    inner: Mutex<Inner>,
}

impl SeedPool {
    pub fn new(capacity: usize, rng_seed: u64) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            inner: Mutex::new(Inner {
                cache: LruCache::new(capacity),
                rng: StdRng::seed_from_u64(rng_seed),
            }),
        }
    }

    pub fn with_default_capacity(rng_seed: u64) -> Self {
        Self::new(DEFAULT_CAPACITY, rng_seed)
    }

    /// Inserts a candidate if its signature is unseen, evicting the LRU
    /// entry when the pool is at capacity. Returns whether it was inserted
    /// (a duplicate signature is a no-op other than refreshing recency).
    pub async fn offer(&self, entry: SeedEntry) -> bool {
        let mut guard = self.inner.lock().await;
        let is_new = !guard.cache.contains(&entry.signature);
        guard.cache.put(entry.signature, entry);
        is_new
    }

    /// Uniformly samples one entry from the pool, or `None` if empty.
    pub async fn sample(&self, _caller_rng: &mut impl Rng) -> Option<SeedEntry> {
        let mut guard = self.inner.lock().await;
        let len = guard.cache.len();
        if len == 0 {
            return None;
        }
        let idx = guard.rng.random_range(0..len);
        guard.cache.iter().nth(idx).map(|(_, v)| v.clone())
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.cache.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(tag: &str) -> SeedEntry {
        let sig = Signature::compute("tool_call", tag, "url");
        SeedEntry::new(json!({"url": tag}), sig)
    }

    #[tokio::test]
    async fn offer_then_sample_returns_entry() {
        let pool = SeedPool::new(4, 1);
        pool.offer(entry("-32602")).await;
        let mut rng = rand::rng();
        let sampled = pool.sample(&mut rng).await;
        assert!(sampled.is_some());
    }

    #[tokio::test]
    async fn pool_never_exceeds_capacity() {
        let pool = SeedPool::new(4, 1);
        for i in 0..20 {
            pool.offer(entry(&format!("code-{i}"))).await;
        }
        assert!(pool.len().await <= 4);
    }

    #[tokio::test]
    async fn duplicate_signature_does_not_grow_pool() {
        let pool = SeedPool::new(4, 1);
        assert!(pool.offer(entry("-32602")).await);
        assert!(!pool.offer(entry("-32602")).await);
        assert_eq!(pool.len().await, 1);
    }

    #[tokio::test]
    async fn empty_pool_samples_none() {
        let pool = SeedPool::new(4, 1);
        let mut rng = rand::rng();
        assert!(pool.sample(&mut rng).await.is_none());
    }
}
