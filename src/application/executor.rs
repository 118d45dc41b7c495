// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Semaphore-gated concurrent execution with success/failure partitioning
//! and cooperative cancellation, patterned after the orchestrator's own use
//! of bounded concurrency in its health-check loop.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::domain::errors::FuzzingError;

/// Runs a list of operations with at most `max_concurrency` in flight.
pub struct BoundedExecutor {
    semaphore: Arc<Semaphore>,
    cancellation: CancellationToken,
}

impl BoundedExecutor {
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrency.max(1))),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(max_concurrency: usize, cancellation: CancellationToken) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrency.max(1))),
            cancellation,
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Runs every operation returned by `make_op`, bounded by the
    /// executor's concurrency limit. Operations never cancel their
    /// siblings on failure; the returned lists partition outcomes.
    pub async fn run_all<T, E, F, Fut>(&self, count: usize, make_op: F) -> (Vec<T>, Vec<E>)
    where
        T: Send + 'static,
        E: Send + 'static,
        F: Fn(usize) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let mut handles = Vec::with_capacity(count);
        for i in 0..count {
            if self.cancellation.is_cancelled() {
                break;
            }
            let permit = match self.semaphore.clone().acquire_owned().await {
                Ok(p) => p,
                Err(_) => break,
            };
            let op = make_op(i);
            let cancellation = self.cancellation.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                tokio::select! {
                    result = op => Some(result),
                    _ = cancellation.cancelled() => None,
                }
            }));
        }

        let mut successes = Vec::new();
        let mut failures = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(Some(Ok(value))) => successes.push(value),
                Ok(Some(Err(err))) => failures.push(err),
                Ok(None) | Err(_) => {}
            }
        }
        (successes, failures)
    }

    /// Stops accepting new work, waits up to `grace` for in-flight
    /// operations, then cancels the rest.
    pub async fn shutdown(&self, grace: Duration) {
        self.cancellation.cancel();
        tokio::time::sleep(grace).await;
    }
}

impl Default for BoundedExecutor {
    fn default() -> Self {
        Self::new(5)
    }
}

pub fn strategy_error(detail: impl Into<String>) -> FuzzingError {
    FuzzingError::Strategy(detail.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    #[tokio::test]
    async fn bounded_concurrency_wall_clock_bounds() {
        let executor = BoundedExecutor::new(5);
        let started = Instant::now();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_observed = Arc::new(AtomicUsize::new(0));

        let in_flight_cl = in_flight.clone();
        let max_observed_cl = max_observed.clone();
        let (successes, failures): (Vec<()>, Vec<()>) = executor
            .run_all(50, move |_i| {
                let in_flight = in_flight_cl.clone();
                let max_observed = max_observed_cl.clone();
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_observed.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok::<(), ()>(())
                }
            })
            .await;

        assert_eq!(successes.len(), 50);
        assert!(failures.is_empty());
        assert!(max_observed.load(Ordering::SeqCst) <= 5);
        assert!(started.elapsed() >= Duration::from_millis(400));
    }

    #[tokio::test]
    async fn failures_do_not_cancel_siblings() {
        let executor = BoundedExecutor::new(3);
        let (successes, failures) = executor
            .run_all(6, |i| async move {
                if i % 2 == 0 {
                    Ok::<usize, &'static str>(i)
                } else {
                    Err("boom")
                }
            })
            .await;
        assert_eq!(successes.len(), 3);
        assert_eq!(failures.len(), 3);
    }

    #[tokio::test]
    async fn shutdown_cancels_pending_work() {
        let executor = BoundedExecutor::new(1);
        executor.shutdown(Duration::from_millis(10)).await;
        assert!(executor.cancellation_token().is_cancelled());
    }
}
