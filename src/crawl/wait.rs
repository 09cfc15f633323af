// src/crawl/wait.rs
//! Wait-for-condition with timeout and backoff. Keeps "how long to wait"
//! policy out of the crawl control flow: callers probe for a value and get
//! either the value or a timeout error.

use futures::future::BoxFuture;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("condition not met within {waited_ms} ms")]
pub struct WaitTimeout {
    pub waited_ms: u128,
}

#[derive(Debug, Clone, Copy)]
pub struct WaitPolicy {
    pub timeout: Duration,
    pub initial_interval: Duration,
    pub max_interval: Duration,
}

impl WaitPolicy {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            initial_interval: Duration::from_millis(250),
            max_interval: Duration::from_secs(2),
        }
    }
}

/// Poll `probe` until it yields `Some(T)` or the policy timeout elapses.
/// The poll interval doubles after each miss, capped at `max_interval`.
pub async fn wait_for<F, Fut, T>(policy: WaitPolicy, mut probe: F) -> Result<T, WaitTimeout>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let start = tokio::time::Instant::now();
    let mut interval = policy.initial_interval;
    loop {
        if let Some(value) = probe().await {
            return Ok(value);
        }
        if start.elapsed() >= policy.timeout {
            return Err(WaitTimeout {
                waited_ms: start.elapsed().as_millis(),
            });
        }
        let remaining = policy.timeout.saturating_sub(start.elapsed());
        tokio::time::sleep(interval.min(remaining)).await;
        interval = (interval * 2).min(policy.max_interval);
    }
}

/// Like [`wait_for`], but threads exclusive state through the probe. Needed
/// when the probe must borrow something mutably (the session driver).
pub async fn wait_for_with<S, T, F>(
    policy: WaitPolicy,
    state: &mut S,
    mut probe: F,
) -> Result<T, WaitTimeout>
where
    S: ?Sized,
    F: for<'a> FnMut(&'a mut S) -> BoxFuture<'a, Option<T>>,
{
    let start = tokio::time::Instant::now();
    let mut interval = policy.initial_interval;
    loop {
        if let Some(value) = probe(state).await {
            return Ok(value);
        }
        if start.elapsed() >= policy.timeout {
            return Err(WaitTimeout {
                waited_ms: start.elapsed().as_millis(),
            });
        }
        let remaining = policy.timeout.saturating_sub(start.elapsed());
        tokio::time::sleep(interval.min(remaining)).await;
        interval = (interval * 2).min(policy.max_interval);
    }
}
