//! Injected delay capability used by every backoff loop.

use async_trait::async_trait;
use rand::Rng;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Upper bound (exclusive) of the jitter added by [`RandomSleeper`], in milliseconds
pub const MAX_JITTER_MS: u64 = 100;

/// Sleeps for a requested number of milliseconds
///
/// Returns how long it actually slept, which is what backoff budgets are
/// charged with.
#[async_trait]
pub trait Sleeper: fmt::Debug + Send + Sync {
    /// Sleep for at least `millis` milliseconds
    async fn sleep(&self, millis: u64) -> u64;
}

/// Production sleeper: the requested time plus a random jitter in `[0, 100)` ms
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomSleeper;

#[async_trait]
impl Sleeper for RandomSleeper {
    async fn sleep(&self, millis: u64) -> u64 {
        let jitter = rand::rng().random_range(0..MAX_JITTER_MS);
        let total = millis.saturating_add(jitter);
        tokio::time::sleep(Duration::from_millis(total)).await;
        total
    }
}

/// Sleeper that returns immediately, reporting the requested time as slept
///
/// Every request is recorded so tests can assert on the backoff sequence.
#[derive(Debug, Default)]
pub struct NoDelaySleeper {
    requests: Mutex<Vec<u64>>,
}

impl NoDelaySleeper {
    /// Create a sleeper with an empty request log
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep requests received so far, in order
    pub fn requests(&self) -> Vec<u64> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of sleep requests received so far
    pub fn calls(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl Sleeper for NoDelaySleeper {
    async fn sleep(&self, millis: u64) -> u64 {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(millis);
        millis
    }
}
