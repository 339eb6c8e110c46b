// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded retry over a fixed, ascending delay sequence.
//!
//! An operation is attempted once, then once more after each delay of the
//! sequence, but only while the error it returns is [`Retryable`]. Any other
//! error is handed back on the spot without touching the remaining budget.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// Delays between attempts used unless configured otherwise: 1s, 3s, 5s.
pub const DEFAULT_RETRY_DELAYS: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(3),
    Duration::from_secs(5),
];

/// Classifies errors into transient ones, worth another attempt, and the rest.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    delays: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delays: DEFAULT_RETRY_DELAYS.to_vec(),
        }
    }
}

impl RetryPolicy {
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    /// `retries` extra attempts with no wait in between.
    pub fn immediate(retries: usize) -> Self {
        Self {
            delays: vec![Duration::ZERO; retries],
        }
    }

    /// A single attempt.
    pub fn none() -> Self {
        Self { delays: Vec::new() }
    }

    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }

    pub fn max_attempts(&self) -> usize {
        self.delays.len() + 1
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error, or
    /// the delay sequence is exhausted, in which case the last error is
    /// returned.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut f: F) -> Result<T, E>
    where
        E: Retryable + Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut delays = self.delays.iter();
        let mut attempt = 1;
        loop {
            match f().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{operation} succeeded after {attempt} attempts");
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => match delays.next() {
                    Some(delay) => {
                        warn!(
                            "{operation} failed with a connection error (attempt {attempt}/{}), retrying in {delay:?}: {e}",
                            self.max_attempts()
                        );
                        tokio::time::sleep(*delay).await;
                        attempt += 1;
                    }
                    None => {
                        warn!("{operation} failed after {attempt} attempts: {e}");
                        return Err(e);
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    #[derive(Debug, PartialEq)]
    enum FakeError {
        Connection,
        Constraint,
    }

    impl Display for FakeError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{self:?}")
        }
    }

    impl Retryable for FakeError {
        fn is_retryable(&self) -> bool {
            matches!(self, FakeError::Connection)
        }
    }

    /// Fails with a connection error on the first `failures` calls.
    async fn flaky(calls: &AtomicUsize, failures: usize) -> Result<usize, FakeError> {
        let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= failures {
            Err(FakeError::Connection)
        } else {
            Ok(call)
        }
    }

    #[tokio::test]
    async fn test_connection_error_recovers_on_next_attempt() {
        let policy = RetryPolicy::immediate(3);
        for failures in 1..=3 {
            let calls = AtomicUsize::new(0);
            let result = policy.run("flaky", || flaky(&calls, failures)).await;
            assert_eq!(result, Ok(failures + 1));
            assert_eq!(calls.load(Ordering::SeqCst), failures + 1);
        }
    }

    #[tokio::test]
    async fn test_non_retryable_error_returns_immediately() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = RetryPolicy::immediate(3)
            .run("constraint", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FakeError::Constraint)
            })
            .await;
        assert_eq!(result, Err(FakeError::Constraint));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let calls = AtomicUsize::new(0);
        let result = RetryPolicy::immediate(2)
            .run("down", || flaky(&calls, usize::MAX))
            .await;
        assert_eq!(result, Err(FakeError::Connection));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_policy_waits_one_three_five_seconds() {
        let calls = AtomicUsize::new(0);
        let start = Instant::now();
        let result = RetryPolicy::default()
            .run("down", || flaky(&calls, usize::MAX))
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(9), "waited {elapsed:?}");
        assert!(elapsed < Duration::from_secs(10), "waited {elapsed:?}");
    }

    #[test]
    fn test_max_attempts() {
        assert_eq!(RetryPolicy::default().max_attempts(), 4);
        assert_eq!(RetryPolicy::none().max_attempts(), 1);
    }
}
