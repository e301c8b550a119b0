use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::error::Result;

/// Retries storage calls that fail with a transient error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    retries: u32,
    backoff: Duration,
}

impl RetryPolicy {
    /// A policy that never retries.
    pub const NONE: Self = Self {
        retries: 0,
        backoff: Duration::ZERO,
    };

    /// `retries` extra attempts, sleeping `backoff` between attempts.
    #[must_use]
    pub const fn new(retries: u32, backoff: Duration) -> Self {
        Self { retries, backoff }
    }

    #[must_use]
    pub fn retries(&self) -> u32 {
        self.retries
    }

    #[must_use]
    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Runs `op` until it succeeds, fails permanently or runs out of retries.
    ///
    /// # Errors
    ///
    /// Returns the last error reported by `op`.
    pub fn run<T>(&self, log_id: &str, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let mut attempt = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.retries => {
                    attempt += 1;
                    warn!(log_id, attempt, error = %err, "transient storage failure, retrying");
                    if !self.backoff.is_zero() {
                        thread::sleep(self.backoff);
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::NONE
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::error::StorageError;

    fn unavailable() -> StorageError {
        StorageError::Unavailable {
            log_id: "saga_1".to_string(),
            reason: "busy".to_string(),
        }
    }

    #[test]
    fn transient_failures_are_retried_until_success() -> anyhow::Result<()> {
        let calls = Cell::new(0);
        let policy = RetryPolicy::new(3, Duration::ZERO);

        let value = policy.run("saga_1", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(unavailable())
            } else {
                Ok(calls.get())
            }
        })?;

        assert_eq!(value, 3);
        Ok(())
    }

    #[test]
    fn gives_up_after_configured_retries() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::new(2, Duration::ZERO);

        let result: Result<()> = policy.run("saga_1", || {
            calls.set(calls.get() + 1);
            Err(unavailable())
        });

        assert!(matches!(result, Err(StorageError::Unavailable { .. })));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn permanent_failures_are_not_retried() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::new(5, Duration::ZERO);

        let result: Result<()> = policy.run("saga_1", || {
            calls.set(calls.get() + 1);
            Err(StorageError::Closed)
        });

        assert!(matches!(result, Err(StorageError::Closed)));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn default_policy_never_retries() {
        assert_eq!(RetryPolicy::default(), RetryPolicy::NONE);
        assert_eq!(RetryPolicy::default().retries(), 0);
    }
}
