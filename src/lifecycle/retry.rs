//! Bounded retry for transient-busy remote calls.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::RetrySettings;
use crate::error::{LifecycleError, OrchestrationError, Result};

/// Shortest backoff between attempts. A busy backend is never hammered in a
/// tight loop, whatever the configuration says.
pub const MIN_DELAY: Duration = Duration::from_secs(1);

/// Retries a single remote call while the backend reports it is busy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one.
    max_attempts: u32,
    /// Delay before the second attempt.
    initial_delay: Duration,
    /// Upper bound for the backoff delay.
    max_delay: Duration,
}

impl RetryPolicy {
    /// Creates a retry policy.
    ///
    /// `max_attempts` is raised to at least one, `initial_delay` to at least
    /// [`MIN_DELAY`] and `max_delay` to at least `initial_delay`.
    #[must_use]
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        let initial_delay = initial_delay.max(MIN_DELAY);
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay: max_delay.max(initial_delay),
        }
    }

    /// Builds a policy from configuration.
    #[must_use]
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self::new(
            settings.max_attempts,
            Duration::from_secs(settings.initial_delay_secs),
            Duration::from_secs(settings.max_delay_secs),
        )
    }

    /// Maximum number of attempts.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff delay after the given failed attempt (1-based), doubling from
    /// the initial delay up to the configured cap.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_delay
            .saturating_mul(1 << exponent)
            .min(self.max_delay)
    }

    /// Runs `operation` against `resource_id`, retrying while it fails with a
    /// transient-busy error.
    ///
    /// Non-transient errors are returned unmodified. When the attempts are
    /// exhausted the last transient error is wrapped in
    /// [`OrchestrationError::RetryExhausted`]. The backoff sleep is
    /// interrupted by `cancel`. Both errors name `name` and `resource_id`.
    ///
    /// # Errors
    ///
    /// Returns the operation's error, a retry-exhausted error, or a
    /// cancellation error.
    pub async fn run<T, F, Fut>(
        &self,
        name: &str,
        resource_id: &str,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let error = match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation = name, resource_id, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient_busy() => e,
                Err(e) => return Err(e),
            };

            if attempt >= self.max_attempts {
                return Err(LifecycleError::Orchestration(
                    OrchestrationError::RetryExhausted {
                        operation: name.to_string(),
                        resource_id: resource_id.to_string(),
                        attempts: attempt,
                        source: Box::new(error),
                    },
                ));
            }

            let delay = self.delay_for(attempt);
            warn!(
                operation = name,
                resource_id,
                attempt,
                max_attempts = self.max_attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Server busy, retrying"
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return Err(LifecycleError::Orchestration(OrchestrationError::Cancelled {
                        resource_id: resource_id.to_string(),
                        phase: format!("retrying {name} of"),
                    }));
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&RetrySettings::default())
    }
}
