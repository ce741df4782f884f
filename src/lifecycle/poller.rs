//! State transition poller.
//!
//! Polls a resource's describe call on a fixed cadence until it reaches a
//! state from which the next operation is legal, it is confirmed gone, or the
//! polling window closes.

use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{LifecycleError, OrchestrationError, Result};

use super::driver::{DriverSnapshot, RemoteState, ResourceDriver};
use super::retry::RetryPolicy;

/// Last-state label used when a resource was never observed.
const STATE_ABSENT: &str = "absent";

/// Polling cadence and deadline for one resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Fixed delay between two describe calls.
    pub interval: Duration,
    /// Overall window for one wait.
    pub timeout: Duration,
    /// Number of readiness checks after provisioning before giving up waiting.
    pub readiness_polls: u32,
}

/// Waits for resources to settle, using the retry policy for each describe.
#[derive(Debug)]
pub struct StatePoller<'a> {
    /// Retry policy wrapping every describe call.
    retry: &'a RetryPolicy,
    /// Caller-supplied cancellation signal.
    cancel: &'a CancellationToken,
}

impl<'a> StatePoller<'a> {
    /// Creates a poller.
    #[must_use]
    pub const fn new(retry: &'a RetryPolicy, cancel: &'a CancellationToken) -> Self {
        Self { retry, cancel }
    }

    /// Polls until the resource is in one of the driver's stable states and
    /// returns that snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError::TransitionTimeout`] if the window closes,
    /// [`OrchestrationError::UnexpectedDisappearance`] if the resource is
    /// reported gone, or the describe call's own error.
    pub async fn await_stable<D: ResourceDriver>(
        &self,
        driver: &D,
        resource_id: &str,
    ) -> Result<DriverSnapshot<D>> {
        let settings = driver.poll_settings();
        let started = Instant::now();
        let mut last_state: Option<String> = None;

        loop {
            let described = self
                .retry
                .run("describe", resource_id, self.cancel, move || driver.describe(resource_id))
                .await?;

            let Some(snapshot) = described else {
                return Err(LifecycleError::Orchestration(
                    OrchestrationError::UnexpectedDisappearance {
                        resource_id: resource_id.to_string(),
                        last_state: last_state.unwrap_or_else(|| String::from(STATE_ABSENT)),
                    },
                ));
            };

            if snapshot.state.is_gone() {
                return Err(LifecycleError::Orchestration(
                    OrchestrationError::UnexpectedDisappearance {
                        resource_id: resource_id.to_string(),
                        last_state: snapshot.state.to_string(),
                    },
                ));
            }

            if driver.stable_states().contains(&snapshot.state) {
                debug!(resource_id, state = %snapshot.state, "Resource is stable");
                return Ok(snapshot);
            }

            debug!(resource_id, state = %snapshot.state, "Waiting for transition");
            last_state = Some(snapshot.state.to_string());

            self.pause_within(started, &settings, resource_id, last_state.as_deref())
                .await?;
        }
    }

    /// Polls until the resource is reported gone.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError::TransitionTimeout`] if the window closes,
    /// or the describe call's own error.
    pub async fn await_gone<D: ResourceDriver>(&self, driver: &D, resource_id: &str) -> Result<()> {
        let settings = driver.poll_settings();
        let started = Instant::now();

        loop {
            let described = self
                .retry
                .run("describe", resource_id, self.cancel, move || driver.describe(resource_id))
                .await?;

            let state = match described {
                None => {
                    debug!(resource_id, "Resource is absent");
                    return Ok(());
                }
                Some(snapshot) if snapshot.state.is_gone() => {
                    debug!(resource_id, state = %snapshot.state, "Resource reached terminal state");
                    return Ok(());
                }
                Some(snapshot) => snapshot.state.to_string(),
            };

            debug!(resource_id, state = %state, "Waiting for deletion");
            self.pause_within(started, &settings, resource_id, Some(&state))
                .await?;
        }
    }

    /// Polls the driver's readiness check a bounded number of times.
    ///
    /// Running out of polls is not an error: the resource is stable, so the
    /// caller proceeds and lets the backend reject what it cannot accept yet.
    ///
    /// # Errors
    ///
    /// Returns the readiness call's error or a cancellation error.
    pub async fn await_ready<D: ResourceDriver>(&self, driver: &D, resource_id: &str) -> Result<()> {
        let settings = driver.poll_settings();

        for poll in 1..=settings.readiness_polls {
            let ready = self
                .retry
                .run("readiness", resource_id, self.cancel, move || driver.is_ready(resource_id))
                .await?;

            if ready {
                return Ok(());
            }

            if poll < settings.readiness_polls {
                self.sleep(settings.interval, resource_id, "awaiting readiness of")
                    .await?;
            }
        }

        if settings.readiness_polls > 0 {
            warn!(
                resource_id,
                polls = settings.readiness_polls,
                "Resource not reported ready, proceeding"
            );
        }
        Ok(())
    }

    /// Sleeps one interval, or fails with a timeout if the window is closed.
    async fn pause_within(
        &self,
        started: Instant,
        settings: &PollSettings,
        resource_id: &str,
        last_state: Option<&str>,
    ) -> Result<()> {
        let elapsed = started.elapsed();
        if elapsed >= settings.timeout {
            return Err(LifecycleError::Orchestration(
                OrchestrationError::TransitionTimeout {
                    resource_id: resource_id.to_string(),
                    last_state: last_state.unwrap_or(STATE_ABSENT).to_string(),
                    waited_secs: elapsed.as_secs(),
                },
            ));
        }

        let remaining = settings.timeout.saturating_sub(elapsed);
        self.sleep(settings.interval.min(remaining), resource_id, "polling")
            .await
    }

    async fn sleep(&self, duration: Duration, resource_id: &str, phase: &str) -> Result<()> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(LifecycleError::Orchestration(
                OrchestrationError::Cancelled {
                    resource_id: resource_id.to_string(),
                    phase: phase.to_string(),
                },
            )),
            () = tokio::time::sleep(duration) => Ok(()),
        }
    }
}
