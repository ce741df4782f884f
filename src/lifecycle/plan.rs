//! Update plans and the applied-step ledger.
//!
//! An update plan is the ordered list of idempotent sub-steps derived once per
//! update request from the desired/current attribute diff. The ledger records
//! which of those steps completed during one update invocation.

use std::fmt::{Debug, Display};

use crate::error::{LifecycleError, Result};

/// A named update step with declared dependencies.
pub trait StepKind: Copy + Eq + Debug + Display + Send + Sync + 'static {
    /// Steps that must run before this one when both are in the same plan.
    fn depends_on(self) -> &'static [Self];
}

/// Ordered list of steps for one update request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePlan<S> {
    steps: Vec<S>,
}

/// Record of the steps completed during one update invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepLedger<S> {
    /// Steps that issued remote calls and completed.
    applied: Vec<S>,
    /// Steps found already satisfied on the live resource.
    skipped: Vec<S>,
}

impl<S: StepKind> UpdatePlan<S> {
    /// Creates an empty plan (no changes needed).
    #[must_use]
    pub const fn empty() -> Self {
        Self { steps: Vec::new() }
    }

    /// Orders the needed steps by their declared dependencies.
    ///
    /// Steps keep their given order unless a dependency forces otherwise.
    /// Dependencies on steps that are not needed are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the dependencies form a cycle.
    pub fn from_steps(needed: impl IntoIterator<Item = S>) -> Result<Self> {
        let mut remaining: Vec<S> = Vec::new();
        for step in needed {
            if !remaining.contains(&step) {
                remaining.push(step);
            }
        }

        let mut steps = Vec::with_capacity(remaining.len());
        while !remaining.is_empty() {
            let ready = remaining.iter().position(|step| {
                step.depends_on()
                    .iter()
                    .all(|dep| !remaining.contains(dep))
            });

            let Some(index) = ready else {
                let cycle = remaining
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" -> ");
                return Err(LifecycleError::internal(format!(
                    "Update steps have circular dependencies: {cycle}"
                )));
            };

            steps.push(remaining.remove(index));
        }

        Ok(Self { steps })
    }

    /// Steps in execution order.
    #[must_use]
    pub fn steps(&self) -> &[S] {
        &self.steps
    }

    /// Returns true if the plan is empty (no changes).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Returns the number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }
}

impl<S: StepKind> StepLedger<S> {
    /// Creates an empty ledger.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            applied: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Records a step whose remote calls all succeeded.
    pub fn record_applied(&mut self, step: S) {
        self.applied.push(step);
    }

    /// Records a step that needed no remote call.
    pub fn record_skipped(&mut self, step: S) {
        self.skipped.push(step);
    }

    /// Steps applied so far, in execution order.
    #[must_use]
    pub fn applied(&self) -> &[S] {
        &self.applied
    }

    /// Steps skipped so far, in execution order.
    #[must_use]
    pub fn skipped(&self) -> &[S] {
        &self.skipped
    }

    /// Names of the applied steps.
    #[must_use]
    pub fn applied_names(&self) -> Vec<String> {
        self.applied.iter().map(ToString::to_string).collect()
    }

    /// Names of the skipped steps.
    #[must_use]
    pub fn skipped_names(&self) -> Vec<String> {
        self.skipped.iter().map(ToString::to_string).collect()
    }
}

impl<S: StepKind> Default for StepLedger<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: StepKind> std::fmt::Display for UpdatePlan<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.steps.is_empty() {
            return write!(f, "No changes required");
        }
        let names = self
            .steps
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" -> ");
        write!(f, "{names}")
    }
}
