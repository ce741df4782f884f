//! Resource driver contract.
//!
//! A driver holds all resource-kind-specific knowledge: which remote states are
//! stable, how a desired/current attribute diff maps to an update plan, and
//! which remote calls each plan step issues. The orchestrator is generic over
//! this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display};

use crate::error::Result;

use super::plan::{StepKind, UpdatePlan};
use super::poller::PollSettings;

/// Kind of a managed resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// Compute instance.
    Instance,
    /// Cache cluster.
    Cache,
}

/// Opaque identifier of a provisioned resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ResourceHandle {
    kind: ResourceKind,
    id: String,
}

/// Remote state of a resource together with its full attribute set, as
/// returned by a single describe call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot<S, A> {
    /// Current remote state.
    pub state: S,
    /// Current attributes.
    pub attributes: A,
}

/// Snapshot type produced by a driver.
pub type DriverSnapshot<D> =
    Snapshot<<D as ResourceDriver>::State, <D as ResourceDriver>::Attributes>;

/// A resource-kind-specific remote state.
pub trait RemoteState: Copy + Eq + Debug + Display + Send + Sync + 'static {
    /// Returns true if the state means the resource no longer exists.
    fn is_gone(self) -> bool;
}

/// A single mutating remote call, built as an immutable request value.
pub trait RemoteOperation: Debug + Send + Sync {
    /// API action name, used for logging and retry reporting.
    fn action(&self) -> &'static str;

    /// Returns true if the call puts the resource into a transitional state
    /// that must be waited out before the next call.
    fn induces_transition(&self) -> bool;
}

/// Contract implemented by each resource kind.
#[async_trait]
pub trait ResourceDriver: Send + Sync {
    /// Remote state enumeration.
    type State: RemoteState;
    /// Typed attribute set used for diffing.
    type Attributes: Clone + PartialEq + Debug + Serialize + Send + Sync;
    /// Creation input.
    type Spec: Debug + Send + Sync;
    /// Update plan step enumeration.
    type Step: StepKind;
    /// Mutating remote call.
    type Operation: RemoteOperation;

    /// Kind of resource this driver manages.
    fn kind(&self) -> ResourceKind;

    /// States from which a mutating call may safely be issued.
    fn stable_states(&self) -> &'static [Self::State];

    /// Polling cadence and deadline for this resource kind.
    fn poll_settings(&self) -> PollSettings;

    /// Checks creation input before any remote call is made.
    ///
    /// # Errors
    ///
    /// Returns a precondition error if the spec cannot be provisioned.
    fn check_preconditions(&self, spec: &Self::Spec) -> Result<()>;

    /// Mutable attributes requested by a creation spec.
    fn desired_attributes(&self, spec: &Self::Spec) -> Self::Attributes;

    /// Builds the ordered list of steps needed to move `current` to `desired`.
    ///
    /// # Errors
    ///
    /// Returns an error if the declared step dependencies are inconsistent.
    fn build_update_plan(
        &self,
        desired: &Self::Attributes,
        current: &Self::Attributes,
    ) -> Result<UpdatePlan<Self::Step>>;

    /// Remote calls still required for `step`, derived from the live snapshot.
    ///
    /// An empty list means the step is already applied.
    fn step_operations(
        &self,
        step: Self::Step,
        resource_id: &str,
        desired: &Self::Attributes,
        live: &Snapshot<Self::State, Self::Attributes>,
    ) -> Vec<Self::Operation>;

    /// Issues the provisioning call and returns the new resource ID.
    async fn provision(&self, spec: &Self::Spec) -> Result<String>;

    /// Describes a resource. Returns `None` if it does not exist.
    async fn describe(
        &self,
        resource_id: &str,
    ) -> Result<Option<Snapshot<Self::State, Self::Attributes>>>;

    /// Issues a single mutating call.
    async fn invoke(&self, operation: &Self::Operation) -> Result<()>;

    /// Issues the terminate/destroy call.
    async fn terminate(&self, resource_id: &str) -> Result<()>;

    /// Returns true once a freshly provisioned resource accepts further
    /// mutations beyond being in a stable state.
    async fn is_ready(&self, _resource_id: &str) -> Result<bool> {
        Ok(true)
    }
}

impl ResourceHandle {
    /// Creates a handle for an existing resource.
    #[must_use]
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    /// Resource kind.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Remote identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Instance => "instance",
            Self::Cache => "cache",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}
