//! Resource lifecycle orchestration.
//!
//! This module contains the provider-neutral core:
//! - The driver contract each resource kind implements
//! - Update plans and the applied-step ledger
//! - The retry policy for transient-busy responses
//! - The state transition poller
//! - The orchestrator driving create, read, update and delete

mod driver;
mod orchestrator;
mod plan;
mod poller;
mod retry;

pub use driver::{
    DriverSnapshot, RemoteOperation, RemoteState, ResourceDriver, ResourceHandle, ResourceKind,
    Snapshot,
};
pub use orchestrator::{LifecycleOrchestrator, UpdateReport};
pub use plan::{StepKind, StepLedger, UpdatePlan};
pub use poller::{PollSettings, StatePoller};
pub use retry::RetryPolicy;
