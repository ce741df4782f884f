// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![warn(missing_docs)]                // All public items must be documented
#![warn(dead_code)]                   // Unused code is flagged
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![warn(unused_imports)]              // Unused imports are flagged
#![warn(unused_variables)]            // Unused variables are flagged
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// Tests unwrap and panic freely
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

// ============================================================================
// Crate Documentation
// ============================================================================

//! # QingCloud Lifecycle
//!
//! Reliable create, read, update and delete for QingCloud compute instances
//! and cache clusters.
//!
//! ## Overview
//!
//! Remote operations on QingCloud are asynchronous: a call is accepted and the
//! resource then moves through a transitional state before settling. This
//! crate drives a resource through its lifecycle on top of that model:
//!
//! - Every remote call is retried with bounded backoff while the backend
//!   reports it is busy
//! - Every mutating call waits for the resource to reach a stable state first
//! - Updates run as an ordered plan of idempotent steps, so a failed update
//!   can be re-driven and resumes where it stopped
//! - Deletes are idempotent and confirmed
//!
//! ## Modules
//!
//! - [`lifecycle`]: Retry policy, state poller, update plans and the orchestrator
//! - [`qingcloud`]: Signed API client and the instance and cache drivers
//! - [`config`]: Provider configuration and resource manifests
//! - [`cli`]: Command-line interface
//! - [`error`]: Error types
//!
//! ## Example
//!
//! ```yaml
//! kind: instance
//! name: web
//! image_id: centos7x64
//! cpu: 2
//! memory: 2048
//! managed_vxnet_id: vxnet-abc
//! keypair_ids: [kp-1]
//! security_group_id: sg-web
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod qingcloud;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigParser, ManifestValidator, ProviderConfig, ResourceManifest};
pub use error::{LifecycleError, Result};
pub use lifecycle::{
    LifecycleOrchestrator, ResourceDriver, ResourceHandle, ResourceKind, RetryPolicy,
    StatePoller, UpdateReport,
};
pub use qingcloud::{CacheDriver, InstanceDriver, QingCloudClient, RemoteClient};
