//! QingCloud API integration.
//!
//! This module provides the signed API client and the resource drivers:
//! - Request signing and the HTTP transport
//! - Typed request values and response records
//! - Instance and cache drivers implementing the lifecycle contract

mod cache;
mod client;
#[cfg(test)]
pub(crate) mod fake;
mod instance;
mod signer;
mod tags;
mod types;

pub use cache::{CacheAttributes, CacheDriver, CacheState, CacheStep, MAX_CACHE_SIZE};
#[cfg(test)]
pub(crate) use client::MockRemoteClient;
pub use client::{QingCloudClient, RemoteClient, classify_response};
pub use instance::{
    InstanceAttributes, InstanceDriver, InstanceState, InstanceStep, VALID_CPUS, VALID_MEMORY,
};
pub use signer::RequestSigner;
pub use tags::{AttachTags, DetachTags, ResourceTagPair};
pub use types::{ApiAction, ApiRequest, QingCloudOperation, Transition};

/// ID of the basic (non-VPC) network.
pub const BASIC_VXNET: &str = "vxnet-0";
