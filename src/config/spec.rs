//! Configuration and manifest data structures.
//!
//! This module defines the provider configuration (compatible with the
//! QingCloud SDK `config.yaml`), the lifecycle tuning section, and the
//! resource manifests describing instances and caches.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use validator::Validate;

use crate::error::ConfigError;
use crate::lifecycle::{PollSettings, ResourceKind};

/// Provider configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Access key ID.
    #[serde(default, rename = "qy_access_key_id")]
    pub access_key_id: String,

    /// Secret access key.
    #[serde(default, rename = "qy_secret_access_key", skip_serializing)]
    pub secret_access_key: String,

    /// Zone every request targets.
    #[serde(default = "default_zone")]
    pub zone: String,

    /// API host.
    #[serde(default = "default_host")]
    pub host: String,

    /// API port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// `https` or `http`.
    #[serde(default = "default_protocol")]
    pub protocol: String,

    /// API path.
    #[serde(default = "default_uri")]
    pub uri: String,

    /// HTTP timeout in seconds.
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,

    /// Retry and polling tuning.
    #[serde(default)]
    pub lifecycle: LifecycleSettings,
}

fn default_zone() -> String {
    String::from("pek3a")
}

fn default_host() -> String {
    String::from("api.qingcloud.com")
}

const fn default_port() -> u16 {
    443
}

fn default_protocol() -> String {
    String::from("https")
}

fn default_uri() -> String {
    String::from("/iaas")
}

const fn default_connection_timeout() -> u64 {
    30
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            access_key_id: String::new(),
            secret_access_key: String::new(),
            zone: default_zone(),
            host: default_host(),
            port: default_port(),
            protocol: default_protocol(),
            uri: default_uri(),
            connection_timeout: default_connection_timeout(),
            lifecycle: LifecycleSettings::default(),
        }
    }
}

/// Retry and polling tuning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleSettings {
    /// Retry policy for busy responses.
    #[serde(default)]
    pub retry: RetrySettings,

    /// Polling for instances. Unset fields use the instance defaults.
    #[serde(default)]
    pub instance: PollConfig,

    /// Polling for caches. Unset fields use the cache defaults.
    #[serde(default)]
    pub cache: PollConfig,
}

impl LifecycleSettings {
    /// Polling settings for a resource kind.
    #[must_use]
    pub const fn poll_for(&self, kind: ResourceKind) -> PollSettings {
        match kind {
            ResourceKind::Instance => self.instance.settings(INSTANCE_POLL),
            ResourceKind::Cache => self.cache.settings(CACHE_POLL),
        }
    }

    /// Rejects polling windows the poller cannot work with.
    ///
    /// # Errors
    ///
    /// Returns a validation error naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sections = [(ResourceKind::Instance, "instance"), (ResourceKind::Cache, "cache")];
        for (kind, section) in sections {
            let settings = self.poll_for(kind);
            if settings.interval.is_zero() {
                return Err(ConfigError::validation(
                    "poll interval must be at least 1 second",
                    format!("lifecycle.{section}.interval_secs"),
                ));
            }
            if settings.timeout.is_zero() {
                return Err(ConfigError::validation(
                    "poll timeout must be at least 1 second",
                    format!("lifecycle.{section}.timeout_secs"),
                ));
            }
        }
        Ok(())
    }
}

/// Retry policy settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Attempts including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry in seconds.
    #[serde(default = "default_initial_delay")]
    pub initial_delay_secs: u64,

    /// Backoff cap in seconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: u64,
}

const fn default_max_attempts() -> u32 {
    5
}

const fn default_initial_delay() -> u64 {
    1
}

const fn default_max_delay() -> u64 {
    16
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_secs: default_initial_delay(),
            max_delay_secs: default_max_delay(),
        }
    }
}

/// Polling settings for one resource kind. Every field is optional; missing
/// ones fall back to the defaults of the kind the section belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollConfig {
    /// Seconds between two describe calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_secs: Option<u64>,
    /// Seconds before a wait times out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Readiness checks after provisioning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness_polls: Option<u32>,
}

/// Instance polling: 5s interval, 10 minute window, lease gate of 5 checks.
const INSTANCE_POLL: PollSettings = PollSettings {
    interval: Duration::from_secs(5),
    timeout: Duration::from_secs(600),
    readiness_polls: 5,
};

/// Cache polling: 10s interval, 20 minute window, no lease gate.
const CACHE_POLL: PollSettings = PollSettings {
    interval: Duration::from_secs(10),
    timeout: Duration::from_secs(1200),
    readiness_polls: 0,
};

impl PollConfig {
    /// Converts to the poller's settings, taking unset fields from `defaults`.
    #[must_use]
    pub const fn settings(&self, defaults: PollSettings) -> PollSettings {
        PollSettings {
            interval: match self.interval_secs {
                Some(secs) => Duration::from_secs(secs),
                None => defaults.interval,
            },
            timeout: match self.timeout_secs {
                Some(secs) => Duration::from_secs(secs),
                None => defaults.timeout,
            },
            readiness_polls: match self.readiness_polls {
                Some(polls) => polls,
                None => defaults.readiness_polls,
            },
        }
    }
}

/// A resource manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ResourceManifest {
    /// Compute instance.
    Instance(InstanceSpec),
    /// Cache cluster.
    Cache(CacheSpec),
}

impl ResourceManifest {
    /// Kind of resource described.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        match self {
            Self::Instance(_) => ResourceKind::Instance,
            Self::Cache(_) => ResourceKind::Cache,
        }
    }

    /// Display name of the resource.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Instance(spec) => &spec.name,
            Self::Cache(spec) => &spec.name,
        }
    }
}

/// Creation input for a compute instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct InstanceSpec {
    /// Display name.
    #[serde(default)]
    #[validate(length(max = 64, message = "name must be at most 64 characters"))]
    pub name: String,

    /// Description.
    #[serde(default)]
    pub description: String,

    /// Image to boot from.
    #[validate(length(min = 1, message = "image_id is required"))]
    pub image_id: String,

    /// vCPU count.
    #[serde(default = "default_cpu")]
    pub cpu: u32,

    /// Memory in MB.
    #[serde(default = "default_memory")]
    pub memory: u32,

    /// 0 for standard, 1 for high performance.
    #[serde(default)]
    #[validate(range(max = 1, message = "instance_class must be 0 or 1"))]
    pub instance_class: u32,

    /// Managed network, `vxnet-0` for the basic network.
    #[serde(default = "default_vxnet")]
    #[validate(length(min = 1, message = "managed_vxnet_id must not be empty"))]
    pub managed_vxnet_id: String,

    /// Login keypairs. The first one is injected at boot.
    #[serde(default)]
    pub keypair_ids: BTreeSet<String>,

    /// Security group. Left unchanged when unset.
    #[serde(default)]
    pub security_group_id: Option<String>,

    /// Public address.
    #[serde(default)]
    pub eip_id: Option<String>,

    /// Block volumes.
    #[serde(default)]
    pub volume_ids: BTreeSet<String>,

    /// Tags.
    #[serde(default)]
    pub tag_ids: BTreeSet<String>,
}

const fn default_cpu() -> u32 {
    1
}

const fn default_memory() -> u32 {
    1024
}

fn default_vxnet() -> String {
    String::from(crate::qingcloud::BASIC_VXNET)
}

/// Creation input for a cache cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct CacheSpec {
    /// Display name.
    #[serde(default)]
    #[validate(length(max = 64, message = "name must be at most 64 characters"))]
    pub name: String,

    /// Description.
    #[serde(default)]
    pub description: String,

    /// Network the cluster lives in.
    #[validate(length(min = 1, message = "vxnet_id is required"))]
    pub vxnet_id: String,

    /// Node size in GB.
    #[serde(default = "default_cache_size")]
    #[validate(range(min = 1, max = 32, message = "cache_size must be between 1 and 32"))]
    pub cache_size: u32,

    /// Engine type.
    #[serde(default = "default_cache_type")]
    #[validate(length(min = 1, message = "cache_type must not be empty"))]
    pub cache_type: String,

    /// Number of nodes.
    #[serde(default = "default_node_count")]
    #[validate(range(min = 1, message = "node_count must be at least 1"))]
    pub node_count: u32,

    /// 0 for standard, 1 for high performance.
    #[serde(default)]
    #[validate(range(max = 1, message = "cache_class must be 0 or 1"))]
    pub cache_class: u32,

    /// Parameter group.
    #[serde(default)]
    pub cache_parameter_group: Option<String>,

    /// Backup hour 0-23, -1 to disable. Left unchanged when unset.
    #[serde(default)]
    pub auto_backup_time: Option<i32>,

    /// Tags.
    #[serde(default)]
    pub tag_ids: BTreeSet<String>,
}

const fn default_cache_size() -> u32 {
    1
}

fn default_cache_type() -> String {
    String::from("redis3.0.5")
}

const fn default_node_count() -> u32 {
    1
}
