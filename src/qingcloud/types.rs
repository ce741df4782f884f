//! QingCloud API types and data structures.
//!
//! Requests are built as immutable value objects and flattened into the
//! query-string parameter map the API expects. Responses are decoded from the
//! JSON body once the client has checked `ret_code`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{RemoteError, Result};
use crate::lifecycle::RemoteOperation;

/// A single API call: action name plus flattened parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    action: &'static str,
    params: BTreeMap<String, String>,
}

impl ApiRequest {
    /// Creates a request with no parameters.
    #[must_use]
    pub fn new(action: &'static str) -> Self {
        Self {
            action,
            params: BTreeMap::new(),
        }
    }

    /// Adds a scalar parameter.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.params.insert(key.to_string(), value.to_string());
        self
    }

    /// Adds a scalar parameter if present and non-empty.
    #[must_use]
    pub fn with_opt(self, key: &str, value: Option<&str>) -> Self {
        match value {
            Some(v) if !v.is_empty() => self.with(key, v),
            _ => self,
        }
    }

    /// Adds a list parameter as `key.1`, `key.2`, ...
    #[must_use]
    pub fn with_list<I, T>(mut self, key: &str, values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: ToString,
    {
        for (index, value) in values.into_iter().enumerate() {
            self.params
                .insert(format!("{key}.{}", index + 1), value.to_string());
        }
        self
    }

    /// API action name.
    #[must_use]
    pub const fn action(&self) -> &'static str {
        self.action
    }

    /// All parameters, sorted by key.
    #[must_use]
    pub const fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    /// Returns a scalar parameter.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Returns the values of a list parameter, in index order.
    #[must_use]
    pub fn list(&self, key: &str) -> Vec<&str> {
        (1..)
            .map_while(|index| self.param(&format!("{key}.{index}")))
            .collect()
    }
}

/// A typed request value that knows its action name and parameters.
pub trait ApiAction {
    /// API action name.
    const ACTION: &'static str;

    /// Flattens the request into its parameter map.
    fn to_request(&self) -> ApiRequest;
}

/// A mutating call issued by a driver during an update or delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QingCloudOperation {
    request: ApiRequest,
    induces_transition: bool,
}

impl QingCloudOperation {
    /// A call after which the resource passes through a transitional state.
    #[must_use]
    pub fn transition(action: &impl ApiAction) -> Self {
        Self {
            request: action.to_request(),
            induces_transition: true,
        }
    }

    /// A call that takes effect without a state transition.
    #[must_use]
    pub fn immediate(action: &impl ApiAction) -> Self {
        Self {
            request: action.to_request(),
            induces_transition: false,
        }
    }

    /// The underlying request.
    #[must_use]
    pub const fn request(&self) -> &ApiRequest {
        &self.request
    }
}

impl RemoteOperation for QingCloudOperation {
    fn action(&self) -> &'static str {
        self.request.action()
    }

    fn induces_transition(&self) -> bool {
        self.induces_transition
    }
}

/// Transitional status reported alongside a resource's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    /// Being created.
    Creating,
    /// Being started.
    Starting,
    /// Being stopped.
    Stopping,
    /// Being restarted.
    Restarting,
    /// Being suspended.
    Suspending,
    /// Being resumed.
    Resuming,
    /// Being terminated.
    Terminating,
    /// Being deleted.
    Deleting,
    /// Being recovered.
    Recovering,
    /// Being reset.
    Resetting,
    /// Being resized.
    Resizing,
    /// Configuration change in progress.
    Updating,
    /// A transition this crate does not know by name.
    Other,
}

impl Transition {
    /// Parses a `transition_status` value. Empty means no transition.
    #[must_use]
    pub fn from_api(value: &str) -> Option<Self> {
        let transition = match value {
            "" => return None,
            "creating" => Self::Creating,
            "starting" => Self::Starting,
            "stopping" => Self::Stopping,
            "restarting" => Self::Restarting,
            "suspending" => Self::Suspending,
            "resuming" => Self::Resuming,
            "terminating" => Self::Terminating,
            "deleting" => Self::Deleting,
            "recovering" => Self::Recovering,
            "resetting" => Self::Resetting,
            "resizing" => Self::Resizing,
            "updating" => Self::Updating,
            _ => Self::Other,
        };
        Some(transition)
    }
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Creating => "creating",
            Self::Starting => "starting",
            Self::Stopping => "stopping",
            Self::Restarting => "restarting",
            Self::Suspending => "suspending",
            Self::Resuming => "resuming",
            Self::Terminating => "terminating",
            Self::Deleting => "deleting",
            Self::Recovering => "recovering",
            Self::Resetting => "resetting",
            Self::Resizing => "resizing",
            Self::Updating => "updating",
            Self::Other => "transitioning",
        };
        write!(f, "{s}")
    }
}

/// Decodes a successful response body.
///
/// # Errors
///
/// Returns an invalid-response error if the body does not match `T`.
pub fn decode<T: DeserializeOwned>(action: &str, body: serde_json::Value) -> Result<T> {
    serde_json::from_value(body).map_err(|e| {
        RemoteError::invalid_response(format!("Unexpected {action} response: {e}")).into()
    })
}

/// Treats an explicit `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Maps an empty string to `None`.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

// =============================================================================
// Instance requests
// =============================================================================

/// Launches a single instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunInstances {
    /// Image to boot from.
    pub image_id: String,
    /// Display name.
    pub instance_name: String,
    /// vCPU count.
    pub cpu: u32,
    /// Memory in MB.
    pub memory: u32,
    /// 0 for standard, 1 for high performance.
    pub instance_class: u32,
    /// Keypair injected at boot.
    pub login_keypair: String,
    /// Security group applied at boot.
    pub security_group: Option<String>,
}

impl ApiAction for RunInstances {
    const ACTION: &'static str = "RunInstances";

    fn to_request(&self) -> ApiRequest {
        ApiRequest::new(Self::ACTION)
            .with("image_id", &self.image_id)
            .with_opt("instance_name", Some(self.instance_name.as_str()))
            .with("cpu", self.cpu)
            .with("memory", self.memory)
            .with("instance_class", self.instance_class)
            .with("count", 1)
            .with("login_mode", "keypair")
            .with("login_keypair", &self.login_keypair)
            .with_opt("security_group", self.security_group.as_deref())
    }
}

/// Describes instances by ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescribeInstances {
    /// Instances to describe.
    pub instances: Vec<String>,
}

impl ApiAction for DescribeInstances {
    const ACTION: &'static str = "DescribeInstances";

    fn to_request(&self) -> ApiRequest {
        ApiRequest::new(Self::ACTION)
            .with_list("instances", &self.instances)
            .with("verbose", 1)
    }
}

/// Renames or re-describes an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyInstanceAttributes {
    /// Target instance.
    pub instance: String,
    /// New name, if changed.
    pub instance_name: Option<String>,
    /// New description, if changed.
    pub description: Option<String>,
}

impl ApiAction for ModifyInstanceAttributes {
    const ACTION: &'static str = "ModifyInstanceAttributes";

    fn to_request(&self) -> ApiRequest {
        let request = ApiRequest::new(Self::ACTION).with("instance", &self.instance);
        let request = match &self.instance_name {
            Some(name) => request.with("instance_name", name),
            None => request,
        };
        match &self.description {
            Some(description) => request.with("description", description),
            None => request,
        }
    }
}

/// Removes instances from a network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaveVxnet {
    /// Network to leave.
    pub vxnet: String,
    /// Instances leaving it.
    pub instances: Vec<String>,
}

impl ApiAction for LeaveVxnet {
    const ACTION: &'static str = "LeaveVxnet";

    fn to_request(&self) -> ApiRequest {
        ApiRequest::new(Self::ACTION)
            .with("vxnet", &self.vxnet)
            .with_list("instances", &self.instances)
    }
}

/// Attaches instances to a network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinVxnet {
    /// Network to join.
    pub vxnet: String,
    /// Instances joining it.
    pub instances: Vec<String>,
}

impl ApiAction for JoinVxnet {
    const ACTION: &'static str = "JoinVxnet";

    fn to_request(&self) -> ApiRequest {
        ApiRequest::new(Self::ACTION)
            .with("vxnet", &self.vxnet)
            .with_list("instances", &self.instances)
    }
}

/// Applies a security group to instances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplySecurityGroup {
    /// Security group ID.
    pub security_group: String,
    /// Target instances.
    pub instances: Vec<String>,
}

impl ApiAction for ApplySecurityGroup {
    const ACTION: &'static str = "ApplySecurityGroup";

    fn to_request(&self) -> ApiRequest {
        ApiRequest::new(Self::ACTION)
            .with("security_group", &self.security_group)
            .with_list("instances", &self.instances)
    }
}

/// Releases public addresses from whatever they are bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DissociateEips {
    /// Addresses to release.
    pub eips: Vec<String>,
}

impl ApiAction for DissociateEips {
    const ACTION: &'static str = "DissociateEips";

    fn to_request(&self) -> ApiRequest {
        ApiRequest::new(Self::ACTION).with_list("eips", &self.eips)
    }
}

/// Binds a public address to an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociateEip {
    /// Address to bind.
    pub eip: String,
    /// Target instance.
    pub instance: String,
}

impl ApiAction for AssociateEip {
    const ACTION: &'static str = "AssociateEip";

    fn to_request(&self) -> ApiRequest {
        ApiRequest::new(Self::ACTION)
            .with("eip", &self.eip)
            .with("instance", &self.instance)
    }
}

/// Attaches login keypairs to instances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachKeyPairs {
    /// Keypairs to attach.
    pub keypairs: Vec<String>,
    /// Target instances.
    pub instances: Vec<String>,
}

impl ApiAction for AttachKeyPairs {
    const ACTION: &'static str = "AttachKeyPairs";

    fn to_request(&self) -> ApiRequest {
        ApiRequest::new(Self::ACTION)
            .with_list("keypairs", &self.keypairs)
            .with_list("instances", &self.instances)
    }
}

/// Detaches login keypairs from instances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachKeyPairs {
    /// Keypairs to detach.
    pub keypairs: Vec<String>,
    /// Target instances.
    pub instances: Vec<String>,
}

impl ApiAction for DetachKeyPairs {
    const ACTION: &'static str = "DetachKeyPairs";

    fn to_request(&self) -> ApiRequest {
        ApiRequest::new(Self::ACTION)
            .with_list("keypairs", &self.keypairs)
            .with_list("instances", &self.instances)
    }
}

/// Attaches block volumes to an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachVolumes {
    /// Volumes to attach.
    pub volumes: Vec<String>,
    /// Target instance.
    pub instance: String,
}

impl ApiAction for AttachVolumes {
    const ACTION: &'static str = "AttachVolumes";

    fn to_request(&self) -> ApiRequest {
        ApiRequest::new(Self::ACTION)
            .with_list("volumes", &self.volumes)
            .with("instance", &self.instance)
    }
}

/// Detaches block volumes from an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachVolumes {
    /// Volumes to detach.
    pub volumes: Vec<String>,
    /// Target instance.
    pub instance: String,
}

impl ApiAction for DetachVolumes {
    const ACTION: &'static str = "DetachVolumes";

    fn to_request(&self) -> ApiRequest {
        ApiRequest::new(Self::ACTION)
            .with_list("volumes", &self.volumes)
            .with("instance", &self.instance)
    }
}

/// Stops instances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopInstances {
    /// Instances to stop.
    pub instances: Vec<String>,
}

impl ApiAction for StopInstances {
    const ACTION: &'static str = "StopInstances";

    fn to_request(&self) -> ApiRequest {
        ApiRequest::new(Self::ACTION).with_list("instances", &self.instances)
    }
}

/// Starts instances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartInstances {
    /// Instances to start.
    pub instances: Vec<String>,
}

impl ApiAction for StartInstances {
    const ACTION: &'static str = "StartInstances";

    fn to_request(&self) -> ApiRequest {
        ApiRequest::new(Self::ACTION).with_list("instances", &self.instances)
    }
}

/// Changes the CPU and memory of stopped instances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResizeInstances {
    /// Instances to resize.
    pub instances: Vec<String>,
    /// New vCPU count.
    pub cpu: u32,
    /// New memory in MB.
    pub memory: u32,
}

impl ApiAction for ResizeInstances {
    const ACTION: &'static str = "ResizeInstances";

    fn to_request(&self) -> ApiRequest {
        ApiRequest::new(Self::ACTION)
            .with_list("instances", &self.instances)
            .with("cpu", self.cpu)
            .with("memory", self.memory)
    }
}

/// Terminates instances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminateInstances {
    /// Instances to terminate.
    pub instances: Vec<String>,
}

impl ApiAction for TerminateInstances {
    const ACTION: &'static str = "TerminateInstances";

    fn to_request(&self) -> ApiRequest {
        ApiRequest::new(Self::ACTION).with_list("instances", &self.instances)
    }
}

/// Reads the billing lease of a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetLeaseInfo {
    /// Resource ID.
    pub resource: String,
}

impl ApiAction for GetLeaseInfo {
    const ACTION: &'static str = "GetLeaseInfo";

    fn to_request(&self) -> ApiRequest {
        ApiRequest::new(Self::ACTION).with("resource", &self.resource)
    }
}

// =============================================================================
// Cache requests
// =============================================================================

/// Creates a cache cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateCache {
    /// Network the cluster lives in.
    pub vxnet: String,
    /// Node size in GB.
    pub cache_size: u32,
    /// Engine type, e.g. `redis3.0.5`.
    pub cache_type: String,
    /// Number of nodes.
    pub node_count: u32,
    /// 0 for standard, 1 for high performance.
    pub cache_class: u32,
    /// Display name.
    pub cache_name: String,
    /// Parameter group.
    pub cache_parameter_group: Option<String>,
}

impl ApiAction for CreateCache {
    const ACTION: &'static str = "CreateCache";

    fn to_request(&self) -> ApiRequest {
        ApiRequest::new(Self::ACTION)
            .with("vxnet", &self.vxnet)
            .with("cache_size", self.cache_size)
            .with("cache_type", &self.cache_type)
            .with("node_count", self.node_count)
            .with("cache_class", self.cache_class)
            .with_opt("cache_name", Some(self.cache_name.as_str()))
            .with_opt("cache_parameter_group", self.cache_parameter_group.as_deref())
    }
}

/// Describes caches by ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescribeCaches {
    /// Caches to describe.
    pub caches: Vec<String>,
}

impl ApiAction for DescribeCaches {
    const ACTION: &'static str = "DescribeCaches";

    fn to_request(&self) -> ApiRequest {
        ApiRequest::new(Self::ACTION)
            .with_list("caches", &self.caches)
            .with("verbose", 1)
    }
}

/// Changes a cache's name, description or backup window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyCacheAttributes {
    /// Target cache.
    pub cache: String,
    /// New name, if changed.
    pub cache_name: Option<String>,
    /// New description, if changed.
    pub description: Option<String>,
    /// New backup hour, if changed. -1 disables backups.
    pub auto_backup_time: Option<i32>,
}

impl ApiAction for ModifyCacheAttributes {
    const ACTION: &'static str = "ModifyCacheAttributes";

    fn to_request(&self) -> ApiRequest {
        let request = ApiRequest::new(Self::ACTION).with("cache", &self.cache);
        let request = match &self.cache_name {
            Some(name) => request.with("cache_name", name),
            None => request,
        };
        let request = match &self.description {
            Some(description) => request.with("description", description),
            None => request,
        };
        match self.auto_backup_time {
            Some(hour) => request.with("auto_backup_time", hour),
            None => request,
        }
    }
}

/// Stops caches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopCaches {
    /// Caches to stop.
    pub caches: Vec<String>,
}

impl ApiAction for StopCaches {
    const ACTION: &'static str = "StopCaches";

    fn to_request(&self) -> ApiRequest {
        ApiRequest::new(Self::ACTION).with_list("caches", &self.caches)
    }
}

/// Starts caches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartCaches {
    /// Caches to start.
    pub caches: Vec<String>,
}

impl ApiAction for StartCaches {
    const ACTION: &'static str = "StartCaches";

    fn to_request(&self) -> ApiRequest {
        ApiRequest::new(Self::ACTION).with_list("caches", &self.caches)
    }
}

/// Changes the node size of stopped caches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResizeCaches {
    /// Caches to resize.
    pub caches: Vec<String>,
    /// New node size in GB.
    pub cache_size: u32,
}

impl ApiAction for ResizeCaches {
    const ACTION: &'static str = "ResizeCaches";

    fn to_request(&self) -> ApiRequest {
        ApiRequest::new(Self::ACTION)
            .with_list("caches", &self.caches)
            .with("cache_size", self.cache_size)
    }
}

/// Deletes caches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteCaches {
    /// Caches to delete.
    pub caches: Vec<String>,
}

impl ApiAction for DeleteCaches {
    const ACTION: &'static str = "DeleteCaches";

    fn to_request(&self) -> ApiRequest {
        ApiRequest::new(Self::ACTION).with_list("caches", &self.caches)
    }
}

// =============================================================================
// Responses
// =============================================================================

/// `RunInstances` response.
#[derive(Debug, Clone, Deserialize)]
pub struct RunInstancesResponse {
    /// IDs of the launched instances.
    #[serde(default, deserialize_with = "null_as_default")]
    pub instances: Vec<String>,
}

/// `DescribeInstances` response.
#[derive(Debug, Clone, Deserialize)]
pub struct DescribeInstancesResponse {
    /// Matching instances.
    #[serde(default, deserialize_with = "null_as_default")]
    pub instance_set: Vec<InstanceRecord>,
}

/// An instance as reported by `DescribeInstances`.
#[derive(Debug, Clone, Deserialize)]
pub struct InstanceRecord {
    /// Instance ID.
    pub instance_id: String,
    /// Display name.
    #[serde(default, deserialize_with = "null_as_default")]
    pub instance_name: String,
    /// Description.
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    /// Status.
    pub status: String,
    /// Transition in progress, empty if none.
    #[serde(default, deserialize_with = "null_as_default")]
    pub transition_status: String,
    /// Current vCPU count.
    #[serde(default)]
    pub vcpus_current: u32,
    /// Current memory in MB.
    #[serde(default)]
    pub memory_current: u32,
    /// Instance class.
    #[serde(default)]
    pub instance_class: u32,
    /// Boot image.
    #[serde(default)]
    pub image: Option<ImageRef>,
    /// Networks the instance is attached to.
    #[serde(default, deserialize_with = "null_as_default")]
    pub vxnets: Vec<VxnetRef>,
    /// Bound public address.
    #[serde(default)]
    pub eip: Option<EipRef>,
    /// Applied security group.
    #[serde(default)]
    pub security_group: Option<SecurityGroupRef>,
    /// Attached keypairs.
    #[serde(default, deserialize_with = "null_as_default")]
    pub keypair_ids: BTreeSet<String>,
    /// Attached volumes.
    #[serde(default, deserialize_with = "null_as_default")]
    pub volume_ids: BTreeSet<String>,
    /// Attached tags.
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<TagRef>,
}

/// Image reference.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageRef {
    /// Image ID.
    #[serde(default, deserialize_with = "null_as_default")]
    pub image_id: String,
}

/// Network attachment.
#[derive(Debug, Clone, Deserialize)]
pub struct VxnetRef {
    /// Network ID.
    pub vxnet_id: String,
    /// 0 self-managed, 1 managed, 2 basic.
    #[serde(default)]
    pub vxnet_type: Option<u32>,
    /// Private address on this network.
    #[serde(default)]
    pub private_ip: Option<String>,
}

/// Public address binding.
#[derive(Debug, Clone, Deserialize)]
pub struct EipRef {
    /// Address ID.
    #[serde(default)]
    pub eip_id: Option<String>,
    /// Public IP.
    #[serde(default)]
    pub eip_addr: Option<String>,
}

/// Security group reference.
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityGroupRef {
    /// Security group ID.
    #[serde(default)]
    pub security_group_id: Option<String>,
}

/// Tag reference.
#[derive(Debug, Clone, Deserialize)]
pub struct TagRef {
    /// Tag ID.
    pub tag_id: String,
}

impl InstanceRecord {
    /// ID of the bound public address, if any.
    #[must_use]
    pub fn eip_id(&self) -> Option<String> {
        non_empty(self.eip.as_ref().and_then(|e| e.eip_id.clone()))
    }

    /// Bound public IP, if any.
    #[must_use]
    pub fn eip_addr(&self) -> Option<String> {
        non_empty(self.eip.as_ref().and_then(|e| e.eip_addr.clone()))
    }

    /// ID of the applied security group, if any.
    #[must_use]
    pub fn security_group_id(&self) -> Option<String> {
        non_empty(
            self.security_group
                .as_ref()
                .and_then(|g| g.security_group_id.clone()),
        )
    }

    /// The managed network and its private address. Self-managed networks
    /// are ignored; any non-managed network reports as the basic `vxnet-0`.
    #[must_use]
    pub fn managed_vxnet(&self) -> Option<(String, Option<String>)> {
        self.vxnets
            .iter()
            .find(|v| v.vxnet_type.unwrap_or(1) != 0)
            .map(|v| {
                let id = if v.vxnet_type.unwrap_or(1) == 1 {
                    v.vxnet_id.clone()
                } else {
                    String::from(super::BASIC_VXNET)
                };
                (id, non_empty(v.private_ip.clone()))
            })
    }

    /// Attached tag IDs.
    #[must_use]
    pub fn tag_ids(&self) -> BTreeSet<String> {
        self.tags.iter().map(|t| t.tag_id.clone()).collect()
    }
}

/// `GetLeaseInfo` response.
#[derive(Debug, Clone, Deserialize)]
pub struct GetLeaseInfoResponse {
    /// Lease details, absent for resources without a lease yet.
    #[serde(default)]
    pub lease_info: Option<LeaseInfo>,
}

/// Billing lease details.
#[derive(Debug, Clone, Deserialize)]
pub struct LeaseInfo {
    /// Lease status, `active` once the resource is billable.
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
}

/// `CreateCache` response.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCacheResponse {
    /// ID of the new cache.
    pub cache_id: String,
}

/// `DescribeCaches` response.
#[derive(Debug, Clone, Deserialize)]
pub struct DescribeCachesResponse {
    /// Matching caches.
    #[serde(default, deserialize_with = "null_as_default")]
    pub cache_set: Vec<CacheRecord>,
}

/// A cache as reported by `DescribeCaches`.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheRecord {
    /// Cache ID.
    pub cache_id: String,
    /// Display name.
    #[serde(default, deserialize_with = "null_as_default")]
    pub cache_name: String,
    /// Description.
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    /// Status.
    pub status: String,
    /// Transition in progress, empty if none.
    #[serde(default, deserialize_with = "null_as_default")]
    pub transition_status: String,
    /// Node size in GB.
    #[serde(default)]
    pub cache_size: u32,
    /// Engine type.
    #[serde(default, deserialize_with = "null_as_default")]
    pub cache_type: String,
    /// Number of nodes.
    #[serde(default)]
    pub node_count: u32,
    /// Backup hour, -1 when disabled.
    #[serde(default)]
    pub auto_backup_time: Option<i32>,
    /// Network the cluster lives in.
    #[serde(default)]
    pub vxnet: Option<CacheVxnetRef>,
    /// Attached tags.
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<TagRef>,
}

/// Network reference on a cache.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheVxnetRef {
    /// Network ID.
    #[serde(default, deserialize_with = "null_as_default")]
    pub vxnet_id: String,
}

impl CacheRecord {
    /// Attached tag IDs.
    #[must_use]
    pub fn tag_ids(&self) -> BTreeSet<String> {
        self.tags.iter().map(|t| t.tag_id.clone()).collect()
    }
}
