//! Compute instance driver.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use crate::config::InstanceSpec;
use crate::error::{OrchestrationError, RemoteError, Result};
use crate::lifecycle::{
    PollSettings, RemoteState, ResourceDriver, ResourceKind, Snapshot, StepKind, UpdatePlan,
};

use super::client::RemoteClient;
use super::tags::tag_operations;
use super::types::{
    decode, ApiAction, ApplySecurityGroup, AssociateEip, AttachKeyPairs, AttachVolumes,
    DescribeInstances, DescribeInstancesResponse, DetachKeyPairs, DetachVolumes, DissociateEips,
    GetLeaseInfo, GetLeaseInfoResponse, InstanceRecord, JoinVxnet, LeaveVxnet,
    ModifyInstanceAttributes, QingCloudOperation, ResizeInstances, RunInstances,
    RunInstancesResponse, StartInstances, StopInstances, TerminateInstances, Transition,
};

/// Resource type used when tagging instances.
const TAG_RESOURCE_TYPE: &str = "instance";

/// Accepted vCPU counts.
pub const VALID_CPUS: &[u32] = &[1, 2, 4, 8, 16];

/// Accepted memory sizes in MB.
pub const VALID_MEMORY: &[u32] = &[1024, 2048, 4096, 6144, 8192, 12288, 16384, 24576, 32768];

/// Remote state of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceState {
    /// Accepted, not yet running.
    Pending,
    /// Running.
    Running,
    /// Stopped.
    Stopped,
    /// Suspended for billing reasons.
    Suspended,
    /// Terminated, recoverable for a while.
    Terminated,
    /// Permanently removed.
    Ceased,
    /// A transition is in progress.
    Transitioning(Transition),
    /// A status this crate does not know.
    Unknown,
}

const INSTANCE_STABLE: &[InstanceState] = &[
    InstanceState::Running,
    InstanceState::Stopped,
    InstanceState::Suspended,
];

impl InstanceState {
    /// Derives the state from `status` and `transition_status`.
    #[must_use]
    pub fn from_api(status: &str, transition_status: &str) -> Self {
        match status {
            "terminated" => return Self::Terminated,
            "ceased" => return Self::Ceased,
            _ => {}
        }
        if let Some(transition) = Transition::from_api(transition_status) {
            return Self::Transitioning(transition);
        }
        match status {
            "pending" => Self::Pending,
            "running" => Self::Running,
            "stopped" => Self::Stopped,
            "suspended" => Self::Suspended,
            _ => Self::Unknown,
        }
    }
}

impl RemoteState for InstanceState {
    fn is_gone(self) -> bool {
        matches!(self, Self::Terminated | Self::Ceased)
    }
}

impl std::fmt::Display for InstanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::Suspended => write!(f, "suspended"),
            Self::Terminated => write!(f, "terminated"),
            Self::Ceased => write!(f, "ceased"),
            Self::Transitioning(transition) => write!(f, "{transition}"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Attributes of an instance used for diffing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct InstanceAttributes {
    /// Display name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Boot image. Fixed after creation.
    pub image_id: String,
    /// vCPU count.
    pub cpu: u32,
    /// Memory in MB.
    pub memory: u32,
    /// Instance class. Fixed after creation.
    pub instance_class: u32,
    /// Managed network, `vxnet-0` for the basic network.
    pub managed_vxnet_id: String,
    /// Private address on the managed network. Read-only.
    pub private_ip: Option<String>,
    /// Attached login keypairs.
    pub keypair_ids: BTreeSet<String>,
    /// Applied security group. `None` in a desired set keeps whatever is applied.
    pub security_group_id: Option<String>,
    /// Bound public address.
    pub eip_id: Option<String>,
    /// Public IP of the bound address. Read-only.
    pub public_ip: Option<String>,
    /// Attached volumes.
    pub volume_ids: BTreeSet<String>,
    /// Attached tags.
    pub tag_ids: BTreeSet<String>,
    /// Powered off. Read-only; an update restarts a stopped instance, since a
    /// stop that is not followed by a start only happens inside a resize.
    pub stopped: bool,
}

impl From<InstanceRecord> for InstanceAttributes {
    fn from(record: InstanceRecord) -> Self {
        let (managed_vxnet_id, private_ip) = record.managed_vxnet().unzip();
        Self {
            stopped: record.status == "stopped",
            eip_id: record.eip_id(),
            public_ip: record.eip_addr(),
            security_group_id: record.security_group_id(),
            tag_ids: record.tag_ids(),
            managed_vxnet_id: managed_vxnet_id.unwrap_or_default(),
            private_ip: private_ip.flatten(),
            image_id: record.image.map(|i| i.image_id).unwrap_or_default(),
            name: record.instance_name,
            description: record.description,
            cpu: record.vcpus_current,
            memory: record.memory_current,
            instance_class: record.instance_class,
            keypair_ids: record.keypair_ids,
            volume_ids: record.volume_ids,
        }
    }
}

/// Update steps for an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceStep {
    /// Name and description.
    Attributes,
    /// Managed network membership.
    ManagedVxnet,
    /// Security group.
    SecurityGroup,
    /// Public address.
    Eip,
    /// Login keypairs.
    KeyPairs,
    /// Block volumes.
    Volumes,
    /// CPU and memory.
    Resize,
    /// Tags.
    Tags,
}

impl StepKind for InstanceStep {
    fn depends_on(self) -> &'static [Self] {
        match self {
            Self::ManagedVxnet => &[Self::Attributes],
            Self::Resize => &[Self::Volumes],
            _ => &[],
        }
    }
}

impl std::fmt::Display for InstanceStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Attributes => "attributes",
            Self::ManagedVxnet => "managed_vxnet",
            Self::SecurityGroup => "security_group",
            Self::Eip => "eip",
            Self::KeyPairs => "keypairs",
            Self::Volumes => "volumes",
            Self::Resize => "resize",
            Self::Tags => "tags",
        };
        write!(f, "{s}")
    }
}

/// Driver for compute instances.
pub struct InstanceDriver {
    client: Arc<dyn RemoteClient>,
    poll: PollSettings,
}

impl InstanceDriver {
    /// Creates an instance driver.
    #[must_use]
    pub fn new(client: Arc<dyn RemoteClient>, poll: PollSettings) -> Self {
        Self { client, poll }
    }
}

impl std::fmt::Debug for InstanceDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceDriver")
            .field("poll", &self.poll)
            .finish_non_exhaustive()
    }
}

fn sizes_differ(desired: &InstanceAttributes, current: &InstanceAttributes) -> bool {
    desired.cpu != current.cpu || desired.memory != current.memory
}

fn security_group_differs(desired: &InstanceAttributes, current: &InstanceAttributes) -> bool {
    desired.security_group_id.is_some() && desired.security_group_id != current.security_group_id
}

fn sorted(ids: impl IntoIterator<Item = impl ToString>) -> Vec<String> {
    ids.into_iter().map(|id| id.to_string()).collect()
}

#[async_trait]
impl ResourceDriver for InstanceDriver {
    type State = InstanceState;
    type Attributes = InstanceAttributes;
    type Spec = InstanceSpec;
    type Step = InstanceStep;
    type Operation = QingCloudOperation;

    fn kind(&self) -> ResourceKind {
        ResourceKind::Instance
    }

    fn stable_states(&self) -> &'static [InstanceState] {
        INSTANCE_STABLE
    }

    fn poll_settings(&self) -> PollSettings {
        self.poll
    }

    fn check_preconditions(&self, spec: &InstanceSpec) -> Result<()> {
        if spec.keypair_ids.is_empty() {
            return Err(OrchestrationError::precondition(
                "an instance needs at least one login keypair",
            )
            .into());
        }
        if !VALID_CPUS.contains(&spec.cpu) {
            return Err(OrchestrationError::precondition(format!(
                "cpu must be one of {VALID_CPUS:?}, got {}",
                spec.cpu
            ))
            .into());
        }
        if !VALID_MEMORY.contains(&spec.memory) {
            return Err(OrchestrationError::precondition(format!(
                "memory must be one of {VALID_MEMORY:?}, got {}",
                spec.memory
            ))
            .into());
        }
        if spec.instance_class > 1 {
            return Err(OrchestrationError::precondition(format!(
                "instance_class must be 0 or 1, got {}",
                spec.instance_class
            ))
            .into());
        }
        Ok(())
    }

    fn desired_attributes(&self, spec: &InstanceSpec) -> InstanceAttributes {
        InstanceAttributes {
            name: spec.name.clone(),
            description: spec.description.clone(),
            image_id: spec.image_id.clone(),
            cpu: spec.cpu,
            memory: spec.memory,
            instance_class: spec.instance_class,
            managed_vxnet_id: spec.managed_vxnet_id.clone(),
            private_ip: None,
            keypair_ids: spec.keypair_ids.clone(),
            security_group_id: spec.security_group_id.clone(),
            eip_id: spec.eip_id.clone(),
            public_ip: None,
            volume_ids: spec.volume_ids.clone(),
            tag_ids: spec.tag_ids.clone(),
            stopped: false,
        }
    }

    fn build_update_plan(
        &self,
        desired: &InstanceAttributes,
        current: &InstanceAttributes,
    ) -> Result<UpdatePlan<InstanceStep>> {
        let checks = [
            (
                InstanceStep::Attributes,
                desired.name != current.name || desired.description != current.description,
            ),
            (
                InstanceStep::ManagedVxnet,
                desired.managed_vxnet_id != current.managed_vxnet_id,
            ),
            (
                InstanceStep::SecurityGroup,
                security_group_differs(desired, current),
            ),
            (InstanceStep::Eip, desired.eip_id != current.eip_id),
            (InstanceStep::KeyPairs, desired.keypair_ids != current.keypair_ids),
            (InstanceStep::Volumes, desired.volume_ids != current.volume_ids),
            (InstanceStep::Resize, sizes_differ(desired, current) || current.stopped),
            (InstanceStep::Tags, desired.tag_ids != current.tag_ids),
        ];

        UpdatePlan::from_steps(
            checks
                .into_iter()
                .filter_map(|(step, needed)| needed.then_some(step)),
        )
    }

    fn step_operations(
        &self,
        step: InstanceStep,
        resource_id: &str,
        desired: &InstanceAttributes,
        live: &Snapshot<InstanceState, InstanceAttributes>,
    ) -> Vec<QingCloudOperation> {
        let current = &live.attributes;
        let instances = vec![resource_id.to_string()];
        let mut operations = Vec::new();

        match step {
            InstanceStep::Attributes => {
                let instance_name = (desired.name != current.name).then(|| desired.name.clone());
                let description = (desired.description != current.description)
                    .then(|| desired.description.clone());
                if instance_name.is_some() || description.is_some() {
                    operations.push(QingCloudOperation::immediate(&ModifyInstanceAttributes {
                        instance: resource_id.to_string(),
                        instance_name,
                        description,
                    }));
                }
            }
            InstanceStep::ManagedVxnet => {
                if desired.managed_vxnet_id != current.managed_vxnet_id {
                    if !current.managed_vxnet_id.is_empty() {
                        operations.push(QingCloudOperation::transition(&LeaveVxnet {
                            vxnet: current.managed_vxnet_id.clone(),
                            instances: instances.clone(),
                        }));
                    }
                    if !desired.managed_vxnet_id.is_empty() {
                        operations.push(QingCloudOperation::transition(&JoinVxnet {
                            vxnet: desired.managed_vxnet_id.clone(),
                            instances,
                        }));
                    }
                }
            }
            InstanceStep::SecurityGroup => {
                if let Some(group) = &desired.security_group_id {
                    if security_group_differs(desired, current) {
                        operations.push(QingCloudOperation::immediate(&ApplySecurityGroup {
                            security_group: group.clone(),
                            instances,
                        }));
                    }
                }
            }
            InstanceStep::Eip => {
                if desired.eip_id != current.eip_id {
                    if let Some(old) = &current.eip_id {
                        operations.push(QingCloudOperation::transition(&DissociateEips {
                            eips: vec![old.clone()],
                        }));
                    }
                    if let Some(new) = &desired.eip_id {
                        operations.push(QingCloudOperation::transition(&AssociateEip {
                            eip: new.clone(),
                            instance: resource_id.to_string(),
                        }));
                    }
                }
            }
            InstanceStep::KeyPairs => {
                let removed = sorted(current.keypair_ids.difference(&desired.keypair_ids));
                let added = sorted(desired.keypair_ids.difference(&current.keypair_ids));
                if !removed.is_empty() {
                    operations.push(QingCloudOperation::transition(&DetachKeyPairs {
                        keypairs: removed,
                        instances: instances.clone(),
                    }));
                }
                if !added.is_empty() {
                    operations.push(QingCloudOperation::transition(&AttachKeyPairs {
                        keypairs: added,
                        instances,
                    }));
                }
            }
            InstanceStep::Volumes => {
                let removed = sorted(current.volume_ids.difference(&desired.volume_ids));
                let added = sorted(desired.volume_ids.difference(&current.volume_ids));
                if !removed.is_empty() {
                    operations.push(QingCloudOperation::transition(&DetachVolumes {
                        volumes: removed,
                        instance: resource_id.to_string(),
                    }));
                }
                if !added.is_empty() {
                    operations.push(QingCloudOperation::transition(&AttachVolumes {
                        volumes: added,
                        instance: resource_id.to_string(),
                    }));
                }
            }
            InstanceStep::Resize => {
                let stopped = live.state == InstanceState::Stopped;
                if sizes_differ(desired, current) {
                    if !stopped {
                        operations.push(QingCloudOperation::transition(&StopInstances {
                            instances: instances.clone(),
                        }));
                    }
                    operations.push(QingCloudOperation::transition(&ResizeInstances {
                        instances: instances.clone(),
                        cpu: desired.cpu,
                        memory: desired.memory,
                    }));
                    operations.push(QingCloudOperation::transition(&StartInstances { instances }));
                } else if stopped {
                    debug!(resource_id, "Size already applied, restarting instance");
                    operations.push(QingCloudOperation::transition(&StartInstances { instances }));
                }
            }
            InstanceStep::Tags => {
                operations.extend(tag_operations(
                    TAG_RESOURCE_TYPE,
                    resource_id,
                    &desired.tag_ids,
                    &current.tag_ids,
                ));
            }
        }

        operations
    }

    async fn provision(&self, spec: &InstanceSpec) -> Result<String> {
        let login_keypair = spec.keypair_ids.iter().next().cloned().ok_or_else(|| {
            OrchestrationError::precondition("an instance needs at least one login keypair")
        })?;

        let request = RunInstances {
            image_id: spec.image_id.clone(),
            instance_name: spec.name.clone(),
            cpu: spec.cpu,
            memory: spec.memory,
            instance_class: spec.instance_class,
            login_keypair,
            security_group: spec.security_group_id.clone(),
        };

        let body = self.client.call(&request.to_request()).await?;
        let response: RunInstancesResponse = decode(RunInstances::ACTION, body)?;

        response.instances.into_iter().next().ok_or_else(|| {
            RemoteError::invalid_response("RunInstances returned no instance ID").into()
        })
    }

    async fn describe(
        &self,
        resource_id: &str,
    ) -> Result<Option<Snapshot<InstanceState, InstanceAttributes>>> {
        let request = DescribeInstances {
            instances: vec![resource_id.to_string()],
        };
        let body = self.client.call(&request.to_request()).await?;
        let response: DescribeInstancesResponse = decode(DescribeInstances::ACTION, body)?;

        Ok(response
            .instance_set
            .into_iter()
            .find(|record| record.instance_id == resource_id)
            .map(|record| Snapshot {
                state: InstanceState::from_api(&record.status, &record.transition_status),
                attributes: InstanceAttributes::from(record),
            }))
    }

    async fn invoke(&self, operation: &QingCloudOperation) -> Result<()> {
        self.client.call(operation.request()).await.map(|_| ())
    }

    async fn terminate(&self, resource_id: &str) -> Result<()> {
        let request = TerminateInstances {
            instances: vec![resource_id.to_string()],
        };
        self.client.call(&request.to_request()).await.map(|_| ())
    }

    async fn is_ready(&self, resource_id: &str) -> Result<bool> {
        let request = GetLeaseInfo {
            resource: resource_id.to_string(),
        };
        let body = self.client.call(&request.to_request()).await?;
        let response: GetLeaseInfoResponse = decode(GetLeaseInfo::ACTION, body)?;

        let status = response.lease_info.map(|l| l.status).unwrap_or_default();
        debug!(resource_id, lease = %status, "Lease status");
        Ok(status == "active")
    }
}
