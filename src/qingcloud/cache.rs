//! Cache cluster driver.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::config::CacheSpec;
use crate::error::{OrchestrationError, Result};
use crate::lifecycle::{
    PollSettings, RemoteState, ResourceDriver, ResourceKind, Snapshot, StepKind, UpdatePlan,
};

use super::client::RemoteClient;
use super::tags::tag_operations;
use super::types::{
    decode, ApiAction, CacheRecord, CreateCache, CreateCacheResponse, DeleteCaches,
    DescribeCaches, DescribeCachesResponse, ModifyCacheAttributes, QingCloudOperation,
    ResizeCaches, StartCaches, StopCaches, Transition,
};

const TAG_RESOURCE_TYPE: &str = "cache";

/// Largest node size in GB.
pub const MAX_CACHE_SIZE: u32 = 32;

/// Remote state of a cache cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheState {
    /// Accepted, not yet serving.
    Pending,
    /// Serving.
    Active,
    /// Stopped.
    Stopped,
    /// Suspended for billing reasons.
    Suspended,
    /// Deleted, recoverable for a while.
    Deleted,
    /// Permanently removed.
    Ceased,
    /// A transition is in progress.
    Transitioning(Transition),
    /// A status this crate does not know.
    Unknown,
}

const CACHE_STABLE: &[CacheState] = &[CacheState::Active, CacheState::Stopped, CacheState::Suspended];

impl CacheState {
    /// Derives the state from `status` and `transition_status`.
    #[must_use]
    pub fn from_api(status: &str, transition_status: &str) -> Self {
        match status {
            "deleted" => return Self::Deleted,
            "ceased" => return Self::Ceased,
            _ => {}
        }
        if let Some(transition) = Transition::from_api(transition_status) {
            return Self::Transitioning(transition);
        }
        match status {
            "pending" => Self::Pending,
            "active" => Self::Active,
            "stopped" => Self::Stopped,
            "suspended" => Self::Suspended,
            _ => Self::Unknown,
        }
    }
}

impl RemoteState for CacheState {
    fn is_gone(self) -> bool {
        matches!(self, Self::Deleted | Self::Ceased)
    }
}

impl std::fmt::Display for CacheState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Active => write!(f, "active"),
            Self::Stopped => write!(f, "stopped"),
            Self::Suspended => write!(f, "suspended"),
            Self::Deleted => write!(f, "deleted"),
            Self::Ceased => write!(f, "ceased"),
            Self::Transitioning(transition) => write!(f, "{transition}"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Attributes of a cache cluster used for diffing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct CacheAttributes {
    /// Display name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Network. Fixed after creation.
    pub vxnet_id: String,
    /// Node size in GB.
    pub cache_size: u32,
    /// Engine type. Fixed after creation.
    pub cache_type: String,
    /// Number of nodes. Fixed after creation.
    pub node_count: u32,
    /// Backup hour, -1 when disabled. `None` in a desired set keeps the current value.
    pub auto_backup_time: Option<i32>,
    /// Attached tags.
    pub tag_ids: BTreeSet<String>,
    /// Powered off. Read-only; an update starts a stopped cache again.
    pub stopped: bool,
}

impl From<CacheRecord> for CacheAttributes {
    fn from(record: CacheRecord) -> Self {
        Self {
            stopped: record.status == "stopped",
            tag_ids: record.tag_ids(),
            vxnet_id: record.vxnet.map(|v| v.vxnet_id).unwrap_or_default(),
            name: record.cache_name,
            description: record.description,
            cache_size: record.cache_size,
            cache_type: record.cache_type,
            node_count: record.node_count,
            auto_backup_time: record.auto_backup_time,
        }
    }
}

/// Update steps for a cache cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheStep {
    /// Name, description and backup window.
    Attributes,
    /// Node size.
    Resize,
    /// Tags.
    Tags,
}

impl StepKind for CacheStep {
    fn depends_on(self) -> &'static [Self] {
        match self {
            Self::Resize => &[Self::Attributes],
            _ => &[],
        }
    }
}

impl std::fmt::Display for CacheStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Attributes => "attributes",
            Self::Resize => "resize",
            Self::Tags => "tags",
        };
        write!(f, "{s}")
    }
}

/// Driver for cache clusters.
pub struct CacheDriver {
    client: Arc<dyn RemoteClient>,
    poll: PollSettings,
}

impl CacheDriver {
    /// Creates a cache driver.
    #[must_use]
    pub fn new(client: Arc<dyn RemoteClient>, poll: PollSettings) -> Self {
        Self { client, poll }
    }
}

impl std::fmt::Debug for CacheDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheDriver")
            .field("poll", &self.poll)
            .finish_non_exhaustive()
    }
}

fn backup_differs(desired: &CacheAttributes, current: &CacheAttributes) -> bool {
    desired.auto_backup_time.is_some() && desired.auto_backup_time != current.auto_backup_time
}

fn attributes_differ(desired: &CacheAttributes, current: &CacheAttributes) -> bool {
    desired.name != current.name
        || desired.description != current.description
        || backup_differs(desired, current)
}

#[async_trait]
impl ResourceDriver for CacheDriver {
    type State = CacheState;
    type Attributes = CacheAttributes;
    type Spec = CacheSpec;
    type Step = CacheStep;
    type Operation = QingCloudOperation;

    fn kind(&self) -> ResourceKind {
        ResourceKind::Cache
    }

    fn stable_states(&self) -> &'static [CacheState] {
        CACHE_STABLE
    }

    fn poll_settings(&self) -> PollSettings {
        self.poll
    }

    fn check_preconditions(&self, spec: &CacheSpec) -> Result<()> {
        if spec.vxnet_id.is_empty() {
            return Err(OrchestrationError::precondition("a cache needs a vxnet").into());
        }
        if spec.cache_size == 0 || spec.cache_size > MAX_CACHE_SIZE {
            return Err(OrchestrationError::precondition(format!(
                "cache_size must be between 1 and {MAX_CACHE_SIZE} GB, got {}",
                spec.cache_size
            ))
            .into());
        }
        if spec.node_count == 0 {
            return Err(OrchestrationError::precondition("node_count must be at least 1").into());
        }
        Ok(())
    }

    fn desired_attributes(&self, spec: &CacheSpec) -> CacheAttributes {
        CacheAttributes {
            name: spec.name.clone(),
            description: spec.description.clone(),
            vxnet_id: spec.vxnet_id.clone(),
            cache_size: spec.cache_size,
            cache_type: spec.cache_type.clone(),
            node_count: spec.node_count,
            auto_backup_time: spec.auto_backup_time,
            tag_ids: spec.tag_ids.clone(),
            stopped: false,
        }
    }

    fn build_update_plan(
        &self,
        desired: &CacheAttributes,
        current: &CacheAttributes,
    ) -> Result<UpdatePlan<CacheStep>> {
        let checks = [
            (CacheStep::Attributes, attributes_differ(desired, current)),
            (
                CacheStep::Resize,
                desired.cache_size != current.cache_size || current.stopped,
            ),
            (CacheStep::Tags, desired.tag_ids != current.tag_ids),
        ];

        UpdatePlan::from_steps(
            checks
                .into_iter()
                .filter_map(|(step, needed)| needed.then_some(step)),
        )
    }

    fn step_operations(
        &self,
        step: CacheStep,
        resource_id: &str,
        desired: &CacheAttributes,
        live: &Snapshot<CacheState, CacheAttributes>,
    ) -> Vec<QingCloudOperation> {
        let current = &live.attributes;
        let caches = vec![resource_id.to_string()];

        match step {
            CacheStep::Attributes => {
                if !attributes_differ(desired, current) {
                    return Vec::new();
                }
                vec![QingCloudOperation::immediate(&ModifyCacheAttributes {
                    cache: resource_id.to_string(),
                    cache_name: (desired.name != current.name).then(|| desired.name.clone()),
                    description: (desired.description != current.description)
                        .then(|| desired.description.clone()),
                    auto_backup_time: if backup_differs(desired, current) {
                        desired.auto_backup_time
                    } else {
                        None
                    },
                })]
            }
            CacheStep::Resize => {
                let stopped = live.state == CacheState::Stopped;
                let mut operations = Vec::new();
                if desired.cache_size != current.cache_size {
                    if !stopped {
                        operations.push(QingCloudOperation::transition(&StopCaches {
                            caches: caches.clone(),
                        }));
                    }
                    operations.push(QingCloudOperation::transition(&ResizeCaches {
                        caches: caches.clone(),
                        cache_size: desired.cache_size,
                    }));
                    operations.push(QingCloudOperation::transition(&StartCaches { caches }));
                } else if stopped {
                    operations.push(QingCloudOperation::transition(&StartCaches { caches }));
                }
                operations
            }
            CacheStep::Tags => tag_operations(
                TAG_RESOURCE_TYPE,
                resource_id,
                &desired.tag_ids,
                &current.tag_ids,
            ),
        }
    }

    async fn provision(&self, spec: &CacheSpec) -> Result<String> {
        let request = CreateCache {
            vxnet: spec.vxnet_id.clone(),
            cache_size: spec.cache_size,
            cache_type: spec.cache_type.clone(),
            node_count: spec.node_count,
            cache_class: spec.cache_class,
            cache_name: spec.name.clone(),
            cache_parameter_group: spec.cache_parameter_group.clone(),
        };

        let body = self.client.call(&request.to_request()).await?;
        let response: CreateCacheResponse = decode(CreateCache::ACTION, body)?;
        Ok(response.cache_id)
    }

    async fn describe(
        &self,
        resource_id: &str,
    ) -> Result<Option<Snapshot<CacheState, CacheAttributes>>> {
        let request = DescribeCaches {
            caches: vec![resource_id.to_string()],
        };
        let body = self.client.call(&request.to_request()).await?;
        let response: DescribeCachesResponse = decode(DescribeCaches::ACTION, body)?;

        Ok(response
            .cache_set
            .into_iter()
            .find(|record| record.cache_id == resource_id)
            .map(|record| Snapshot {
                state: CacheState::from_api(&record.status, &record.transition_status),
                attributes: CacheAttributes::from(record),
            }))
    }

    async fn invoke(&self, operation: &QingCloudOperation) -> Result<()> {
        self.client.call(operation.request()).await.map(|_| ())
    }

    async fn terminate(&self, resource_id: &str) -> Result<()> {
        let request = DeleteCaches {
            caches: vec![resource_id.to_string()],
        };
        self.client.call(&request.to_request()).await.map(|_| ())
    }
}
