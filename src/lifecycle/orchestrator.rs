//! Lifecycle orchestrator.
//!
//! Drives create, read, update and delete for one resource kind through its
//! driver. Every remote call goes through the retry policy, and every
//! mutating call is preceded by a wait for a stable state.

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{LifecycleError, OrchestrationError, Result};

use super::driver::{RemoteOperation, RemoteState, ResourceDriver, ResourceHandle};
use super::plan::StepLedger;
use super::poller::StatePoller;
use super::retry::RetryPolicy;

/// Outcome of an update.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateReport<A> {
    /// Resource that was updated.
    pub resource_id: String,
    /// Steps that issued remote calls, in execution order.
    pub applied_steps: Vec<String>,
    /// Steps found already satisfied on the live resource.
    pub skipped_steps: Vec<String>,
    /// Attributes read back after the update. `None` for a no-op update.
    pub attributes: Option<A>,
}

impl<A> UpdateReport<A> {
    /// Returns true if no remote mutation was issued.
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        self.applied_steps.is_empty()
    }
}

/// Orchestrates the lifecycle of one resource kind.
#[derive(Debug)]
pub struct LifecycleOrchestrator<D> {
    /// Resource-kind-specific driver.
    driver: D,
    /// Retry policy for every remote call.
    retry: RetryPolicy,
    /// Caller-supplied cancellation signal.
    cancel: CancellationToken,
}

impl<D: ResourceDriver> LifecycleOrchestrator<D> {
    /// Creates an orchestrator that is never cancelled.
    #[must_use]
    pub fn new(driver: D, retry: RetryPolicy) -> Self {
        Self {
            driver,
            retry,
            cancel: CancellationToken::new(),
        }
    }

    /// Aborts waits and backoffs once `cancel` fires.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The underlying driver.
    #[must_use]
    pub const fn driver(&self) -> &D {
        &self.driver
    }

    fn poller(&self) -> StatePoller<'_> {
        StatePoller::new(&self.retry, &self.cancel)
    }

    /// Provisions a resource, waits for it to settle and applies the
    /// attributes the provisioning call cannot set.
    ///
    /// # Errors
    ///
    /// Returns a precondition error before any remote call, the provisioning
    /// error if no resource was created, or
    /// [`OrchestrationError::PartiallyProvisioned`] carrying the handle if
    /// anything fails after the resource exists.
    pub async fn create(&self, spec: &D::Spec) -> Result<ResourceHandle> {
        let kind = self.driver.kind();
        self.driver.check_preconditions(spec)?;

        info!("Provisioning {kind}");
        let driver = &self.driver;
        let target = format!("new {kind}");
        let resource_id = self
            .retry
            .run("provision", &target, &self.cancel, move || driver.provision(spec))
            .await?;

        let handle = ResourceHandle::new(kind, resource_id);
        info!(resource_id = handle.id(), "Provisioned {kind}");

        if let Err(source) = self.configure(&handle, spec).await {
            error!(resource_id = handle.id(), error = %source, "Post-create configuration failed");
            return Err(LifecycleError::Orchestration(
                OrchestrationError::PartiallyProvisioned {
                    handle,
                    source: Box::new(source),
                },
            ));
        }

        info!(resource_id = handle.id(), "Created {kind}");
        Ok(handle)
    }

    async fn configure(&self, handle: &ResourceHandle, spec: &D::Spec) -> Result<()> {
        let poller = self.poller();
        poller.await_stable(&self.driver, handle.id()).await?;
        poller.await_ready(&self.driver, handle.id()).await?;

        let live = poller.await_stable(&self.driver, handle.id()).await?;
        let desired = self.driver.desired_attributes(spec);
        self.update(handle, &desired, &live.attributes).await?;
        Ok(())
    }

    /// Reads the current attributes. Returns `None` if the resource no
    /// longer exists, so the caller can drop it from its records.
    ///
    /// # Errors
    ///
    /// Returns the describe call's error.
    pub async fn read(&self, handle: &ResourceHandle) -> Result<Option<D::Attributes>> {
        let driver = &self.driver;
        let resource_id = handle.id();
        let described = self
            .retry
            .run("describe", resource_id, &self.cancel, move || driver.describe(resource_id))
            .await?;

        match described {
            Some(snapshot) if !snapshot.state.is_gone() => Ok(Some(snapshot.attributes)),
            Some(snapshot) => {
                debug!(resource_id, state = %snapshot.state, "Resource is gone");
                Ok(None)
            }
            None => {
                debug!(resource_id, "Resource is absent");
                Ok(None)
            }
        }
    }

    /// Moves the resource from `current` to `desired` by executing the update
    /// plan step by step.
    ///
    /// Each step waits for a stable state, then derives its remaining calls
    /// from the live resource, so re-running the same update after a partial
    /// failure skips the steps that already took effect. An empty plan makes
    /// no remote call.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError::PartialUpdateFailure`] naming the failed
    /// step and the steps applied before it.
    pub async fn update(
        &self,
        handle: &ResourceHandle,
        desired: &D::Attributes,
        current: &D::Attributes,
    ) -> Result<UpdateReport<D::Attributes>> {
        let resource_id = handle.id();
        let plan = self.driver.build_update_plan(desired, current)?;

        if plan.is_empty() {
            debug!(resource_id, "No changes required");
            return Ok(UpdateReport {
                resource_id: resource_id.to_string(),
                applied_steps: Vec::new(),
                skipped_steps: Vec::new(),
                attributes: None,
            });
        }

        info!(resource_id, plan = %plan, "Applying update plan");

        let mut ledger = StepLedger::new();
        let mut last_state: Option<String> = None;

        for &step in plan.steps() {
            if let Err(source) = self
                .apply_step(step, resource_id, desired, &mut ledger, &mut last_state)
                .await
            {
                error!(resource_id, step = %step, error = %source, "Update step failed");
                let last_state = source.last_observed_state().map(String::from).or(last_state);
                return Err(LifecycleError::Orchestration(
                    OrchestrationError::PartialUpdateFailure {
                        resource_id: resource_id.to_string(),
                        failed_step: step.to_string(),
                        applied_steps: ledger.applied_names(),
                        last_state,
                        source: Box::new(source),
                    },
                ));
            }
        }

        let attributes = self.read(handle).await?;
        info!(
            resource_id,
            applied = ledger.applied().len(),
            skipped = ledger.skipped().len(),
            "Update complete"
        );

        Ok(UpdateReport {
            resource_id: resource_id.to_string(),
            applied_steps: ledger.applied_names(),
            skipped_steps: ledger.skipped_names(),
            attributes,
        })
    }

    async fn apply_step(
        &self,
        step: D::Step,
        resource_id: &str,
        desired: &D::Attributes,
        ledger: &mut StepLedger<D::Step>,
        last_state: &mut Option<String>,
    ) -> Result<()> {
        let poller = self.poller();
        let live = poller.await_stable(&self.driver, resource_id).await?;
        *last_state = Some(live.state.to_string());

        let operations = self.driver.step_operations(step, resource_id, desired, &live);
        if operations.is_empty() {
            debug!(resource_id, step = %step, "Step already applied");
            ledger.record_skipped(step);
            return Ok(());
        }

        for operation in &operations {
            if self.cancel.is_cancelled() {
                return Err(LifecycleError::Orchestration(OrchestrationError::Cancelled {
                    resource_id: resource_id.to_string(),
                    phase: format!("updating {step} of"),
                }));
            }

            let action = operation.action();
            info!(resource_id, step = %step, action, "Issuing {action}");

            let driver = &self.driver;
            self.retry
                .run(action, resource_id, &self.cancel, move || driver.invoke(operation))
                .await?;

            if operation.induces_transition() {
                let settled = poller.await_stable(&self.driver, resource_id).await?;
                *last_state = Some(settled.state.to_string());
            }
        }

        ledger.record_applied(step);
        Ok(())
    }

    /// Deletes the resource held in `slot` and clears the slot once the
    /// deletion is confirmed.
    ///
    /// An empty slot, or a resource that is already gone, succeeds without a
    /// destroy call.
    ///
    /// # Errors
    ///
    /// Returns the terminate call's error or a timeout while waiting for the
    /// resource to disappear. The slot is left untouched on error.
    pub async fn delete(&self, slot: &mut Option<ResourceHandle>) -> Result<()> {
        let Some(resource_id) = slot.as_ref().map(|h| h.id().to_string()) else {
            debug!("Nothing to delete");
            return Ok(());
        };
        let resource_id = resource_id.as_str();
        let poller = self.poller();

        match poller.await_stable(&self.driver, resource_id).await {
            Ok(_) => {}
            Err(LifecycleError::Orchestration(OrchestrationError::UnexpectedDisappearance {
                ..
            })) => {
                info!(resource_id, "Resource already deleted");
                *slot = None;
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        info!(resource_id, "Deleting resource");
        let driver = &self.driver;
        match self
            .retry
            .run("terminate", resource_id, &self.cancel, move || {
                driver.terminate(resource_id)
            })
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                info!(resource_id, "Resource vanished before terminate");
                *slot = None;
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        poller.await_gone(&self.driver, resource_id).await?;
        info!(resource_id, "Deleted resource");
        *slot = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheSpec, InstanceSpec};
    use crate::lifecycle::{PollSettings, ResourceKind};
    use crate::qingcloud::fake::FakeCloud;
    use crate::qingcloud::{CacheAttributes, CacheDriver, InstanceAttributes, InstanceDriver};
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    fn poll() -> PollSettings {
        PollSettings {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(600),
            readiness_polls: 3,
        }
    }

    fn instances(cloud: &Arc<FakeCloud>) -> LifecycleOrchestrator<InstanceDriver> {
        let client: Arc<dyn crate::qingcloud::RemoteClient> = cloud.clone();
        LifecycleOrchestrator::new(InstanceDriver::new(client, poll()), RetryPolicy::default())
    }

    fn caches(cloud: &Arc<FakeCloud>) -> LifecycleOrchestrator<CacheDriver> {
        let client: Arc<dyn crate::qingcloud::RemoteClient> = cloud.clone();
        LifecycleOrchestrator::new(CacheDriver::new(client, poll()), RetryPolicy::default())
    }

    fn ids(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(ToString::to_string).collect()
    }

    fn instance_spec() -> InstanceSpec {
        InstanceSpec {
            name: String::from("web"),
            description: String::from("front end"),
            image_id: String::from("centos7x64"),
            cpu: 1,
            memory: 1024,
            instance_class: 0,
            managed_vxnet_id: String::from("vxnet-abc"),
            keypair_ids: ids(&["kp-1"]),
            security_group_id: None,
            eip_id: None,
            volume_ids: BTreeSet::new(),
            tag_ids: ids(&["tag-1"]),
        }
    }

    async fn live(
        orchestrator: &LifecycleOrchestrator<InstanceDriver>,
        id: &str,
    ) -> InstanceAttributes {
        let handle = ResourceHandle::new(ResourceKind::Instance, id);
        orchestrator.read(&handle).await.unwrap().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_provisions_then_configures() {
        let cloud = FakeCloud::new();
        let orchestrator = instances(&cloud);

        let handle = assert_ok!(orchestrator.create(&instance_spec()).await);
        assert_eq!(handle.kind(), ResourceKind::Instance);

        let mutating = cloud.mutating_actions();
        assert_eq!(mutating[0], "RunInstances");
        assert!(mutating.contains(&"ModifyInstanceAttributes"));
        assert!(mutating.contains(&"JoinVxnet"));
        assert!(mutating.contains(&"AttachTags"));
        assert!(cloud.actions().contains(&"GetLeaseInfo"));
        assert!(cloud.violations().is_empty(), "{:?}", cloud.violations());

        let attributes = live(&orchestrator, handle.id()).await;
        assert_eq!(attributes.description, "front end");
        assert_eq!(attributes.managed_vxnet_id, "vxnet-abc");
        assert_eq!(attributes.tag_ids, ids(&["tag-1"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_precondition_makes_no_call() {
        let cloud = FakeCloud::new();
        let spec = InstanceSpec {
            keypair_ids: BTreeSet::new(),
            ..instance_spec()
        };

        let err = assert_err!(instances(&cloud).create(&spec).await);
        assert!(matches!(
            err,
            LifecycleError::Orchestration(OrchestrationError::Precondition { .. })
        ));
        assert!(cloud.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_provisioning_names_the_kind() {
        let cloud = FakeCloud::new();
        cloud.fail_next("RunInstances", 5100, 5);

        let err = assert_err!(instances(&cloud).create(&instance_spec()).await);
        assert!(err.to_string().contains("provision on new instance still busy after 5 attempts"));
        assert_eq!(cloud.mutating_actions(), vec!["RunInstances"; 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_failure_after_provisioning_keeps_handle() {
        let cloud = FakeCloud::new();
        cloud.fail_next("JoinVxnet", 1400, 1);

        let err = assert_err!(instances(&cloud).create(&instance_spec()).await);
        let LifecycleError::Orchestration(OrchestrationError::PartiallyProvisioned { handle, .. }) =
            err
        else {
            panic!("expected a partially provisioned error");
        };
        assert!(cloud.instance(handle.id()).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_gate_gives_up_and_proceeds() {
        let cloud = FakeCloud::new();
        cloud.set_lease_status("pending");

        assert_ok!(instances(&cloud).create(&instance_spec()).await);

        let lease_checks = cloud
            .actions()
            .into_iter()
            .filter(|action| *action == "GetLeaseInfo")
            .count();
        assert_eq!(lease_checks, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_noop_update_makes_no_call() {
        let cloud = FakeCloud::new();
        cloud.insert_instance("i-1", 1, 1024);
        let orchestrator = instances(&cloud);
        let current = live(&orchestrator, "i-1").await;
        cloud.clear_calls();

        let handle = ResourceHandle::new(ResourceKind::Instance, "i-1");
        let report = assert_ok!(orchestrator.update(&handle, &current, &current).await);

        assert!(report.is_unchanged());
        assert!(report.attributes.is_none());
        assert!(cloud.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resize_stops_resizes_and_starts_with_waits_between() {
        let cloud = FakeCloud::new();
        cloud.insert_instance("i-1", 1, 1024);
        let orchestrator = instances(&cloud);
        let current = live(&orchestrator, "i-1").await;
        let desired = InstanceAttributes {
            cpu: 2,
            memory: 2048,
            ..current.clone()
        };
        cloud.clear_calls();

        let handle = ResourceHandle::new(ResourceKind::Instance, "i-1");
        let report = assert_ok!(orchestrator.update(&handle, &desired, &current).await);

        assert_eq!(report.applied_steps, vec!["resize"]);
        assert_eq!(
            cloud.mutating_actions(),
            vec!["StopInstances", "ResizeInstances", "StartInstances"]
        );
        assert!(cloud.violations().is_empty(), "{:?}", cloud.violations());

        let actions = cloud.actions();
        for mutation in ["StopInstances", "ResizeInstances", "StartInstances"] {
            let index = actions.iter().position(|a| *a == mutation).unwrap();
            assert_eq!(actions[index + 1], "DescribeInstances");
        }

        let attributes = report.attributes.unwrap();
        assert_eq!((attributes.cpu, attributes.memory), (2, 2048));
        let record = cloud.instance("i-1").unwrap();
        assert_eq!(record["status"], "running");
    }

    #[tokio::test(start_paused = true)]
    async fn test_resize_resumes_from_stopped_and_resized() {
        let cloud = FakeCloud::new();
        cloud.insert_instance("i-1", 2, 2048);
        cloud.set_instance_field("i-1", "status", serde_json::json!("stopped"));
        let orchestrator = instances(&cloud);
        let desired = live(&orchestrator, "i-1").await;
        let current = InstanceAttributes {
            cpu: 1,
            memory: 1024,
            ..desired.clone()
        };
        cloud.clear_calls();

        let handle = ResourceHandle::new(ResourceKind::Instance, "i-1");
        assert_ok!(orchestrator.update(&handle, &desired, &current).await);

        assert_eq!(cloud.mutating_actions(), vec!["StartInstances"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_from_live_state_restarts_stopped_instance() {
        let cloud = FakeCloud::new();
        cloud.insert_instance("i-1", 2, 2048);
        cloud.set_instance_field("i-1", "status", serde_json::json!("stopped"));
        let orchestrator = instances(&cloud);
        let spec = InstanceSpec {
            description: String::new(),
            cpu: 2,
            memory: 2048,
            managed_vxnet_id: String::from("vxnet-0"),
            tag_ids: BTreeSet::new(),
            ..instance_spec()
        };
        let current = live(&orchestrator, "i-1").await;
        let desired = orchestrator.driver().desired_attributes(&spec);
        assert!(current.stopped);
        cloud.clear_calls();

        let handle = ResourceHandle::new(ResourceKind::Instance, "i-1");
        let report = assert_ok!(orchestrator.update(&handle, &desired, &current).await);

        assert_eq!(report.applied_steps, vec!["resize"]);
        assert_eq!(cloud.mutating_actions(), vec!["StartInstances"]);
        assert_eq!(cloud.instance("i-1").unwrap()["status"], "running");
        assert!(!report.attributes.unwrap().stopped);

        cloud.clear_calls();
        let current = live(&orchestrator, "i-1").await;
        let report = assert_ok!(orchestrator.update(&handle, &desired, &current).await);
        assert!(report.is_unchanged());
        assert!(cloud.mutating_actions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transition_timeout_aborts_remaining_steps() {
        let cloud = FakeCloud::new();
        cloud.insert_instance("i-1", 1, 1024);
        let orchestrator = instances(&cloud);
        let current = live(&orchestrator, "i-1").await;
        let desired = InstanceAttributes {
            name: String::from("api"),
            eip_id: Some(String::from("eip-1")),
            tag_ids: ids(&["tag-1"]),
            ..current.clone()
        };
        cloud.set_transition_polls(1000);
        cloud.clear_calls();

        let handle = ResourceHandle::new(ResourceKind::Instance, "i-1");
        let err = assert_err!(orchestrator.update(&handle, &desired, &current).await);

        let LifecycleError::Orchestration(OrchestrationError::PartialUpdateFailure {
            resource_id,
            failed_step,
            applied_steps,
            last_state,
            source,
        }) = err
        else {
            panic!("expected a partial update failure");
        };
        assert_eq!(resource_id, "i-1");
        assert_eq!(failed_step, "eip");
        assert_eq!(applied_steps, vec!["attributes"]);
        assert_eq!(last_state.as_deref(), Some("updating"));
        assert!(matches!(
            *source,
            LifecycleError::Orchestration(OrchestrationError::TransitionTimeout {
                ref last_state,
                waited_secs,
                ..
            }) if last_state == "updating" && waited_secs >= 600
        ));
        assert_eq!(
            cloud.mutating_actions(),
            vec!["ModifyInstanceAttributes", "AssociateEip"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_failure_then_resume() {
        let cloud = FakeCloud::new();
        cloud.insert_instance("i-1", 1, 1024);
        let orchestrator = instances(&cloud);
        let current = live(&orchestrator, "i-1").await;
        let desired = InstanceAttributes {
            name: String::from("api"),
            security_group_id: Some(String::from("sg-web")),
            eip_id: Some(String::from("eip-1")),
            tag_ids: ids(&["tag-1"]),
            ..current.clone()
        };
        let handle = ResourceHandle::new(ResourceKind::Instance, "i-1");

        cloud.fail_next("ApplySecurityGroup", 1400, 1);
        cloud.clear_calls();

        let err = assert_err!(orchestrator.update(&handle, &desired, &current).await);
        let LifecycleError::Orchestration(OrchestrationError::PartialUpdateFailure {
            failed_step,
            applied_steps,
            last_state,
            ..
        }) = err
        else {
            panic!("expected a partial update failure");
        };
        assert_eq!(failed_step, "security_group");
        assert_eq!(applied_steps, vec!["attributes"]);
        assert_eq!(last_state.as_deref(), Some("running"));
        assert_eq!(
            cloud.mutating_actions(),
            vec!["ModifyInstanceAttributes", "ApplySecurityGroup"]
        );

        cloud.clear_calls();
        let report = assert_ok!(orchestrator.update(&handle, &desired, &current).await);

        assert_eq!(
            cloud.mutating_actions(),
            vec!["ApplySecurityGroup", "AssociateEip", "AttachTags"]
        );
        assert_eq!(report.skipped_steps, vec!["attributes"]);
        assert_eq!(report.applied_steps, vec!["security_group", "eip", "tags"]);

        let attributes = report.attributes.unwrap();
        assert_eq!(attributes.name, "api");
        assert_eq!(attributes.eip_id.as_deref(), Some("eip-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_responses_are_retried_within_a_step() {
        let cloud = FakeCloud::new();
        cloud.insert_instance("i-1", 1, 1024);
        let orchestrator = instances(&cloud);
        let current = live(&orchestrator, "i-1").await;
        let desired = InstanceAttributes {
            cpu: 4,
            memory: 4096,
            ..current.clone()
        };
        cloud.fail_next("StopInstances", 5100, 2);
        cloud.clear_calls();

        let handle = ResourceHandle::new(ResourceKind::Instance, "i-1");
        assert_ok!(orchestrator.update(&handle, &desired, &current).await);

        let stops = cloud
            .actions()
            .into_iter()
            .filter(|action| *action == "StopInstances")
            .count();
        assert_eq!(stops, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_update_reports_partial_failure() {
        let cloud = FakeCloud::new();
        cloud.insert_instance("i-1", 1, 1024);
        let cancel = CancellationToken::new();
        let orchestrator = instances(&cloud).with_cancellation(cancel.clone());
        let current = live(&orchestrator, "i-1").await;
        let desired = InstanceAttributes {
            name: String::from("renamed"),
            ..current.clone()
        };
        cancel.cancel();
        cloud.clear_calls();

        let handle = ResourceHandle::new(ResourceKind::Instance, "i-1");
        let err = assert_err!(orchestrator.update(&handle, &desired, &current).await);

        let LifecycleError::Orchestration(OrchestrationError::PartialUpdateFailure {
            source, ..
        }) = err
        else {
            panic!("expected a partial update failure");
        };
        assert!(matches!(
            *source,
            LifecycleError::Orchestration(OrchestrationError::Cancelled { .. })
        ));
        assert!(cloud.mutating_actions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_waits_until_gone_and_clears_slot() {
        let cloud = FakeCloud::new();
        cloud.insert_instance("i-1", 1, 1024);
        let orchestrator = instances(&cloud);

        let mut slot = Some(ResourceHandle::new(ResourceKind::Instance, "i-1"));
        assert_ok!(orchestrator.delete(&mut slot).await);

        assert!(slot.is_none());
        assert_eq!(cloud.mutating_actions(), vec!["TerminateInstances"]);
        assert_eq!(cloud.instance("i-1").unwrap()["status"], "terminated");
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_terminate_names_the_resource() {
        let cloud = FakeCloud::new();
        cloud.insert_instance("i-1", 1, 1024);
        cloud.fail_next("TerminateInstances", 5100, 5);
        let orchestrator = instances(&cloud);

        let mut slot = Some(ResourceHandle::new(ResourceKind::Instance, "i-1"));
        let err = assert_err!(orchestrator.delete(&mut slot).await);

        assert!(err.to_string().contains("terminate on i-1 still busy after 5 attempts"));
        assert!(matches!(
            err,
            LifecycleError::Orchestration(OrchestrationError::RetryExhausted {
                ref resource_id,
                ..
            }) if resource_id == "i-1"
        ));
        assert!(slot.is_some());
        assert_eq!(cloud.instance("i-1").unwrap()["status"], "running");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_backoff_names_the_resource() {
        let cloud = FakeCloud::new();
        cloud.insert_instance("i-1", 1, 1024);
        let cancel = CancellationToken::new();
        let orchestrator = instances(&cloud).with_cancellation(cancel.clone());
        cloud.fail_next("TerminateInstances", 5100, 1);

        let deadline = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            deadline.cancel();
        });

        let mut slot = Some(ResourceHandle::new(ResourceKind::Instance, "i-1"));
        let err = assert_err!(orchestrator.delete(&mut slot).await);

        assert!(err.to_string().ends_with("Cancelled while retrying terminate of i-1"));
        assert!(matches!(
            err,
            LifecycleError::Orchestration(OrchestrationError::Cancelled {
                ref resource_id,
                ..
            }) if resource_id == "i-1"
        ));
        assert!(slot.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_is_idempotent() {
        let cloud = FakeCloud::new();
        let orchestrator = instances(&cloud);

        let mut slot = Some(ResourceHandle::new(ResourceKind::Instance, "i-missing"));
        assert_ok!(orchestrator.delete(&mut slot).await);
        assert!(slot.is_none());

        assert_ok!(orchestrator.delete(&mut slot).await);
        assert!(cloud.mutating_actions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_of_terminated_instance_makes_no_destroy_call() {
        let cloud = FakeCloud::new();
        cloud.insert_instance("i-1", 1, 1024);
        cloud.set_instance_field("i-1", "status", serde_json::json!("terminated"));
        let orchestrator = instances(&cloud);

        let mut slot = Some(ResourceHandle::new(ResourceKind::Instance, "i-1"));
        assert_ok!(orchestrator.delete(&mut slot).await);

        assert!(slot.is_none());
        assert!(cloud.mutating_actions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_of_gone_resource_is_none() {
        let cloud = FakeCloud::new();
        cloud.insert_instance("i-1", 1, 1024);
        cloud.set_instance_field("i-1", "status", serde_json::json!("ceased"));

        let handle = ResourceHandle::new(ResourceKind::Instance, "i-1");
        assert!(assert_ok!(instances(&cloud).read(&handle).await).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_lifecycle() {
        let cloud = FakeCloud::new();
        let orchestrator = caches(&cloud);
        let spec = CacheSpec {
            name: String::from("sessions"),
            description: String::new(),
            vxnet_id: String::from("vxnet-abc"),
            cache_size: 1,
            cache_type: String::from("redis3.0.5"),
            node_count: 1,
            cache_class: 0,
            cache_parameter_group: None,
            auto_backup_time: Some(2),
            tag_ids: BTreeSet::new(),
        };

        let handle = assert_ok!(orchestrator.create(&spec).await);
        assert_eq!(
            cloud.mutating_actions(),
            vec!["CreateCache", "ModifyCacheAttributes"]
        );

        let current = assert_ok!(orchestrator.read(&handle).await).unwrap();
        assert_eq!(current.auto_backup_time, Some(2));
        let desired = CacheAttributes {
            cache_size: 4,
            ..current.clone()
        };
        cloud.clear_calls();

        let report = assert_ok!(orchestrator.update(&handle, &desired, &current).await);
        assert_eq!(report.applied_steps, vec!["resize"]);
        assert_eq!(
            cloud.mutating_actions(),
            vec!["StopCaches", "ResizeCaches", "StartCaches"]
        );
        assert!(cloud.violations().is_empty(), "{:?}", cloud.violations());
        assert_eq!(cloud.cache(handle.id()).unwrap()["status"], "active");

        let mut slot = Some(handle);
        assert_ok!(orchestrator.delete(&mut slot).await);
        assert!(slot.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_cache_is_started_by_update() {
        let cloud = FakeCloud::new();
        cloud.insert_cache("c-1", 2);
        cloud.set_cache_field("c-1", "status", serde_json::json!("stopped"));
        let orchestrator = caches(&cloud);

        let handle = ResourceHandle::new(ResourceKind::Cache, "c-1");
        let current = assert_ok!(orchestrator.read(&handle).await).unwrap();
        assert!(current.stopped);
        let desired = CacheAttributes {
            stopped: false,
            ..current.clone()
        };
        cloud.clear_calls();

        let report = assert_ok!(orchestrator.update(&handle, &desired, &current).await);

        assert_eq!(report.applied_steps, vec!["resize"]);
        assert_eq!(cloud.mutating_actions(), vec!["StartCaches"]);
        assert_eq!(cloud.cache("c-1").unwrap()["status"], "active");
        assert!(cloud.violations().is_empty(), "{:?}", cloud.violations());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_resize_survives_slow_transitions() {
        let cloud = FakeCloud::new();
        cloud.insert_cache("c-1", 1);
        cloud.set_transition_polls(3);
        let orchestrator = caches(&cloud);

        let handle = ResourceHandle::new(ResourceKind::Cache, "c-1");
        let current = assert_ok!(orchestrator.read(&handle).await).unwrap();
        let desired = CacheAttributes {
            cache_size: 2,
            ..current.clone()
        };
        cloud.clear_calls();

        assert_ok!(orchestrator.update(&handle, &desired, &current).await);

        assert_eq!(
            cloud.mutating_actions(),
            vec!["StopCaches", "ResizeCaches", "StartCaches"]
        );
        assert!(cloud.violations().is_empty(), "{:?}", cloud.violations());
        assert_eq!(cloud.cache("c-1").unwrap()["cache_size"], 2);
    }
}
