//! Operation executors.
//!
//! Each executor turns one kind of intent into controller operations, waits
//! for them through the [`TaskPoller`] and reports per-device outcomes.

pub mod add;
pub mod delete;
pub mod export;
pub mod provision;
pub mod reboot;
pub mod resync;
pub mod udf;
pub mod update;

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::audit::AuditLogger;
use crate::clients::{ArchiveReader, ControllerApi, Operation, TaskStatus};
use crate::config::PollingConfig;
use crate::descriptor::DeviceDescriptor;
use crate::error::{ControllerError, Result};
use crate::outcome::{DeviceOutcome, OperationKind, StepReport};
use crate::poller::{TaskOutcome, TaskPoller};
use crate::prober::StateProber;

/// Trait for operation executors.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Operation kind this executor reports as.
    fn kind(&self) -> OperationKind;

    /// Run the operation for the planned targets.
    async fn execute(&self, plan: &Plan<'_>) -> Result<StepReport>;
}

/// Shared handles every executor works with.
#[derive(Clone)]
pub struct ExecContext {
    pub controller: Arc<dyn ControllerApi>,
    pub prober: StateProber,
    pub poller: TaskPoller,
    pub audit: AuditLogger,
    pub archive: Arc<dyn ArchiveReader>,
    /// Password for credential exports that feed credential merging.
    pub export_password: String,
}

impl ExecContext {
    pub fn new(
        controller: Arc<dyn ControllerApi>,
        archive: Arc<dyn ArchiveReader>,
        polling: PollingConfig,
        audit: AuditLogger,
        export_password: String,
    ) -> Self {
        Self {
            prober: StateProber::new(Arc::clone(&controller)),
            poller: TaskPoller::new(Arc::clone(&controller), polling),
            controller,
            audit,
            archive,
            export_password,
        }
    }

    /// Submit an operation and wait for it to finish.
    pub async fn run_task(
        &self,
        op: Operation,
        kind: OperationKind,
        targets: &[String],
    ) -> std::result::Result<TaskOutcome, ControllerError> {
        let handle = self.controller.submit(op).await?;
        self.audit.submitted(kind, &handle.to_string(), targets);
        self.poller.await_completion(&handle, kind).await
    }

    /// Like [`ExecContext::run_task`], folded into a device outcome.
    ///
    /// Returns the final status alongside for response echoing.
    pub async fn run_for_device(
        &self,
        op: Operation,
        kind: OperationKind,
        target: &str,
    ) -> (DeviceOutcome, Option<TaskStatus>) {
        let targets = [target.to_string()];
        let (outcome, status) = device_outcome(self.run_task(op, kind, &targets).await);
        self.audit_outcome(kind, target, &outcome);
        (outcome, status)
    }

    pub fn audit_outcome(&self, kind: OperationKind, target: &str, outcome: &DeviceOutcome) {
        match outcome {
            DeviceOutcome::Succeeded => self.audit.completed(kind, target),
            DeviceOutcome::Failed(reason) => self.audit.failed(kind, target, reason),
            DeviceOutcome::Unchanged(_) => {}
        }
    }
}

/// Map a polled task onto a device outcome.
pub fn device_outcome(
    result: std::result::Result<TaskOutcome, ControllerError>,
) -> (DeviceOutcome, Option<TaskStatus>) {
    match result {
        Ok(TaskOutcome::Success(status)) => (DeviceOutcome::Succeeded, Some(status)),
        Ok(other) => (
            DeviceOutcome::Failed(other.failure().unwrap_or_default()),
            None,
        ),
        Err(e) => (DeviceOutcome::Failed(e.to_string()), None),
    }
}

/// Resolved desired-vs-actual view of one playbook entry.
#[derive(Debug, Clone)]
pub struct Plan<'a> {
    pub descriptor: &'a DeviceDescriptor,
    /// Management IPs the entry resolves to.
    pub targets: Vec<String>,
    /// Management IPs of the whole inventory at probe time.
    pub inventory: BTreeSet<String>,
    /// Targets found in inventory.
    pub present: Vec<String>,
    /// Targets not in inventory.
    pub absent: Vec<String>,
    /// Targets added earlier in this pass.
    pub added: Vec<String>,
}

impl<'a> Plan<'a> {
    pub fn new(
        descriptor: &'a DeviceDescriptor,
        targets: Vec<String>,
        inventory: BTreeSet<String>,
    ) -> Self {
        let (present, absent): (Vec<String>, Vec<String>) = targets
            .iter()
            .cloned()
            .partition(|ip| inventory.contains(ip));
        Self {
            descriptor,
            targets,
            inventory,
            present,
            absent,
            added: Vec::new(),
        }
    }

    /// Plan after devices were added in this pass.
    pub fn with_added(&self, added: Vec<String>) -> Self {
        let mut next = self.clone();
        for ip in &added {
            next.inventory.insert(ip.clone());
            next.absent.retain(|a| a != ip);
            if !next.present.contains(ip) {
                next.present.push(ip.clone());
            }
        }
        next.added = added;
        next
    }

    pub fn is_present(&self, ip: &str) -> bool {
        self.inventory.contains(ip)
    }
}

/// Response echo of a successful task.
pub fn status_echo(target: &str, status: &TaskStatus) -> serde_json::Value {
    serde_json::json!({ "device": target, "progress": status.progress })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_partitions_targets() {
        let desc = DeviceDescriptor::default();
        let inventory: BTreeSet<String> = ["10.0.0.1".to_string()].into_iter().collect();
        let plan = Plan::new(
            &desc,
            vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()],
            inventory,
        );
        assert_eq!(plan.present, vec!["10.0.0.1".to_string()]);
        assert_eq!(plan.absent, vec!["10.0.0.2".to_string()]);

        let after = plan.with_added(vec!["10.0.0.2".to_string()]);
        assert!(after.absent.is_empty());
        assert_eq!(after.present.len(), 2);
        assert!(after.is_present("10.0.0.2"));
        assert_eq!(after.added, vec!["10.0.0.2".to_string()]);
    }

    #[test]
    fn test_device_outcome_mapping() {
        let (ok, status) = device_outcome(Ok(TaskOutcome::Success(TaskStatus::default())));
        assert_eq!(ok, DeviceOutcome::Succeeded);
        assert!(status.is_some());

        let (timeout, _) = device_outcome(Ok(TaskOutcome::Timeout { attempts: 3 }));
        assert!(timeout.is_failed());

        let (err, _) = device_outcome(Err(ControllerError::Transport("refused".into())));
        assert_eq!(err, DeviceOutcome::Failed("transport: refused".into()));
    }
}
