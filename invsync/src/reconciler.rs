//! Reconciliation pass.
//!
//! For every playbook entry: validate, probe the controller, diff desired
//! against actual state, run the executors the entry asks for in a fixed
//! order and fold their reports into one [`ReconciliationResult`].

use std::sync::Arc;

use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use crate::audit::AuditLogger;
use crate::clients::{ArchiveReader, ControllerApi, CsvArchiveReader};
use crate::config::{Mode, Playbook, PollingConfig};
use crate::descriptor::DeviceDescriptor;
use crate::error::{ReconcileError, Result};
use crate::executor::add::AddExecutor;
use crate::executor::delete::{DeleteDeviceExecutor, DeleteUdfExecutor};
use crate::executor::export::ExportExecutor;
use crate::executor::provision::{validate_ap_locations, ProvisionExecutor};
use crate::executor::reboot::RebootExecutor;
use crate::executor::resync::ResyncExecutor;
use crate::executor::udf::{UdfExecutor, UdfScope};
use crate::executor::update::{skipped_update, update_executors};
use crate::executor::{ExecContext, Executor, Plan};
use crate::outcome::{DeviceOutcome, ReconciliationResult, StepReport};
use crate::validation::{validate_deleted, validate_merged};
use crate::verifier::Verifier;

/// Export password used for credential merging when none is configured.
///
/// Satisfies the export password rule and is unique per pass.
pub fn generated_export_password() -> String {
    format!("Inv-{}-9x", Uuid::new_v4().simple())
}

/// Drives reconciliation passes against one controller.
pub struct Reconciler {
    controller: Arc<dyn ControllerApi>,
    archive: Arc<dyn ArchiveReader>,
    polling: PollingConfig,
    export_password: Option<String>,
}

impl Reconciler {
    pub fn new(controller: Arc<dyn ControllerApi>, polling: PollingConfig) -> Self {
        Self {
            controller,
            archive: Arc::new(CsvArchiveReader::new()),
            polling,
            export_password: None,
        }
    }

    pub fn from_playbook(controller: Arc<dyn ControllerApi>, playbook: &Playbook) -> Self {
        Self::new(controller, playbook.polling.clone())
            .with_export_password(playbook.credential_export_password.clone())
    }

    /// Replace the reader used for exported archives.
    pub fn with_archive_reader(mut self, archive: Arc<dyn ArchiveReader>) -> Self {
        self.archive = archive;
        self
    }

    pub fn with_export_password(mut self, password: Option<String>) -> Self {
        self.export_password = password;
        self
    }

    /// Run one pass over all playbook entries.
    pub async fn reconcile(
        &self,
        descriptors: &[DeviceDescriptor],
        mode: Mode,
        verify: bool,
    ) -> Result<ReconciliationResult> {
        let pass_id = Uuid::new_v4().to_string();
        let span = info_span!("reconcile", pass = %pass_id, mode = ?mode);
        self.run_pass(pass_id, descriptors, mode, verify)
            .instrument(span)
            .await
    }

    async fn run_pass(
        &self,
        pass_id: String,
        descriptors: &[DeviceDescriptor],
        mode: Mode,
        verify: bool,
    ) -> Result<ReconciliationResult> {
        // INIT: a broken playbook must fail before the first controller call.
        for desc in descriptors {
            match mode {
                Mode::Merged => validate_merged(desc)?,
                Mode::Deleted => validate_deleted(desc)?,
            }
        }
        // AP locations need site lookups but still precede every change.
        if mode == Mode::Merged {
            for wireless in descriptors.iter().filter_map(DeviceDescriptor::wireless) {
                validate_ap_locations(self.controller.as_ref(), wireless).await?;
            }
        }

        let audit = AuditLogger::new(pass_id.clone());
        let export_password = self
            .export_password
            .clone()
            .unwrap_or_else(generated_export_password);
        let ctx = ExecContext::new(
            Arc::clone(&self.controller),
            Arc::clone(&self.archive),
            self.polling.clone(),
            audit.clone(),
            export_password,
        );

        let mode_name = match mode {
            Mode::Merged => "merged",
            Mode::Deleted => "deleted",
        };
        info!("Starting {} pass over {} entries", mode_name, descriptors.len());
        audit.pass_started(mode_name, descriptors.len());

        let mut result = ReconciliationResult::new(pass_id);
        for desc in descriptors {
            result = self.reconcile_entry(&ctx, desc, mode, result).await?;
        }

        if verify {
            let report = Verifier::new(ctx.clone()).verify(descriptors, mode).await;
            result = result.with_verification(report);
        }

        info!("Pass finished: {}", result.summary());
        audit.pass_finished(&result.summary());
        Ok(result)
    }

    async fn reconcile_entry(
        &self,
        ctx: &ExecContext,
        desc: &DeviceDescriptor,
        mode: Mode,
        mut result: ReconciliationResult,
    ) -> Result<ReconciliationResult> {
        // PROBED
        let inventory = ctx.prober.list_existing_devices().await?;
        let targets = ctx.prober.resolve_identity(desc).await;
        debug!("Resolved targets {:?}", targets);

        // DIFFED
        let plan = Plan::new(desc, targets, inventory);
        debug!(present = ?plan.present, absent = ?plan.absent, "Diffed playbook entry");

        match mode {
            Mode::Merged => {
                for step in self.execute_merged(ctx, plan).await? {
                    result = result.fold(step);
                }
            }
            Mode::Deleted => {
                let step = if desc.add_user_defined_field.is_some() {
                    run(&DeleteUdfExecutor::new(ctx.clone()), &plan).await?
                } else {
                    run(&DeleteDeviceExecutor::new(ctx.clone()), &plan).await?
                };
                result = result.fold(step);
            }
        }
        Ok(result)
    }

    async fn execute_merged(&self, ctx: &ExecContext, plan: Plan<'_>) -> Result<Vec<StepReport>> {
        let desc = plan.descriptor;
        let mut steps = Vec::new();

        if desc.add_user_defined_field.is_some() {
            steps.push(run(&UdfExecutor::new(ctx.clone(), UdfScope::Existing), &plan).await?);
        }

        if desc.device_updated {
            let executors = update_executors(ctx, desc);
            match executors.first() {
                Some(first) if plan.present.is_empty() => {
                    steps.push(skipped_update(&plan, first.kind()));
                }
                _ => {
                    for executor in &executors {
                        steps.push(run(executor.as_ref(), &plan).await?);
                    }
                }
            }
        }

        let plan = if desc.device_added {
            let add = run(&AddExecutor::new(ctx.clone()), &plan).await?;
            let added: Vec<String> = plan
                .absent
                .iter()
                .filter(|ip| add.outcome_for(ip) == Some(&DeviceOutcome::Succeeded))
                .cloned()
                .collect();
            steps.push(add);
            plan.with_added(added)
        } else {
            plan
        };

        if desc.add_user_defined_field.is_some() && !plan.added.is_empty() {
            steps.push(run(&UdfExecutor::new(ctx.clone(), UdfScope::Added), &plan).await?);
        }

        if desc.provision_wired_device.is_some() {
            steps.push(run(&ProvisionExecutor::wired(ctx.clone()), &plan).await?);
        }
        if desc.wireless().is_some() {
            steps.push(run(&ProvisionExecutor::wireless(ctx.clone()), &plan).await?);
        }
        if desc.device_resync {
            steps.push(run(&ResyncExecutor::new(ctx.clone()), &plan).await?);
        }
        if desc.reboot_device {
            steps.push(run(&RebootExecutor::new(ctx.clone()), &plan).await?);
        }
        if desc.export_device_list.is_some() {
            steps.push(run(&ExportExecutor::new(ctx.clone()), &plan).await?);
        }

        Ok(steps)
    }
}

/// Run one executor. Only validation and inventory errors abort the pass;
/// anything else becomes a failed step.
async fn run(executor: &dyn Executor, plan: &Plan<'_>) -> Result<StepReport> {
    let kind = executor.kind();
    debug!("Running {} executor", kind);
    match executor.execute(plan).await {
        Ok(report) => Ok(report),
        Err(e @ (ReconcileError::Validation(_) | ReconcileError::Inventory(_))) => Err(e),
        Err(e) => {
            error!("{} failed: {}", kind, e);
            let mut report = StepReport::new(kind).with_message(format!("{} failed: {}", kind, e));
            report.failed = true;
            Ok(report)
        }
    }
}
