//! Provision executor - wired (SDA) and wireless provisioning.
//!
//! Each device must reach the managed state before it can be provisioned.
//! The step is then classified over all resolved targets.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{ExecContext, Executor, Plan};
use crate::clients::{ControllerApi, DeviceRecord, Operation};
use crate::descriptor::WirelessProvision;
use crate::error::{ControllerError, Result};
use crate::outcome::{
    DeviceOutcome, OperationKind, ProvisionClass, ProvisionTally, StepReport,
};
use crate::payload::WirelessProvisionPayload;
use crate::poller::{wait_for, TaskOutcome};
use crate::validation::ValidationError;

const ALREADY_PROVISIONED: &str = "already provisioned";

/// Check that every managed AP location of a wireless section is a floor.
pub async fn validate_ap_locations(
    controller: &dyn ControllerApi,
    wireless: &WirelessProvision,
) -> Result<()> {
    for location in &wireless.managed_ap_locations {
        let site = controller
            .site_by_name(location)
            .await?
            .ok_or_else(|| ValidationError::SiteNotFound(location.clone()))?;
        let site_type = site.site_type().unwrap_or_default();
        if site_type != "floor" {
            return Err(ValidationError::ApLocationNotFloor {
                location: location.clone(),
                site_type: site_type.to_string(),
            }
            .into());
        }
    }
    Ok(())
}

/// Provisions devices to their site, wired or wireless.
pub struct ProvisionExecutor {
    ctx: ExecContext,
    kind: OperationKind,
}

impl ProvisionExecutor {
    pub fn wired(ctx: ExecContext) -> Self {
        Self {
            ctx,
            kind: OperationKind::ProvisionWired,
        }
    }

    pub fn wireless(ctx: ExecContext) -> Self {
        Self {
            ctx,
            kind: OperationKind::ProvisionWireless,
        }
    }

    fn label(&self) -> &'static str {
        match self.kind {
            OperationKind::ProvisionWireless => "Wireless",
            _ => "Wired",
        }
    }

    /// Wait until the device is managed and has a hostname.
    async fn wait_managed(&self, ip: &str) -> std::result::Result<Option<DeviceRecord>, ControllerError> {
        let policy = self.ctx.poller.polling().managed_policy(self.kind);
        wait_for(&policy, |attempt| async move {
            let record = self.ctx.prober.device_detail(ip).await;
            if let Some(r) = &record {
                debug!(
                    attempt,
                    "Device {} is in {:?} state waiting for Managed State",
                    ip,
                    r.management_state
                );
            }
            Ok(record.filter(DeviceRecord::is_managed))
        })
        .await
    }

    fn operation(&self, plan: &Plan<'_>, ip: &str, record: &DeviceRecord) -> Option<Operation> {
        match self.kind {
            OperationKind::ProvisionWireless => {
                let wireless = plan.descriptor.wireless()?;
                let hostname = record.hostname.clone().unwrap_or_default();
                Some(Operation::ProvisionWireless(WirelessProvisionPayload::new(
                    wireless, hostname,
                )))
            }
            _ => {
                let site = plan.descriptor.provision_wired_device.as_ref()?.site_name.clone()?;
                Some(Operation::ProvisionWired {
                    site_name: site,
                    management_ip: ip.to_string(),
                })
            }
        }
    }

    /// Provision one device. `Unchanged` means it was already provisioned.
    async fn provision_device(&self, plan: &Plan<'_>, ip: &str) -> DeviceOutcome {
        let record = match self.wait_managed(ip).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!(
                    "Device {} is not transitioning to the managed state, so provisioning operation cannot be performed",
                    ip
                );
                return DeviceOutcome::Failed("device did not reach the managed state".to_string());
            }
            Err(e) => return DeviceOutcome::Failed(e.to_string()),
        };

        let Some(op) = self.operation(plan, ip, &record) else {
            return DeviceOutcome::Failed("no provisioning settings".to_string());
        };

        match self.ctx.run_task(op, self.kind, &[ip.to_string()]).await {
            Ok(TaskOutcome::Success(_)) => DeviceOutcome::Succeeded,
            Ok(TaskOutcome::Failed(reason)) if reason.contains(ALREADY_PROVISIONED) => {
                DeviceOutcome::Unchanged(format!("Device '{}' already provisioned", ip))
            }
            Ok(other) => DeviceOutcome::Failed(other.failure().unwrap_or_default()),
            Err(e) if e.is_already_provisioned() => {
                info!("{}", e);
                DeviceOutcome::Unchanged(format!("Device '{}' already provisioned", ip))
            }
            Err(e) => DeviceOutcome::Failed(e.to_string()),
        }
    }
}

#[async_trait]
impl Executor for ProvisionExecutor {
    fn kind(&self) -> OperationKind {
        self.kind
    }

    async fn execute(&self, plan: &Plan<'_>) -> Result<StepReport> {
        let label = self.label();
        let total = plan.targets.len();

        if total == 0 {
            return Ok(StepReport::noop(
                self.kind,
                format!("No devices to provision for {} Devices", label),
            ));
        }

        let mut report = StepReport::new(self.kind);
        let mut tally = ProvisionTally {
            total,
            ..Default::default()
        };

        for ip in &plan.targets {
            if !plan.is_present(ip) {
                report.record(ip, DeviceOutcome::Failed("device not in inventory".to_string()));
                continue;
            }

            let outcome = self.provision_device(plan, ip).await;
            match &outcome {
                DeviceOutcome::Succeeded => {
                    info!("{} Device '{}' provisioned successfully", label, ip);
                    tally.newly += 1;
                }
                DeviceOutcome::Unchanged(reason) => {
                    info!("{}", reason);
                    tally.already += 1;
                }
                DeviceOutcome::Failed(reason) => {
                    warn!("{} Device '{}' provisioning failed: {}", label, ip, reason);
                }
            }
            self.ctx.audit_outcome(self.kind, ip, &outcome);
            report.record(ip, outcome);
        }

        let class = tally.classify();
        let message = match class {
            ProvisionClass::AllAlready => {
                format!("{} Device(s) {:?} already provisioned", label, plan.targets)
            }
            ProvisionClass::AllProvisioned => {
                format!("{} device(s) provisioned successfully", label)
            }
            ProvisionClass::AllFailed => format!("{} device provisioning failed", label),
            ProvisionClass::Partial => format!(
                "{} device(s) provisioned successfully, {} already provisioned, {} failed",
                tally.newly,
                tally.already,
                tally.failed()
            ),
        };
        info!("{}", message);

        report.changed = class.changed();
        report.failed = class.failed();
        Ok(report.with_message(message))
    }
}
