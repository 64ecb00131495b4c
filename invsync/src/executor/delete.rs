//! Delete executors - devices and global user defined fields.

use async_trait::async_trait;
use tracing::{info, warn};

use super::{status_echo, ExecContext, Executor, Plan};
use crate::clients::Operation;
use crate::error::Result;
use crate::outcome::{DeviceOutcome, OperationKind, StepReport};

/// Removes devices from inventory, de-provisioning SDA devices first.
pub struct DeleteDeviceExecutor {
    ctx: ExecContext,
}

impl DeleteDeviceExecutor {
    pub fn new(ctx: ExecContext) -> Self {
        Self { ctx }
    }

    async fn delete_one(&self, plan: &Plan<'_>, ip: &str) -> (DeviceOutcome, Option<serde_json::Value>) {
        let provisioned = match self.ctx.controller.is_wired_provisioned(ip).await {
            Ok(provisioned) => provisioned,
            Err(e) => {
                warn!("Failed to read provisioning state of {}: {}", ip, e);
                false
            }
        };

        // De-provisioning removes the device from inventory as well.
        if provisioned {
            let op = Operation::DeleteProvisioned {
                management_ip: ip.to_string(),
            };
            let (outcome, status) = self
                .ctx
                .run_for_device(op, OperationKind::DeleteProvisioned, ip)
                .await;
            return (outcome, status.map(|s| status_echo(ip, &s)));
        }

        let Some(record) = self.ctx.prober.device_detail(ip).await else {
            return (
                DeviceOutcome::Failed("device details unavailable".to_string()),
                None,
            );
        };
        let op = Operation::DeleteDevice {
            device_id: record.id,
            clean_config: plan.descriptor.clean_config,
        };
        let (outcome, status) = self
            .ctx
            .run_for_device(op, OperationKind::DeleteDevice, ip)
            .await;
        (outcome, status.map(|s| status_echo(ip, &s)))
    }
}

#[async_trait]
impl Executor for DeleteDeviceExecutor {
    fn kind(&self) -> OperationKind {
        OperationKind::DeleteDevice
    }

    async fn execute(&self, plan: &Plan<'_>) -> Result<StepReport> {
        let mut report = StepReport::new(self.kind());
        let mut messages = Vec::new();

        for ip in &plan.targets {
            if !plan.is_present(ip) {
                let message = format!(
                    "Device '{}' is not present in inventory so can't perform delete operation",
                    ip
                );
                info!("{}", message);
                report.record(ip, DeviceOutcome::Unchanged(message.clone()));
                messages.push(message);
                continue;
            }

            let (outcome, echo) = self.delete_one(plan, ip).await;
            let message = match &outcome {
                DeviceOutcome::Failed(reason) => {
                    warn!("Device '{}' deletion failed due to: {}", ip, reason);
                    format!("Device '{}' deletion get failed due to: {}", ip, reason)
                }
                _ => {
                    info!("Device '{}' was successfully deleted", ip);
                    format!("Device '{}' was successfully deleted", ip)
                }
            };
            if let Some(echo) = echo {
                report.response = echo;
            }
            messages.push(message);
            report.record(ip, outcome);
        }

        Ok(report.with_message(messages.join("; ")))
    }
}

/// Deletes a global user defined field by name.
pub struct DeleteUdfExecutor {
    ctx: ExecContext,
}

impl DeleteUdfExecutor {
    pub fn new(ctx: ExecContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Executor for DeleteUdfExecutor {
    fn kind(&self) -> OperationKind {
        OperationKind::DeleteUdf
    }

    async fn execute(&self, plan: &Plan<'_>) -> Result<StepReport> {
        let mut report = StepReport::new(self.kind());
        let Some(name) = plan
            .descriptor
            .add_user_defined_field
            .as_ref()
            .and_then(|u| u.name.as_deref())
        else {
            return Ok(report);
        };

        let existing = match self.ctx.controller.list_udfs(name).await {
            Ok(existing) => existing,
            Err(e) => {
                report.failed = true;
                return Ok(report.with_message(format!(
                    "Error while deleting Global UDF '{}': {}",
                    name, e
                )));
            }
        };

        let Some(udf) = existing.into_iter().next() else {
            let message = format!("Global UDF '{}' is not present in inventory", name);
            info!("{}", message);
            return Ok(report.with_message(message));
        };

        let op = Operation::DeleteUdf { udf_id: udf.id };
        let (outcome, status) = self.ctx.run_for_device(op, self.kind(), name).await;
        let message = match &outcome {
            DeviceOutcome::Failed(reason) => {
                warn!("Failed to delete Global UDF '{}': {}", name, reason);
                format!(
                    "Failed to delete Global User Defined Field(UDF) due to: {}",
                    reason
                )
            }
            _ => {
                info!("Global UDF '{}' deleted", name);
                format!("Global UDF '{}' deleted successfully", name)
            }
        };
        if let Some(status) = status {
            report.response = status_echo(name, &status);
        }
        report.changed = outcome.is_succeeded();
        report.failed = outcome.is_failed();
        Ok(report.with_message(message))
    }
}
