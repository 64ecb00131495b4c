//! User defined field executor - ensures a global UDF exists and attaches it.

use async_trait::async_trait;
use tracing::{error, info};

use super::{ExecContext, Executor, Plan};
use crate::descriptor::UdfDescriptor;
use crate::error::Result;
use crate::outcome::{DeviceOutcome, OperationKind, StepReport};

/// Which devices a UDF pass attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UdfScope {
    /// Devices in inventory before the pass started.
    Existing,
    /// Devices added earlier in this pass.
    Added,
}

pub struct UdfExecutor {
    ctx: ExecContext,
    scope: UdfScope,
}

impl UdfExecutor {
    pub fn new(ctx: ExecContext, scope: UdfScope) -> Self {
        Self { ctx, scope }
    }

    /// Create the UDF unless one with the same name exists. Returns whether
    /// it was created.
    async fn ensure_exists(&self, udf: &UdfDescriptor, name: &str) -> Result<bool> {
        let existing = self.ctx.controller.list_udfs(name).await?;
        if !existing.is_empty() {
            return Ok(false);
        }
        info!("Global User Defined Field '{}' does not exist, creating it", name);
        self.ctx.controller.create_udf(udf).await?;
        self.ctx.audit.udf_created(name);
        Ok(true)
    }
}

#[async_trait]
impl Executor for UdfExecutor {
    fn kind(&self) -> OperationKind {
        OperationKind::AddUdf
    }

    async fn execute(&self, plan: &Plan<'_>) -> Result<StepReport> {
        let mut report = StepReport::new(self.kind());
        let Some(udf) = &plan.descriptor.add_user_defined_field else {
            return Ok(report);
        };
        let Some(name) = udf.name.as_deref() else {
            return Ok(report);
        };

        let targets = match self.scope {
            UdfScope::Existing => &plan.present,
            UdfScope::Added => &plan.added,
        };
        let devices = self.ctx.prober.device_ids(targets).await;

        if devices.is_empty() {
            // Devices about to be added get the field in the second pass.
            let pending = self.scope == UdfScope::Existing
                && plan.descriptor.device_added
                && !plan.absent.is_empty();
            if pending {
                return Ok(report);
            }
            let message = "Can't Assign Global User Defined Field to device as device's are not present in inventory";
            info!("{}", message);
            report.failed = true;
            return Ok(report.with_message(message));
        }

        match self.ensure_exists(udf, name).await {
            Ok(true) => report.changed = true,
            Ok(false) => {}
            Err(e) => {
                let message = format!(
                    "Error while creating Global UDF(User Defined Field) '{}': {}",
                    name, e
                );
                error!("{}", message);
                report.failed = true;
                return Ok(report.with_message(message));
            }
        }

        let value = udf.value_or_default();
        for (ip, device_id) in &devices {
            let outcome = match self.ctx.controller.assign_udf(device_id, name, value).await {
                Ok(()) => {
                    self.ctx.audit.udf_assigned(name, device_id);
                    DeviceOutcome::Succeeded
                }
                Err(e) => {
                    error!("Error while adding Global UDF to device {}: {}", ip, e);
                    DeviceOutcome::Failed(e.to_string())
                }
            };
            report.record(ip, outcome);
        }

        let message = format!(
            "Global User Defined Field(UDF) named '{}' has been successfully added to the device.",
            name
        );
        info!("{}", message);
        Ok(report.with_message(message))
    }
}
