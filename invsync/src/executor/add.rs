//! Add executor - adds devices missing from inventory.

use async_trait::async_trait;
use tracing::info;

use super::{status_echo, ExecContext, Executor, Plan};
use crate::clients::Operation;
use crate::descriptor::DeviceType;
use crate::error::Result;
use crate::outcome::{DeviceOutcome, OperationKind, StepReport};
use crate::payload::DevicePayload;

const MERAKI_TARGET: &str = "meraki-dashboard";

/// Adds the absent targets of a playbook entry in one request.
pub struct AddExecutor {
    ctx: ExecContext,
}

impl AddExecutor {
    pub fn new(ctx: ExecContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Executor for AddExecutor {
    fn kind(&self) -> OperationKind {
        OperationKind::Add
    }

    async fn execute(&self, plan: &Plan<'_>) -> Result<StepReport> {
        let desc = plan.descriptor;
        let mut report = StepReport::new(self.kind());

        // Dashboards are identified by their API key, not an address.
        let dashboard_only =
            desc.device_type == DeviceType::MerakiDashboard && !desc.has_identity();

        for ip in &plan.present {
            report.record(ip, DeviceOutcome::Unchanged("already present".to_string()));
        }

        if plan.absent.is_empty() && !dashboard_only {
            info!("Device(s) {:?} already present in inventory", plan.present);
            return Ok(report.with_message(format!(
                "Device(s) {:?} already present in inventory",
                plan.present
            )));
        }

        let payload = DevicePayload::for_add(desc, plan.absent.clone());
        let targets = if dashboard_only {
            vec![MERAKI_TARGET.to_string()]
        } else {
            plan.absent.clone()
        };

        info!("Adding {} device(s): {:?}", targets.len(), targets);
        let (outcome, status) = super::device_outcome(
            self.ctx
                .run_task(Operation::AddDevices(payload), self.kind(), &targets)
                .await,
        );

        for target in &targets {
            self.ctx.audit_outcome(self.kind(), target, &outcome);
            report.record(target, outcome.clone());
        }

        let message = match &outcome {
            DeviceOutcome::Failed(reason) => {
                format!("Device addition failed because of {}", reason)
            }
            _ => format!("Device(s) {:?} added to inventory", targets),
        };
        info!("{}", message);

        let mut report = report.with_message(message);
        if let Some(status) = status {
            report = report.with_response(status_echo(&targets.join(","), &status));
        }
        Ok(report)
    }
}
