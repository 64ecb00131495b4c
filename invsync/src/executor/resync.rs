//! Resync executor - resynchronizes non access point devices.

use async_trait::async_trait;
use tracing::{info, warn};

use super::{device_outcome, status_echo, ExecContext, Executor, Plan};
use crate::clients::Operation;
use crate::error::Result;
use crate::outcome::{DeviceOutcome, OperationKind, StepReport};
use crate::prober::partition_access_points;

pub struct ResyncExecutor {
    ctx: ExecContext,
}

impl ResyncExecutor {
    pub fn new(ctx: ExecContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Executor for ResyncExecutor {
    fn kind(&self) -> OperationKind {
        OperationKind::Resync
    }

    async fn execute(&self, plan: &Plan<'_>) -> Result<StepReport> {
        let records = self.ctx.prober.device_records(&plan.present).await;
        let (devices, _access_points) = partition_access_points(records);

        if devices.is_empty() {
            let message = format!(
                "No devices to resync among {:?}, access points are excluded",
                plan.targets
            );
            info!("{}", message);
            return Ok(StepReport::noop(self.kind(), message));
        }

        let ips: Vec<String> = devices
            .iter()
            .map(|d| d.management_ip_address.clone())
            .collect();
        let op = Operation::Resync {
            device_ids: devices.iter().map(|d| d.id.clone()).collect(),
            force_sync: plan.descriptor.force_sync,
        };

        let (outcome, status) = device_outcome(self.ctx.run_task(op, self.kind(), &ips).await);

        let mut report = StepReport::new(self.kind());
        for ip in &ips {
            self.ctx.audit_outcome(self.kind(), ip, &outcome);
            report.record(ip, outcome.clone());
        }

        let message = match &outcome {
            DeviceOutcome::Failed(reason) => {
                warn!("Device resync for {:?} failed: {}", ips, reason);
                format!("Device resynced get failed because of {}", reason)
            }
            _ => {
                info!("Devices {:?} resynced", ips);
                format!("Device(s) {:?} have been successfully resynced", ips)
            }
        };
        if let Some(status) = status {
            report = report.with_response(status_echo(&ips.join(","), &status));
        }
        Ok(report.with_message(message))
    }
}
