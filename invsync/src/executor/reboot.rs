//! Reboot executor - reboots access points by their Ethernet MAC.

use async_trait::async_trait;
use tracing::{info, warn};

use super::{device_outcome, status_echo, ExecContext, Executor, Plan};
use crate::clients::Operation;
use crate::error::Result;
use crate::outcome::{DeviceOutcome, OperationKind, StepReport};
use crate::prober::partition_access_points;

pub struct RebootExecutor {
    ctx: ExecContext,
}

impl RebootExecutor {
    pub fn new(ctx: ExecContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Executor for RebootExecutor {
    fn kind(&self) -> OperationKind {
        OperationKind::Reboot
    }

    async fn execute(&self, plan: &Plan<'_>) -> Result<StepReport> {
        let records = self.ctx.prober.device_records(&plan.present).await;
        let (_devices, access_points) = partition_access_points(records);

        // Access points without a reported Ethernet MAC cannot be addressed.
        let (ips, macs): (Vec<String>, Vec<String>) = access_points
            .into_iter()
            .filter_map(|ap| {
                let mac = ap.ap_ethernet_mac_address.filter(|m| !m.is_empty())?;
                Some((ap.management_ip_address, mac))
            })
            .unzip();

        if macs.is_empty() {
            let message = format!("No access points to reboot among {:?}", plan.targets);
            info!("{}", message);
            return Ok(StepReport::noop(self.kind(), message));
        }

        let op = Operation::RebootAccessPoints {
            mac_addresses: macs,
        };
        let (outcome, status) = device_outcome(self.ctx.run_task(op, self.kind(), &ips).await);

        let mut report = StepReport::new(self.kind());
        for ip in &ips {
            self.ctx.audit_outcome(self.kind(), ip, &outcome);
            report.record(ip, outcome.clone());
        }

        let message = match &outcome {
            DeviceOutcome::Failed(reason) => {
                warn!("Access point reboot for {:?} failed: {}", ips, reason);
                format!("AP Device Rebooting get failed because of {}", reason)
            }
            _ => {
                info!("Access points {:?} rebooted", ips);
                format!("AP Device(s) {:?} successfully rebooted", ips)
            }
        };
        if let Some(status) = status {
            report = report.with_response(status_echo(&ips.join(","), &status));
        }
        Ok(report.with_message(message))
    }
}
