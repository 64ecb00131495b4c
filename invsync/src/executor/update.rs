//! Update executors - role, interface, credentials and management IP.
//!
//! Updates only touch devices already in inventory. When none of the
//! targeted devices is present the whole update is skipped.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::{info, warn};

use super::export::fetch_export;
use super::{status_echo, ExecContext, Executor, Plan};
use crate::clients::{ExportRow, InterfaceRecord, Operation};
use crate::descriptor::{DeviceDescriptor, ExportOperation, InterfaceUpdate};
use crate::error::{ControllerError, Result};
use crate::outcome::{DeviceOutcome, OperationKind, StepReport};
use crate::payload::{interface_payload, DevicePayload, MgmtIpUpdate};

/// Reported for interfaces the controller refuses to change.
pub const PORT_ACTION_REJECTED: &str =
    "Port actions are only supported on user facing/access ports as it's not allowed or No Updation required";

/// Update executors requested by a playbook entry, in execution order.
pub fn update_executors(ctx: &ExecContext, desc: &DeviceDescriptor) -> Vec<Box<dyn Executor>> {
    let mut executors: Vec<Box<dyn Executor>> = Vec::new();
    if desc.update_device_role.is_some() {
        executors.push(Box::new(RoleExecutor::new(ctx.clone())));
    }
    if desc.update_interface_details.is_some() {
        executors.push(Box::new(InterfaceExecutor::new(ctx.clone())));
    }
    if desc.credential_update && desc.management_ip_change().is_none() {
        executors.push(Box::new(CredentialExecutor::new(ctx.clone())));
    }
    if desc.management_ip_change().is_some() {
        executors.push(Box::new(ManagementIpExecutor::new(ctx.clone())));
    }
    executors
}

/// Report used when none of the update targets is in inventory.
pub fn skipped_update(plan: &Plan<'_>, kind: OperationKind) -> StepReport {
    let message = format!(
        "Cannot perform Update operation as device(s) {:?} not present in inventory",
        plan.targets
    );
    info!("{}", message);
    StepReport::noop(kind, message)
}

/// Updates the device role.
pub struct RoleExecutor {
    ctx: ExecContext,
}

impl RoleExecutor {
    pub fn new(ctx: ExecContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Executor for RoleExecutor {
    fn kind(&self) -> OperationKind {
        OperationKind::UpdateRole
    }

    async fn execute(&self, plan: &Plan<'_>) -> Result<StepReport> {
        let mut report = StepReport::new(self.kind());
        let Some(update) = &plan.descriptor.update_device_role else {
            return Ok(report);
        };
        let (Some(role), Some(role_source)) = (&update.role, &update.role_source) else {
            return Ok(report.with_message("Role and role source are required"));
        };

        for ip in &plan.present {
            let Some(record) = self.ctx.prober.device_detail(ip).await else {
                report.record(ip, DeviceOutcome::Failed("device details unavailable".to_string()));
                continue;
            };

            if record.role.as_deref() == Some(role.as_str()) {
                info!("Device {} already has role {}", ip, role);
                report.record(ip, DeviceOutcome::Unchanged(format!("role already {}", role)));
                continue;
            }

            let op = Operation::UpdateRole {
                device_id: record.id.clone(),
                role: role.clone(),
                role_source: role_source.clone(),
            };
            let (outcome, status) = self.ctx.run_for_device(op, self.kind(), ip).await;
            match &outcome {
                DeviceOutcome::Failed(reason) => {
                    warn!("Device role update for {} failed because of {}", ip, reason)
                }
                _ => info!("Device {} role updated to {}", ip, role),
            }
            if let Some(status) = status {
                report.response = status_echo(ip, &status);
            }
            report.record(ip, outcome);
        }

        let message = format!("Device role update: {} device(s) processed", report.outcomes.len());
        Ok(report.with_message(message))
    }
}

/// Updates one interface of every targeted device.
pub struct InterfaceExecutor {
    ctx: ExecContext,
}

impl InterfaceExecutor {
    pub fn new(ctx: ExecContext) -> Self {
        Self { ctx }
    }
}

/// Whether the interface already carries every value the playbook sets.
pub fn interface_matches(update: &InterfaceUpdate, current: &InterfaceRecord) -> bool {
    let description_ok = update
        .description
        .as_deref()
        .filter(|d| !d.is_empty())
        .is_none_or(|d| current.description.as_deref() == Some(d));
    let admin_ok = update
        .admin_status
        .as_deref()
        .filter(|s| !s.is_empty())
        .is_none_or(|s| current.admin_status.as_deref() == Some(s));
    let vlan_ok = update.vlan_id.filter(|v| *v != 0).is_none_or(|v| {
        current
            .vlan_id
            .as_deref()
            .and_then(|c| c.parse::<u32>().ok())
            == Some(v)
    });
    let voice_ok = update.voice_vlan_id.filter(|v| *v != 0).is_none_or(|v| {
        current
            .voice_vlan
            .as_deref()
            .and_then(|c| c.parse::<u32>().ok())
            == Some(v)
    });
    description_ok && admin_ok && vlan_ok && voice_ok
}

#[async_trait]
impl Executor for InterfaceExecutor {
    fn kind(&self) -> OperationKind {
        OperationKind::UpdateInterface
    }

    async fn execute(&self, plan: &Plan<'_>) -> Result<StepReport> {
        let mut report = StepReport::new(self.kind());
        let Some(update) = &plan.descriptor.update_interface_details else {
            return Ok(report);
        };
        let Some(name) = update.interface_name.as_deref() else {
            return Ok(report.with_message("Interface name is required"));
        };

        for ip in &plan.present {
            let Some(record) = self.ctx.prober.device_detail(ip).await else {
                report.record(ip, DeviceOutcome::Failed("device details unavailable".to_string()));
                continue;
            };

            let interface = match self.ctx.controller.interface_by_name(&record.id, name).await {
                Ok(Some(interface)) => interface,
                Ok(None) => {
                    report.record(
                        ip,
                        DeviceOutcome::Unchanged(format!("interface {} not found", name)),
                    );
                    continue;
                }
                Err(e) => {
                    report.record(ip, DeviceOutcome::Failed(e.to_string()));
                    continue;
                }
            };

            if interface_matches(update, &interface) {
                info!("Interface {} of {} already up to date", name, ip);
                report.record(
                    ip,
                    DeviceOutcome::Unchanged(format!("interface {} already up to date", name)),
                );
                continue;
            }

            let op = Operation::UpdateInterface {
                interface_id: interface.id.clone(),
                deployment_mode: update.deployment_mode.clone(),
                payload: interface_payload(update),
            };

            let outcome = match self.ctx.run_task(op, self.kind(), std::slice::from_ref(ip)).await {
                Ok(task) => {
                    let (outcome, status) = super::device_outcome(Ok(task));
                    if let Some(status) = status {
                        report.response = status_echo(ip, &status);
                    }
                    outcome
                }
                Err(e @ (ControllerError::Api { .. } | ControllerError::Rejected(_))) => {
                    info!("Interface update of {} rejected: {}", ip, e);
                    DeviceOutcome::Unchanged(PORT_ACTION_REJECTED.to_string())
                }
                Err(e) => DeviceOutcome::Failed(e.to_string()),
            };
            self.ctx.audit_outcome(self.kind(), ip, &outcome);
            report.record(ip, outcome);
        }

        let message = format!(
            "Interface {} update: {} device(s) processed",
            name,
            report.outcomes.len()
        );
        Ok(report.with_message(message))
    }
}

/// Export current credentials of the present targets, keyed by IP.
async fn discovered_credentials(
    ctx: &ExecContext,
    plan: &Plan<'_>,
) -> Result<BTreeMap<String, ExportRow>> {
    let ids: Vec<String> = ctx
        .prober
        .device_ids(&plan.present)
        .await
        .into_iter()
        .map(|(_, id)| id)
        .collect();

    let export = fetch_export(
        ctx,
        ids,
        &ctx.export_password,
        ExportOperation::CredentialDetails,
        None,
    )
    .await?;

    Ok(export
        .rows
        .into_iter()
        .filter_map(|row| row.get("ip_address").cloned().map(|ip| (ip, row)))
        .collect())
}

fn fail_all(report: &mut StepReport, targets: &[String], reason: &str) {
    for ip in targets {
        report.record(ip, DeviceOutcome::Failed(reason.to_string()));
    }
}

/// Pushes playbook credentials merged over the controller's current ones.
pub struct CredentialExecutor {
    ctx: ExecContext,
}

impl CredentialExecutor {
    pub fn new(ctx: ExecContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Executor for CredentialExecutor {
    fn kind(&self) -> OperationKind {
        OperationKind::UpdateCredentials
    }

    async fn execute(&self, plan: &Plan<'_>) -> Result<StepReport> {
        let mut report = StepReport::new(self.kind());

        let discovered = match discovered_credentials(&self.ctx, plan).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Credential export failed: {}", e);
                fail_all(&mut report, &plan.present, &e.to_string());
                return Ok(report.with_message(format!("Credential export failed: {}", e)));
            }
        };

        for ip in &plan.present {
            let Some(row) = discovered.get(ip) else {
                report.record(
                    ip,
                    DeviceOutcome::Failed("no exported credentials for device".to_string()),
                );
                continue;
            };

            let mut payload = DevicePayload::from_descriptor(plan.descriptor);
            payload.ip_address = vec![ip.clone()];
            payload.merge_discovered(row);
            payload.strip_for_snmp_mode();

            let (outcome, status) = self
                .ctx
                .run_for_device(Operation::UpdateDevices(payload), self.kind(), ip)
                .await;
            match &outcome {
                DeviceOutcome::Failed(reason) => {
                    warn!("Device update for {} failed due to {}", ip, reason)
                }
                _ => info!("Device {} credentials updated", ip),
            }
            if let Some(status) = status {
                report.response = status_echo(ip, &status);
            }
            report.record(ip, outcome);
        }

        let message = format!(
            "Device credential update: {} device(s) processed",
            report.outcomes.len()
        );
        Ok(report.with_message(message))
    }
}

/// Moves a device to a new management IP.
pub struct ManagementIpExecutor {
    ctx: ExecContext,
}

impl ManagementIpExecutor {
    pub fn new(ctx: ExecContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Executor for ManagementIpExecutor {
    fn kind(&self) -> OperationKind {
        OperationKind::UpdateManagementIp
    }

    async fn execute(&self, plan: &Plan<'_>) -> Result<StepReport> {
        let mut report = StepReport::new(self.kind());
        let Some(change) = plan.descriptor.management_ip_change() else {
            return Ok(report);
        };

        if plan.is_present(&change.new_mgmt_ipaddress) {
            let message = format!(
                "Device with IP address '{}' already exists in inventory",
                change.new_mgmt_ipaddress
            );
            warn!("{}", message);
            fail_all(&mut report, &plan.present, &message);
            return Ok(report.with_message(message));
        }

        let discovered = if plan.descriptor.credential_update {
            match discovered_credentials(&self.ctx, plan).await {
                Ok(rows) => Some(rows),
                Err(e) => {
                    warn!("Credential export failed: {}", e);
                    fail_all(&mut report, &plan.present, &e.to_string());
                    return Ok(report.with_message(format!("Credential export failed: {}", e)));
                }
            }
        } else {
            None
        };

        for ip in &plan.present {
            let mut payload = DevicePayload::from_descriptor(plan.descriptor);
            payload.ip_address = vec![ip.clone()];
            payload.update_mgmt_ip_address_list = vec![MgmtIpUpdate::from(change)];

            if let Some(rows) = &discovered {
                match rows.get(ip) {
                    Some(row) => payload.merge_discovered(row),
                    None => {
                        report.record(
                            ip,
                            DeviceOutcome::Failed("no exported credentials for device".to_string()),
                        );
                        continue;
                    }
                }
            }
            payload.strip_for_snmp_mode();

            let (outcome, status) = self
                .ctx
                .run_for_device(Operation::UpdateDevices(payload), self.kind(), ip)
                .await;
            match &outcome {
                DeviceOutcome::Failed(reason) => warn!(
                    "Device new management IP update for {} failed due to {}",
                    ip, reason
                ),
                _ => info!(
                    "Device {} moved to management IP {}",
                    ip, change.new_mgmt_ipaddress
                ),
            }
            if let Some(status) = status {
                report.response = status_echo(ip, &status);
            }
            report.record(ip, outcome);
        }

        let message = format!(
            "Management IP update to {}: {} device(s) processed",
            change.new_mgmt_ipaddress,
            report.outcomes.len()
        );
        Ok(report.with_message(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interface_matches_ignores_unset_fields() {
        let update = InterfaceUpdate {
            interface_name: Some("Gi1/0/2".into()),
            vlan_id: Some(20),
            ..Default::default()
        };
        let mut current = InterfaceRecord {
            id: "if-1".into(),
            description: Some("uplink".into()),
            vlan_id: Some("20".into()),
            ..Default::default()
        };
        assert!(interface_matches(&update, &current));

        current.vlan_id = Some("21".into());
        assert!(!interface_matches(&update, &current));
    }

    #[test]
    fn test_interface_matches_compares_description() {
        let update = InterfaceUpdate {
            description: Some("printer".into()),
            ..Default::default()
        };
        let current = InterfaceRecord {
            description: Some("uplink".into()),
            ..Default::default()
        };
        assert!(!interface_matches(&update, &current));
    }
}
