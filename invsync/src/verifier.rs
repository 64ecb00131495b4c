//! Post-pass verification.
//!
//! Re-reads controller state after a pass and checks it against the
//! playbook. Results are logged and attached to the pass result; they never
//! change the pass outcome.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{info, warn};

use crate::clients::ExportRow;
use crate::config::Mode;
use crate::descriptor::{DeviceDescriptor, DeviceType, ExportOperation};
use crate::executor::export::fetch_export;
use crate::executor::update::interface_matches;
use crate::executor::ExecContext;

/// One verification check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationCheck {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

/// All checks of a verification run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub checks: Vec<VerificationCheck>,
}

impl VerificationReport {
    pub fn push(&mut self, name: impl Into<String>, passed: bool, detail: impl Into<String>) {
        let check = VerificationCheck {
            name: name.into(),
            passed,
            detail: detail.into(),
        };
        if check.passed {
            info!(check = %check.name, "Verified: {}", check.detail);
        } else {
            warn!(check = %check.name, "Verification failed: {}", check.detail);
        }
        self.checks.push(check);
    }

    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn failed(&self) -> impl Iterator<Item = &VerificationCheck> {
        self.checks.iter().filter(|c| !c.passed)
    }
}

/// Re-probes the controller after a pass.
pub struct Verifier {
    ctx: ExecContext,
}

impl Verifier {
    pub fn new(ctx: ExecContext) -> Self {
        Self { ctx }
    }

    pub async fn verify(&self, descriptors: &[DeviceDescriptor], mode: Mode) -> VerificationReport {
        let mut report = VerificationReport::default();

        let inventory = match self.ctx.prober.list_existing_devices().await {
            Ok(inventory) => inventory,
            Err(e) => {
                report.push("inventory", false, format!("cannot list inventory: {}", e));
                return report;
            }
        };

        for desc in descriptors {
            let targets = self.ctx.prober.resolve_identity(desc).await;
            match mode {
                Mode::Merged => self.verify_merged(desc, &targets, &inventory, &mut report).await,
                Mode::Deleted => self.verify_deleted(desc, &targets, &inventory, &mut report).await,
            }
        }

        if report.all_passed() {
            info!("Verification passed: {} check(s)", report.checks.len());
        }
        report
    }

    async fn verify_merged(
        &self,
        desc: &DeviceDescriptor,
        targets: &[String],
        inventory: &BTreeSet<String>,
        report: &mut VerificationReport,
    ) {
        if desc.device_added {
            let missing: Vec<&String> = targets.iter().filter(|ip| !inventory.contains(*ip)).collect();
            report.push(
                "devices-added",
                missing.is_empty(),
                if missing.is_empty() {
                    format!("device(s) {:?} present in inventory", targets)
                } else {
                    format!("device(s) {:?} missing from inventory", missing)
                },
            );
        }

        let present: Vec<String> = targets
            .iter()
            .filter(|ip| inventory.contains(*ip))
            .cloned()
            .collect();

        if desc.device_updated {
            if let Some(role) = desc.update_device_role.as_ref().and_then(|r| r.role.clone()) {
                for ip in &present {
                    let current = self.ctx.prober.device_detail(ip).await.and_then(|r| r.role);
                    report.push(
                        format!("role:{}", ip),
                        current.as_deref() == Some(role.as_str()),
                        format!("expected role {}, found {:?}", role, current),
                    );
                }
            }

            if let Some(update) = &desc.update_interface_details {
                if let Some(name) = update.interface_name.as_deref() {
                    for ip in &present {
                        let passed = self.interface_converged(ip, name, update).await;
                        report.push(
                            format!("interface:{}:{}", ip, name),
                            passed,
                            format!("interface {} of {}", name, ip),
                        );
                    }
                }
            }

            if let Some(change) = desc.management_ip_change() {
                let passed = inventory.contains(&change.new_mgmt_ipaddress);
                report.push(
                    "management-ip",
                    passed,
                    format!("{} present in inventory", change.new_mgmt_ipaddress),
                );
            }

            if desc.credential_update && desc.device_type == DeviceType::NetworkDevice {
                self.verify_credentials(desc, &present, report).await;
            }
        }

        if let Some(name) = desc
            .add_user_defined_field
            .as_ref()
            .and_then(|u| u.name.as_deref())
        {
            let exists = self
                .ctx
                .controller
                .list_udfs(name)
                .await
                .is_ok_and(|udfs| !udfs.is_empty());
            report.push(format!("udf:{}", name), exists, format!("Global UDF '{}' exists", name));
        }

        if desc.provision_wired_device.is_some() {
            for ip in &present {
                let provisioned = self
                    .ctx
                    .controller
                    .is_wired_provisioned(ip)
                    .await
                    .unwrap_or(false);
                report.push(
                    format!("provisioned:{}", ip),
                    provisioned,
                    format!("wired device {} provisioned", ip),
                );
            }
        }
    }

    async fn verify_deleted(
        &self,
        desc: &DeviceDescriptor,
        targets: &[String],
        inventory: &BTreeSet<String>,
        report: &mut VerificationReport,
    ) {
        if let Some(name) = desc
            .add_user_defined_field
            .as_ref()
            .and_then(|u| u.name.as_deref())
        {
            let gone = self
                .ctx
                .controller
                .list_udfs(name)
                .await
                .is_ok_and(|udfs| udfs.is_empty());
            report.push(format!("udf-deleted:{}", name), gone, format!("Global UDF '{}' absent", name));
            return;
        }

        let remaining: Vec<&String> = targets.iter().filter(|ip| inventory.contains(*ip)).collect();
        report.push(
            "devices-deleted",
            remaining.is_empty(),
            if remaining.is_empty() {
                format!("device(s) {:?} absent from inventory", targets)
            } else {
                format!("device(s) {:?} still in inventory", remaining)
            },
        );
    }

    async fn interface_converged(
        &self,
        ip: &str,
        name: &str,
        update: &crate::descriptor::InterfaceUpdate,
    ) -> bool {
        let Some(record) = self.ctx.prober.device_detail(ip).await else {
            return false;
        };
        match self.ctx.controller.interface_by_name(&record.id, name).await {
            Ok(Some(interface)) => interface_matches(update, &interface),
            _ => false,
        }
    }

    async fn verify_credentials(
        &self,
        desc: &DeviceDescriptor,
        present: &[String],
        report: &mut VerificationReport,
    ) {
        let ids = self
            .ctx
            .prober
            .device_ids(present)
            .await
            .into_iter()
            .map(|(_, id)| id)
            .collect();

        match fetch_export(
            &self.ctx,
            ids,
            &self.ctx.export_password,
            ExportOperation::CredentialDetails,
            None,
        )
        .await
        {
            Ok(export) => {
                for row in &export.rows {
                    let ip = row.get("ip_address").cloned().unwrap_or_default();
                    let mismatched = credential_mismatches(desc, row);
                    report.push(
                        format!("credentials:{}", ip),
                        mismatched.is_empty(),
                        if mismatched.is_empty() {
                            "credentials match".to_string()
                        } else {
                            format!("mismatched fields {:?}", mismatched)
                        },
                    );
                }
            }
            Err(e) => report.push("credentials", false, format!("cannot export credentials: {}", e)),
        }
    }
}

/// Playbook credential fields that differ from an exported row.
pub fn credential_mismatches(desc: &DeviceDescriptor, row: &ExportRow) -> Vec<&'static str> {
    let pairs: [(&'static str, Option<&str>); 5] = [
        ("cli_username", desc.username.as_deref()),
        ("cli_password", desc.password.as_deref()),
        ("cli_enable_password", desc.enable_password.as_deref()),
        ("snmpv3_user_name", desc.snmp_username.as_deref()),
        ("snmpv3_auth_type", Some(desc.snmp_auth_protocol.as_str())),
    ];

    let mut mismatched: Vec<&'static str> = pairs
        .into_iter()
        .filter_map(|(column, wanted)| {
            let wanted = wanted?;
            let found = row.get(column)?;
            (found != wanted).then_some(column)
        })
        .collect();

    if let Some(retries) = row.get("snmp_retries").and_then(|r| r.parse::<u32>().ok()) {
        if retries != desc.snmp_retry {
            mismatched.push("snmp_retries");
        }
    }
    mismatched
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_mismatches() {
        let desc: DeviceDescriptor =
            serde_yaml::from_str("username: admin\npassword: secret\nsnmp_retry: 3").unwrap();
        let row: ExportRow = [
            ("cli_username", "admin"),
            ("cli_password", "other"),
            ("snmpv3_auth_type", "SHA"),
            ("snmp_retries", "3"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        assert_eq!(credential_mismatches(&desc, &row), vec!["cli_password"]);
    }

    #[test]
    fn test_report_all_passed() {
        let mut report = VerificationReport::default();
        report.push("a", true, "ok");
        assert!(report.all_passed());
        report.push("b", false, "nope");
        assert!(!report.all_passed());
        assert_eq!(report.failed().count(), 1);
    }
}
