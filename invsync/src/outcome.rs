//! Per-device outcomes, step reports and the aggregate result of a pass.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clients::ExportRow;
use crate::verifier::VerificationReport;

/// Kind of controller operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    Add,
    UpdateRole,
    UpdateInterface,
    UpdateCredentials,
    UpdateManagementIp,
    Resync,
    Reboot,
    ProvisionWired,
    ProvisionWireless,
    AddUdf,
    DeleteDevice,
    DeleteProvisioned,
    DeleteUdf,
    Export,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Add => "add",
            OperationKind::UpdateRole => "update-role",
            OperationKind::UpdateInterface => "update-interface",
            OperationKind::UpdateCredentials => "update-credentials",
            OperationKind::UpdateManagementIp => "update-management-ip",
            OperationKind::Resync => "resync",
            OperationKind::Reboot => "reboot",
            OperationKind::ProvisionWired => "provision-wired",
            OperationKind::ProvisionWireless => "provision-wireless",
            OperationKind::AddUdf => "add-udf",
            OperationKind::DeleteDevice => "delete-device",
            OperationKind::DeleteProvisioned => "delete-provisioned",
            OperationKind::DeleteUdf => "delete-udf",
            OperationKind::Export => "export",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result for one target of a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum DeviceOutcome {
    Succeeded,
    /// Desired state was already in place, or there was nothing to do.
    Unchanged(String),
    Failed(String),
}

impl DeviceOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, DeviceOutcome::Failed(_))
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(self, DeviceOutcome::Succeeded)
    }
}

/// Outcome tied to the device (or object) it concerns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetOutcome {
    pub target: String,
    #[serde(flatten)]
    pub outcome: DeviceOutcome,
}

/// Result of an export step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportReport {
    pub file_name: String,
    pub rows: Vec<ExportRow>,
}

/// Report of one executor run.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub kind: OperationKind,
    pub outcomes: Vec<TargetOutcome>,
    pub changed: bool,
    pub failed: bool,
    pub message: String,
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub response: serde_json::Value,
    #[serde(skip)]
    pub export: Option<ExportReport>,
}

impl StepReport {
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            outcomes: Vec::new(),
            changed: false,
            failed: false,
            message: String::new(),
            response: serde_json::Value::Null,
            export: None,
        }
    }

    /// A step that had nothing to do.
    pub fn noop(kind: OperationKind, message: impl Into<String>) -> Self {
        Self::new(kind).with_message(message)
    }

    /// Record one target. `changed` and `failed` follow the outcomes.
    pub fn record(&mut self, target: impl Into<String>, outcome: DeviceOutcome) {
        self.changed |= outcome.is_succeeded();
        self.failed |= outcome.is_failed();
        self.outcomes.push(TargetOutcome {
            target: target.into(),
            outcome,
        });
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_response(mut self, response: serde_json::Value) -> Self {
        self.response = response;
        self
    }

    pub fn count(&self, pred: impl Fn(&DeviceOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.outcome)).count()
    }

    pub fn outcome_for(&self, target: &str) -> Option<&DeviceOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.target == target)
            .map(|o| &o.outcome)
    }
}

/// Aggregate result of one reconciliation pass.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationResult {
    pub pass_id: String,
    pub started_at: DateTime<Utc>,
    pub succeeded: usize,
    pub already_satisfied: usize,
    pub failed_count: usize,
    pub changed: bool,
    pub failed: bool,
    pub messages: Vec<String>,
    pub steps: Vec<StepReport>,
    pub response: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export: Option<ExportReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationReport>,
}

impl ReconciliationResult {
    pub fn new(pass_id: impl Into<String>) -> Self {
        Self {
            pass_id: pass_id.into(),
            started_at: Utc::now(),
            succeeded: 0,
            already_satisfied: 0,
            failed_count: 0,
            changed: false,
            failed: false,
            messages: Vec::new(),
            steps: Vec::new(),
            response: Vec::new(),
            export: None,
            verification: None,
        }
    }

    /// Fold one step report into the result.
    pub fn fold(mut self, mut step: StepReport) -> Self {
        for o in &step.outcomes {
            match o.outcome {
                DeviceOutcome::Succeeded => self.succeeded += 1,
                DeviceOutcome::Unchanged(_) => self.already_satisfied += 1,
                DeviceOutcome::Failed(_) => self.failed_count += 1,
            }
        }
        self.changed |= step.changed;
        self.failed |= step.failed;
        if !step.message.is_empty() {
            self.messages.push(step.message.clone());
        }
        if !step.response.is_null() {
            self.response.push(step.response.clone());
        }
        if let Some(export) = step.export.take() {
            self.export = Some(export);
        }
        self.steps.push(step);
        self
    }

    pub fn with_verification(mut self, report: VerificationReport) -> Self {
        self.verification = Some(report);
        self
    }

    /// Single line summary used for logs and the CLI.
    pub fn summary(&self) -> String {
        format!(
            "{} succeeded, {} already satisfied, {} failed (changed={})",
            self.succeeded, self.already_satisfied, self.failed_count, self.changed
        )
    }
}

/// Aggregate classification of a provisioning step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionClass {
    AllAlready,
    AllProvisioned,
    AllFailed,
    Partial,
}

/// Provisioning tallies over the resolved targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProvisionTally {
    pub total: usize,
    pub already: usize,
    pub newly: usize,
}

impl ProvisionTally {
    pub fn failed(&self) -> usize {
        self.total.saturating_sub(self.already + self.newly)
    }

    /// Exactly one class holds; for an empty target list that is `AllAlready`.
    pub fn classify(&self) -> ProvisionClass {
        if self.already == self.total {
            ProvisionClass::AllAlready
        } else if self.newly == self.total {
            ProvisionClass::AllProvisioned
        } else if self.newly == 0 && self.already == 0 {
            ProvisionClass::AllFailed
        } else {
            ProvisionClass::Partial
        }
    }
}

impl ProvisionClass {
    pub fn changed(&self) -> bool {
        matches!(self, ProvisionClass::AllProvisioned | ProvisionClass::Partial)
    }

    pub fn failed(&self) -> bool {
        matches!(self, ProvisionClass::AllFailed)
    }
}
