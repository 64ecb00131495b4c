//! Audit trail of mutating controller operations.
//!
//! Events go to the `invsync::audit` tracing target so they can be routed
//! separately from operational logs.

use tracing::{info, warn};

use crate::outcome::OperationKind;

/// Audit logger for one reconciliation pass.
#[derive(Debug, Clone)]
pub struct AuditLogger {
    pass_id: String,
}

impl AuditLogger {
    pub fn new(pass_id: impl Into<String>) -> Self {
        Self {
            pass_id: pass_id.into(),
        }
    }

    fn log(&self, message: String, object_ids: &[&str]) {
        info!(target: "invsync::audit", pass = %self.pass_id, objects = ?object_ids, "{}", message);
    }

    fn log_warn(&self, message: String, object_ids: &[&str]) {
        warn!(target: "invsync::audit", pass = %self.pass_id, objects = ?object_ids, "{}", message);
    }

    // Pass events
    pub fn pass_started(&self, mode: &str, entries: usize) {
        self.log(format!("Reconciliation started: {} ({} entries)", mode, entries), &[]);
    }

    pub fn pass_finished(&self, summary: &str) {
        self.log(format!("Reconciliation finished: {}", summary), &[]);
    }

    // Task events
    pub fn submitted(&self, kind: OperationKind, handle: &str, targets: &[String]) {
        let ids: Vec<&str> = targets.iter().map(String::as_str).collect();
        self.log(format!("Submitted {}: {}", kind, handle), &ids);
    }

    pub fn completed(&self, kind: OperationKind, target: &str) {
        self.log(format!("Completed {}", kind), &[target]);
    }

    pub fn failed(&self, kind: OperationKind, target: &str, reason: &str) {
        self.log_warn(format!("Failed {}: {}", kind, reason), &[target]);
    }

    // UDF events
    pub fn udf_created(&self, name: &str) {
        self.log(format!("User defined field created: {}", name), &[name]);
    }

    pub fn udf_assigned(&self, name: &str, device_id: &str) {
        self.log(format!("User defined field {} assigned", name), &[device_id]);
    }
}
