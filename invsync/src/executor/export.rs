//! Export executor - device and credential reports.

use async_trait::async_trait;
use chrono::Local;
use tracing::{error, info};

use super::{ExecContext, Executor, Plan};
use crate::clients::{ExportJob, Operation};
use crate::descriptor::ExportOperation;
use crate::error::{ControllerError, Result};
use crate::outcome::{ExportReport, OperationKind, StepReport};
use crate::poller::TaskOutcome;
use crate::validation::{is_valid_password, ValidationError};

/// Run an export job, download its file and parse the rows.
pub async fn fetch_export(
    ctx: &ExecContext,
    device_ids: Vec<String>,
    password: &str,
    operation: ExportOperation,
    parameters: Option<Vec<String>>,
) -> Result<ExportReport> {
    let job = ExportJob {
        device_uuids: device_ids.clone(),
        password: password.to_string(),
        operation_enum: operation.as_enum().to_string(),
        parameters,
    };

    let status = match ctx
        .run_task(Operation::Export(job), OperationKind::Export, &device_ids)
        .await?
    {
        TaskOutcome::Success(status) => status,
        other => {
            let reason = other.failure().unwrap_or_default();
            return Err(ControllerError::Rejected(format!(
                "Could not get the File ID because of {}",
                reason
            ))
            .into());
        }
    };

    let file_id = status
        .additional_status_url
        .as_deref()
        .and_then(|url| url.rsplit('/').next())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ControllerError::Decode("export task returned no file URL".to_string()))?;

    let file = ctx.controller.download_file(file_id).await?;

    let (rows, file_name) = match operation {
        ExportOperation::CredentialDetails => {
            let rows = ctx.archive.read_rows(&file, Some(password))?;
            let stem = file
                .name
                .as_deref()
                .and_then(|n| n.split('.').next())
                .filter(|s| !s.is_empty())
                .unwrap_or("credentials");
            (rows, format!("{}.csv", stem))
        }
        ExportOperation::DeviceDetails => {
            let rows = ctx.archive.read_rows(&file, None)?;
            (rows, device_details_file_name())
        }
    };

    Ok(ExportReport { file_name, rows })
}

/// `devices-MM-DD-YYYY.csv` for today's date.
pub fn device_details_file_name() -> String {
    format!("devices-{}.csv", Local::now().format("%m-%d-%Y"))
}

/// Exports device or credential details of the resolved devices.
pub struct ExportExecutor {
    ctx: ExecContext,
}

impl ExportExecutor {
    pub fn new(ctx: ExecContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Executor for ExportExecutor {
    fn kind(&self) -> OperationKind {
        OperationKind::Export
    }

    async fn execute(&self, plan: &Plan<'_>) -> Result<StepReport> {
        let mut report = StepReport::new(self.kind());
        let Some(request) = &plan.descriptor.export_device_list else {
            return Ok(report);
        };

        let operation = request.operation()?;
        let password = request
            .password
            .as_deref()
            .ok_or(ValidationError::ExportPasswordRequired)?;
        if !is_valid_password(password) {
            return Err(ValidationError::WeakExportPassword.into());
        }

        let ids: Vec<String> = self
            .ctx
            .prober
            .device_ids(&plan.targets)
            .await
            .into_iter()
            .map(|(_, id)| id)
            .collect();

        if ids.is_empty() {
            let message = "Could not find device UUIDs for exporting device details";
            error!("{}", message);
            report.failed = true;
            return Ok(report.with_message(message));
        }

        match fetch_export(&self.ctx, ids, password, operation, request.parameters.clone()).await {
            Ok(export) => {
                let message = format!(
                    "Device Details Exported Successfully to the CSV file: {}",
                    export.file_name
                );
                info!("{}", message);
                report.changed = true;
                report.export = Some(export);
                Ok(report.with_message(message))
            }
            Err(e) => {
                let message = format!(
                    "Error while exporting device details for device(s) {:?}: {}",
                    plan.targets, e
                );
                error!("{}", message);
                report.failed = true;
                Ok(report.with_message(message))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_details_file_name_format() {
        let name = device_details_file_name();
        assert!(name.starts_with("devices-"));
        assert!(name.ends_with(".csv"));
        // devices-MM-DD-YYYY.csv
        assert_eq!(name.len(), "devices-01-31-2024.csv".len());
    }
}
