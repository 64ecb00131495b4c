//! Controller client abstraction.
//!
//! The reconciliation engine only talks to the controller through
//! [`ControllerApi`]. `rest` provides the HTTP implementation, tests provide
//! an in-memory one.

pub mod archive;
pub mod rest;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::descriptor::UdfDescriptor;
use crate::error::ControllerError;
use crate::payload::{DevicePayload, WirelessProvisionPayload};

pub use archive::{ArchiveReader, CsvArchiveReader, ExportRow};
pub use rest::RestController;

/// Result type for controller calls.
pub type Result<T> = std::result::Result<T, ControllerError>;

/// Device family reported for access points.
pub const ACCESS_POINT_FAMILY: &str = "Unified AP";

/// Device as reported by the controller inventory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub id: String,
    pub management_ip_address: String,
    #[serde(default)]
    pub family: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub role_source: Option<String>,
    #[serde(default)]
    pub management_state: Option<String>,
    #[serde(default)]
    pub collection_status: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub ap_ethernet_mac_address: Option<String>,
}

impl DeviceRecord {
    pub fn is_access_point(&self) -> bool {
        self.family.as_deref() == Some(ACCESS_POINT_FAMILY)
    }

    /// Managed on both state axes and a hostname has been collected.
    pub fn is_managed(&self) -> bool {
        self.management_state.as_deref() == Some("Managed")
            && self.collection_status.as_deref() == Some("Managed")
            && self.hostname.as_deref().is_some_and(|h| !h.is_empty())
    }
}

/// Inventory lookup filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceFilter {
    All,
    ManagementIp(String),
    Hostname(String),
    SerialNumber(String),
    MacAddress(String),
}

impl DeviceFilter {
    /// Query parameter for the filter, `None` for the full listing.
    pub fn query(&self) -> Option<(&'static str, &str)> {
        match self {
            DeviceFilter::All => None,
            DeviceFilter::ManagementIp(v) => Some(("managementIpAddress", v)),
            DeviceFilter::Hostname(v) => Some(("hostname", v)),
            DeviceFilter::SerialNumber(v) => Some(("serialNumber", v)),
            DeviceFilter::MacAddress(v) => Some(("macAddress", v)),
        }
    }
}

/// Interface details of a device port.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceRecord {
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub admin_status: Option<String>,
    #[serde(default)]
    pub vlan_id: Option<String>,
    #[serde(default)]
    pub voice_vlan: Option<String>,
}

/// Global user defined field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UdfRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Site record, only the location type matters here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteRecord {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub additional_info: Vec<SiteAdditionalInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteAdditionalInfo {
    pub name_space: String,
    #[serde(default)]
    pub attributes: std::collections::BTreeMap<String, String>,
}

impl SiteRecord {
    /// `type` attribute of the `Location` namespace (area, building, floor).
    pub fn site_type(&self) -> Option<&str> {
        self.additional_info
            .iter()
            .find(|info| info.name_space == "Location")
            .and_then(|info| info.attributes.get("type"))
            .map(String::as_str)
    }
}

/// A file fetched from the controller's file service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    pub name: Option<String>,
    pub bytes: Vec<u8>,
}

/// Handle to an asynchronous controller operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskHandle {
    /// Task API identifier.
    Task(String),
    /// Business API execution identifier.
    Execution(String),
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskHandle::Task(id) => write!(f, "task {}", id),
            TaskHandle::Execution(id) => write!(f, "execution {}", id),
        }
    }
}

/// Normalized status of a task or execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    #[serde(default)]
    pub progress: String,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub end_time: Option<i64>,
    #[serde(default, rename = "additionalStatusURL")]
    pub additional_status_url: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Export job parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportJob {
    pub device_uuids: Vec<String>,
    pub password: String,
    pub operation_enum: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Vec<String>>,
}

/// Operation submitted to the controller, each yielding a [`TaskHandle`].
#[derive(Debug, Clone)]
pub enum Operation {
    AddDevices(DevicePayload),
    UpdateDevices(DevicePayload),
    UpdateRole {
        device_id: String,
        role: String,
        role_source: String,
    },
    UpdateInterface {
        interface_id: String,
        deployment_mode: String,
        payload: serde_json::Value,
    },
    Resync {
        device_ids: Vec<String>,
        force_sync: bool,
    },
    RebootAccessPoints {
        mac_addresses: Vec<String>,
    },
    ProvisionWired {
        site_name: String,
        management_ip: String,
    },
    ProvisionWireless(WirelessProvisionPayload),
    DeleteDevice {
        device_id: String,
        clean_config: bool,
    },
    DeleteProvisioned {
        management_ip: String,
    },
    DeleteUdf {
        udf_id: String,
    },
    Export(ExportJob),
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::AddDevices(_) => "add-devices",
            Operation::UpdateDevices(_) => "update-devices",
            Operation::UpdateRole { .. } => "update-role",
            Operation::UpdateInterface { .. } => "update-interface",
            Operation::Resync { .. } => "resync",
            Operation::RebootAccessPoints { .. } => "reboot-access-points",
            Operation::ProvisionWired { .. } => "provision-wired",
            Operation::ProvisionWireless(_) => "provision-wireless",
            Operation::DeleteDevice { .. } => "delete-device",
            Operation::DeleteProvisioned { .. } => "delete-provisioned",
            Operation::DeleteUdf { .. } => "delete-udf",
            Operation::Export(_) => "export",
        }
    }
}

/// Controller operations used by the reconciliation engine.
#[async_trait]
pub trait ControllerApi: Send + Sync {
    /// List inventory devices matching the filter.
    async fn list_devices(&self, filter: &DeviceFilter) -> Result<Vec<DeviceRecord>>;

    /// Submit an asynchronous operation.
    async fn submit(&self, op: Operation) -> Result<TaskHandle>;

    /// Read the current status of a submitted operation.
    async fn task_status(&self, handle: &TaskHandle) -> Result<TaskStatus>;

    /// Look up an interface of a device by name.
    async fn interface_by_name(&self, device_id: &str, name: &str)
        -> Result<Option<InterfaceRecord>>;

    /// Whether a wired device is provisioned through SDA.
    async fn is_wired_provisioned(&self, management_ip: &str) -> Result<bool>;

    /// List global user defined fields with the given name.
    async fn list_udfs(&self, name: &str) -> Result<Vec<UdfRecord>>;

    /// Create a global user defined field.
    async fn create_udf(&self, udf: &UdfDescriptor) -> Result<()>;

    /// Attach a user defined field with a value to one device.
    async fn assign_udf(&self, device_id: &str, name: &str, value: &str) -> Result<()>;

    /// Look up a site by its hierarchical name.
    async fn site_by_name(&self, name: &str) -> Result<Option<SiteRecord>>;

    /// Download a file produced by an export job.
    async fn download_file(&self, file_id: &str) -> Result<DownloadedFile>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_type_from_location_namespace() {
        let site: SiteRecord = serde_json::from_value(serde_json::json!({
            "name": "Floor1",
            "additionalInfo": [
                {"nameSpace": "com.wireless.managingwlc", "attributes": {"type": "ignored"}},
                {"nameSpace": "Location", "attributes": {"type": "floor", "address": "x"}}
            ]
        }))
        .unwrap();
        assert_eq!(site.site_type(), Some("floor"));
        assert_eq!(SiteRecord::default().site_type(), None);
    }

    #[test]
    fn test_managed_requires_both_states_and_hostname() {
        let mut record = DeviceRecord {
            management_state: Some("Managed".to_string()),
            collection_status: Some("In Progress".to_string()),
            hostname: Some("edge-1".to_string()),
            ..Default::default()
        };
        assert!(!record.is_managed());
        record.collection_status = Some("Managed".to_string());
        assert!(record.is_managed());
        record.hostname = Some(String::new());
        assert!(!record.is_managed());
    }

    #[test]
    fn test_task_status_wire_names() {
        let status: TaskStatus = serde_json::from_value(serde_json::json!({
            "progress": "{\"fileId\":\"abc\"}",
            "isError": false,
            "additionalStatusURL": "/api/v1/file/abc",
            "endTime": 1700000000000i64
        }))
        .unwrap();
        assert_eq!(status.additional_status_url.as_deref(), Some("/api/v1/file/abc"));
        assert_eq!(status.end_time, Some(1700000000000));
    }
}
