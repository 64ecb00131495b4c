//! Desired device configuration, one entry per playbook item.

use serde::{Deserialize, Serialize};

use crate::validation::ValidationError;

/// Kind of device being managed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceType {
    #[default]
    NetworkDevice,
    ComputeDevice,
    MerakiDashboard,
    FirepowerManagementSystem,
    ThirdPartyDevice,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::NetworkDevice => "NETWORK_DEVICE",
            DeviceType::ComputeDevice => "COMPUTE_DEVICE",
            DeviceType::MerakiDashboard => "MERAKI_DASHBOARD",
            DeviceType::FirepowerManagementSystem => "FIREPOWER_MANAGEMENT_SYSTEM",
            DeviceType::ThirdPartyDevice => "THIRD_PARTY_DEVICE",
        }
    }
}

/// SNMPv3 security level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SnmpMode {
    #[default]
    AuthPriv,
    AuthNoPriv,
    NoAuthNoPriv,
}

/// Management IP change request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagementIpChange {
    pub exist_mgmt_ipaddress: String,
    pub new_mgmt_ipaddress: String,
}

/// Desired device role.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleUpdate {
    pub role: Option<String>,
    #[serde(default = "default_role_source")]
    pub role_source: Option<String>,
}

/// Desired interface settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterfaceUpdate {
    pub interface_name: Option<String>,
    pub description: Option<String>,
    pub admin_status: Option<String>,
    pub vlan_id: Option<u32>,
    pub voice_vlan_id: Option<u32>,
    #[serde(default = "default_deployment_mode")]
    pub deployment_mode: String,
}

/// Global user defined field to create and attach.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UdfDescriptor {
    pub name: Option<String>,
    pub description: Option<String>,
    pub value: Option<String>,
}

impl UdfDescriptor {
    /// Value attached to devices, `"1"` when none is given.
    pub fn value_or_default(&self) -> &str {
        self.value.as_deref().unwrap_or("1")
    }
}

/// What the export job should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportOperation {
    /// Encrypted archive with device credentials.
    CredentialDetails,
    /// Plain CSV with device attributes.
    DeviceDetails,
}

impl ExportOperation {
    pub fn as_enum(&self) -> &'static str {
        match self {
            ExportOperation::CredentialDetails => "0",
            ExportOperation::DeviceDetails => "1",
        }
    }
}

/// Export request section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportRequest {
    pub password: Option<String>,
    pub operation_enum: Option<String>,
    pub parameters: Option<Vec<String>>,
}

impl ExportRequest {
    pub fn operation(&self) -> Result<ExportOperation, ValidationError> {
        match self.operation_enum.as_deref().unwrap_or("0") {
            "0" | "CREDENTIALDETAILS" => Ok(ExportOperation::CredentialDetails),
            "1" | "DEVICEDETAILS" => Ok(ExportOperation::DeviceDetails),
            other => Err(ValidationError::InvalidExportOperation(other.to_string())),
        }
    }
}

/// Wired provisioning section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WiredProvision {
    pub site_name: Option<String>,
}

/// Dynamic interface of a wireless controller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicInterface {
    pub interface_ip_address: Option<String>,
    pub interface_netmask_in_cidr: Option<u8>,
    pub interface_gateway: Option<String>,
    pub lag_or_port_number: Option<u32>,
    pub vlan_id: Option<u32>,
    pub interface_name: Option<String>,
}

/// Wireless provisioning section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WirelessProvision {
    pub site_name: String,
    #[serde(default)]
    pub managed_ap_locations: Vec<String>,
    #[serde(default)]
    pub dynamic_interfaces: Vec<DynamicInterface>,
}

/// Desired state for one playbook entry.
///
/// Identity is given by exactly one of the four identity lists; the first
/// non-empty one in `ip_address`, `hostname_list`, `serial_number_list`,
/// `mac_address_list` order is the one that counts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    // Identity
    #[serde(default)]
    pub ip_address: Vec<String>,
    #[serde(default)]
    pub hostname_list: Vec<String>,
    #[serde(default)]
    pub serial_number_list: Vec<String>,
    #[serde(default)]
    pub mac_address_list: Vec<String>,

    #[serde(rename = "type", default)]
    pub device_type: DeviceType,

    // CLI credentials
    pub cli_transport: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub enable_password: Option<String>,
    pub netconf_port: Option<String>,

    // SNMP
    #[serde(default = "default_snmp_version")]
    pub snmp_version: String,
    #[serde(default)]
    pub snmp_mode: SnmpMode,
    pub snmp_username: Option<String>,
    pub snmp_auth_passphrase: Option<String>,
    #[serde(default = "default_snmp_auth_protocol")]
    pub snmp_auth_protocol: String,
    pub snmp_priv_passphrase: Option<String>,
    pub snmp_priv_protocol: Option<String>,
    #[serde(default = "default_ro_community")]
    pub snmp_ro_community: String,
    #[serde(default = "default_rw_community")]
    pub snmp_rw_community: String,
    #[serde(default = "default_snmp_retry")]
    pub snmp_retry: u32,
    #[serde(default = "default_snmp_timeout")]
    pub snmp_timeout: u32,

    // HTTP
    pub http_username: Option<String>,
    pub http_password: Option<String>,
    pub http_port: Option<String>,
    pub http_secure: Option<bool>,

    // Misc device attributes
    pub serial_number: Option<String>,
    pub extended_discovery_info: Option<String>,
    pub compute_device: Option<bool>,

    // Intent flags
    #[serde(default)]
    pub device_added: bool,
    #[serde(default)]
    pub device_updated: bool,
    #[serde(default)]
    pub device_resync: bool,
    #[serde(default)]
    pub reboot_device: bool,
    #[serde(default)]
    pub credential_update: bool,
    #[serde(default)]
    pub force_sync: bool,
    #[serde(default)]
    pub clean_config: bool,

    // Intent sections
    #[serde(default)]
    pub update_mgmt_ipaddresslist: Vec<ManagementIpChange>,
    pub update_device_role: Option<RoleUpdate>,
    pub update_interface_details: Option<InterfaceUpdate>,
    pub add_user_defined_field: Option<UdfDescriptor>,
    pub export_device_list: Option<ExportRequest>,
    pub provision_wired_device: Option<WiredProvision>,
    #[serde(default)]
    pub provision_wireless_device: Vec<WirelessProvision>,
}

impl DeviceDescriptor {
    /// Whether any identity list is populated.
    pub fn has_identity(&self) -> bool {
        !self.ip_address.is_empty()
            || !self.hostname_list.is_empty()
            || !self.serial_number_list.is_empty()
            || !self.mac_address_list.is_empty()
    }

    /// Presence check by playbook field name, used by the mandatory-field table.
    pub fn has_field(&self, field: &str) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
        match field {
            "ip_address" => !self.ip_address.is_empty(),
            "username" => present(&self.username),
            "password" => present(&self.password),
            "enable_password" => present(&self.enable_password),
            "snmp_username" => present(&self.snmp_username),
            "snmp_auth_passphrase" => present(&self.snmp_auth_passphrase),
            "snmp_priv_passphrase" => present(&self.snmp_priv_passphrase),
            "http_username" => present(&self.http_username),
            "http_password" => present(&self.http_password),
            "http_port" => present(&self.http_port),
            _ => false,
        }
    }

    /// Wireless provisioning settings; only the first entry is honoured.
    pub fn wireless(&self) -> Option<&WirelessProvision> {
        self.provision_wireless_device.first()
    }

    /// Requested management IP change, if any.
    pub fn management_ip_change(&self) -> Option<&ManagementIpChange> {
        self.update_mgmt_ipaddresslist.first()
    }
}

fn default_snmp_version() -> String {
    "v3".to_string()
}

fn default_snmp_auth_protocol() -> String {
    "SHA".to_string()
}

fn default_ro_community() -> String {
    "public".to_string()
}

fn default_rw_community() -> String {
    "private".to_string()
}

fn default_snmp_retry() -> u32 {
    3
}

fn default_snmp_timeout() -> u32 {
    5
}

fn default_role_source() -> Option<String> {
    Some("AUTO".to_string())
}

fn default_deployment_mode() -> String {
    "Deploy".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied() {
        let desc: DeviceDescriptor = serde_yaml::from_str("ip_address: [\"10.1.1.1\"]").unwrap();
        assert_eq!(desc.device_type, DeviceType::NetworkDevice);
        assert_eq!(desc.snmp_mode, SnmpMode::AuthPriv);
        assert_eq!(desc.snmp_auth_protocol, "SHA");
        assert_eq!(desc.snmp_ro_community, "public");
        assert_eq!(desc.snmp_rw_community, "private");
        assert_eq!(desc.snmp_retry, 3);
        assert_eq!(desc.snmp_timeout, 5);
        assert_eq!(desc.snmp_version, "v3");
        assert!(!desc.device_added);
    }

    #[test]
    fn test_parse_full_entry() {
        let desc: DeviceDescriptor = serde_yaml::from_str(
            r#"
type: COMPUTE_DEVICE
hostname_list: [edge-1, edge-2]
snmp_mode: NOAUTHNOPRIV
device_updated: true
update_device_role:
  role: ACCESS
  role_source: MANUAL
update_interface_details:
  interface_name: GigabitEthernet1/0/11
  vlan_id: 23
update_mgmt_ipaddresslist:
  - exist_mgmt_ipaddress: 10.0.0.1
    new_mgmt_ipaddress: 10.0.0.2
provision_wireless_device:
  - site_name: Global/USA/HQ
    managed_ap_locations: [Global/USA/HQ/Floor1]
"#,
        )
        .unwrap();

        assert_eq!(desc.device_type, DeviceType::ComputeDevice);
        assert_eq!(desc.snmp_mode, SnmpMode::NoAuthNoPriv);
        assert_eq!(desc.hostname_list.len(), 2);
        let iface = desc.update_interface_details.as_ref().unwrap();
        assert_eq!(iface.deployment_mode, "Deploy");
        assert_eq!(iface.vlan_id, Some(23));
        assert_eq!(
            desc.management_ip_change().unwrap().new_mgmt_ipaddress,
            "10.0.0.2"
        );
        assert_eq!(desc.wireless().unwrap().managed_ap_locations.len(), 1);
    }

    #[test]
    fn test_export_operation_parsing() {
        let mut req = ExportRequest::default();
        assert_eq!(req.operation().unwrap(), ExportOperation::CredentialDetails);
        req.operation_enum = Some("1".to_string());
        assert_eq!(req.operation().unwrap(), ExportOperation::DeviceDetails);
        req.operation_enum = Some("7".to_string());
        assert!(req.operation().is_err());
    }
}
