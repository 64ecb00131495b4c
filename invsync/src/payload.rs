//! Controller request payloads built from desired state.

use serde::{Deserialize, Serialize};

use crate::clients::ExportRow;
use crate::descriptor::{
    DeviceDescriptor, DeviceType, DynamicInterface, InterfaceUpdate, ManagementIpChange, SnmpMode,
    WirelessProvision,
};

/// Privacy protocol used when none is given.
pub const DEFAULT_SNMP_PRIV_PROTOCOL: &str = "AES128";
/// CLI transport used when none is given.
pub const DEFAULT_CLI_TRANSPORT: &str = "ssh";
/// HTTP port used for Firepower management systems when none is given.
pub const DEFAULT_FIREPOWER_HTTP_PORT: &str = "443";

/// Management IP change as sent on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MgmtIpUpdate {
    pub exist_mgmt_ip_address: String,
    pub new_mgmt_ip_address: String,
}

impl From<&ManagementIpChange> for MgmtIpUpdate {
    fn from(change: &ManagementIpChange) -> Self {
        Self {
            exist_mgmt_ip_address: change.exist_mgmt_ipaddress.clone(),
            new_mgmt_ip_address: change.new_mgmt_ipaddress.clone(),
        }
    }
}

/// Add / update device request body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevicePayload {
    pub ip_address: Vec<String>,
    #[serde(rename = "type")]
    pub device_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cli_transport: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub netconf_port: Option<String>,
    pub snmp_version: String,
    pub snmp_mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snmp_user_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snmp_auth_passphrase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snmp_auth_protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snmp_priv_passphrase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snmp_priv_protocol: Option<String>,
    #[serde(rename = "snmpROCommunity")]
    pub snmp_ro_community: String,
    #[serde(rename = "snmpRWCommunity")]
    pub snmp_rw_community: String,
    pub snmp_retry: u32,
    pub snmp_timeout: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_user_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_port: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_secure: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extended_discovery_info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compute_device: Option<bool>,
    #[serde(
        rename = "updateMgmtIPaddressList",
        skip_serializing_if = "Vec::is_empty",
        default
    )]
    pub update_mgmt_ip_address_list: Vec<MgmtIpUpdate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force_sync: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clean_config: Option<bool>,
    #[serde(skip)]
    mode: SnmpMode,
}

impl DevicePayload {
    /// Payload carrying exactly what the playbook entry states, no defaults.
    pub fn from_descriptor(desc: &DeviceDescriptor) -> Self {
        let http_port = match (&desc.http_port, desc.device_type) {
            (None, DeviceType::FirepowerManagementSystem) => {
                Some(DEFAULT_FIREPOWER_HTTP_PORT.to_string())
            }
            (port, _) => port.clone(),
        };

        Self {
            ip_address: desc.ip_address.clone(),
            device_type: desc.device_type.as_str().to_string(),
            cli_transport: desc.cli_transport.clone(),
            user_name: desc.username.clone(),
            password: desc.password.clone(),
            enable_password: desc.enable_password.clone(),
            netconf_port: desc.netconf_port.clone(),
            snmp_version: desc.snmp_version.clone(),
            snmp_mode: snmp_mode_str(desc.snmp_mode).to_string(),
            snmp_user_name: desc.snmp_username.clone(),
            snmp_auth_passphrase: desc.snmp_auth_passphrase.clone(),
            snmp_auth_protocol: Some(desc.snmp_auth_protocol.clone()),
            snmp_priv_passphrase: desc.snmp_priv_passphrase.clone(),
            snmp_priv_protocol: desc.snmp_priv_protocol.clone(),
            snmp_ro_community: desc.snmp_ro_community.clone(),
            snmp_rw_community: desc.snmp_rw_community.clone(),
            snmp_retry: desc.snmp_retry,
            snmp_timeout: desc.snmp_timeout,
            http_user_name: desc.http_username.clone(),
            http_password: desc.http_password.clone(),
            http_port,
            http_secure: desc.http_secure,
            serial_number: desc.serial_number.clone(),
            extended_discovery_info: desc.extended_discovery_info.clone(),
            compute_device: desc.compute_device,
            update_mgmt_ip_address_list: Vec::new(),
            force_sync: Some(desc.force_sync),
            clean_config: Some(desc.clean_config),
            mode: desc.snmp_mode,
        }
    }

    /// Add-device payload: defaults applied, SNMP fields stripped by mode.
    pub fn for_add(desc: &DeviceDescriptor, ips: Vec<String>) -> Self {
        let mut payload = Self::from_descriptor(desc);
        payload.ip_address = ips;
        payload.apply_defaults();
        payload.strip_for_snmp_mode();
        payload
    }

    /// Fill in CLI transport and privacy protocol when the playbook omits them.
    pub fn apply_defaults(&mut self) {
        if self.cli_transport.as_deref().is_none_or(str::is_empty) {
            self.cli_transport = Some(DEFAULT_CLI_TRANSPORT.to_string());
        }
        if self.snmp_priv_protocol.as_deref().is_none_or(str::is_empty) {
            self.snmp_priv_protocol = Some(DEFAULT_SNMP_PRIV_PROTOCOL.to_string());
        }
    }

    /// Drop the SNMP secrets the configured security level does not use.
    pub fn strip_for_snmp_mode(&mut self) {
        match self.mode {
            SnmpMode::NoAuthNoPriv => {
                self.snmp_auth_passphrase = None;
                self.snmp_priv_passphrase = None;
                self.snmp_priv_protocol = None;
                self.snmp_auth_protocol = None;
            }
            SnmpMode::AuthNoPriv => {
                self.snmp_priv_passphrase = None;
                self.snmp_priv_protocol = None;
            }
            SnmpMode::AuthPriv => {}
        }
    }

    /// Fill fields the playbook left empty from the controller's exported
    /// credentials. Values given in the playbook always win.
    pub fn merge_discovered(&mut self, row: &ExportRow) {
        let discovered = |key: &str| row.get(key).filter(|v| !v.is_empty()).cloned();

        if self.cli_transport.is_none() {
            self.cli_transport = discovered("protocol").map(|p| {
                if p == "ssh2" {
                    DEFAULT_CLI_TRANSPORT.to_string()
                } else {
                    p
                }
            });
        }
        if self.snmp_priv_protocol.is_none() {
            self.snmp_priv_protocol = discovered("snmpv3_privacy_type");
        }

        fill(&mut self.user_name, discovered("cli_username"));
        fill(&mut self.password, discovered("cli_password"));
        fill(&mut self.enable_password, discovered("cli_enable_password"));
        fill(&mut self.netconf_port, discovered("netconf_port"));

        if row.get("snmp_version").map(String::as_str) == Some("3") {
            fill(&mut self.snmp_user_name, discovered("snmpv3_user_name"));
            if self.mode == SnmpMode::AuthPriv && discovered("snmpv3_privacy_password").is_some() {
                fill(
                    &mut self.snmp_auth_passphrase,
                    discovered("snmpv3_auth_password"),
                );
                fill(
                    &mut self.snmp_priv_passphrase,
                    discovered("snmpv3_privacy_password"),
                );
            }
        }

        if self.netconf_port.as_deref().is_some_and(|p| p.trim().is_empty()) {
            self.netconf_port = None;
        }
    }
}

fn fill(slot: &mut Option<String>, discovered: Option<String>) {
    if slot.is_none() {
        *slot = discovered;
    }
}

fn snmp_mode_str(mode: SnmpMode) -> &'static str {
    match mode {
        SnmpMode::AuthPriv => "AUTHPRIV",
        SnmpMode::AuthNoPriv => "AUTHNOPRIV",
        SnmpMode::NoAuthNoPriv => "NOAUTHNOPRIV",
    }
}

/// Interface update body: only fields the playbook sets.
pub fn interface_payload(update: &InterfaceUpdate) -> serde_json::Value {
    let mut body = serde_json::Map::new();
    body.insert(
        "description".to_string(),
        serde_json::Value::String(update.description.clone().unwrap_or_default()),
    );
    if let Some(status) = &update.admin_status {
        body.insert("adminStatus".to_string(), status.clone().into());
    }
    if let Some(vlan) = update.voice_vlan_id {
        body.insert("voiceVlanId".to_string(), vlan.into());
    }
    if let Some(vlan) = update.vlan_id {
        body.insert("vlanId".to_string(), vlan.into());
    }
    serde_json::Value::Object(body)
}

/// Dynamic interface as sent on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicInterfacePayload {
    #[serde(rename = "interfaceIPAddress")]
    pub interface_ip_address: Option<String>,
    #[serde(rename = "interfaceNetmaskInCIDR")]
    pub interface_netmask_in_cidr: Option<u8>,
    pub interface_gateway: Option<String>,
    pub lag_or_port_number: Option<u32>,
    pub vlan_id: Option<u32>,
    pub interface_name: Option<String>,
}

impl From<&DynamicInterface> for DynamicInterfacePayload {
    fn from(i: &DynamicInterface) -> Self {
        Self {
            interface_ip_address: i.interface_ip_address.clone(),
            interface_netmask_in_cidr: i.interface_netmask_in_cidr,
            interface_gateway: i.interface_gateway.clone(),
            lag_or_port_number: i.lag_or_port_number,
            vlan_id: i.vlan_id,
            interface_name: i.interface_name.clone(),
        }
    }
}

/// Wireless provisioning body for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WirelessProvisionPayload {
    pub device_name: String,
    pub site: String,
    #[serde(rename = "managedAPLocations")]
    pub managed_ap_locations: Vec<String>,
    pub dynamic_interfaces: Vec<DynamicInterfacePayload>,
}

impl WirelessProvisionPayload {
    pub fn new(config: &WirelessProvision, device_name: String) -> Self {
        Self {
            device_name,
            site: config.site_name.clone(),
            managed_ap_locations: config.managed_ap_locations.clone(),
            dynamic_interfaces: config.dynamic_interfaces.iter().map(Into::into).collect(),
        }
    }
}
