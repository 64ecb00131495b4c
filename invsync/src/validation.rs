//! Pre-flight validation of playbook entries.
//!
//! Everything here runs before the first controller call of a pass so that a
//! broken playbook never leaves the controller half-reconciled.

use thiserror::Error;

use crate::descriptor::{DeviceDescriptor, DeviceType};

/// Symbols accepted by the export password rule.
pub const PASSWORD_SYMBOLS: &str = "-=\\;,./~!@#$%^&*()_+{}[]|:?";

/// Validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required parameters {0:?} for adding devices are not present")]
    MissingMandatory(Vec<&'static str>),

    #[error(
        "Invalid password. Min password length is 8 and it should contain atleast one lower case \
         letter, one uppercase letter, one digit and one special characters from {}",
        PASSWORD_SYMBOLS
    )]
    WeakExportPassword,

    #[error("Export password is required to export device details")]
    ExportPasswordRequired,

    #[error("Invalid export operation '{0}', expected 0 (credential details) or 1 (device details)")]
    InvalidExportOperation(String),

    #[error("Managed AP Location must be a floor: '{location}' is of type '{site_type}'")]
    ApLocationNotFloor { location: String, site_type: String },

    #[error("Site '{0}' not found")]
    SiteNotFound(String),

    #[error("The mandatory parameter 'name' for the User Defined Field is missing")]
    UdfNameRequired,

    #[error("Mandatory parameter (role/role_source) to update device role are missing")]
    RoleFieldsRequired,

    #[error("Interface name is required to update interface details")]
    InterfaceNameRequired,

    #[error("Site/Devices are required for Provisioning of {0} Devices")]
    ProvisionSiteRequired(&'static str),

    #[error("Cannot export device details as no devices are specified in the playbook")]
    ExportTargetsRequired,
}

pub type Result<T> = std::result::Result<T, ValidationError>;

/// Mandatory playbook fields for adding a device of the given type.
pub fn mandatory_fields(device_type: DeviceType) -> &'static [&'static str] {
    match device_type {
        DeviceType::NetworkDevice => &[
            "enable_password",
            "ip_address",
            "password",
            "snmp_username",
            "username",
        ],
        DeviceType::ComputeDevice => &[
            "ip_address",
            "http_username",
            "http_password",
            "http_port",
            "snmp_username",
        ],
        DeviceType::MerakiDashboard => &["http_password"],
        DeviceType::FirepowerManagementSystem => &["ip_address", "http_username", "http_password"],
        DeviceType::ThirdPartyDevice => &[
            "ip_address",
            "snmp_username",
            "snmp_auth_passphrase",
            "snmp_priv_passphrase",
        ],
    }
}

/// Check that every mandatory field for the descriptor's device type is present.
pub fn check_mandatory(desc: &DeviceDescriptor) -> Result<()> {
    let missing: Vec<&'static str> = mandatory_fields(desc.device_type)
        .iter()
        .copied()
        .filter(|field| !desc.has_field(field))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::MissingMandatory(missing))
    }
}

/// Export password complexity: at least 8 characters with a lowercase letter,
/// an uppercase letter, a digit and one of [`PASSWORD_SYMBOLS`].
pub fn is_valid_password(password: &str) -> bool {
    password.chars().count() >= 8
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| PASSWORD_SYMBOLS.contains(c))
}

/// Validate one playbook entry for a merged pass.
pub fn validate_merged(desc: &DeviceDescriptor) -> Result<()> {
    if let Some(udf) = &desc.add_user_defined_field {
        if udf.name.as_deref().is_none_or(str::is_empty) {
            return Err(ValidationError::UdfNameRequired);
        }
    }

    if desc.device_added {
        check_mandatory(desc)?;
    }

    if desc.device_updated {
        if let Some(role) = &desc.update_device_role {
            if role.role.is_none() || role.role_source.is_none() {
                return Err(ValidationError::RoleFieldsRequired);
            }
        }
        if let Some(iface) = &desc.update_interface_details {
            if iface.interface_name.as_deref().is_none_or(str::is_empty) {
                return Err(ValidationError::InterfaceNameRequired);
            }
        }
    }

    if let Some(wired) = &desc.provision_wired_device {
        if wired.site_name.as_deref().is_none_or(str::is_empty) {
            return Err(ValidationError::ProvisionSiteRequired("Wired"));
        }
    }
    if let Some(wireless) = desc.provision_wireless_device.first() {
        if wireless.site_name.is_empty() {
            return Err(ValidationError::ProvisionSiteRequired("Wireless"));
        }
    }

    if let Some(export) = &desc.export_device_list {
        if !desc.has_identity() {
            return Err(ValidationError::ExportTargetsRequired);
        }
        export.operation()?;
        let password = export
            .password
            .as_deref()
            .ok_or(ValidationError::ExportPasswordRequired)?;
        if !is_valid_password(password) {
            return Err(ValidationError::WeakExportPassword);
        }
    }

    Ok(())
}

/// Validate one playbook entry for a deleted pass.
pub fn validate_deleted(desc: &DeviceDescriptor) -> Result<()> {
    if let Some(udf) = &desc.add_user_defined_field {
        if udf.name.as_deref().is_none_or(str::is_empty) {
            return Err(ValidationError::UdfNameRequired);
        }
    }
    Ok(())
}
