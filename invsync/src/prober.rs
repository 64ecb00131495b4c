//! Controller state lookups.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::clients::{ControllerApi, DeviceFilter, DeviceRecord};
use crate::descriptor::DeviceDescriptor;
use crate::error::{ReconcileError, Result};

/// Reads current device state from the controller.
#[derive(Clone)]
pub struct StateProber {
    controller: Arc<dyn ControllerApi>,
}

impl StateProber {
    pub fn new(controller: Arc<dyn ControllerApi>) -> Self {
        Self { controller }
    }

    /// Management IPs of every device in inventory.
    ///
    /// A failure here aborts the pass since "absent" cannot be trusted.
    pub async fn list_existing_devices(&self) -> Result<BTreeSet<String>> {
        let devices = self
            .controller
            .list_devices(&DeviceFilter::All)
            .await
            .map_err(ReconcileError::Inventory)?;
        Ok(devices
            .into_iter()
            .map(|d| d.management_ip_address)
            .filter(|ip| !ip.is_empty())
            .collect())
    }

    /// Management IPs the descriptor refers to.
    ///
    /// The first non-empty identity source wins: IP list, hostnames, serial
    /// numbers, MAC addresses. Lookup failures count as "not found".
    pub async fn resolve_identity(&self, desc: &DeviceDescriptor) -> Vec<String> {
        if !desc.ip_address.is_empty() {
            return desc.ip_address.clone();
        }

        let hostname: fn(String) -> DeviceFilter = DeviceFilter::Hostname;
        let serial: fn(String) -> DeviceFilter = DeviceFilter::SerialNumber;
        let mac: fn(String) -> DeviceFilter = DeviceFilter::MacAddress;

        let (label, keys, filter) = if !desc.hostname_list.is_empty() {
            ("hostname", desc.hostname_list.as_slice(), hostname)
        } else if !desc.serial_number_list.is_empty() {
            ("serial number", desc.serial_number_list.as_slice(), serial)
        } else if !desc.mac_address_list.is_empty() {
            ("MAC address", desc.mac_address_list.as_slice(), mac)
        } else {
            return Vec::new();
        };

        let mut ips = Vec::new();
        for key in keys {
            match self.controller.list_devices(&filter(key.clone())).await {
                Ok(devices) => match devices.into_iter().next() {
                    Some(device) => {
                        debug!("Resolved {} {} to {}", label, key, device.management_ip_address);
                        if !ips.contains(&device.management_ip_address) {
                            ips.push(device.management_ip_address);
                        }
                    }
                    None => warn!("No device found for {} {}", label, key),
                },
                Err(e) => warn!("Failed to look up device by {} {}: {}", label, key, e),
            }
        }
        ips
    }

    /// Inventory record of a device, `None` when absent or on lookup failure.
    pub async fn device_detail(&self, ip: &str) -> Option<DeviceRecord> {
        match self
            .controller
            .list_devices(&DeviceFilter::ManagementIp(ip.to_string()))
            .await
        {
            Ok(devices) => devices.into_iter().next(),
            Err(e) => {
                warn!("Failed to fetch details of device {}: {}", ip, e);
                None
            }
        }
    }

    /// Inventory records for the given IPs, skipping devices that cannot be read.
    pub async fn device_records(&self, ips: &[String]) -> Vec<DeviceRecord> {
        let mut records = Vec::with_capacity(ips.len());
        for ip in ips {
            if let Some(record) = self.device_detail(ip).await {
                records.push(record);
            }
        }
        records
    }

    /// `(ip, id)` pairs for the given IPs.
    pub async fn device_ids(&self, ips: &[String]) -> Vec<(String, String)> {
        self.device_records(ips)
            .await
            .into_iter()
            .map(|r| (r.management_ip_address, r.id))
            .collect()
    }
}

/// Split records into (non access points, access points).
pub fn partition_access_points(records: Vec<DeviceRecord>) -> (Vec<DeviceRecord>, Vec<DeviceRecord>) {
    records.into_iter().partition(|r| !r.is_access_point())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::ACCESS_POINT_FAMILY;

    fn record(ip: &str, family: &str) -> DeviceRecord {
        DeviceRecord {
            id: format!("id-{}", ip),
            management_ip_address: ip.to_string(),
            family: Some(family.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_partition_is_disjoint_and_complete() {
        let records = vec![
            record("10.0.0.1", "Switches and Hubs"),
            record("10.0.0.2", ACCESS_POINT_FAMILY),
            record("10.0.0.3", "Routers"),
            record("10.0.0.4", ACCESS_POINT_FAMILY),
        ];
        let (others, aps) = partition_access_points(records.clone());

        assert_eq!(others.len() + aps.len(), records.len());
        assert!(aps.iter().all(DeviceRecord::is_access_point));
        assert!(others.iter().all(|r| !r.is_access_point()));
        for r in &records {
            assert!(others.contains(r) ^ aps.contains(r));
        }
    }
}
