//! Shared test utilities for invsync integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use invsync::clients::{
    ControllerApi, DeviceFilter, DeviceRecord, DownloadedFile, InterfaceRecord, Operation,
    SiteRecord, TaskHandle, TaskStatus, UdfRecord, ACCESS_POINT_FAMILY,
};
use invsync::config::PollingConfig;
use invsync::descriptor::{DeviceDescriptor, UdfDescriptor};
use invsync::error::ControllerError;
use invsync::Reconciler;
use tokio::net::TcpListener;

type Result<T> = std::result::Result<T, ControllerError>;

/// Allocate an available port for testing.
pub fn allocate_port() -> u16 {
    portpicker::pick_unused_port().expect("No available port")
}

/// Fast polling so scripted tasks resolve immediately.
pub fn fast_polling() -> PollingConfig {
    PollingConfig {
        interval_ms: 1,
        max_attempts: Some(3),
        wired_managed_attempts: 3,
        wireless_managed_attempts: 3,
        ..Default::default()
    }
}

/// Parse a playbook entry.
pub fn descriptor(yaml: &str) -> DeviceDescriptor {
    serde_yaml::from_str(yaml).expect("invalid descriptor")
}

/// Managed switch at `ip`.
pub fn switch(ip: &str) -> DeviceRecord {
    DeviceRecord {
        id: format!("id-{}", ip),
        management_ip_address: ip.to_string(),
        family: Some("Switches and Hubs".to_string()),
        role: Some("ACCESS".to_string()),
        role_source: Some("AUTO".to_string()),
        management_state: Some("Managed".to_string()),
        collection_status: Some("Managed".to_string()),
        hostname: Some(format!("sw-{}", ip)),
        ap_ethernet_mac_address: None,
    }
}

/// Managed access point at `ip`.
pub fn access_point(ip: &str, mac: &str) -> DeviceRecord {
    DeviceRecord {
        family: Some(ACCESS_POINT_FAMILY.to_string()),
        hostname: Some(format!("ap-{}", ip)),
        ap_ethernet_mac_address: Some(mac.to_string()),
        ..switch(ip)
    }
}

/// Status that satisfies the completion rule of the operation.
fn success_status(op: &Operation) -> TaskStatus {
    let mut status = TaskStatus::default();
    match op {
        Operation::AddDevices(_) => status.progress = "/api/v1/task/added".to_string(),
        Operation::UpdateDevices(_) => status.end_time = Some(1_700_000_000_000),
        Operation::UpdateRole { .. } => status.progress = "Device role updated successfully".to_string(),
        Operation::UpdateInterface { .. } => status.progress = "SUCCESS".to_string(),
        Operation::Resync { .. } => status.progress = "Synced".to_string(),
        Operation::RebootAccessPoints { .. } => status.progress = "{\"url\":\"/reboot\"}".to_string(),
        Operation::ProvisionWired { .. } | Operation::ProvisionWireless(_) => {
            status.progress = "TASK_PROVISION".to_string()
        }
        Operation::DeleteDevice { .. } | Operation::DeleteUdf { .. } => {
            status.progress = "deleted successfully".to_string()
        }
        Operation::DeleteProvisioned { .. } => status.status = Some("SUCCESS".to_string()),
        Operation::Export(_) => status.additional_status_url = Some("/api/v1/file/file-1".to_string()),
    }
    status
}

/// In-memory controller.
///
/// Submitted operations apply their effect immediately and their task
/// reports success unless a status override is scripted for the operation.
#[derive(Default)]
pub struct FakeController {
    pub devices: Mutex<Vec<DeviceRecord>>,
    /// serial number -> management IP
    pub serials: Mutex<BTreeMap<String, String>>,
    pub interfaces: Mutex<BTreeMap<(String, String), InterfaceRecord>>,
    pub udfs: Mutex<Vec<UdfRecord>>,
    pub sites: Mutex<BTreeMap<String, SiteRecord>>,
    pub provisioned: Mutex<BTreeSet<String>>,
    pub export_file: Mutex<Vec<u8>>,

    /// Every submitted operation, in order.
    pub submitted: Mutex<Vec<Operation>>,
    pub created_udfs: Mutex<Vec<String>>,
    /// (device id, name, value)
    pub assigned_udfs: Mutex<Vec<(String, String, String)>>,
    pub list_calls: AtomicUsize,

    /// Fail the full inventory listing.
    pub fail_inventory: AtomicBool,
    /// Device ids whose UDF assignment fails.
    pub fail_assign: Mutex<BTreeSet<String>>,
    /// Operation name -> status every poll returns.
    pub status_overrides: Mutex<BTreeMap<&'static str, TaskStatus>>,

    tasks: Mutex<BTreeMap<String, TaskStatus>>,
}

impl FakeController {
    pub fn with_devices(devices: Vec<DeviceRecord>) -> Arc<Self> {
        let fake = Self::default();
        *fake.devices.lock().unwrap() = devices;
        Arc::new(fake)
    }

    pub fn reconciler(self: &Arc<Self>) -> Reconciler {
        Reconciler::new(self.clone(), fast_polling())
    }

    pub fn submitted_names(&self) -> Vec<&'static str> {
        self.submitted.lock().unwrap().iter().map(Operation::name).collect()
    }

    pub fn device(&self, ip: &str) -> Option<DeviceRecord> {
        self.devices
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.management_ip_address == ip)
            .cloned()
    }

    fn apply(&self, op: &Operation) -> Result<()> {
        let mut devices = self.devices.lock().unwrap();
        match op {
            Operation::AddDevices(payload) => {
                for ip in &payload.ip_address {
                    if !devices.iter().any(|d| &d.management_ip_address == ip) {
                        devices.push(switch(ip));
                    }
                }
            }
            Operation::UpdateRole {
                device_id,
                role,
                role_source,
            } => {
                if let Some(d) = devices.iter_mut().find(|d| &d.id == device_id) {
                    d.role = Some(role.clone());
                    d.role_source = Some(role_source.clone());
                }
            }
            Operation::UpdateDevices(payload) => {
                if let Some(change) = payload.update_mgmt_ip_address_list.first() {
                    if let Some(d) = devices
                        .iter_mut()
                        .find(|d| d.management_ip_address == change.exist_mgmt_ip_address)
                    {
                        d.management_ip_address = change.new_mgmt_ip_address.clone();
                    }
                }
            }
            Operation::ProvisionWired { management_ip, .. } => {
                let mut provisioned = self.provisioned.lock().unwrap();
                if !provisioned.insert(management_ip.clone()) {
                    return Err(ControllerError::Rejected(format!(
                        "Device {} already provisioned",
                        management_ip
                    )));
                }
            }
            Operation::DeleteDevice { device_id, .. } => devices.retain(|d| &d.id != device_id),
            Operation::DeleteProvisioned { management_ip } => {
                self.provisioned.lock().unwrap().remove(management_ip);
                devices.retain(|d| &d.management_ip_address != management_ip);
            }
            Operation::DeleteUdf { udf_id } => self.udfs.lock().unwrap().retain(|u| &u.id != udf_id),
            _ => {}
        }
        Ok(())
    }
}

#[async_trait]
impl ControllerApi for FakeController {
    async fn list_devices(&self, filter: &DeviceFilter) -> Result<Vec<DeviceRecord>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let devices = self.devices.lock().unwrap().clone();
        let matching = match filter {
            DeviceFilter::All => {
                if self.fail_inventory.load(Ordering::SeqCst) {
                    return Err(ControllerError::Transport("connection refused".to_string()));
                }
                devices
            }
            DeviceFilter::ManagementIp(ip) => devices
                .into_iter()
                .filter(|d| &d.management_ip_address == ip)
                .collect(),
            DeviceFilter::Hostname(name) => devices
                .into_iter()
                .filter(|d| d.hostname.as_ref() == Some(name))
                .collect(),
            DeviceFilter::SerialNumber(serial) => {
                let ip = self.serials.lock().unwrap().get(serial).cloned();
                devices
                    .into_iter()
                    .filter(|d| Some(&d.management_ip_address) == ip.as_ref())
                    .collect()
            }
            DeviceFilter::MacAddress(mac) => devices
                .into_iter()
                .filter(|d| d.ap_ethernet_mac_address.as_ref() == Some(mac))
                .collect(),
        };
        Ok(matching)
    }

    async fn submit(&self, op: Operation) -> Result<TaskHandle> {
        self.submitted.lock().unwrap().push(op.clone());
        self.apply(&op)?;

        let status = self
            .status_overrides
            .lock()
            .unwrap()
            .get(op.name())
            .cloned()
            .unwrap_or_else(|| success_status(&op));

        let mut tasks = self.tasks.lock().unwrap();
        let id = format!("{}-{}", op.name(), tasks.len());
        tasks.insert(id.clone(), status);
        Ok(TaskHandle::Task(id))
    }

    async fn task_status(&self, handle: &TaskHandle) -> Result<TaskStatus> {
        let id = match handle {
            TaskHandle::Task(id) | TaskHandle::Execution(id) => id,
        };
        self.tasks
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| ControllerError::Api {
                status: 404,
                message: format!("unknown task {}", id),
            })
    }

    async fn interface_by_name(
        &self,
        device_id: &str,
        name: &str,
    ) -> Result<Option<InterfaceRecord>> {
        Ok(self
            .interfaces
            .lock()
            .unwrap()
            .get(&(device_id.to_string(), name.to_string()))
            .cloned())
    }

    async fn is_wired_provisioned(&self, management_ip: &str) -> Result<bool> {
        Ok(self.provisioned.lock().unwrap().contains(management_ip))
    }

    async fn list_udfs(&self, name: &str) -> Result<Vec<UdfRecord>> {
        Ok(self
            .udfs
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.name == name)
            .cloned()
            .collect())
    }

    async fn create_udf(&self, udf: &UdfDescriptor) -> Result<()> {
        let name = udf.name.clone().unwrap_or_default();
        let mut udfs = self.udfs.lock().unwrap();
        let id = format!("udf-{}", udfs.len());
        udfs.push(UdfRecord {
            id,
            name: name.clone(),
            description: udf.description.clone(),
        });
        self.created_udfs.lock().unwrap().push(name);
        Ok(())
    }

    async fn assign_udf(&self, device_id: &str, name: &str, value: &str) -> Result<()> {
        self.assigned_udfs.lock().unwrap().push((
            device_id.to_string(),
            name.to_string(),
            value.to_string(),
        ));
        if self.fail_assign.lock().unwrap().contains(device_id) {
            return Err(ControllerError::Api {
                status: 500,
                message: "internal error".to_string(),
            });
        }
        Ok(())
    }

    async fn site_by_name(&self, name: &str) -> Result<Option<SiteRecord>> {
        Ok(self.sites.lock().unwrap().get(name).cloned())
    }

    async fn download_file(&self, _file_id: &str) -> Result<DownloadedFile> {
        Ok(DownloadedFile {
            name: Some("export.csv".to_string()),
            bytes: self.export_file.lock().unwrap().clone(),
        })
    }
}

/// Mock controller HTTP server.
pub struct MockServer {
    pub addr: SocketAddr,
    shutdown_tx: tokio::sync::oneshot::Sender<()>,
}

impl MockServer {
    /// Serve `router` on a free local port.
    pub async fn spawn(router: axum::Router) -> Self {
        let addr: SocketAddr = format!("127.0.0.1:{}", allocate_port()).parse().unwrap();
        let listener = TcpListener::bind(&addr).await.expect("Failed to bind");
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self { addr, shutdown_tx }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
    }
}
