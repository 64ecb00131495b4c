//! REST implementation of [`ControllerApi`].

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::debug;

use super::{
    ControllerApi, DeviceFilter, DeviceRecord, DownloadedFile, InterfaceRecord, Operation, Result,
    SiteRecord, TaskHandle, TaskStatus, UdfRecord,
};
use crate::config::ControllerConfig;
use crate::descriptor::UdfDescriptor;
use crate::error::ControllerError;

const AUTH_PATH: &str = "/dna/system/api/v1/auth/token";
const INTENT_PREFIX: &str = "/dna/intent/api/v1";
const EXECUTION_STATUS_PATH: &str = "/dna/platform/management/business-api/v1/execution-status";
const TOKEN_HEADER: &str = "X-Auth-Token";

/// `{"response": ...}` envelope used by most intent endpoints.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    response: T,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskRef {
    task_id: Option<String>,
}

/// Answer to a submitted operation; the shape differs between APIs.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    response: Option<TaskRef>,
    task_id: Option<String>,
    execution_id: Option<String>,
    status: Option<String>,
    description: Option<String>,
}

impl SubmitResponse {
    fn into_handle(self) -> Result<TaskHandle> {
        if self.status.as_deref() == Some("failed") {
            return Err(ControllerError::Rejected(
                self.description.unwrap_or_else(|| "operation rejected".to_string()),
            ));
        }
        if let Some(id) = self.response.and_then(|r| r.task_id).or(self.task_id) {
            return Ok(TaskHandle::Task(id));
        }
        if let Some(id) = self.execution_id {
            return Ok(TaskHandle::Execution(id));
        }
        Err(ControllerError::Decode(
            "response carries neither a task nor an execution id".to_string(),
        ))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecutionStatus {
    status: Option<String>,
    bapi_error: Option<String>,
    bapi_name: Option<String>,
    end_time: Option<i64>,
}

impl From<ExecutionStatus> for TaskStatus {
    fn from(e: ExecutionStatus) -> Self {
        let failure = e.bapi_error.filter(|s| !s.is_empty());
        TaskStatus {
            progress: e.bapi_name.unwrap_or_default(),
            is_error: failure.is_some() || e.status.as_deref() == Some("FAILURE"),
            failure_reason: failure,
            end_time: e.end_time,
            additional_status_url: None,
            status: e.status,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AuthToken {
    #[serde(rename = "Token")]
    token: String,
}

/// HTTP client for the controller's intent API.
pub struct RestController {
    client: Client,
    base_url: String,
    username: String,
    password: String,
    token: RwLock<Option<String>>,
}

impl RestController {
    /// Client for the controller described by `config`.
    pub fn new(config: &ControllerConfig) -> Result<Self> {
        let client = Client::builder()
            .danger_accept_invalid_certs(!config.verify)
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self::with_client(
            client,
            config.base_url(),
            &config.username,
            &config.password,
        ))
    }

    /// Client against an explicit base URL.
    pub fn with_client(client: Client, base_url: String, username: &str, password: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
            token: RwLock::new(None),
        }
    }

    async fn authenticate(&self) -> Result<String> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, AUTH_PATH))
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ControllerError::Auth(format!(
                "controller returned {}",
                response.status()
            )));
        }
        let token: AuthToken = response.json().await?;
        Ok(token.token)
    }

    async fn token(&self) -> Result<String> {
        if let Some(token) = self.token.read().await.as_ref() {
            return Ok(token.clone());
        }
        let mut slot = self.token.write().await;
        if let Some(token) = slot.as_ref() {
            return Ok(token.clone());
        }
        let token = self.authenticate().await?;
        *slot = Some(token.clone());
        Ok(token)
    }

    async fn request(&self, method: Method, url: String) -> Result<RequestBuilder> {
        let token = self.token().await?;
        Ok(self.client.request(method, url).header(TOKEN_HEADER, token))
    }

    fn intent(&self, path: &str) -> String {
        format!("{}{}/{}", self.base_url, INTENT_PREFIX, path)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            *self.token.write().await = None;
        }
        let message = response.text().await.unwrap_or_default();
        Err(ControllerError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = self.send(builder).await?;
        response
            .json()
            .await
            .map_err(|e| ControllerError::Decode(e.to_string()))
    }

    async fn submit_request(&self, builder: RequestBuilder) -> Result<TaskHandle> {
        let response: SubmitResponse = self.send_json(builder).await?;
        response.into_handle()
    }
}

/// File name from a `Content-Disposition` header value.
fn disposition_file_name(value: &str) -> Option<String> {
    value.split(';').map(str::trim).find_map(|part| {
        part.strip_prefix("filename=")
            .map(|name| name.trim_matches('"').to_string())
    })
}

fn is_client_error(e: &ControllerError) -> bool {
    matches!(e, ControllerError::Api { status, .. } if (400..500).contains(status))
}

#[async_trait]
impl ControllerApi for RestController {
    async fn list_devices(&self, filter: &DeviceFilter) -> Result<Vec<DeviceRecord>> {
        let mut builder = self.request(Method::GET, self.intent("network-device")).await?;
        if let Some((key, value)) = filter.query() {
            builder = builder.query(&[(key, value)]);
        }
        let envelope: Envelope<Vec<DeviceRecord>> = self.send_json(builder).await?;
        Ok(envelope.response)
    }

    async fn submit(&self, op: Operation) -> Result<TaskHandle> {
        debug!("Submitting {}", op.name());
        let builder = match op {
            Operation::AddDevices(payload) => self
                .request(Method::POST, self.intent("network-device"))
                .await?
                .json(&payload),
            Operation::UpdateDevices(payload) => self
                .request(Method::PUT, self.intent("network-device"))
                .await?
                .json(&payload),
            Operation::UpdateRole {
                device_id,
                role,
                role_source,
            } => self
                .request(Method::PUT, self.intent("network-device/brief"))
                .await?
                .json(&json!({ "id": device_id, "role": role, "roleSource": role_source })),
            Operation::UpdateInterface {
                interface_id,
                deployment_mode,
                payload,
            } => self
                .request(Method::PUT, self.intent(&format!("interface/{}", interface_id)))
                .await?
                .query(&[("deploymentMode", deployment_mode)])
                .json(&payload),
            Operation::Resync {
                device_ids,
                force_sync,
            } => self
                .request(Method::PUT, self.intent("network-device/sync"))
                .await?
                .query(&[("forceSync", force_sync)])
                .json(&device_ids),
            Operation::RebootAccessPoints { mac_addresses } => self
                .request(Method::POST, self.intent("device-reboot/apreboot"))
                .await?
                .json(&json!({ "apMacAddresses": mac_addresses })),
            Operation::ProvisionWired {
                site_name,
                management_ip,
            } => self
                .request(Method::POST, self.intent("business/sda/provision-device"))
                .await?
                .json(&json!({
                    "siteNameHierarchy": site_name,
                    "deviceManagementIpAddress": management_ip,
                })),
            Operation::ProvisionWireless(payload) => self
                .request(Method::POST, self.intent("wireless/provision"))
                .await?
                .json(&[payload]),
            Operation::DeleteDevice {
                device_id,
                clean_config,
            } => self
                .request(Method::DELETE, self.intent(&format!("network-device/{}", device_id)))
                .await?
                .query(&[("cleanConfig", clean_config)]),
            Operation::DeleteProvisioned { management_ip } => self
                .request(Method::DELETE, self.intent("business/sda/provision-device"))
                .await?
                .query(&[("deviceManagementIpAddress", management_ip)]),
            Operation::DeleteUdf { udf_id } => {
                self.request(
                    Method::DELETE,
                    self.intent(&format!("network-device/user-defined-field/{}", udf_id)),
                )
                .await?
            }
            Operation::Export(job) => self
                .request(Method::POST, self.intent("network-device/file"))
                .await?
                .json(&job),
        };
        self.submit_request(builder).await
    }

    async fn task_status(&self, handle: &TaskHandle) -> Result<TaskStatus> {
        match handle {
            TaskHandle::Task(id) => {
                let builder = self
                    .request(Method::GET, self.intent(&format!("task/{}", id)))
                    .await?;
                let envelope: Envelope<TaskStatus> = self.send_json(builder).await?;
                Ok(envelope.response)
            }
            TaskHandle::Execution(id) => {
                let url = format!("{}{}/{}", self.base_url, EXECUTION_STATUS_PATH, id);
                let builder = self.request(Method::GET, url).await?;
                let status: ExecutionStatus = self.send_json(builder).await?;
                Ok(status.into())
            }
        }
    }

    async fn interface_by_name(
        &self,
        device_id: &str,
        name: &str,
    ) -> Result<Option<InterfaceRecord>> {
        let builder = self
            .request(
                Method::GET,
                self.intent(&format!("interface/network-device/{}/interface-name", device_id)),
            )
            .await?
            .query(&[("name", name)]);
        match self.send_json::<Envelope<Option<InterfaceRecord>>>(builder).await {
            Ok(envelope) => Ok(envelope.response),
            Err(ControllerError::Api { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn is_wired_provisioned(&self, management_ip: &str) -> Result<bool> {
        #[derive(Deserialize)]
        struct Provisioned {
            status: Option<String>,
        }

        let builder = self
            .request(Method::GET, self.intent("business/sda/provision-device"))
            .await?
            .query(&[("deviceManagementIpAddress", management_ip)]);
        match self.send_json::<Provisioned>(builder).await {
            Ok(p) => Ok(p.status.as_deref() == Some("success")),
            Err(e) if is_client_error(&e) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn list_udfs(&self, name: &str) -> Result<Vec<UdfRecord>> {
        let builder = self
            .request(Method::GET, self.intent("network-device/user-defined-field"))
            .await?
            .query(&[("name", name)]);
        let envelope: Envelope<Vec<UdfRecord>> = self.send_json(builder).await?;
        Ok(envelope.response)
    }

    async fn create_udf(&self, udf: &UdfDescriptor) -> Result<()> {
        let builder = self
            .request(Method::POST, self.intent("network-device/user-defined-field"))
            .await?
            .json(&json!({ "name": udf.name, "description": udf.description }));
        self.send(builder).await?;
        Ok(())
    }

    async fn assign_udf(&self, device_id: &str, name: &str, value: &str) -> Result<()> {
        let builder = self
            .request(
                Method::PUT,
                self.intent(&format!("network-device/{}/user-defined-field", device_id)),
            )
            .await?
            .json(&json!([{ "name": name, "value": value }]));
        self.send(builder).await?;
        Ok(())
    }

    async fn site_by_name(&self, name: &str) -> Result<Option<SiteRecord>> {
        let builder = self
            .request(Method::GET, self.intent("site"))
            .await?
            .query(&[("name", name)]);
        match self.send_json::<Envelope<Vec<SiteRecord>>>(builder).await {
            Ok(envelope) => Ok(envelope.response.into_iter().next()),
            Err(e) if is_client_error(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn download_file(&self, file_id: &str) -> Result<DownloadedFile> {
        let builder = self
            .request(Method::GET, self.intent(&format!("file/{}", file_id)))
            .await?;
        let response = self.send(builder).await?;
        let name = response
            .headers()
            .get(reqwest::header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(disposition_file_name);
        let bytes = response.bytes().await?.to_vec();
        Ok(DownloadedFile { name, bytes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disposition_file_name() {
        assert_eq!(
            disposition_file_name("attachment; filename=\"export-123.zip\""),
            Some("export-123.zip".to_string())
        );
        assert_eq!(disposition_file_name("inline"), None);
    }

    #[test]
    fn test_submit_response_shapes() {
        let task: SubmitResponse =
            serde_json::from_str(r#"{"response": {"taskId": "t-1", "url": "/task/t-1"}}"#).unwrap();
        assert_eq!(task.into_handle().unwrap(), TaskHandle::Task("t-1".into()));

        let execution: SubmitResponse =
            serde_json::from_str(r#"{"executionId": "e-1", "status": "pending"}"#).unwrap();
        assert_eq!(
            execution.into_handle().unwrap(),
            TaskHandle::Execution("e-1".into())
        );

        let failed: SubmitResponse = serde_json::from_str(
            r#"{"status": "failed", "description": "Device already provisioned"}"#,
        )
        .unwrap();
        assert!(failed.into_handle().unwrap_err().is_already_provisioned());
    }

    #[test]
    fn test_execution_status_mapping() {
        let status: TaskStatus = serde_json::from_value::<ExecutionStatus>(json!({
            "status": "FAILURE",
            "bapiError": "device unreachable",
            "bapiName": "Delete Provision Device"
        }))
        .unwrap()
        .into();
        assert!(status.is_error);
        assert_eq!(status.failure_reason.as_deref(), Some("device unreachable"));

        let ok: TaskStatus = serde_json::from_value::<ExecutionStatus>(json!({"status": "SUCCESS"}))
            .unwrap()
            .into();
        assert!(!ok.is_error);
        assert_eq!(ok.status.as_deref(), Some("SUCCESS"));
    }
}
