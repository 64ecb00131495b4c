//! RestController against a mock controller HTTP API.

mod common;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use common::MockServer;
use invsync::clients::{ControllerApi, DeviceFilter, Operation, TaskHandle};
use invsync::descriptor::WirelessProvision;
use invsync::payload::{DevicePayload, WirelessProvisionPayload};
use invsync::{ControllerError, RestController};
use serde_json::{json, Value};

const TOKEN: &str = "tok-1";

#[derive(Default)]
struct MockState {
    auth_calls: AtomicUsize,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("X-Auth-Token").and_then(|v| v.to_str().ok()) == Some(TOKEN)
}

async fn auth(State(state): State<Arc<MockState>>, headers: HeaderMap) -> impl IntoResponse {
    state.auth_calls.fetch_add(1, Ordering::SeqCst);
    if headers.get(header::AUTHORIZATION).is_none() {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "no credentials"})));
    }
    (StatusCode::OK, Json(json!({ "Token": TOKEN })))
}

async fn list_devices(
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({})));
    }
    let devices = vec![
        json!({"id": "d1", "managementIpAddress": "10.0.0.1", "hostname": "sw1", "family": "Switches and Hubs"}),
        json!({"id": "d2", "managementIpAddress": "10.0.0.2", "hostname": "ap1", "family": "Unified AP"}),
    ];
    let matching: Vec<Value> = match params.get("managementIpAddress") {
        Some(ip) => devices
            .into_iter()
            .filter(|d| d["managementIpAddress"] == ip.as_str())
            .collect(),
        None => devices,
    };
    (StatusCode::OK, Json(json!({ "response": matching })))
}

async fn add_devices(headers: HeaderMap, Json(body): Json<Value>) -> impl IntoResponse {
    if !authorized(&headers) || body["ipAddress"].as_array().is_none() {
        return (StatusCode::BAD_REQUEST, Json(json!({"response": {"errorCode": "bad"}})));
    }
    (
        StatusCode::ACCEPTED,
        Json(json!({"response": {"taskId": "t-1", "url": "/api/v1/task/t-1"}, "version": "1.0"})),
    )
}

async fn task(Path(id): Path<String>) -> Json<Value> {
    Json(json!({"response": {"progress": format!("/api/v1/task/{}", id), "isError": false}}))
}

async fn provision(Query(params): Query<HashMap<String, String>>) -> impl IntoResponse {
    match params.get("deviceManagementIpAddress").map(String::as_str) {
        Some("10.0.0.1") => (StatusCode::OK, Json(json!({"status": "success"}))),
        _ => (StatusCode::NOT_FOUND, Json(json!({"status": "failed"}))),
    }
}

async fn deprovision() -> Json<Value> {
    Json(json!({"executionId": "e-1", "executionStatusUrl": "/execution-status/e-1", "status": "pending"}))
}

async fn wireless_provision() -> Json<Value> {
    Json(json!({"status": "failed", "description": "Device 10.0.0.9 already provisioned"}))
}

async fn execution_status(Path(id): Path<String>) -> Json<Value> {
    Json(json!({"bapiName": format!("Delete {}", id), "status": "SUCCESS", "endTime": 1700000000000i64}))
}

async fn interface_by_name() -> StatusCode {
    StatusCode::NOT_FOUND
}

async fn download(Path(id): Path<String>) -> impl IntoResponse {
    (
        [(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}.csv\"", id),
        )],
        "ip_address,hostname\n10.0.0.1,sw1\n",
    )
}

async fn spawn() -> (MockServer, Arc<MockState>, RestController) {
    let state = Arc::new(MockState::default());
    let router = Router::new()
        .route("/dna/system/api/v1/auth/token", post(auth))
        .route(
            "/dna/intent/api/v1/network-device",
            get(list_devices).post(add_devices),
        )
        .route("/dna/intent/api/v1/task/{id}", get(task))
        .route(
            "/dna/intent/api/v1/business/sda/provision-device",
            get(provision).delete(deprovision),
        )
        .route("/dna/intent/api/v1/wireless/provision", post(wireless_provision))
        .route(
            "/dna/platform/management/business-api/v1/execution-status/{id}",
            get(execution_status),
        )
        .route(
            "/dna/intent/api/v1/interface/network-device/{id}/interface-name",
            get(interface_by_name),
        )
        .route("/dna/intent/api/v1/file/{id}", get(download))
        .with_state(state.clone());

    let server = MockServer::spawn(router).await;
    let client = RestController::with_client(
        reqwest::Client::new(),
        server.base_url(),
        "admin",
        "secret",
    );
    (server, state, client)
}

#[tokio::test]
async fn test_token_is_fetched_once() {
    let (server, state, client) = spawn().await;

    let all = client.list_devices(&DeviceFilter::All).await.unwrap();
    assert_eq!(all.len(), 2);
    assert!(all[1].is_access_point());

    let one = client
        .list_devices(&DeviceFilter::ManagementIp("10.0.0.1".to_string()))
        .await
        .unwrap();
    assert_eq!(one.len(), 1);
    assert_eq!(one[0].id, "d1");
    assert_eq!(one[0].hostname.as_deref(), Some("sw1"));

    assert_eq!(state.auth_calls.load(Ordering::SeqCst), 1);
    server.shutdown();
}

#[tokio::test]
async fn test_submit_and_poll_task() {
    let (server, _state, client) = spawn().await;

    let mut payload = DevicePayload::default();
    payload.ip_address = vec!["10.0.0.3".to_string()];
    let handle = client.submit(Operation::AddDevices(payload)).await.unwrap();
    assert_eq!(handle, TaskHandle::Task("t-1".to_string()));

    let status = client.task_status(&handle).await.unwrap();
    assert!(!status.is_error);
    assert!(status.progress.contains("/task/t-1"));
    server.shutdown();
}

#[tokio::test]
async fn test_execution_handle_and_status() {
    let (server, _state, client) = spawn().await;

    let handle = client
        .submit(Operation::DeleteProvisioned {
            management_ip: "10.0.0.1".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(handle, TaskHandle::Execution("e-1".to_string()));

    let status = client.task_status(&handle).await.unwrap();
    assert_eq!(status.status.as_deref(), Some("SUCCESS"));
    assert_eq!(status.progress, "Delete e-1");
    assert!(!status.is_error);
    server.shutdown();
}

#[tokio::test]
async fn test_rejected_submission() {
    let (server, _state, client) = spawn().await;

    let wireless = WirelessProvision {
        site_name: "Global/SJC".to_string(),
        ..Default::default()
    };
    let payload = WirelessProvisionPayload::new(&wireless, "wlc-1".to_string());
    let err = client
        .submit(Operation::ProvisionWireless(payload))
        .await
        .unwrap_err();
    assert!(matches!(err, ControllerError::Rejected(_)));
    assert!(err.is_already_provisioned());
    server.shutdown();
}

#[tokio::test]
async fn test_provisioned_state_and_missing_interface() {
    let (server, _state, client) = spawn().await;

    assert!(client.is_wired_provisioned("10.0.0.1").await.unwrap());
    assert!(!client.is_wired_provisioned("10.0.0.2").await.unwrap());
    assert_eq!(client.interface_by_name("d1", "Gi1/0/1").await.unwrap(), None);
    server.shutdown();
}

#[tokio::test]
async fn test_download_file_name() {
    let (server, _state, client) = spawn().await;

    let file = client.download_file("export-42").await.unwrap();
    assert_eq!(file.name.as_deref(), Some("export-42.csv"));
    assert!(String::from_utf8(file.bytes).unwrap().starts_with("ip_address"));
    server.shutdown();
}

#[tokio::test]
async fn test_unknown_endpoint_maps_to_api_error() {
    let (server, _state, client) = spawn().await;

    let err = client.list_udfs("Owner").await.unwrap_err();
    assert!(matches!(err, ControllerError::Api { status: 404, .. }));
    server.shutdown();
}
