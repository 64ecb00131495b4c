//! Playbook configuration.
//!
//! A playbook names the controller to talk to, how to poll it, and the list
//! of desired devices. YAML is the primary format; files ending in `.json`
//! are parsed as JSON.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::descriptor::DeviceDescriptor;
use crate::outcome::OperationKind;
use crate::poller::RetryPolicy;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Reconciliation direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Converge the controller towards the playbook.
    #[default]
    Merged,
    /// Remove the playbook's devices (or UDF) from the controller.
    Deleted,
}

/// Controller connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Verify the controller's TLS certificate.
    #[serde(default = "default_true")]
    pub verify: bool,
    #[serde(default = "default_version")]
    pub version: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl ControllerConfig {
    pub fn base_url(&self) -> String {
        format!("https://{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

/// Polling behaviour for asynchronous controller tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Delay between two status reads, in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Attempt budget for every operation without an override; `null` polls forever.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: Option<u32>,
    /// Per-operation attempt budgets.
    #[serde(default)]
    pub overrides: BTreeMap<OperationKind, Option<u32>>,
    /// Managed-state checks before wired provisioning.
    #[serde(default = "default_wired_managed_attempts")]
    pub wired_managed_attempts: u32,
    /// Managed-state checks before wireless provisioning.
    #[serde(default = "default_wireless_managed_attempts")]
    pub wireless_managed_attempts: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            max_attempts: default_max_attempts(),
            overrides: BTreeMap::new(),
            wired_managed_attempts: default_wired_managed_attempts(),
            wireless_managed_attempts: default_wireless_managed_attempts(),
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Retry policy for task polling of one operation kind.
    pub fn policy_for(&self, kind: OperationKind) -> RetryPolicy {
        let max_attempts = self
            .overrides
            .get(&kind)
            .copied()
            .unwrap_or(self.max_attempts);
        RetryPolicy {
            max_attempts,
            interval: self.interval(),
        }
    }

    /// Retry policy for the managed-state wait before provisioning.
    pub fn managed_policy(&self, kind: OperationKind) -> RetryPolicy {
        let attempts = match kind {
            OperationKind::ProvisionWireless => self.wireless_managed_attempts,
            _ => self.wired_managed_attempts,
        };
        RetryPolicy::bounded(attempts, self.interval())
    }
}

/// A complete playbook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playbook {
    pub controller: ControllerConfig,
    #[serde(default)]
    pub state: Mode,
    #[serde(default)]
    pub config_verify: bool,
    #[serde(default)]
    pub polling: PollingConfig,
    /// Password protecting credential exports used for credential merging.
    #[serde(default)]
    pub credential_export_password: Option<String>,
    #[serde(default)]
    pub config: Vec<DeviceDescriptor>,
}

impl Playbook {
    /// Load a playbook from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let display = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;

        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));

        if is_json {
            Self::from_json(&content)
        } else {
            Self::from_yaml(&content)
        }
        .map_err(|message| ConfigError::Parse {
            path: display,
            message,
        })
    }

    pub fn from_yaml(content: &str) -> std::result::Result<Self, String> {
        serde_yaml::from_str(content).map_err(|e| e.to_string())
    }

    pub fn from_json(content: &str) -> std::result::Result<Self, String> {
        serde_json::from_str(content).map_err(|e| e.to_string())
    }
}

fn default_port() -> u16 {
    443
}

fn default_true() -> bool {
    true
}

fn default_version() -> String {
    "2.3.7.6".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_interval_ms() -> u64 {
    2000
}

fn default_max_attempts() -> Option<u32> {
    Some(150)
}

fn default_wired_managed_attempts() -> u32 {
    400
}

fn default_wireless_managed_attempts() -> u32 {
    200
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAYBOOK: &str = r#"
controller:
  host: dnac.example.com
  username: admin
  password: secret
state: deleted
polling:
  interval_ms: 10
  max_attempts: 5
  overrides:
    resync: 20
    export: null
config:
  - ip_address: ["10.0.0.1"]
    device_added: true
"#;

    #[test]
    fn test_parse_playbook() {
        let playbook = Playbook::from_yaml(PLAYBOOK).unwrap();
        assert_eq!(playbook.state, Mode::Deleted);
        assert_eq!(playbook.controller.port, 443);
        assert!(playbook.controller.verify);
        assert_eq!(playbook.controller.version, "2.3.7.6");
        assert_eq!(playbook.controller.base_url(), "https://dnac.example.com:443");
        assert_eq!(playbook.config.len(), 1);
        assert!(!playbook.config_verify);
    }

    #[test]
    fn test_policy_overrides() {
        let polling = Playbook::from_yaml(PLAYBOOK).unwrap().polling;
        assert_eq!(polling.policy_for(OperationKind::Add).max_attempts, Some(5));
        assert_eq!(polling.policy_for(OperationKind::Resync).max_attempts, Some(20));
        assert_eq!(polling.policy_for(OperationKind::Export).max_attempts, None);
        assert_eq!(
            polling.managed_policy(OperationKind::ProvisionWired).max_attempts,
            Some(400)
        );
        assert_eq!(
            polling.managed_policy(OperationKind::ProvisionWireless).max_attempts,
            Some(200)
        );
    }

    #[test]
    fn test_json_playbook() {
        let playbook = Playbook::from_json(
            r#"{"controller": {"host": "h", "username": "u", "password": "p"}, "config": []}"#,
        )
        .unwrap();
        assert_eq!(playbook.state, Mode::Merged);
        assert_eq!(playbook.polling.wired_managed_attempts, 400);
    }
}
