//! Error types for the reconciliation engine.

use thiserror::Error;

use crate::clients::archive::ArchiveError;
use crate::validation::ValidationError;

/// Errors raised while talking to the controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// The request never produced a usable HTTP response.
    #[error("transport: {0}")]
    Transport(String),

    /// The controller answered with a non-success status.
    #[error("controller returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The controller accepted the request but refused the operation.
    #[error("rejected: {0}")]
    Rejected(String),

    /// Authentication against the controller failed.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The response body did not have the expected shape.
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ControllerError {
    /// Whether the controller reported the device as already provisioned.
    pub fn is_already_provisioned(&self) -> bool {
        self.to_string().contains("already provisioned")
    }
}

impl From<reqwest::Error> for ControllerError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ControllerError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            ControllerError::Api {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            ControllerError::Transport(e.to_string())
        }
    }
}

/// Errors that abort a reconciliation pass.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Playbook input failed pre-flight validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The full inventory could not be listed, so "absent" is not reliable.
    #[error("error while fetching devices from the controller: {0}")]
    Inventory(ControllerError),

    /// A controller call failed outside of a per-device loop.
    #[error(transparent)]
    Controller(#[from] ControllerError),

    /// An exported archive could not be read.
    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

/// Result type for reconciliation.
pub type Result<T> = std::result::Result<T, ReconcileError>;
