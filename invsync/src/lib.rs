//! invsync: reconciles a desired network-device inventory with a controller.
//!
//! A pass validates the playbook, probes controller state, diffs it against
//! every entry and runs the executors the entry asks for. Every controller
//! operation is asynchronous and awaited through the task poller.

pub mod audit;
pub mod clients;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod executor;
pub mod outcome;
pub mod payload;
pub mod poller;
pub mod prober;
pub mod reconciler;
pub mod validation;
pub mod verifier;

pub use clients::{ControllerApi, RestController};
pub use config::{Mode, Playbook};
pub use descriptor::DeviceDescriptor;
pub use error::{ControllerError, ReconcileError};
pub use outcome::{DeviceOutcome, ReconciliationResult, StepReport};
pub use reconciler::Reconciler;
