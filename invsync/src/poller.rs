//! Task polling.
//!
//! Every asynchronous controller operation hands back a [`TaskHandle`]. The
//! [`TaskPoller`] reads its status until the operation's [`CompletionRule`]
//! matches, the controller reports an error, or the [`RetryPolicy`] runs out.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::clients::{ControllerApi, Result, TaskHandle, TaskStatus};
use crate::config::PollingConfig;
use crate::error::ControllerError;
use crate::outcome::OperationKind;

/// Attempt budget and pacing for a polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// `None` polls until a terminal state is seen.
    pub max_attempts: Option<u32>,
    pub interval: Duration,
}

impl RetryPolicy {
    pub fn bounded(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            interval,
        }
    }

    pub fn unbounded(interval: Duration) -> Self {
        Self {
            max_attempts: None,
            interval,
        }
    }

    fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

/// Predicate on a task status that signals successful completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionRule {
    ProgressContains(&'static str),
    EndTimePresent,
    StatusEquals(&'static str),
    AdditionalStatusUrlPresent,
}

impl CompletionRule {
    pub fn matches(&self, status: &TaskStatus) -> bool {
        match self {
            CompletionRule::ProgressContains(needle) => status.progress.contains(needle),
            CompletionRule::EndTimePresent => status.end_time.is_some(),
            CompletionRule::StatusEquals(expected) => status.status.as_deref() == Some(*expected),
            CompletionRule::AdditionalStatusUrlPresent => status.additional_status_url.is_some(),
        }
    }
}

/// Completion rule of every operation kind.
pub fn completion_rule(kind: OperationKind) -> CompletionRule {
    match kind {
        OperationKind::Add => CompletionRule::ProgressContains("/task/"),
        OperationKind::UpdateCredentials | OperationKind::UpdateManagementIp => {
            CompletionRule::EndTimePresent
        }
        OperationKind::UpdateRole => CompletionRule::ProgressContains("successfully"),
        OperationKind::UpdateInterface => CompletionRule::ProgressContains("SUCCESS"),
        OperationKind::Resync => CompletionRule::ProgressContains("Synced"),
        OperationKind::Reboot => CompletionRule::ProgressContains("url"),
        OperationKind::ProvisionWired | OperationKind::ProvisionWireless => {
            CompletionRule::ProgressContains("TASK_PROVISION")
        }
        OperationKind::DeleteDevice | OperationKind::DeleteUdf | OperationKind::AddUdf => {
            CompletionRule::ProgressContains("success")
        }
        OperationKind::DeleteProvisioned => CompletionRule::StatusEquals("SUCCESS"),
        OperationKind::Export => CompletionRule::AdditionalStatusUrlPresent,
    }
}

/// Terminal state of a polled task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Success(TaskStatus),
    Failed(String),
    Timeout { attempts: u32 },
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success(_))
    }

    /// Failure description, `None` on success.
    pub fn failure(&self) -> Option<String> {
        match self {
            TaskOutcome::Success(_) => None,
            TaskOutcome::Failed(reason) => Some(reason.clone()),
            TaskOutcome::Timeout { attempts } => {
                Some(format!("task did not complete after {} attempts", attempts))
            }
        }
    }
}

/// Run `probe` until it yields a value or the policy is exhausted.
///
/// Returns `Ok(None)` when the attempt budget ran out. The probe receives the
/// 1-based attempt number.
pub async fn wait_for<T, E, F, Fut>(policy: &RetryPolicy, mut probe: F) -> std::result::Result<Option<T>, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = std::result::Result<Option<T>, E>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        if let Some(value) = probe(attempt).await? {
            return Ok(Some(value));
        }
        if policy.exhausted(attempt) {
            return Ok(None);
        }
        tokio::time::sleep(policy.interval).await;
    }
}

/// Polls controller tasks to a terminal state.
#[derive(Clone)]
pub struct TaskPoller {
    controller: Arc<dyn ControllerApi>,
    polling: PollingConfig,
}

impl TaskPoller {
    pub fn new(controller: Arc<dyn ControllerApi>, polling: PollingConfig) -> Self {
        Self {
            controller,
            polling,
        }
    }

    pub fn polling(&self) -> &PollingConfig {
        &self.polling
    }

    /// Wait for a task of the given kind to finish.
    pub async fn await_completion(
        &self,
        handle: &TaskHandle,
        kind: OperationKind,
    ) -> Result<TaskOutcome> {
        let policy = self.polling.policy_for(kind);
        let rule = completion_rule(kind);

        let outcome = wait_for::<_, ControllerError, _, _>(&policy, |attempt| async move {
            let status = self.controller.task_status(handle).await?;
            debug!(%handle, attempt, progress = %status.progress, "polled {}", kind);

            if status.is_error {
                let reason = status
                    .failure_reason
                    .clone()
                    .filter(|r| !r.is_empty())
                    .unwrap_or_else(|| format!("{} task failed", kind));
                return Ok(Some(TaskOutcome::Failed(reason)));
            }
            if rule.matches(&status) {
                return Ok(Some(TaskOutcome::Success(status)));
            }
            Ok(None)
        })
        .await?;

        Ok(outcome.unwrap_or_else(|| {
            let attempts = policy.max_attempts.unwrap_or_default();
            warn!(%handle, attempts, "{} task timed out", kind);
            TaskOutcome::Timeout { attempts }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(progress: &str) -> TaskStatus {
        TaskStatus {
            progress: progress.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_completion_rule_table() {
        let add = completion_rule(OperationKind::Add);
        assert!(add.matches(&status("/api/v1/task/123")));
        assert!(!add.matches(&status("in progress")));

        assert!(completion_rule(OperationKind::UpdateRole)
            .matches(&status("Device role updated successfully")));
        assert!(completion_rule(OperationKind::UpdateInterface).matches(&status("SUCCESS")));
        assert!(completion_rule(OperationKind::Resync).matches(&status("Synced 2 devices")));
        assert!(completion_rule(OperationKind::Reboot).matches(&status("{\"url\":\"x\"}")));
        assert!(completion_rule(OperationKind::ProvisionWired)
            .matches(&status("TASK_PROVISION completed")));
        assert!(completion_rule(OperationKind::DeleteDevice)
            .matches(&status("Network device deleted successfully")));

        let creds = completion_rule(OperationKind::UpdateCredentials);
        assert!(!creds.matches(&status("done")));
        assert!(creds.matches(&TaskStatus {
            end_time: Some(1),
            ..Default::default()
        }));

        let deprovision = completion_rule(OperationKind::DeleteProvisioned);
        assert!(deprovision.matches(&TaskStatus {
            status: Some("SUCCESS".to_string()),
            ..Default::default()
        }));
        assert!(!deprovision.matches(&status("SUCCESS")));

        assert!(completion_rule(OperationKind::Export).matches(&TaskStatus {
            additional_status_url: Some("/file/1".to_string()),
            ..Default::default()
        }));
    }

    #[tokio::test]
    async fn test_wait_for_exhausts_bounded_policy() {
        let policy = RetryPolicy::bounded(3, Duration::from_millis(1));
        let mut calls = 0;
        let result: std::result::Result<Option<()>, ()> = wait_for(&policy, |_| {
            calls += 1;
            async { Ok(None) }
        })
        .await;
        assert_eq!(result, Ok(None));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_wait_for_returns_first_value() {
        let policy = RetryPolicy::unbounded(Duration::from_millis(1));
        let result: std::result::Result<Option<u32>, ()> =
            wait_for(&policy, |attempt| async move { Ok((attempt == 4).then_some(attempt)) }).await;
        assert_eq!(result, Ok(Some(4)));
    }

    #[tokio::test]
    async fn test_wait_for_propagates_errors() {
        let policy = RetryPolicy::bounded(5, Duration::from_millis(1));
        let result: std::result::Result<Option<u32>, &str> =
            wait_for(&policy, |_| async { Err("down") }).await;
        assert_eq!(result, Err("down"));
    }
}
