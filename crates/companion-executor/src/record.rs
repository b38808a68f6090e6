//! Execution records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of an execution.
///
/// `Pending → Running → Completed | Failed | Cancelled`. Terminal records
/// are never modified again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
  Pending,
  Running,
  Completed,
  Failed,
  Cancelled,
}

impl ExecutionStatus {
  pub fn is_terminal(&self) -> bool {
    matches!(
      self,
      ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
    )
  }
}

/// Classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
  DuplicateName,
  NotFound,
  /// No registered service provides the step's capability.
  ServiceUnavailable,
  /// A placeholder could not be resolved.
  Parameter,
  /// The service call failed.
  StepExecution,
  Cancelled,
}

/// Error attached to a failed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepError {
  pub kind: ErrorKind,
  pub message: String,
}

/// Outcome of one dispatched step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
  pub step_index: usize,
  pub capability: String,
  pub action: String,
  pub service_id: Option<String>,
  pub success: bool,
  /// Number of requests sent, including retries.
  pub attempts: u32,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub output: Option<serde_json::Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<StepError>,
  pub started_at: DateTime<Utc>,
  pub completed_at: DateTime<Utc>,
}

/// Why an execution did not complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionFailure {
  /// Step that failed; absent when the execution was cancelled between steps.
  pub step_index: Option<usize>,
  pub kind: ErrorKind,
  pub message: String,
}

/// One run of a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecution {
  pub execution_id: String,
  pub template_id: String,
  pub template_name: String,
  pub status: ExecutionStatus,
  pub payload: serde_json::Map<String, serde_json::Value>,
  pub total_steps: usize,
  pub created_at: DateTime<Utc>,
  pub started_at: Option<DateTime<Utc>>,
  pub completed_at: Option<DateTime<Utc>>,
  /// Results of dispatched steps, in order.
  pub step_results: Vec<StepResult>,
  /// Steps not run because a step's conditions were not met.
  #[serde(default)]
  pub steps_skipped: usize,
  pub failure: Option<ExecutionFailure>,
}

impl WorkflowExecution {
  pub(crate) fn new(
    execution_id: String,
    template_id: String,
    template_name: String,
    total_steps: usize,
    payload: serde_json::Map<String, serde_json::Value>,
  ) -> Self {
    Self {
      execution_id,
      template_id,
      template_name,
      status: ExecutionStatus::Pending,
      payload,
      total_steps,
      created_at: Utc::now(),
      started_at: None,
      completed_at: None,
      step_results: Vec::new(),
      steps_skipped: 0,
      failure: None,
    }
  }

  /// Number of steps that completed successfully.
  pub fn steps_completed(&self) -> usize {
    self.step_results.iter().filter(|r| r.success).count()
  }

  /// Time from start to completion, once both are known.
  pub fn duration_ms(&self) -> Option<u64> {
    let (Some(started), Some(completed)) = (self.started_at, self.completed_at) else {
      return None;
    };
    u64::try_from((completed - started).num_milliseconds()).ok()
  }

  pub fn summary(&self) -> ExecutionSummary {
    ExecutionSummary {
      execution_id: self.execution_id.clone(),
      template_id: self.template_id.clone(),
      template_name: self.template_name.clone(),
      status: self.status,
      steps_completed: self.steps_completed(),
      total_steps: self.total_steps,
      created_at: self.created_at,
      completed_at: self.completed_at,
    }
  }
}

/// Listing entry for `GET /executions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
  pub execution_id: String,
  pub template_id: String,
  pub template_name: String,
  pub status: ExecutionStatus,
  pub steps_completed: usize,
  pub total_steps: usize,
  pub created_at: DateTime<Utc>,
  pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_terminal_states() {
    assert!(!ExecutionStatus::Pending.is_terminal());
    assert!(!ExecutionStatus::Running.is_terminal());
    assert!(ExecutionStatus::Completed.is_terminal());
    assert!(ExecutionStatus::Failed.is_terminal());
    assert!(ExecutionStatus::Cancelled.is_terminal());
  }

  #[test]
  fn test_kinds_serialize_snake_case() {
    assert_eq!(
      serde_json::to_value(ErrorKind::ServiceUnavailable).unwrap(),
      "service_unavailable"
    );
    assert_eq!(
      serde_json::to_value(ExecutionStatus::Cancelled).unwrap(),
      "cancelled"
    );
  }
}
