//! Execution events and notifiers for observability.
//!
//! Events are emitted while a workflow runs so consumers can follow
//! progress, stream it to a UI or record it elsewhere.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::record::{ErrorKind, ExecutionStatus};

/// Events emitted during workflow execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEvent {
  /// The execution task has started.
  ExecutionStarted {
    execution_id: String,
    template_id: String,
  },

  /// A step has been dispatched to a service.
  StepStarted {
    execution_id: String,
    step_index: usize,
    capability: String,
    service_id: String,
  },

  /// A step returned a usable output.
  StepCompleted {
    execution_id: String,
    step_index: usize,
    output: serde_json::Value,
  },

  /// A step failed and the execution is stopping.
  StepFailed {
    execution_id: String,
    step_index: usize,
    kind: ErrorKind,
    error: String,
  },

  /// The execution reached a terminal state.
  ExecutionFinished {
    execution_id: String,
    template_id: String,
    template_name: String,
    status: ExecutionStatus,
    steps_completed: usize,
    total_steps: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_ms: Option<u64>,
  },
}

/// Receives execution events.
///
/// The executor calls `notify` for each event. Implementations decide
/// what to do with them and must not block.
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: ExecutionEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {}
}

/// Sends events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  // Unbounded so a slow consumer never stalls an execution. Volume is a
  // handful of events per step.
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    // Receiver may have been dropped
    let _ = self.sender.send(event);
  }
}
