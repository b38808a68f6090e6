//! In-memory tracking of executions for polling.

use std::collections::{HashMap, VecDeque};
use std::sync::{PoisonError, RwLock};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ExecutionError;
use crate::record::{ExecutionFailure, ExecutionStatus, WorkflowExecution};

struct Entry {
  record: WorkflowExecution,
  cancel: CancellationToken,
}

#[derive(Default)]
struct Inner {
  entries: HashMap<String, Entry>,
  /// Execution ids, oldest first.
  order: VecDeque<String>,
}

/// Executions keyed by id.
///
/// Running executions are always kept. Once more than `history_limit`
/// executions are terminal, the oldest terminal ones are dropped.
pub struct ExecutionStore {
  inner: RwLock<Inner>,
  history_limit: usize,
}

impl ExecutionStore {
  /// Keep at most `history_limit` terminal records. The most recent one is
  /// always kept so a just-finished execution can still be polled.
  pub fn new(history_limit: usize) -> Self {
    Self {
      inner: RwLock::new(Inner::default()),
      history_limit: history_limit.max(1),
    }
  }

  /// Track a new execution and return its cancellation token.
  pub(crate) fn insert(&self, record: WorkflowExecution) -> CancellationToken {
    let cancel = CancellationToken::new();
    let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
    inner.order.push_back(record.execution_id.clone());
    inner.entries.insert(
      record.execution_id.clone(),
      Entry {
        record,
        cancel: cancel.clone(),
      },
    );
    cancel
  }

  /// Snapshot of one execution.
  pub fn get(&self, execution_id: &str) -> Result<WorkflowExecution, ExecutionError> {
    let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
    inner
      .entries
      .get(execution_id)
      .map(|e| e.record.clone())
      .ok_or_else(|| ExecutionError::NotFound(execution_id.to_string()))
  }

  /// Snapshots of all tracked executions, newest first.
  pub fn list(&self) -> Vec<WorkflowExecution> {
    let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
    inner
      .order
      .iter()
      .rev()
      .filter_map(|id| inner.entries.get(id))
      .map(|e| e.record.clone())
      .collect()
  }

  /// Number of executions that have not reached a terminal state.
  pub fn active_count(&self) -> usize {
    let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
    inner
      .entries
      .values()
      .filter(|e| !e.record.status.is_terminal())
      .count()
  }

  /// Apply a change to a non-terminal execution.
  ///
  /// Returns false if the execution is unknown or already terminal.
  pub(crate) fn update(&self, execution_id: &str, f: impl FnOnce(&mut WorkflowExecution)) -> bool {
    let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
    match inner.entries.get_mut(execution_id) {
      Some(entry) if !entry.record.status.is_terminal() => {
        f(&mut entry.record);
        true
      }
      _ => false,
    }
  }

  /// Move an execution to a terminal state and return the final record.
  pub(crate) fn finish(
    &self,
    execution_id: &str,
    status: ExecutionStatus,
    failure: Option<ExecutionFailure>,
  ) -> Result<WorkflowExecution, ExecutionError> {
    debug_assert!(status.is_terminal());
    let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);

    let entry = inner
      .entries
      .get_mut(execution_id)
      .ok_or_else(|| ExecutionError::NotFound(execution_id.to_string()))?;
    if entry.record.status.is_terminal() {
      return Err(ExecutionError::AlreadyFinished(execution_id.to_string()));
    }

    entry.record.status = status;
    entry.record.failure = failure;
    entry.record.completed_at = Some(Utc::now());
    let record = entry.record.clone();

    evict(&mut inner, self.history_limit);
    Ok(record)
  }

  /// Request cooperative cancellation.
  pub fn cancel(&self, execution_id: &str) -> Result<(), ExecutionError> {
    let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
    let entry = inner
      .entries
      .get(execution_id)
      .ok_or_else(|| ExecutionError::NotFound(execution_id.to_string()))?;
    if entry.record.status.is_terminal() {
      return Err(ExecutionError::AlreadyFinished(execution_id.to_string()));
    }
    entry.cancel.cancel();
    Ok(())
  }

  pub fn len(&self) -> usize {
    let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
    inner.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

fn evict(inner: &mut Inner, history_limit: usize) {
  let mut terminal = inner
    .entries
    .values()
    .filter(|e| e.record.status.is_terminal())
    .count();

  while terminal > history_limit {
    let Some(pos) = inner.order.iter().position(|id| {
      inner
        .entries
        .get(id)
        .is_some_and(|e| e.record.status.is_terminal())
    }) else {
      break;
    };
    if let Some(id) = inner.order.remove(pos) {
      inner.entries.remove(&id);
      debug!(execution_id = %id, "evicted execution from history");
    }
    terminal -= 1;
  }
}
