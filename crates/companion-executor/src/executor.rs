//! Workflow execution.
//!
//! The `WorkflowExecutor` runs a template's steps strictly in order, each
//! against the best registered provider of the step's capability.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use companion_config::RetryPolicy;
use companion_registry::ServiceRegistry;
use companion_template::{StepSpec, TemplateStore, WorkflowTemplate, render};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::error::{ExecutionError, InvokeError};
use crate::events::{ExecutionEvent, ExecutionNotifier, NoopNotifier};
use crate::invoker::{StepInvoker, StepRequest};
use crate::record::{
  ErrorKind, ExecutionFailure, ExecutionStatus, StepError, StepResult, WorkflowExecution,
};
use crate::store::ExecutionStore;

/// Executor limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
  /// Request timeout for steps that do not set their own.
  #[serde(default = "default_step_timeout_ms")]
  pub step_timeout_ms: u64,

  /// Terminal executions kept for polling.
  #[serde(default = "default_history_limit")]
  pub history_limit: usize,
}

impl Default for ExecutorConfig {
  fn default() -> Self {
    Self {
      step_timeout_ms: default_step_timeout_ms(),
      history_limit: default_history_limit(),
    }
  }
}

fn default_step_timeout_ms() -> u64 {
  10_000
}

fn default_history_limit() -> usize {
  100
}

/// A started execution.
///
/// The execution runs on its own task whether or not the handle is awaited.
pub struct ExecutionHandle {
  execution_id: String,
  join: JoinHandle<Result<WorkflowExecution, ExecutionError>>,
}

impl ExecutionHandle {
  pub fn execution_id(&self) -> &str {
    &self.execution_id
  }

  /// Wait for the execution to reach a terminal state.
  pub async fn wait(self) -> Result<WorkflowExecution, ExecutionError> {
    self.join.await.map_err(|e| ExecutionError::Join {
      message: e.to_string(),
    })?
  }
}

/// Why a step's dispatch did not produce an output.
enum DispatchError {
  Failed(InvokeError),
  Cancelled,
}

/// Runs workflow templates against registered services.
#[derive(Clone)]
pub struct WorkflowExecutor {
  registry: Arc<ServiceRegistry>,
  templates: Arc<TemplateStore>,
  invoker: Arc<dyn StepInvoker>,
  notifier: Arc<dyn ExecutionNotifier>,
  store: Arc<ExecutionStore>,
  config: ExecutorConfig,
}

impl WorkflowExecutor {
  /// Create an executor whose events are discarded.
  pub fn new(
    registry: Arc<ServiceRegistry>,
    templates: Arc<TemplateStore>,
    invoker: Arc<dyn StepInvoker>,
    config: ExecutorConfig,
  ) -> Self {
    Self {
      registry,
      templates,
      invoker,
      notifier: Arc::new(NoopNotifier),
      store: Arc::new(ExecutionStore::new(config.history_limit)),
      config,
    }
  }

  /// Report events to `notifier`.
  pub fn with_notifier(mut self, notifier: impl ExecutionNotifier + 'static) -> Self {
    self.notifier = Arc::new(notifier);
    self
  }

  pub fn registry(&self) -> &Arc<ServiceRegistry> {
    &self.registry
  }

  pub fn templates(&self) -> &Arc<TemplateStore> {
    &self.templates
  }

  /// Create an execution and run it on a new task.
  ///
  /// Returns as soon as the execution is tracked; poll [`status`] or await
  /// the handle for the outcome.
  ///
  /// [`status`]: WorkflowExecutor::status
  pub fn start(
    &self,
    template_id: &str,
    payload: serde_json::Map<String, serde_json::Value>,
  ) -> Result<ExecutionHandle, ExecutionError> {
    let template = self.templates.get(template_id)?;
    let execution_id = uuid::Uuid::new_v4().to_string();

    let record = WorkflowExecution::new(
      execution_id.clone(),
      template.template_id.clone(),
      template.name.clone(),
      template.steps.len(),
      payload.clone(),
    );
    let cancel = self.store.insert(record);

    info!(
      execution_id = %execution_id,
      template_id = %template.template_id,
      "execution_created"
    );

    let executor = self.clone();
    let id = execution_id.clone();
    let join = tokio::spawn(async move { executor.run(template, id, payload, cancel).await });

    Ok(ExecutionHandle { execution_id, join })
  }

  /// Start an execution and wait for its final record.
  pub async fn execute(
    &self,
    template_id: &str,
    payload: serde_json::Map<String, serde_json::Value>,
  ) -> Result<WorkflowExecution, ExecutionError> {
    self.start(template_id, payload)?.wait().await
  }

  /// Snapshot of one execution.
  pub fn status(&self, execution_id: &str) -> Result<WorkflowExecution, ExecutionError> {
    self.store.get(execution_id)
  }

  /// Tracked executions, newest first.
  pub fn list(&self) -> Vec<WorkflowExecution> {
    self.store.list()
  }

  /// Request cancellation. The execution stops before its next step.
  pub fn cancel(&self, execution_id: &str) -> Result<(), ExecutionError> {
    self.store.cancel(execution_id)?;
    info!(execution_id = %execution_id, "cancellation requested");
    Ok(())
  }

  pub fn active_count(&self) -> usize {
    self.store.active_count()
  }

  #[instrument(
    name = "workflow_execute",
    skip(self, template, payload, cancel),
    fields(template_id = %template.template_id)
  )]
  async fn run(
    self,
    template: Arc<WorkflowTemplate>,
    execution_id: String,
    payload: serde_json::Map<String, serde_json::Value>,
    cancel: CancellationToken,
  ) -> Result<WorkflowExecution, ExecutionError> {
    self.store.update(&execution_id, |r| {
      r.status = ExecutionStatus::Running;
      r.started_at = Some(Utc::now());
    });
    self.notifier.notify(ExecutionEvent::ExecutionStarted {
      execution_id: execution_id.clone(),
      template_id: template.template_id.clone(),
    });
    info!(
      execution_id = %execution_id,
      steps = template.steps.len(),
      "workflow_started"
    );

    let outcome = self
      .run_steps(&template, &execution_id, payload, &cancel)
      .await;

    let (status, failure) = match outcome {
      Ok(()) => (ExecutionStatus::Completed, None),
      Err(failure) if failure.kind == ErrorKind::Cancelled => {
        (ExecutionStatus::Cancelled, Some(failure))
      }
      Err(failure) => (ExecutionStatus::Failed, Some(failure)),
    };

    match &failure {
      None => info!(execution_id = %execution_id, "workflow_completed"),
      Some(f) if status == ExecutionStatus::Cancelled => {
        warn!(execution_id = %execution_id, step_index = ?f.step_index, "workflow_cancelled")
      }
      Some(f) => error!(
        execution_id = %execution_id,
        step_index = ?f.step_index,
        kind = ?f.kind,
        error = %f.message,
        "workflow_failed"
      ),
    }

    let record = self.store.finish(&execution_id, status, failure)?;
    self.notifier.notify(ExecutionEvent::ExecutionFinished {
      execution_id,
      template_id: record.template_id.clone(),
      template_name: record.template_name.clone(),
      status,
      steps_completed: record.steps_completed(),
      total_steps: record.total_steps,
      duration_ms: record.duration_ms(),
    });
    Ok(record)
  }

  /// Run every step in order; the first failure stops the execution, and
  /// unmet step conditions end it early as completed.
  async fn run_steps(
    &self,
    template: &WorkflowTemplate,
    execution_id: &str,
    payload: serde_json::Map<String, serde_json::Value>,
    cancel: &CancellationToken,
  ) -> Result<(), ExecutionFailure> {
    // Later sources win: defaults, then payload, then step outputs.
    let mut context = template.defaults.clone();
    context.extend(payload);

    for step in &template.steps {
      if cancel.is_cancelled() {
        return Err(ExecutionFailure {
          step_index: None,
          kind: ErrorKind::Cancelled,
          message: format!("cancelled before step {}", step.index),
        });
      }

      let service = self.registry.lookup(&step.capability).map_err(|e| {
        self.fail_step(execution_id, step, ErrorKind::ServiceUnavailable, e.to_string())
      })?;

      let body = render(&step.params, &context).map_err(|e| {
        self.fail_step(execution_id, step, ErrorKind::Parameter, e.to_string())
      })?;

      let request = StepRequest {
        execution_id: execution_id.to_string(),
        step_index: step.index,
        service,
        action: step.action.clone(),
        body,
        timeout: Duration::from_millis(step.timeout_ms.unwrap_or(self.config.step_timeout_ms)),
      };

      self.notifier.notify(ExecutionEvent::StepStarted {
        execution_id: execution_id.to_string(),
        step_index: step.index,
        capability: step.capability.clone(),
        service_id: request.service.id.clone(),
      });
      info!(
        execution_id = %execution_id,
        step_index = step.index,
        service_id = %request.service.id,
        action = %step.action,
        "task_started"
      );

      let started_at = Utc::now();
      let (outcome, attempts) = self.dispatch(&request, step.retry, cancel).await;
      let mut result = StepResult {
        step_index: step.index,
        capability: step.capability.clone(),
        action: step.action.clone(),
        service_id: Some(request.service.id.clone()),
        success: false,
        attempts,
        output: None,
        error: None,
        started_at,
        completed_at: Utc::now(),
      };

      match outcome {
        Ok(output) => {
          let proceed = step.conditions_hold(&output, &context);
          let output = serde_json::Value::Object(output);
          result.success = true;
          result.output = Some(output.clone());
          self
            .store
            .update(execution_id, |r| r.step_results.push(result));

          info!(
            execution_id = %execution_id,
            step_index = step.index,
            attempts,
            "task_completed"
          );
          self.notifier.notify(ExecutionEvent::StepCompleted {
            execution_id: execution_id.to_string(),
            step_index: step.index,
            output: output.clone(),
          });
          context.insert(step.output_key.clone(), output);

          if !proceed {
            let skipped = template.steps.len() - step.index - 1;
            info!(
              execution_id = %execution_id,
              step_index = step.index,
              skipped,
              "step conditions not met, skipping remaining steps"
            );
            self.store.update(execution_id, |r| r.steps_skipped = skipped);
            return Ok(());
          }
        }
        Err(DispatchError::Cancelled) => {
          let message = format!("cancelled while retrying step {}", step.index);
          result.error = Some(StepError {
            kind: ErrorKind::Cancelled,
            message: message.clone(),
          });
          self
            .store
            .update(execution_id, |r| r.step_results.push(result));
          return Err(ExecutionFailure {
            step_index: Some(step.index),
            kind: ErrorKind::Cancelled,
            message,
          });
        }
        Err(DispatchError::Failed(e)) => {
          let message = e.to_string();
          result.error = Some(StepError {
            kind: ErrorKind::StepExecution,
            message: message.clone(),
          });
          self
            .store
            .update(execution_id, |r| r.step_results.push(result));
          return Err(self.fail_step(execution_id, step, ErrorKind::StepExecution, message));
        }
      }
    }

    Ok(())
  }

  /// Send a step, retrying per its policy.
  ///
  /// Returns the outcome and the number of requests sent.
  async fn dispatch(
    &self,
    request: &StepRequest,
    retry: Option<RetryPolicy>,
    cancel: &CancellationToken,
  ) -> (
    Result<serde_json::Map<String, serde_json::Value>, DispatchError>,
    u32,
  ) {
    let max_retries = retry.map(|r| r.max_retries).unwrap_or(0);
    let backoff = Duration::from_millis(retry.map(|r| r.backoff_ms).unwrap_or(0));
    let mut attempts = 0;

    loop {
      attempts += 1;
      match self.invoker.invoke(request).await {
        Ok(output) => return (Ok(output), attempts),
        Err(e) if attempts <= max_retries => {
          warn!(
            execution_id = %request.execution_id,
            step_index = request.step_index,
            attempt = attempts,
            error = %e,
            "step failed, retrying"
          );
          tokio::select! {
            _ = cancel.cancelled() => return (Err(DispatchError::Cancelled), attempts),
            _ = tokio::time::sleep(backoff) => {}
          }
        }
        Err(e) => return (Err(DispatchError::Failed(e)), attempts),
      }
    }
  }

  fn fail_step(
    &self,
    execution_id: &str,
    step: &StepSpec,
    kind: ErrorKind,
    message: String,
  ) -> ExecutionFailure {
    self.notifier.notify(ExecutionEvent::StepFailed {
      execution_id: execution_id.to_string(),
      step_index: step.index,
      kind,
      error: message.clone(),
    });
    ExecutionFailure {
      step_index: Some(step.index),
      kind,
      message,
    }
  }
}

#[cfg(test)]
mod tests {
  use std::collections::HashMap;
  use std::sync::Mutex;
  use std::sync::atomic::{AtomicU32, Ordering};

  use async_trait::async_trait;
  use companion_config::{MAX_RETRIES, StepDef, TemplateDef};
  use companion_registry::Registration;
  use serde_json::json;
  use tokio::sync::{Notify, mpsc};

  use super::*;
  use crate::events::ChannelNotifier;

  type Reply = Result<serde_json::Map<String, serde_json::Value>, InvokeError>;

  /// Replies per action and records every request.
  #[derive(Default)]
  struct FakeInvoker {
    replies: HashMap<String, Reply>,
    requests: Mutex<Vec<StepRequest>>,
  }

  impl FakeInvoker {
    fn reply(mut self, action: &str, reply: Reply) -> Self {
      self.replies.insert(action.to_string(), reply);
      self
    }

    fn requests(&self) -> Vec<StepRequest> {
      self.requests.lock().unwrap().clone()
    }
  }

  #[async_trait]
  impl StepInvoker for FakeInvoker {
    async fn invoke(&self, request: &StepRequest) -> Reply {
      self.requests.lock().unwrap().push(request.clone());
      self
        .replies
        .get(&request.action)
        .cloned()
        .unwrap_or_else(|| Ok(serde_json::Map::new()))
    }
  }

  fn object(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
    value.as_object().cloned().unwrap()
  }

  fn registry(capabilities: &[&str]) -> Arc<ServiceRegistry> {
    let registry = Arc::new(ServiceRegistry::new());
    for (i, capability) in capabilities.iter().enumerate() {
      registry
        .register(
          Registration::new(format!("svc-{}", capability), format!("http://localhost:{}", 9000 + i))
            .capability(*capability),
        )
        .unwrap();
    }
    registry
  }

  fn executor(
    registry: Arc<ServiceRegistry>,
    templates: Vec<TemplateDef>,
    invoker: Arc<dyn StepInvoker>,
  ) -> WorkflowExecutor {
    WorkflowExecutor::new(
      registry,
      Arc::new(TemplateStore::new(templates).unwrap()),
      invoker,
      ExecutorConfig::default(),
    )
  }

  fn two_step_template() -> TemplateDef {
    TemplateDef::new(
      "organize",
      "Organize",
      vec![
        StepDef::new("organize_files", "run")
          .param("dir", "{dir}")
          .output_key("organize"),
        StepDef::new("memory_storage", "store")
          .param("content", "moved {organize.files_moved} files from {dir}"),
      ],
    )
  }

  #[tokio::test]
  async fn test_all_steps_succeed() {
    let invoker = Arc::new(
      FakeInvoker::default().reply("run", Ok(object(json!({"files_moved": 3})))),
    );
    let executor = executor(
      registry(&["organize_files", "memory_storage"]),
      vec![two_step_template()],
      invoker.clone(),
    );

    let execution = executor
      .execute("organize", object(json!({"dir": "/tmp/x"})))
      .await
      .unwrap();

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.step_results.len(), 2);
    assert!(execution.step_results.iter().all(|r| r.success));
    assert!(execution.failure.is_none());
    assert!(execution.completed_at.is_some());

    let requests = invoker.requests();
    assert_eq!(requests[0].body, object(json!({"dir": "/tmp/x"})));
    assert_eq!(
      requests[1].body,
      object(json!({"content": "moved 3 files from /tmp/x"}))
    );
  }

  #[tokio::test]
  async fn test_missing_provider_stops_at_failing_step() {
    let invoker = Arc::new(FakeInvoker::default());
    let executor = executor(
      registry(&["organize_files"]),
      vec![two_step_template()],
      invoker.clone(),
    );

    let execution = executor
      .execute("organize", object(json!({"dir": "/tmp/x"})))
      .await
      .unwrap();

    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(execution.step_results.len(), 1);
    let failure = execution.failure.unwrap();
    assert_eq!(failure.step_index, Some(1));
    assert_eq!(failure.kind, ErrorKind::ServiceUnavailable);
    assert_eq!(invoker.requests().len(), 1);
  }

  #[tokio::test]
  async fn test_unresolved_placeholder_fails_without_dispatch() {
    let invoker = Arc::new(FakeInvoker::default());
    let executor = executor(
      registry(&["organize_files", "memory_storage"]),
      vec![two_step_template()],
      invoker.clone(),
    );

    let execution = executor
      .execute("organize", serde_json::Map::new())
      .await
      .unwrap();

    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert!(execution.step_results.is_empty());
    let failure = execution.failure.unwrap();
    assert_eq!(failure.step_index, Some(0));
    assert_eq!(failure.kind, ErrorKind::Parameter);
    assert!(invoker.requests().is_empty());
  }

  #[tokio::test]
  async fn test_defaults_are_overridden_by_payload() {
    let mut template = TemplateDef::new(
      "memo",
      "Memo",
      vec![StepDef::new("memory_storage", "store").param("content", "{topic}")],
    );
    template.defaults.insert("topic".to_string(), json!("general"));

    let invoker = Arc::new(FakeInvoker::default());
    let executor = executor(registry(&["memory_storage"]), vec![template], invoker.clone());

    executor.execute("memo", serde_json::Map::new()).await.unwrap();
    executor
      .execute("memo", object(json!({"topic": "roadmap"})))
      .await
      .unwrap();

    let requests = invoker.requests();
    assert_eq!(requests[0].body["content"], "general");
    assert_eq!(requests[1].body["content"], "roadmap");
  }

  #[tokio::test]
  async fn test_prior_step_output_overrides_payload() {
    let invoker = Arc::new(
      FakeInvoker::default().reply("run", Ok(object(json!({"files_moved": 3})))),
    );
    let executor = executor(
      registry(&["organize_files", "memory_storage"]),
      vec![two_step_template()],
      invoker.clone(),
    );

    let execution = executor
      .execute(
        "organize",
        object(json!({"dir": "/tmp/x", "organize": {"files_moved": 99}})),
      )
      .await
      .unwrap();

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(
      invoker.requests()[1].body["content"],
      "moved 3 files from /tmp/x"
    );
  }

  #[tokio::test]
  async fn test_unmet_conditions_skip_remaining_steps() {
    let template = TemplateDef::new(
      "conditional",
      "Conditional",
      vec![
        StepDef::new("organize_files", "run")
          .output_key("organize")
          .condition("files_moved", ">0"),
        StepDef::new("memory_storage", "store").param("content", "{organize.files_moved}"),
        StepDef::new("memory_storage", "search"),
      ],
    );
    let caps = ["organize_files", "memory_storage"];

    let idle = Arc::new(FakeInvoker::default().reply("run", Ok(object(json!({"files_moved": 0})))));
    let execution = executor(registry(&caps), vec![template.clone()], idle.clone())
      .execute("conditional", serde_json::Map::new())
      .await
      .unwrap();

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert!(execution.failure.is_none());
    assert_eq!(execution.step_results.len(), 1);
    assert_eq!(execution.steps_skipped, 2);
    assert_eq!(idle.requests().len(), 1);

    let busy = Arc::new(FakeInvoker::default().reply("run", Ok(object(json!({"files_moved": 4})))));
    let execution = executor(registry(&caps), vec![template], busy.clone())
      .execute("conditional", serde_json::Map::new())
      .await
      .unwrap();

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.step_results.len(), 3);
    assert_eq!(execution.steps_skipped, 0);
    assert_eq!(busy.requests()[1].body["content"], "4");
  }

  #[tokio::test]
  async fn test_step_failure_records_result() {
    let invoker = Arc::new(FakeInvoker::default().reply(
      "run",
      Err(InvokeError::Status {
        status: 500,
        body: "boom".to_string(),
      }),
    ));
    let executor = executor(
      registry(&["organize_files", "memory_storage"]),
      vec![two_step_template()],
      invoker.clone(),
    );

    let execution = executor
      .execute("organize", object(json!({"dir": "/tmp/x"})))
      .await
      .unwrap();

    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(execution.step_results.len(), 1);
    let result = &execution.step_results[0];
    assert!(!result.success);
    assert_eq!(result.attempts, 1);
    assert_eq!(result.error.as_ref().unwrap().kind, ErrorKind::StepExecution);
    assert_eq!(execution.failure.unwrap().kind, ErrorKind::StepExecution);
  }

  /// Fails the first `failures` calls.
  struct FlakyInvoker {
    failures: u32,
    calls: AtomicU32,
  }

  #[async_trait]
  impl StepInvoker for FlakyInvoker {
    async fn invoke(&self, _request: &StepRequest) -> Reply {
      let call = self.calls.fetch_add(1, Ordering::SeqCst);
      if call < self.failures {
        Err(InvokeError::Connection("refused".to_string()))
      } else {
        Ok(object(json!({"ok": true})))
      }
    }
  }

  #[tokio::test]
  async fn test_retry_policy_recovers() {
    let template = TemplateDef::new(
      "flaky",
      "Flaky",
      vec![StepDef::new("memory_storage", "store").retry(RetryPolicy::new(2, 5))],
    );
    let invoker = Arc::new(FlakyInvoker {
      failures: 2,
      calls: AtomicU32::new(0),
    });
    let executor = executor(registry(&["memory_storage"]), vec![template], invoker);

    let execution = executor
      .execute("flaky", serde_json::Map::new())
      .await
      .unwrap();

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.step_results[0].attempts, 3);
  }

  #[tokio::test]
  async fn test_no_retry_by_default() {
    let template = TemplateDef::new(
      "flaky",
      "Flaky",
      vec![StepDef::new("memory_storage", "store")],
    );
    let invoker = Arc::new(FlakyInvoker {
      failures: 1,
      calls: AtomicU32::new(0),
    });
    let executor = executor(registry(&["memory_storage"]), vec![template], invoker.clone());

    let execution = executor
      .execute("flaky", serde_json::Map::new())
      .await
      .unwrap();

    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(invoker.calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_cancel_during_retry_backoff() {
    let template = TemplateDef::new(
      "flaky",
      "Flaky",
      vec![
        StepDef::new("memory_storage", "store").retry(RetryPolicy::new(MAX_RETRIES, 60_000)),
        StepDef::new("memory_storage", "search"),
      ],
    );
    let invoker = Arc::new(FlakyInvoker {
      failures: u32::MAX,
      calls: AtomicU32::new(0),
    });
    let executor = executor(registry(&["memory_storage"]), vec![template], invoker.clone());

    let handle = executor.start("flaky", serde_json::Map::new()).unwrap();
    let id = handle.execution_id().to_string();
    while invoker.calls.load(Ordering::SeqCst) == 0 {
      tokio::time::sleep(Duration::from_millis(5)).await;
    }
    executor.cancel(&id).unwrap();

    let execution = tokio::time::timeout(Duration::from_secs(5), handle.wait())
      .await
      .unwrap()
      .unwrap();
    assert_eq!(execution.status, ExecutionStatus::Cancelled);
    assert_eq!(execution.step_results.len(), 1);
    let result = &execution.step_results[0];
    assert!(!result.success);
    assert_eq!(result.attempts, 1);
    assert_eq!(result.error.as_ref().unwrap().kind, ErrorKind::Cancelled);
    let failure = execution.failure.unwrap();
    assert_eq!(failure.step_index, Some(0));
    assert_eq!(failure.kind, ErrorKind::Cancelled);
    assert_eq!(invoker.calls.load(Ordering::SeqCst), 1);
  }

  /// Blocks each call until released.
  struct GatedInvoker {
    entered: Notify,
    release: Notify,
    calls: AtomicU32,
  }

  #[async_trait]
  impl StepInvoker for GatedInvoker {
    async fn invoke(&self, _request: &StepRequest) -> Reply {
      self.calls.fetch_add(1, Ordering::SeqCst);
      self.entered.notify_one();
      self.release.notified().await;
      Ok(object(json!({"files_moved": 1})))
    }
  }

  #[tokio::test]
  async fn test_cancel_between_steps() {
    let invoker = Arc::new(GatedInvoker {
      entered: Notify::new(),
      release: Notify::new(),
      calls: AtomicU32::new(0),
    });
    let executor = executor(
      registry(&["organize_files", "memory_storage"]),
      vec![two_step_template()],
      invoker.clone(),
    );

    let handle = executor
      .start("organize", object(json!({"dir": "/tmp/x"})))
      .unwrap();
    let id = handle.execution_id().to_string();

    invoker.entered.notified().await;
    assert_eq!(executor.status(&id).unwrap().status, ExecutionStatus::Running);
    executor.cancel(&id).unwrap();
    invoker.release.notify_one();

    let execution = handle.wait().await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Cancelled);
    assert_eq!(execution.step_results.len(), 1);
    assert_eq!(invoker.calls.load(Ordering::SeqCst), 1);
    assert!(matches!(
      executor.cancel(&id),
      Err(ExecutionError::AlreadyFinished(_))
    ));
  }

  #[tokio::test]
  async fn test_status_snapshots_are_stable() {
    let invoker = Arc::new(FakeInvoker::default());
    let executor = executor(
      registry(&["organize_files", "memory_storage"]),
      vec![two_step_template()],
      invoker,
    );

    let execution = executor
      .execute("organize", object(json!({"dir": "/tmp/x"})))
      .await
      .unwrap();

    let first = executor.status(&execution.execution_id).unwrap();
    let second = executor.status(&execution.execution_id).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, execution);
    assert_eq!(executor.list().len(), 1);
    assert_eq!(executor.active_count(), 0);
  }

  #[tokio::test]
  async fn test_unknown_template() {
    let executor = executor(
      registry(&[]),
      vec![two_step_template()],
      Arc::new(FakeInvoker::default()),
    );
    assert!(matches!(
      executor.start("nope", serde_json::Map::new()),
      Err(ExecutionError::Template(_))
    ));
    assert!(matches!(
      executor.status("nope"),
      Err(ExecutionError::NotFound(_))
    ));
  }

  #[tokio::test]
  async fn test_events_are_emitted_in_order() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let executor = executor(
      registry(&["organize_files", "memory_storage"]),
      vec![two_step_template()],
      Arc::new(FakeInvoker::default().reply("run", Ok(object(json!({"files_moved": 2}))))),
    )
    .with_notifier(ChannelNotifier::new(tx));

    executor
      .execute("organize", object(json!({"dir": "/tmp/x"})))
      .await
      .unwrap();

    let mut names = Vec::new();
    while let Ok(event) = rx.try_recv() {
      names.push(match event {
        ExecutionEvent::ExecutionStarted { .. } => "execution_started",
        ExecutionEvent::StepStarted { .. } => "step_started",
        ExecutionEvent::StepCompleted { .. } => "step_completed",
        ExecutionEvent::StepFailed { .. } => "step_failed",
        ExecutionEvent::ExecutionFinished { status, .. } => {
          assert_eq!(status, ExecutionStatus::Completed);
          "execution_finished"
        }
      });
    }
    assert_eq!(
      names,
      vec![
        "execution_started",
        "step_started",
        "step_completed",
        "step_started",
        "step_completed",
        "execution_finished"
      ]
    );
  }
}
