//! Records completed executions with the memory service.

use std::sync::Arc;
use std::time::Duration;

use companion_registry::ServiceRegistry;
use serde_json::json;
use tracing::{debug, warn};

use crate::events::{ExecutionEvent, ExecutionNotifier};
use crate::invoker::{StepInvoker, StepRequest};
use crate::record::ExecutionStatus;

/// Capability that receives completion records.
pub const MEMORY_CAPABILITY: &str = "memory_storage";

const STORE_ACTION: &str = "store";

/// Posts a summary of every completed execution to the best provider of
/// [`MEMORY_CAPABILITY`].
///
/// Recording happens on its own task and never affects the execution. With
/// no memory provider registered the record is dropped.
pub struct CompletionRecorder {
  registry: Arc<ServiceRegistry>,
  invoker: Arc<dyn StepInvoker>,
  timeout: Duration,
}

impl CompletionRecorder {
  pub fn new(
    registry: Arc<ServiceRegistry>,
    invoker: Arc<dyn StepInvoker>,
    timeout: Duration,
  ) -> Self {
    Self {
      registry,
      invoker,
      timeout,
    }
  }
}

impl ExecutionNotifier for CompletionRecorder {
  fn notify(&self, event: ExecutionEvent) {
    let ExecutionEvent::ExecutionFinished {
      execution_id,
      template_id,
      template_name,
      status: ExecutionStatus::Completed,
      steps_completed,
      total_steps,
      duration_ms,
    } = event
    else {
      return;
    };

    let service = match self.registry.lookup(MEMORY_CAPABILITY) {
      Ok(service) => service,
      Err(e) => {
        debug!(execution_id = %execution_id, error = %e, "completion not recorded");
        return;
      }
    };
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
      warn!(execution_id = %execution_id, "completion not recorded: no runtime");
      return;
    };

    let status = "completed";
    let body = json!({
      "content": format!("Workflow completed: {}", template_name),
      "category": "workflow_execution",
      "metadata": {
        "execution_id": &execution_id,
        "template_id": &template_id,
        "status": status,
        "duration_ms": duration_ms,
        "steps_completed": steps_completed,
        "total_steps": total_steps,
      },
      "tags": ["workflow", template_id.replace('_', "-"), status],
    });
    let serde_json::Value::Object(body) = body else {
      return;
    };

    let request = StepRequest {
      execution_id,
      step_index: total_steps,
      service,
      action: STORE_ACTION.to_string(),
      body,
      timeout: self.timeout,
    };
    let invoker = self.invoker.clone();
    runtime.spawn(async move {
      match invoker.invoke(&request).await {
        Ok(_) => debug!(execution_id = %request.execution_id, "completion recorded"),
        Err(e) => warn!(
          execution_id = %request.execution_id,
          service_id = %request.service.id,
          error = %e,
          "could not record workflow completion"
        ),
      }
    });
  }
}
