use std::sync::Arc;

use chrono::{DateTime, Utc};
use companion_executor::WorkflowExecutor;
use companion_registry::ServiceRegistry;
use companion_template::TemplateStore;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
  pub executor: WorkflowExecutor,
  pub started_at: DateTime<Utc>,
}

impl AppState {
  pub fn new(executor: WorkflowExecutor) -> Self {
    Self {
      executor,
      started_at: Utc::now(),
    }
  }

  pub fn registry(&self) -> &Arc<ServiceRegistry> {
    self.executor.registry()
  }

  pub fn templates(&self) -> &Arc<TemplateStore> {
    self.executor.templates()
  }
}
