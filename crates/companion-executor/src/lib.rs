//! Companion Executor
//!
//! Runs workflow templates against the services in the registry.
//!
//! # Architecture
//!
//! ```text
//! WorkflowExecutor
//! ├── start(template_id, payload) -> ExecutionHandle   (spawns a task)
//! ├── execute(template_id, payload) -> WorkflowExecution
//! ├── status(id) / list() / cancel(id)
//! │
//! └── per step, in order:
//!     lookup(capability) -> render(params, context) -> StepInvoker::invoke
//! ```
//!
//! Executions are tracked in an [`ExecutionStore`] so they can be polled
//! while running. Progress is reported to an [`ExecutionNotifier`];
//! [`CompletionRecorder`] is the one that stores completed runs with the
//! memory service.

mod completion;
mod error;
mod events;
mod executor;
mod invoker;
mod record;
mod store;

pub use completion::{CompletionRecorder, MEMORY_CAPABILITY};
pub use error::{ExecutionError, InvokeError};
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier};
pub use executor::{ExecutionHandle, ExecutorConfig, WorkflowExecutor};
pub use invoker::{HttpInvoker, StepInvoker, StepRequest};
pub use record::{
  ErrorKind, ExecutionFailure, ExecutionStatus, ExecutionSummary, StepError, StepResult,
  WorkflowExecution,
};
pub use store::ExecutionStore;
