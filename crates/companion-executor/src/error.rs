//! Executor errors.

use companion_template::TemplateError;

/// Errors returned by executor operations.
///
/// Failures inside a running workflow are not returned here; they are
/// recorded on the execution itself.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
  /// The template to start does not exist.
  #[error(transparent)]
  Template(#[from] TemplateError),

  /// No execution with this id is tracked.
  #[error("execution not found: {0}")]
  NotFound(String),

  /// The execution already reached a terminal state.
  #[error("execution '{0}' has already finished")]
  AlreadyFinished(String),

  /// The execution task ended without producing a record.
  #[error("execution task failed: {message}")]
  Join { message: String },

  #[error("failed to build http client: {0}")]
  Client(#[from] reqwest::Error),
}

/// A failed call to a service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvokeError {
  #[error("request timed out after {timeout_ms}ms")]
  Timeout { timeout_ms: u64 },

  #[error("connection failed: {0}")]
  Connection(String),

  #[error("service returned {status}: {body}")]
  Status { status: u16, body: String },

  #[error("malformed response: {0}")]
  MalformedResponse(String),
}
