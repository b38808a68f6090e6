use thiserror::Error;

/// Errors raised while rendering step parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InterpolationError {
  /// A placeholder had no value in the context.
  #[error("unresolved placeholder in '{key}': {message}")]
  Unresolved {
    /// Parameter path, e.g. `content` or `metadata.tags[0]`.
    key: String,
    /// Top-level names missing from the context, if known.
    missing: Vec<String>,
    message: String,
  },

  /// The template string itself is invalid.
  #[error("malformed template in '{key}': {message}")]
  Malformed { key: String, message: String },
}

impl InterpolationError {
  pub fn key(&self) -> &str {
    match self {
      InterpolationError::Unresolved { key, .. } | InterpolationError::Malformed { key, .. } => key,
    }
  }
}

/// Errors raised by the template store.
#[derive(Debug, Error)]
pub enum TemplateError {
  #[error("template not found: {0}")]
  NotFound(String),

  #[error("duplicate template id: {0}")]
  DuplicateId(String),

  #[error("invalid template '{template_id}': {message}")]
  Invalid { template_id: String, message: String },

  #[error("invalid step {step_index} in template '{template_id}': {message}")]
  InvalidStep {
    template_id: String,
    step_index: usize,
    message: String,
  },

  #[error("invalid parameters for step {step_index} in template '{template_id}': {source}")]
  Parameter {
    template_id: String,
    step_index: usize,
    #[source]
    source: InterpolationError,
  },

  #[error("failed to read template file: {0}")]
  Io(#[from] std::io::Error),

  #[error("failed to parse template file: {0}")]
  Parse(#[from] serde_json::Error),
}
