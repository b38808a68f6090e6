use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
  #[error("service name already registered: {0}")]
  DuplicateName(String),

  #[error("service not found: {0}")]
  NotFound(String),

  #[error("no service provides capability: {0}")]
  NoProvider(String),

  #[error("invalid registration for '{name}': {message}")]
  InvalidRegistration { name: String, message: String },
}
