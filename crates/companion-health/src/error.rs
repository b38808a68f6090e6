/// Errors that can occur while setting up health monitoring.
#[derive(Debug, thiserror::Error)]
pub enum HealthError {
  /// The HTTP client could not be constructed.
  #[error("failed to build http client: {0}")]
  Client(#[from] reqwest::Error),
}
