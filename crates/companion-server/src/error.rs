//! API errors.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use companion_executor::ExecutionError;
use companion_registry::RegistryError;
use companion_template::TemplateError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
  #[error("{0}")]
  NotFound(String),

  #[error("{0}")]
  BadRequest(String),

  #[error("{0}")]
  Conflict(String),

  #[error("{0}")]
  Internal(String),
}

/// Error response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
  pub error: String,
  pub code: String,
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, code) = match &self {
      ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
      ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
      ApiError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
      ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
    };

    let body = ErrorResponse {
      error: self.to_string(),
      code: code.to_string(),
    };
    (status, Json(body)).into_response()
  }
}

impl From<RegistryError> for ApiError {
  fn from(e: RegistryError) -> Self {
    match e {
      RegistryError::DuplicateName(_) => ApiError::Conflict(e.to_string()),
      RegistryError::NotFound(_) | RegistryError::NoProvider(_) => {
        ApiError::NotFound(e.to_string())
      }
      RegistryError::InvalidRegistration { .. } => ApiError::BadRequest(e.to_string()),
    }
  }
}

impl From<TemplateError> for ApiError {
  fn from(e: TemplateError) -> Self {
    match e {
      TemplateError::NotFound(_) => ApiError::NotFound(e.to_string()),
      _ => ApiError::Internal(e.to_string()),
    }
  }
}

impl From<ExecutionError> for ApiError {
  fn from(e: ExecutionError) -> Self {
    match e {
      ExecutionError::Template(e) => e.into(),
      ExecutionError::NotFound(_) => ApiError::NotFound(e.to_string()),
      ExecutionError::AlreadyFinished(_) => ApiError::Conflict(e.to_string()),
      ExecutionError::Join { .. } | ExecutionError::Client(_) => ApiError::Internal(e.to_string()),
    }
  }
}

impl From<JsonRejection> for ApiError {
  fn from(e: JsonRejection) -> Self {
    ApiError::BadRequest(e.body_text())
  }
}

pub type ApiResult<T> = Result<T, ApiError>;
