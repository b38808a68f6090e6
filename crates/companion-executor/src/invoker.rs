//! Dispatching a step to a service.

use std::time::Duration;

use async_trait::async_trait;
use companion_registry::ServiceRecord;
use reqwest::Client;

use crate::error::{ExecutionError, InvokeError};

/// Longest error body kept in a step error.
const MAX_ERROR_BODY: usize = 512;

/// A rendered step ready to send.
#[derive(Debug, Clone)]
pub struct StepRequest {
  pub execution_id: String,
  pub step_index: usize,
  pub service: ServiceRecord,
  pub action: String,
  pub body: serde_json::Map<String, serde_json::Value>,
  pub timeout: Duration,
}

/// Sends a step to the service chosen for it.
#[async_trait]
pub trait StepInvoker: Send + Sync {
  /// Invoke the action and return the service's JSON object response.
  async fn invoke(
    &self,
    request: &StepRequest,
  ) -> Result<serde_json::Map<String, serde_json::Value>, InvokeError>;
}

/// Invokes `POST {base_url}/{action}` with the rendered params as body.
///
/// Only a 2xx response whose body is a JSON object counts as success.
#[derive(Debug, Clone)]
pub struct HttpInvoker {
  client: Client,
}

impl HttpInvoker {
  pub fn new() -> Result<Self, ExecutionError> {
    Ok(Self {
      client: Client::builder().build()?,
    })
  }

  pub fn with_client(client: Client) -> Self {
    Self { client }
  }
}

#[async_trait]
impl StepInvoker for HttpInvoker {
  async fn invoke(
    &self,
    request: &StepRequest,
  ) -> Result<serde_json::Map<String, serde_json::Value>, InvokeError> {
    let url = request.service.action_url(&request.action);

    let response = self
      .client
      .post(&url)
      .timeout(request.timeout)
      .json(&request.body)
      .send()
      .await
      .map_err(|e| classify(e, request.timeout))?;

    let status = response.status();
    if !status.is_success() {
      let mut body = response.text().await.unwrap_or_default();
      truncate(&mut body, MAX_ERROR_BODY);
      return Err(InvokeError::Status {
        status: status.as_u16(),
        body,
      });
    }

    let value: serde_json::Value = response.json().await.map_err(|e| {
      if e.is_timeout() {
        classify(e, request.timeout)
      } else {
        InvokeError::MalformedResponse(e.to_string())
      }
    })?;

    match value {
      serde_json::Value::Object(map) => Ok(map),
      other => Err(InvokeError::MalformedResponse(format!(
        "expected a JSON object, got {}",
        json_type(&other)
      ))),
    }
  }
}

fn classify(error: reqwest::Error, timeout: Duration) -> InvokeError {
  if error.is_timeout() {
    InvokeError::Timeout {
      timeout_ms: timeout.as_millis() as u64,
    }
  } else {
    InvokeError::Connection(error.to_string())
  }
}

fn json_type(value: &serde_json::Value) -> &'static str {
  match value {
    serde_json::Value::Null => "null",
    serde_json::Value::Bool(_) => "a boolean",
    serde_json::Value::Number(_) => "a number",
    serde_json::Value::String(_) => "a string",
    serde_json::Value::Array(_) => "an array",
    serde_json::Value::Object(_) => "an object",
  }
}

fn truncate(s: &mut String, max: usize) {
  if s.len() <= max {
    return;
  }
  let mut end = max;
  while !s.is_char_boundary(end) {
    end -= 1;
  }
  s.truncate(end);
}
