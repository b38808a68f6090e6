use serde::{Deserialize, Serialize};

use crate::param::ParamValue;

/// Upper bound on `RetryPolicy::max_retries` accepted at load time.
pub const MAX_RETRIES: u32 = 5;

/// A single step of a workflow template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDef {
  /// Capability a registered service must declare to run this step.
  pub capability: String,

  /// Action appended to the provider's base URL, e.g. `run` → `POST {base}/run`.
  pub action: String,

  /// Request body template.
  #[serde(default)]
  pub params: serde_json::Map<String, ParamValue>,

  /// Key under which the step's output is exposed to later steps.
  /// Defaults to `step_{index}`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub output_key: Option<String>,

  /// Per-step request timeout, overriding the executor default.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub timeout_ms: Option<u64>,

  /// Opt-in retry policy. Steps without one abort on the first failure.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub retry: Option<RetryPolicy>,

  /// Checked against the step's output, then the context, once the step
  /// succeeds. If any fails, the remaining steps are skipped and the
  /// execution still completes.
  #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
  pub conditions: serde_json::Map<String, serde_json::Value>,
}

impl StepDef {
  /// Create a step with no params, output key, timeout or retry.
  pub fn new(capability: impl Into<String>, action: impl Into<String>) -> Self {
    Self {
      capability: capability.into(),
      action: action.into(),
      params: serde_json::Map::new(),
      output_key: None,
      timeout_ms: None,
      retry: None,
      conditions: serde_json::Map::new(),
    }
  }

  /// Add a parameter.
  pub fn param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
    self.params.insert(key.into(), value.into());
    self
  }

  /// Set the output key.
  pub fn output_key(mut self, key: impl Into<String>) -> Self {
    self.output_key = Some(key.into());
    self
  }

  /// Set the retry policy.
  pub fn retry(mut self, policy: RetryPolicy) -> Self {
    self.retry = Some(policy);
    self
  }

  /// Add a condition that must hold for the workflow to continue.
  pub fn condition(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
    self.conditions.insert(key.into(), value.into());
    self
  }

  /// Set the per-step timeout.
  pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
    self.timeout_ms = Some(timeout_ms);
    self
  }

  /// The output key, falling back to `step_{index}`.
  pub fn resolved_output_key(&self, index: usize) -> String {
    self
      .output_key
      .clone()
      .unwrap_or_else(|| format!("step_{}", index))
  }
}

/// Bounded retry with a fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
  /// Additional attempts after the first failure.
  pub max_retries: u32,

  /// Delay between attempts.
  #[serde(default = "default_backoff_ms")]
  pub backoff_ms: u64,
}

impl RetryPolicy {
  pub fn new(max_retries: u32, backoff_ms: u64) -> Self {
    Self {
      max_retries,
      backoff_ms,
    }
  }
}

fn default_backoff_ms() -> u64 {
  1000
}
