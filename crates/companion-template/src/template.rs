//! Loaded, validated workflow templates.

use std::collections::BTreeSet;

use companion_config::{RetryPolicy, TriggerDef};
use serde::Serialize;

use crate::matching::step_conditions_hold;

/// A validated workflow template.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowTemplate {
  pub template_id: String,
  pub name: String,
  pub description: String,
  pub category: String,
  pub steps: Vec<StepSpec>,
  pub triggers: Vec<TriggerDef>,
  pub defaults: serde_json::Map<String, serde_json::Value>,
}

impl WorkflowTemplate {
  pub fn summary(&self) -> TemplateSummary {
    TemplateSummary {
      template_id: self.template_id.clone(),
      name: self.name.clone(),
      description: self.description.clone(),
      category: self.category.clone(),
      steps_count: self.steps.len(),
      triggers: self.triggers.clone(),
    }
  }
}

/// A validated step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepSpec {
  pub index: usize,
  pub capability: String,
  pub action: String,
  pub params: serde_json::Map<String, serde_json::Value>,
  /// Key under which this step's output is visible to later steps.
  pub output_key: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub timeout_ms: Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub retry: Option<RetryPolicy>,
  #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
  pub conditions: serde_json::Map<String, serde_json::Value>,
  /// Top-level names referenced by `params`.
  pub placeholders: BTreeSet<String>,
}

impl StepSpec {
  /// Whether the workflow may continue after this step produced `output`.
  pub fn conditions_hold(
    &self,
    output: &serde_json::Map<String, serde_json::Value>,
    context: &serde_json::Map<String, serde_json::Value>,
  ) -> bool {
    step_conditions_hold(&self.conditions, output, context)
  }
}

/// Listing entry for `GET /templates`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateSummary {
  pub template_id: String,
  pub name: String,
  pub description: String,
  pub category: String,
  pub steps_count: usize,
  pub triggers: Vec<TriggerDef>,
}
