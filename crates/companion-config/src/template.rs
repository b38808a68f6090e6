use serde::{Deserialize, Serialize};

use crate::step::StepDef;
use crate::trigger::TriggerDef;

/// A workflow template definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateDef {
  pub template_id: String,
  pub name: String,
  #[serde(default)]
  pub description: String,
  #[serde(default = "default_category")]
  pub category: String,
  pub steps: Vec<StepDef>,
  /// Triggers that start this template when posted by type.
  #[serde(default)]
  pub triggers: Vec<TriggerDef>,
  /// Fallback values for placeholders; the trigger payload overrides them.
  #[serde(default)]
  pub defaults: serde_json::Map<String, serde_json::Value>,
}

impl TemplateDef {
  /// Create a template with no triggers and no defaults.
  pub fn new(template_id: impl Into<String>, name: impl Into<String>, steps: Vec<StepDef>) -> Self {
    Self {
      template_id: template_id.into(),
      name: name.into(),
      description: String::new(),
      category: default_category(),
      steps,
      triggers: Vec::new(),
      defaults: serde_json::Map::new(),
    }
  }
}

fn default_category() -> String {
  "general".to_string()
}
