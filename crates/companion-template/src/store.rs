use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use companion_config::{MAX_RETRIES, TemplateDef, TriggerType};
use tracing::info;

use crate::builtin::builtin_templates;
use crate::error::TemplateError;
use crate::interpolate::param_placeholders;
use crate::matching::trigger_matches;
use crate::template::{StepSpec, WorkflowTemplate};

/// Read-only store of validated workflow templates.
///
/// Templates are fixed once the store is built. Callers get [`Arc`]
/// snapshots, so a store rebuilt with edited definitions never changes a
/// template an execution already holds.
#[derive(Debug, Clone, Default)]
pub struct TemplateStore {
  templates: Vec<Arc<WorkflowTemplate>>,
  index: HashMap<String, usize>,
}

impl TemplateStore {
  /// Validate and load a set of template definitions.
  pub fn new(defs: impl IntoIterator<Item = TemplateDef>) -> Result<Self, TemplateError> {
    let mut store = Self::default();
    for def in defs {
      let template = load_template(def)?;
      if store.index.contains_key(&template.template_id) {
        return Err(TemplateError::DuplicateId(template.template_id));
      }
      store
        .index
        .insert(template.template_id.clone(), store.templates.len());
      store.templates.push(Arc::new(template));
    }

    info!(templates = store.templates.len(), "loaded workflow templates");
    Ok(store)
  }

  /// The built-in template set.
  pub fn builtin() -> Result<Self, TemplateError> {
    Self::new(builtin_templates())
  }

  /// Load only the templates defined in a JSON file.
  pub fn from_json_file(path: &Path) -> Result<Self, TemplateError> {
    Self::new(Self::read_definitions(path)?)
  }

  /// Read template definitions from a JSON file containing an array.
  pub fn read_definitions(path: &Path) -> Result<Vec<TemplateDef>, TemplateError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
  }

  /// Get a template by id.
  pub fn get(&self, template_id: &str) -> Result<Arc<WorkflowTemplate>, TemplateError> {
    self
      .index
      .get(template_id)
      .map(|&i| self.templates[i].clone())
      .ok_or_else(|| TemplateError::NotFound(template_id.to_string()))
  }

  /// All templates in load order.
  pub fn list(&self) -> Vec<Arc<WorkflowTemplate>> {
    self.templates.clone()
  }

  /// Templates declaring a trigger of this type whose conditions hold for
  /// the payload, in load order.
  pub fn matching(
    &self,
    trigger_type: TriggerType,
    payload: &serde_json::Map<String, serde_json::Value>,
  ) -> Vec<Arc<WorkflowTemplate>> {
    self
      .templates
      .iter()
      .filter(|t| {
        t.triggers
          .iter()
          .any(|trigger| trigger.trigger_type == trigger_type && trigger_matches(trigger, payload))
      })
      .cloned()
      .collect()
  }

  pub fn len(&self) -> usize {
    self.templates.len()
  }

  pub fn is_empty(&self) -> bool {
    self.templates.is_empty()
  }
}

fn load_template(def: TemplateDef) -> Result<WorkflowTemplate, TemplateError> {
  let template_id = def.template_id.trim().to_string();
  if template_id.is_empty() {
    return Err(TemplateError::Invalid {
      template_id,
      message: "template id must not be empty".to_string(),
    });
  }
  if def.steps.is_empty() {
    return Err(TemplateError::Invalid {
      template_id,
      message: "template has no steps".to_string(),
    });
  }

  let invalid_step = |step_index: usize, message: String| TemplateError::InvalidStep {
    template_id: template_id.clone(),
    step_index,
    message,
  };

  let mut output_keys = HashSet::new();
  let mut steps = Vec::with_capacity(def.steps.len());

  for (index, step) in def.steps.into_iter().enumerate() {
    if step.capability.trim().is_empty() {
      return Err(invalid_step(index, "capability must not be empty".to_string()));
    }
    if step.action.trim().is_empty() {
      return Err(invalid_step(index, "action must not be empty".to_string()));
    }
    if let Some(retry) = &step.retry
      && retry.max_retries > MAX_RETRIES
    {
      return Err(invalid_step(
        index,
        format!(
          "max_retries {} exceeds the limit of {}",
          retry.max_retries, MAX_RETRIES
        ),
      ));
    }

    let output_key = step.resolved_output_key(index);
    if !output_keys.insert(output_key.clone()) {
      return Err(invalid_step(
        index,
        format!("duplicate output key '{}'", output_key),
      ));
    }

    let placeholders =
      param_placeholders(&step.params).map_err(|source| TemplateError::Parameter {
        template_id: template_id.clone(),
        step_index: index,
        source,
      })?;

    steps.push(StepSpec {
      index,
      capability: step.capability.trim().to_string(),
      action: step.action.trim().to_string(),
      params: step.params,
      output_key,
      timeout_ms: step.timeout_ms,
      retry: step.retry,
      conditions: step.conditions,
      placeholders,
    });
  }

  Ok(WorkflowTemplate {
    template_id,
    name: def.name,
    description: def.description,
    category: def.category,
    steps,
    triggers: def.triggers,
    defaults: def.defaults,
  })
}
