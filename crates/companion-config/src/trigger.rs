use serde::{Deserialize, Serialize};

/// Kinds of events that can start a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
  ScreenChange,
  VoiceCommand,
  TimeBased,
  FileEvent,
  ContextChange,
  Manual,
}

impl TriggerType {
  pub fn as_str(&self) -> &'static str {
    match self {
      TriggerType::ScreenChange => "screen_change",
      TriggerType::VoiceCommand => "voice_command",
      TriggerType::TimeBased => "time_based",
      TriggerType::FileEvent => "file_event",
      TriggerType::ContextChange => "context_change",
      TriggerType::Manual => "manual",
    }
  }
}

impl std::fmt::Display for TriggerType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A trigger declared by a template.
///
/// Conditions are matched against the trigger payload:
/// - a list matches if any element occurs in the payload value
/// - `">n"` / `"<n"` compare numerically
/// - any other string matches as a case-insensitive substring
/// - other values must be equal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerDef {
  #[serde(rename = "type")]
  pub trigger_type: TriggerType,
  #[serde(default, alias = "condition")]
  pub conditions: serde_json::Map<String, serde_json::Value>,
}

impl TriggerDef {
  pub fn new(trigger_type: TriggerType) -> Self {
    Self {
      trigger_type,
      conditions: serde_json::Map::new(),
    }
  }

  /// Add a condition.
  pub fn condition(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
    self.conditions.insert(key.into(), value.into());
    self
  }
}
