//! Templates available without any configuration.

use companion_config::{StepDef, TemplateDef, TriggerDef, TriggerType};
use serde_json::json;

/// The built-in template definitions, in load order.
pub fn builtin_templates() -> Vec<TemplateDef> {
  vec![
    smart_file_organization(),
    meeting_preparation(),
    voice_command_basic(),
    conversational_voice_ai(),
  ]
}

fn smart_file_organization() -> TemplateDef {
  let mut def = TemplateDef::new(
    "smart_file_organization",
    "Smart File Organization",
    vec![
      StepDef::new("file_organization", "organize")
        .param("path", "{target_dir}")
        .output_key("organize"),
      StepDef::new("memory_storage", "store")
        .param(
          "content",
          "File organization completed: {organize.files_moved} files organized",
        )
        .param("category", "file_organization")
        .param("tags", json!(["workflow", "files", "organization"])),
    ],
  );
  def.description = "Automatically organize files based on content and patterns".to_string();
  def.category = "productivity".to_string();
  def.triggers = vec![
    TriggerDef::new(TriggerType::FileEvent).condition("new_files", ">5"),
    TriggerDef::new(TriggerType::TimeBased).condition("schedule", "daily"),
  ];
  def.defaults.insert("target_dir".to_string(), json!("~/Downloads"));
  def
}

fn meeting_preparation() -> TemplateDef {
  let mut def = TemplateDef::new(
    "meeting_preparation",
    "Meeting Preparation Assistant",
    vec![
      StepDef::new("screen_capture", "capture_screen")
        .param("analyze", true)
        .output_key("screen"),
      StepDef::new("memory_storage", "search")
        .param("query", "meeting {meeting_topic}")
        .param("limit", 10)
        .output_key("context"),
      StepDef::new("memory_storage", "store")
        .param(
          "content",
          "Meeting preparation completed for: {meeting_topic}",
        )
        .param("category", "meeting_prep")
        .param("tags", json!(["workflow", "meeting", "preparation"])),
    ],
  );
  def.description =
    "Prepare for meetings by gathering context and relevant information".to_string();
  def.category = "productivity".to_string();
  def.triggers = vec![
    TriggerDef::new(TriggerType::VoiceCommand).condition("phrase", "prepare for meeting"),
    TriggerDef::new(TriggerType::ScreenChange)
      .condition("text_contains", json!(["zoom", "teams", "meet"])),
  ];
  def.defaults.insert("meeting_topic".to_string(), json!("general"));
  def
}

fn voice_command_basic() -> TemplateDef {
  let mut def = TemplateDef::new(
    "voice_command_basic",
    "Basic Voice Commands",
    vec![
      StepDef::new("memory_storage", "store")
        .param("content", "Voice command received: {command_text}")
        .param("category", "voice_commands")
        .param("tags", json!(["workflow", "voice", "command"])),
    ],
  );
  def.description = "Handle simple voice commands".to_string();
  def.category = "voice".to_string();
  def.triggers = vec![TriggerDef::new(TriggerType::VoiceCommand).condition("phrase", "basic")];
  def.defaults.insert("command_text".to_string(), json!(""));
  def
}

fn conversational_voice_ai() -> TemplateDef {
  let mut def = TemplateDef::new(
    "conversational_voice_ai",
    "Conversational Voice AI",
    vec![
      StepDef::new("conversational_ai", "process_command")
        .param("command", "{command}")
        .param("context", "{context}")
        .param("timestamp", "{timestamp}")
        .output_key("response"),
    ],
  );
  def.description =
    "Process voice commands through a conversational assistant for natural interaction".to_string();
  def.category = "voice".to_string();
  def.triggers = vec![TriggerDef::new(TriggerType::VoiceCommand)];
  def.defaults.insert("command".to_string(), json!(""));
  def.defaults.insert("context".to_string(), json!({}));
  def.defaults.insert("timestamp".to_string(), json!(""));
  def
}
