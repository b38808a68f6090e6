//! Orchestrator configuration.
//!
//! Sources, later ones winning: built-in defaults, an optional config file,
//! then `COMPANION_*` environment variables (`__` separates nested keys,
//! e.g. `COMPANION_HEALTH__INTERVAL_SECS=10`).

use std::path::{Path, PathBuf};

use companion_executor::ExecutorConfig;
use companion_health::HealthConfig;
use companion_registry::Registration;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
  #[serde(default = "default_listen_addr")]
  pub listen_addr: String,

  #[serde(default)]
  pub health: HealthConfig,

  #[serde(default)]
  pub executor: ExecutorConfig,

  #[serde(default)]
  pub templates: TemplatesConfig,

  /// Services registered at startup.
  #[serde(default)]
  pub services: Vec<Registration>,

  #[serde(default)]
  pub logging: LoggingConfig,
}

impl Default for OrchestratorConfig {
  fn default() -> Self {
    Self {
      listen_addr: default_listen_addr(),
      health: HealthConfig::default(),
      executor: ExecutorConfig::default(),
      templates: TemplatesConfig::default(),
      services: Vec::new(),
      logging: LoggingConfig::default(),
    }
  }
}

fn default_listen_addr() -> String {
  "127.0.0.1:8084".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplatesConfig {
  /// JSON file with additional template definitions.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub file: Option<PathBuf>,

  /// Load the built-in templates before `file`.
  #[serde(default = "default_true")]
  pub include_builtin: bool,
}

impl Default for TemplatesConfig {
  fn default() -> Self {
    Self {
      file: None,
      include_builtin: true,
    }
  }
}

fn default_true() -> bool {
  true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
  /// Filter directive used when `RUST_LOG` is unset.
  #[serde(default = "default_log_level")]
  pub level: String,

  #[serde(default)]
  pub json: bool,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      json: false,
    }
  }
}

fn default_log_level() -> String {
  "info".to_string()
}

impl OrchestratorConfig {
  /// Load configuration from defaults, an optional file and the environment.
  pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
    let mut builder =
      config::Config::builder().add_source(config::Config::try_from(&OrchestratorConfig::default())?);

    if let Some(path) = path {
      builder = builder.add_source(config::File::from(path).required(false));
    }

    builder = builder.add_source(
      config::Environment::with_prefix("COMPANION")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true),
    );

    builder.build()?.try_deserialize()
  }

  /// `~/.companion/config.toml`, if the home directory is known.
  pub fn default_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".companion").join("config.toml"))
  }
}
