use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Liveness of a registered service as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
  Healthy,
  Unhealthy,
  /// Registered but not yet probed.
  Unknown,
}

impl ServiceStatus {
  /// Lookup preference; lower wins.
  pub(crate) fn rank(&self) -> u8 {
    match self {
      ServiceStatus::Healthy => 0,
      ServiceStatus::Unknown => 1,
      ServiceStatus::Unhealthy => 2,
    }
  }
}

/// A registered backend service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
  pub id: String,
  pub name: String,
  pub base_url: String,
  pub capabilities: BTreeSet<String>,
  pub health_path: String,
  pub status: ServiceStatus,
  pub last_heartbeat: DateTime<Utc>,
  pub registered_at: DateTime<Utc>,
  #[serde(default)]
  pub metadata: serde_json::Map<String, serde_json::Value>,
  /// Registration order, used to break lookup ties.
  #[serde(skip)]
  pub(crate) seq: u64,
}

impl ServiceRecord {
  /// Whether this service declares the capability.
  pub fn provides(&self, capability: &str) -> bool {
    self.capabilities.contains(capability)
  }

  /// Full URL of the health endpoint.
  pub fn health_url(&self) -> String {
    format!("{}{}", self.base_url.trim_end_matches('/'), self.health_path)
  }

  /// URL for invoking an action on this service.
  pub fn action_url(&self, action: &str) -> String {
    format!(
      "{}/{}",
      self.base_url.trim_end_matches('/'),
      action.trim_start_matches('/')
    )
  }
}

/// Input for registering or re-registering a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
  pub name: String,
  pub base_url: String,
  #[serde(default)]
  pub capabilities: Vec<String>,
  #[serde(default = "default_health_path")]
  pub health_path: String,
  #[serde(default)]
  pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Registration {
  pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      base_url: base_url.into(),
      capabilities: Vec::new(),
      health_path: default_health_path(),
      metadata: serde_json::Map::new(),
    }
  }

  /// Add a declared capability.
  pub fn capability(mut self, capability: impl Into<String>) -> Self {
    self.capabilities.push(capability.into());
    self
  }

  /// Override the health endpoint path (default `/health`).
  pub fn health_path(mut self, path: impl Into<String>) -> Self {
    self.health_path = path.into();
    self
  }
}

fn default_health_path() -> String {
  "/health".to_string()
}

/// Counts of registered services by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySummary {
  pub total: usize,
  pub healthy: usize,
  pub unhealthy: usize,
  pub unknown: usize,
}
