//! Health probes.

use std::time::Duration;

use async_trait::async_trait;
use companion_registry::ServiceRecord;
use reqwest::{Client, StatusCode};

use crate::error::HealthError;

/// Result of probing one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
  Healthy,
  Unhealthy { reason: String },
}

impl ProbeOutcome {
  pub fn is_healthy(&self) -> bool {
    matches!(self, ProbeOutcome::Healthy)
  }
}

/// Checks whether a service is alive.
#[async_trait]
pub trait HealthProbe: Send + Sync {
  async fn probe(&self, service: &ServiceRecord) -> ProbeOutcome;
}

/// Probes `GET {base_url}{health_path}`; only `200 OK` counts as healthy.
#[derive(Debug, Clone)]
pub struct HttpProbe {
  client: Client,
}

impl HttpProbe {
  /// Create a probe whose requests give up after `timeout`.
  pub fn new(timeout: Duration) -> Result<Self, HealthError> {
    let client = Client::builder().timeout(timeout).build()?;
    Ok(Self { client })
  }
}

#[async_trait]
impl HealthProbe for HttpProbe {
  async fn probe(&self, service: &ServiceRecord) -> ProbeOutcome {
    match self.client.get(service.health_url()).send().await {
      Ok(response) if response.status() == StatusCode::OK => ProbeOutcome::Healthy,
      Ok(response) => ProbeOutcome::Unhealthy {
        reason: format!("health endpoint returned {}", response.status()),
      },
      Err(e) if e.is_timeout() => ProbeOutcome::Unhealthy {
        reason: "health check timed out".to_string(),
      },
      Err(e) => ProbeOutcome::Unhealthy {
        reason: e.to_string(),
      },
    }
  }
}
