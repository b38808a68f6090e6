//! Periodic health monitoring.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use companion_registry::ServiceRegistry;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::probe::{HealthProbe, ProbeOutcome};

/// Health monitor timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthConfig {
  /// Seconds between probe rounds.
  #[serde(default = "default_interval_secs")]
  pub interval_secs: u64,

  /// Seconds before a single probe gives up.
  #[serde(default = "default_probe_timeout_secs")]
  pub probe_timeout_secs: u64,
}

impl HealthConfig {
  pub fn interval(&self) -> Duration {
    Duration::from_secs(self.interval_secs.max(1))
  }

  pub fn probe_timeout(&self) -> Duration {
    Duration::from_secs(self.probe_timeout_secs.max(1))
  }
}

impl Default for HealthConfig {
  fn default() -> Self {
    Self {
      interval_secs: default_interval_secs(),
      probe_timeout_secs: default_probe_timeout_secs(),
    }
  }
}

fn default_interval_secs() -> u64 {
  30
}

fn default_probe_timeout_secs() -> u64 {
  5
}

/// Outcome of one probe round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckReport {
  pub checked: usize,
  pub healthy: usize,
  pub unhealthy: usize,
}

/// Probes every registered service on a fixed interval.
pub struct HealthMonitor {
  registry: Arc<ServiceRegistry>,
  probe: Arc<dyn HealthProbe>,
  interval: Duration,
}

impl HealthMonitor {
  pub fn new(registry: Arc<ServiceRegistry>, probe: Arc<dyn HealthProbe>, interval: Duration) -> Self {
    Self {
      registry,
      probe,
      interval,
    }
  }

  /// Probe every registered service once.
  ///
  /// Probes run concurrently against a snapshot of the registry; the
  /// registry lock is only taken again to apply each result.
  #[instrument(name = "health_check", skip(self))]
  pub async fn check_all(&self) -> CheckReport {
    let services = self.registry.list_all();

    let probes = services.iter().map(|service| {
      let probe = self.probe.clone();
      async move { (service, probe.probe(service).await) }
    });
    let outcomes = futures::future::join_all(probes).await;

    let mut report = CheckReport::default();
    for (service, outcome) in outcomes {
      let healthy = outcome.is_healthy();
      if let ProbeOutcome::Unhealthy { reason } = &outcome {
        debug!(service_id = %service.id, name = %service.name, reason = %reason, "probe failed");
      }

      if self
        .registry
        .record_probe(&service.id, healthy, Utc::now())
        .is_none()
      {
        // Deregistered while the probe was in flight.
        continue;
      }

      report.checked += 1;
      if healthy {
        report.healthy += 1;
      } else {
        report.unhealthy += 1;
      }
    }

    debug!(
      checked = report.checked,
      healthy = report.healthy,
      unhealthy = report.unhealthy,
      "health check round finished"
    );
    report
  }

  /// Run probe rounds until cancelled. The first round starts immediately.
  pub async fn run(&self, cancel: CancellationToken) {
    info!(interval_secs = self.interval.as_secs(), "starting health monitor");

    let mut ticker = tokio::time::interval(self.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
      tokio::select! {
        _ = cancel.cancelled() => break,
        _ = ticker.tick() => {}
      }

      tokio::select! {
        _ = cancel.cancelled() => break,
        _ = self.check_all() => {}
      }
    }

    info!("health monitor stopped");
  }

  /// Run the monitor on its own task.
  pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move { self.run(cancel).await })
  }
}

#[cfg(test)]
mod tests {
  use std::collections::HashSet;
  use std::sync::Mutex;
  use std::sync::atomic::{AtomicUsize, Ordering};

  use async_trait::async_trait;
  use companion_registry::{Registration, ServiceRecord, ServiceStatus};

  use super::*;

  /// Reports services whose name is in `down` as unhealthy.
  struct ScriptedProbe {
    down: Mutex<HashSet<String>>,
    calls: AtomicUsize,
  }

  impl ScriptedProbe {
    fn new(down: &[&str]) -> Self {
      Self {
        down: Mutex::new(down.iter().map(|s| s.to_string()).collect()),
        calls: AtomicUsize::new(0),
      }
    }
  }

  #[async_trait]
  impl HealthProbe for ScriptedProbe {
    async fn probe(&self, service: &ServiceRecord) -> ProbeOutcome {
      self.calls.fetch_add(1, Ordering::SeqCst);
      if self.down.lock().unwrap().contains(&service.name) {
        ProbeOutcome::Unhealthy {
          reason: "connection refused".to_string(),
        }
      } else {
        ProbeOutcome::Healthy
      }
    }
  }

  fn registry_with(names: &[&str]) -> Arc<ServiceRegistry> {
    let registry = Arc::new(ServiceRegistry::new());
    for (i, name) in names.iter().enumerate() {
      registry
        .register(Registration::new(*name, format!("http://localhost:{}", 9000 + i)))
        .unwrap();
    }
    registry
  }

  #[tokio::test]
  async fn test_check_all_updates_status() {
    let registry = registry_with(&["memory", "finder"]);
    let probe = Arc::new(ScriptedProbe::new(&["finder"]));
    let monitor = HealthMonitor::new(registry.clone(), probe, Duration::from_secs(30));

    let report = monitor.check_all().await;

    assert_eq!(
      report,
      CheckReport {
        checked: 2,
        healthy: 1,
        unhealthy: 1
      }
    );
    for service in registry.list_all() {
      let expected = if service.name == "finder" {
        ServiceStatus::Unhealthy
      } else {
        ServiceStatus::Healthy
      };
      assert_eq!(service.status, expected);
    }
  }

  #[tokio::test]
  async fn test_unhealthy_services_are_kept() {
    let registry = registry_with(&["finder"]);
    let probe = Arc::new(ScriptedProbe::new(&["finder"]));
    let monitor = HealthMonitor::new(registry.clone(), probe, Duration::from_secs(30));

    monitor.check_all().await;
    monitor.check_all().await;

    assert_eq!(registry.len(), 1);
    assert!(registry.lookup("anything").is_err());
  }

  #[tokio::test]
  async fn test_recovery_marks_healthy_again() {
    let registry = registry_with(&["finder"]);
    let probe = Arc::new(ScriptedProbe::new(&["finder"]));
    let monitor = HealthMonitor::new(registry.clone(), probe.clone(), Duration::from_secs(30));

    monitor.check_all().await;
    probe.down.lock().unwrap().clear();
    monitor.check_all().await;

    assert_eq!(registry.list_all()[0].status, ServiceStatus::Healthy);
  }

  #[tokio::test(start_paused = true)]
  async fn test_run_polls_until_cancelled() {
    let registry = registry_with(&["memory"]);
    let probe = Arc::new(ScriptedProbe::new(&[]));
    let monitor = Arc::new(HealthMonitor::new(
      registry,
      probe.clone(),
      Duration::from_secs(30),
    ));

    let cancel = CancellationToken::new();
    let handle = monitor.spawn(cancel.clone());

    tokio::time::sleep(Duration::from_secs(65)).await;
    cancel.cancel();
    handle.await.unwrap();

    assert!(probe.calls.load(Ordering::SeqCst) >= 2);
  }

  #[test]
  fn test_config_defaults() {
    let config = HealthConfig::default();
    assert_eq!(config.interval(), Duration::from_secs(30));
    assert_eq!(config.probe_timeout(), Duration::from_secs(5));
  }
}
