use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::RegistryError;
use crate::record::{Registration, RegistrySummary, ServiceRecord, ServiceStatus};

/// In-memory service registry.
///
/// All records live behind a single lock. Reads and writes are short and
/// never held across an await point, so a coarse lock is enough for the
/// handful of local services this manages.
pub struct ServiceRegistry {
  inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
  services: HashMap<String, ServiceRecord>,
  next_seq: u64,
}

impl ServiceRegistry {
  pub fn new() -> Self {
    Self {
      inner: RwLock::new(Inner::default()),
    }
  }

  fn read(&self) -> RwLockReadGuard<'_, Inner> {
    self.inner.read().unwrap_or_else(PoisonError::into_inner)
  }

  fn write(&self) -> RwLockWriteGuard<'_, Inner> {
    self.inner.write().unwrap_or_else(PoisonError::into_inner)
  }

  /// Register a new service.
  ///
  /// Fails with [`RegistryError::DuplicateName`] if a service with the same
  /// name exists; use [`ServiceRegistry::update`] to re-register.
  pub fn register(&self, registration: Registration) -> Result<ServiceRecord, RegistryError> {
    let registration = validate(registration)?;
    let mut inner = self.write();

    if inner
      .services
      .values()
      .any(|s| s.name == registration.name)
    {
      return Err(RegistryError::DuplicateName(registration.name));
    }

    let now = Utc::now();
    let seq = inner.next_seq;
    inner.next_seq += 1;

    let record = ServiceRecord {
      id: uuid::Uuid::new_v4().to_string(),
      name: registration.name,
      base_url: registration.base_url,
      capabilities: registration.capabilities.into_iter().collect(),
      health_path: registration.health_path,
      status: ServiceStatus::Unknown,
      last_heartbeat: now,
      registered_at: now,
      metadata: registration.metadata,
      seq,
    };

    info!(
      service_id = %record.id,
      name = %record.name,
      base_url = %record.base_url,
      capabilities = ?record.capabilities,
      "service_registered"
    );

    inner.services.insert(record.id.clone(), record.clone());
    Ok(record)
  }

  /// Replace the registration details of an existing service.
  ///
  /// The id and registration order are kept. Liveness is kept too unless
  /// the base URL or health path changed, in which case the service is
  /// back to `Unknown` until it is probed or heartbeats again.
  pub fn update(
    &self,
    service_id: &str,
    registration: Registration,
  ) -> Result<ServiceRecord, RegistryError> {
    let registration = validate(registration)?;
    let mut inner = self.write();

    if inner
      .services
      .values()
      .any(|s| s.name == registration.name && s.id != service_id)
    {
      return Err(RegistryError::DuplicateName(registration.name));
    }

    let record = inner
      .services
      .get_mut(service_id)
      .ok_or_else(|| RegistryError::NotFound(service_id.to_string()))?;

    let endpoint_changed =
      record.base_url != registration.base_url || record.health_path != registration.health_path;
    if endpoint_changed {
      record.status = ServiceStatus::Unknown;
      record.last_heartbeat = record.registered_at;
    }

    record.name = registration.name;
    record.base_url = registration.base_url;
    record.capabilities = registration.capabilities.into_iter().collect();
    record.health_path = registration.health_path;
    record.metadata = registration.metadata;

    info!(
      service_id = %record.id,
      name = %record.name,
      endpoint_changed,
      "service_updated"
    );
    Ok(record.clone())
  }

  /// Remove a service. Removing an unknown id is not an error.
  ///
  /// Returns whether a record was removed.
  pub fn deregister(&self, service_id: &str) -> bool {
    let removed = self.write().services.remove(service_id);
    match &removed {
      Some(record) => info!(service_id = %service_id, name = %record.name, "service_deregistered"),
      None => debug!(service_id = %service_id, "deregister of unknown service ignored"),
    }
    removed.is_some()
  }

  /// Get a service by id.
  pub fn get(&self, service_id: &str) -> Result<ServiceRecord, RegistryError> {
    self
      .read()
      .services
      .get(service_id)
      .cloned()
      .ok_or_else(|| RegistryError::NotFound(service_id.to_string()))
  }

  /// Snapshot of every registered service, in registration order.
  pub fn list_all(&self) -> Vec<ServiceRecord> {
    let mut services: Vec<ServiceRecord> = self.read().services.values().cloned().collect();
    services.sort_by_key(|s| s.seq);
    services
  }

  /// All providers of a capability, best first.
  ///
  /// Healthy services come before services that were never probed, which
  /// come before unhealthy ones. Within a status the most recent heartbeat
  /// wins, then the earliest registration.
  pub fn providers(&self, capability: &str) -> Vec<ServiceRecord> {
    let mut providers: Vec<ServiceRecord> = self
      .read()
      .services
      .values()
      .filter(|s| s.provides(capability))
      .cloned()
      .collect();
    providers.sort_by(preference);
    providers
  }

  /// The single best provider of a capability.
  pub fn lookup(&self, capability: &str) -> Result<ServiceRecord, RegistryError> {
    self
      .read()
      .services
      .values()
      .filter(|s| s.provides(capability))
      .min_by(|a, b| preference(a, b))
      .cloned()
      .ok_or_else(|| RegistryError::NoProvider(capability.to_string()))
  }

  /// Record a heartbeat pushed by the service itself.
  pub fn heartbeat(&self, service_id: &str) -> Result<ServiceRecord, RegistryError> {
    let mut inner = self.write();
    let record = inner
      .services
      .get_mut(service_id)
      .ok_or_else(|| RegistryError::NotFound(service_id.to_string()))?;

    record.status = ServiceStatus::Healthy;
    record.last_heartbeat = Utc::now();
    Ok(record.clone())
  }

  /// Apply the outcome of a health probe taken at `at`.
  ///
  /// A healthy probe refreshes the heartbeat; a failed one only flips the
  /// status. Returns the previous status, or `None` if the service was
  /// deregistered while the probe was in flight.
  pub fn record_probe(
    &self,
    service_id: &str,
    healthy: bool,
    at: DateTime<Utc>,
  ) -> Option<ServiceStatus> {
    let mut inner = self.write();
    let record = inner.services.get_mut(service_id)?;
    let previous = record.status;

    if healthy {
      record.status = ServiceStatus::Healthy;
      record.last_heartbeat = at;
    } else {
      record.status = ServiceStatus::Unhealthy;
    }

    if previous != record.status {
      match record.status {
        ServiceStatus::Unhealthy => warn!(
          service_id = %record.id,
          name = %record.name,
          "service marked unhealthy"
        ),
        _ => info!(
          service_id = %record.id,
          name = %record.name,
          status = ?record.status,
          "service status changed"
        ),
      }
    }

    Some(previous)
  }

  /// Counts by status.
  pub fn summary(&self) -> RegistrySummary {
    let inner = self.read();
    let mut summary = RegistrySummary {
      total: inner.services.len(),
      ..Default::default()
    };
    for record in inner.services.values() {
      match record.status {
        ServiceStatus::Healthy => summary.healthy += 1,
        ServiceStatus::Unhealthy => summary.unhealthy += 1,
        ServiceStatus::Unknown => summary.unknown += 1,
      }
    }
    summary
  }

  pub fn len(&self) -> usize {
    self.read().services.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl Default for ServiceRegistry {
  fn default() -> Self {
    Self::new()
  }
}

fn preference(a: &ServiceRecord, b: &ServiceRecord) -> Ordering {
  a.status
    .rank()
    .cmp(&b.status.rank())
    .then_with(|| b.last_heartbeat.cmp(&a.last_heartbeat))
    .then_with(|| a.seq.cmp(&b.seq))
}

/// Normalize and check a registration before it touches shared state.
fn validate(mut registration: Registration) -> Result<Registration, RegistryError> {
  let invalid = |name: &str, message: String| RegistryError::InvalidRegistration {
    name: name.to_string(),
    message,
  };

  registration.name = registration.name.trim().to_string();
  if registration.name.is_empty() {
    return Err(invalid("", "name must not be empty".to_string()));
  }

  let url = url::Url::parse(&registration.base_url)
    .map_err(|e| invalid(&registration.name, format!("invalid base url: {}", e)))?;
  if url.scheme() != "http" && url.scheme() != "https" {
    return Err(invalid(
      &registration.name,
      format!("unsupported url scheme: {}", url.scheme()),
    ));
  }
  registration.base_url = registration.base_url.trim_end_matches('/').to_string();

  if !registration.health_path.starts_with('/') {
    registration.health_path = format!("/{}", registration.health_path);
  }

  let capabilities: BTreeSet<String> = registration
    .capabilities
    .iter()
    .map(|c| c.trim().to_string())
    .filter(|c| !c.is_empty())
    .collect();
  registration.capabilities = capabilities.into_iter().collect();

  Ok(registration)
}
