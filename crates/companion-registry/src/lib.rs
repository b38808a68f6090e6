//! Companion Registry
//!
//! An in-memory directory of the backend services the orchestrator can
//! route to. Each service declares a set of capabilities; workflow steps
//! name a capability and [`ServiceRegistry::lookup`] picks the provider.
//!
//! Nothing is persisted: the registry is rebuilt from scratch on every run,
//! either from static configuration or from services calling `/register`.

mod error;
mod record;
mod registry;

pub use error::RegistryError;
pub use record::{Registration, RegistrySummary, ServiceRecord, ServiceStatus};
pub use registry::ServiceRegistry;
