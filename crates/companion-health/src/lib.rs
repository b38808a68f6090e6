//! Companion Health
//!
//! Periodically probes every registered service and feeds the outcome back
//! into the [`ServiceRegistry`](companion_registry::ServiceRegistry).
//!
//! The monitor never removes services; an unreachable service is marked
//! unhealthy and stays routable until it is explicitly deregistered.

mod error;
mod monitor;
mod probe;

pub use error::HealthError;
pub use monitor::{CheckReport, HealthConfig, HealthMonitor};
pub use probe::{HealthProbe, HttpProbe, ProbeOutcome};
