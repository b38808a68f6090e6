//! Companion Config
//!
//! This crate contains the serializable workflow template types for the
//! companion orchestrator. These types describe templates before they are
//! validated and loaded into the template store.
//!
//! Definitions can be loaded from:
//! - the built-in template set compiled into the orchestrator
//! - JSON files (via `templates.file` in the orchestrator config)

mod param;
mod step;
mod template;
mod trigger;

pub use param::ParamValue;
pub use step::{MAX_RETRIES, RetryPolicy, StepDef};
pub use template::TemplateDef;
pub use trigger::{TriggerDef, TriggerType};
