//! Companion Template
//!
//! Workflow templates and the parameter interpolator that renders step
//! parameters against an execution context.
//!
//! Templates are validated when loaded: malformed placeholders, duplicate
//! output keys and unbounded retry policies are rejected before anything
//! runs. Loaded templates are immutable and handed out as [`Arc`] snapshots,
//! so an execution keeps the exact definition it started with.
//!
//! [`Arc`]: std::sync::Arc

mod builtin;
mod error;
pub mod interpolate;
mod matching;
mod store;
mod template;

pub use builtin::builtin_templates;
pub use error::{InterpolationError, TemplateError};
pub use interpolate::{Context, placeholders, render, render_str, validate};
pub use store::TemplateStore;
pub use template::{StepSpec, TemplateSummary, WorkflowTemplate};
