//! Parameter values for step configuration.
//!
//! A parameter is either a template string containing `{name}` placeholders
//! or a literal JSON value that is passed through unchanged.
//!
//! # Examples
//!
//! ```json
//! {
//!   "path": "{target_dir}",
//!   "content": "Organized {step_0.files_moved} files",
//!   "limit": 10,
//!   "tags": ["workflow", "files"]
//! }
//! ```
//!
//! Strings are rendered by the interpolator; numbers, booleans and null are
//! literals. Objects and arrays are walked recursively so nested strings may
//! carry placeholders too.

/// A parameter value is any JSON value; strings are treated as templates.
pub type ParamValue = serde_json::Value;
