//! Request handlers.

mod health;
mod services;
mod templates;
mod workflows;

pub use health::*;
pub use services::*;
pub use templates::*;
pub use workflows::*;
