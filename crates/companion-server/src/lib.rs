//! Companion Server
//!
//! The orchestrator's HTTP interface: trigger and poll workflow executions,
//! browse templates, and register services.

mod error;
mod handlers;
mod router;
mod state;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use router::create_router;
pub use state::AppState;

/// Serve the API until `shutdown` is cancelled.
pub async fn serve(
  listener: TcpListener,
  state: AppState,
  shutdown: CancellationToken,
) -> std::io::Result<()> {
  let app = create_router(state);
  axum::serve(listener, app)
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await
}
