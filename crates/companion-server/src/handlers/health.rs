use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
  pub status: String,
  pub registered_count: usize,
  pub healthy_count: usize,
  pub templates_loaded: usize,
  pub active_executions: usize,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
  let summary = state.registry().summary();
  Json(HealthResponse {
    status: "healthy".to_string(),
    registered_count: summary.total,
    healthy_count: summary.healthy,
    templates_loaded: state.templates().len(),
    active_executions: state.executor.active_count(),
  })
}
