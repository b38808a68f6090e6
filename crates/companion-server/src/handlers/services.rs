use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use companion_registry::{Registration, ServiceRecord};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ApiResult;
use crate::state::AppState;

/// Body of `POST /register` and `PUT /services/:id`.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
  pub name: String,
  pub url: String,
  #[serde(default)]
  pub capabilities: Vec<String>,
  #[serde(default)]
  pub health_endpoint: Option<String>,
  #[serde(default)]
  pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl From<RegisterRequest> for Registration {
  fn from(req: RegisterRequest) -> Self {
    let mut registration = Registration::new(req.name, req.url);
    registration.capabilities = req.capabilities;
    registration.metadata = req.metadata;
    if let Some(path) = req.health_endpoint {
      registration.health_path = path;
    }
    registration
  }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
  pub service_id: String,
  pub status: String,
}

pub async fn register_service(
  State(state): State<AppState>,
  body: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<Json<RegisterResponse>> {
  let Json(req) = body?;
  let record = state.registry().register(req.into())?;
  info!(service_id = %record.id, name = %record.name, "service registered via api");
  Ok(Json(RegisterResponse {
    service_id: record.id,
    status: "registered".to_string(),
  }))
}

pub async fn update_service(
  State(state): State<AppState>,
  Path(id): Path<String>,
  body: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<Json<ServiceRecord>> {
  let Json(req) = body?;
  Ok(Json(state.registry().update(&id, req.into())?))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeregisterResponse {
  pub service_id: String,
  pub removed: bool,
}

pub async fn deregister_service(
  State(state): State<AppState>,
  Path(id): Path<String>,
) -> Json<DeregisterResponse> {
  let removed = state.registry().deregister(&id);
  Json(DeregisterResponse {
    service_id: id,
    removed,
  })
}

pub async fn heartbeat(
  State(state): State<AppState>,
  Path(id): Path<String>,
) -> ApiResult<Json<ServiceRecord>> {
  Ok(Json(state.registry().heartbeat(&id)?))
}

#[derive(Debug, Serialize)]
pub struct ServiceList {
  pub services: Vec<ServiceRecord>,
  pub count: usize,
}

pub async fn list_services(State(state): State<AppState>) -> Json<ServiceList> {
  let services = state.registry().list_all();
  Json(ServiceList {
    count: services.len(),
    services,
  })
}
