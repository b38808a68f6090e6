use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use chrono::Utc;
use companion_config::TriggerType;
use companion_executor::{ExecutionSummary, WorkflowExecution};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Body of `POST /trigger`. At most one of `template_id` or `trigger_type`
/// selects what runs; with neither, templates with a `manual` trigger run.
#[derive(Debug, Deserialize)]
pub struct TriggerRequest {
  #[serde(default)]
  pub template_id: Option<String>,
  #[serde(default)]
  pub trigger_type: Option<TriggerType>,
  #[serde(default, alias = "trigger_data")]
  pub payload: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartedExecution {
  pub execution_id: String,
  pub template_id: String,
  pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TriggerResponse {
  Template(StartedExecution),
  Matched {
    trigger_type: TriggerType,
    executions: Vec<StartedExecution>,
  },
}

pub async fn trigger(
  State(state): State<AppState>,
  body: Result<Json<TriggerRequest>, JsonRejection>,
) -> ApiResult<Json<TriggerResponse>> {
  let Json(req) = body?;

  let mut payload = req.payload;
  if !payload.contains_key("timestamp") {
    payload.insert(
      "timestamp".to_string(),
      serde_json::Value::String(Utc::now().to_rfc3339()),
    );
  }

  let selector = match (req.template_id, req.trigger_type) {
    (None, None) => (None, Some(TriggerType::Manual)),
    other => other,
  };

  match selector {
    (Some(template_id), None) => {
      let started = start(&state, &template_id, payload)?;
      Ok(Json(TriggerResponse::Template(started)))
    }
    (None, Some(trigger_type)) => {
      let matched = state.templates().matching(trigger_type, &payload);
      info!(
        trigger_type = %trigger_type,
        matched = matched.len(),
        "trigger received"
      );

      let executions = matched
        .iter()
        .map(|template| start(&state, &template.template_id, payload.clone()))
        .collect::<ApiResult<Vec<_>>>()?;
      Ok(Json(TriggerResponse::Matched {
        trigger_type,
        executions,
      }))
    }
    _ => Err(ApiError::BadRequest(
      "provide either template_id or trigger_type, not both".to_string(),
    )),
  }
}

fn start(
  state: &AppState,
  template_id: &str,
  payload: serde_json::Map<String, serde_json::Value>,
) -> ApiResult<StartedExecution> {
  let handle = state.executor.start(template_id, payload)?;
  Ok(StartedExecution {
    execution_id: handle.execution_id().to_string(),
    template_id: template_id.to_string(),
    status: "started".to_string(),
  })
}

pub async fn execution_status(
  State(state): State<AppState>,
  Path(id): Path<String>,
) -> ApiResult<Json<WorkflowExecution>> {
  Ok(Json(state.executor.status(&id)?))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CancelResponse {
  pub execution_id: String,
  pub status: String,
}

pub async fn cancel_execution(
  State(state): State<AppState>,
  Path(id): Path<String>,
) -> ApiResult<Json<CancelResponse>> {
  state.executor.cancel(&id)?;
  Ok(Json(CancelResponse {
    execution_id: id,
    status: "cancelling".to_string(),
  }))
}

#[derive(Debug, Serialize)]
pub struct ExecutionList {
  pub executions: Vec<ExecutionSummary>,
  pub count: usize,
}

pub async fn list_executions(State(state): State<AppState>) -> Json<ExecutionList> {
  let executions: Vec<_> = state
    .executor
    .list()
    .iter()
    .map(|e| e.summary())
    .collect();
  Json(ExecutionList {
    count: executions.len(),
    executions,
  })
}
