use axum::Json;
use axum::extract::{Path, State};
use companion_template::{TemplateSummary, WorkflowTemplate};
use serde::Serialize;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct TemplateList {
  pub templates: Vec<TemplateSummary>,
  pub count: usize,
}

pub async fn list_templates(State(state): State<AppState>) -> Json<TemplateList> {
  let templates: Vec<_> = state
    .templates()
    .list()
    .iter()
    .map(|t| t.summary())
    .collect();
  Json(TemplateList {
    count: templates.len(),
    templates,
  })
}

pub async fn get_template(
  State(state): State<AppState>,
  Path(id): Path<String>,
) -> ApiResult<Json<WorkflowTemplate>> {
  let template = state.templates().get(&id)?;
  Ok(Json(WorkflowTemplate::clone(&template)))
}
