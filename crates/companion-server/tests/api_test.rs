//! Router tests driven through `tower::ServiceExt::oneshot`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use companion_executor::{
  ExecutorConfig, InvokeError, StepInvoker, StepRequest, WorkflowExecutor,
};
use companion_registry::{Registration, ServiceRegistry};
use companion_server::{AppState, create_router};
use companion_template::TemplateStore;
use serde_json::{Value, json};
use tower::ServiceExt;

/// Echoes the request body back as the step output.
struct EchoInvoker;

#[async_trait]
impl StepInvoker for EchoInvoker {
  async fn invoke(
    &self,
    request: &StepRequest,
  ) -> Result<serde_json::Map<String, Value>, InvokeError> {
    let mut output = request.body.clone();
    output.insert("files_moved".to_string(), json!(0));
    Ok(output)
  }
}

fn app_with(registry: Arc<ServiceRegistry>) -> Router {
  let executor = WorkflowExecutor::new(
    registry,
    Arc::new(TemplateStore::builtin().unwrap()),
    Arc::new(EchoInvoker),
    ExecutorConfig::default(),
  );
  create_router(AppState::new(executor))
}

fn app() -> Router {
  app_with(Arc::new(ServiceRegistry::new()))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
  let request = Request::builder().method(method).uri(uri);
  let request = match body {
    Some(body) => request
      .header("content-type", "application/json")
      .body(Body::from(serde_json::to_string(&body).unwrap()))
      .unwrap(),
    None => request.body(Body::empty()).unwrap(),
  };

  let response = app.clone().oneshot(request).await.unwrap();
  let status = response.status();
  let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
    .await
    .unwrap();
  let value = if bytes.is_empty() {
    Value::Null
  } else {
    serde_json::from_slice(&bytes).unwrap()
  };
  (status, value)
}

async fn wait_terminal(app: &Router, execution_id: &str) -> Value {
  for _ in 0..100 {
    let (status, body) = send(
      app,
      "GET",
      &format!("/execution/{}/status", execution_id),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    if !matches!(body["status"].as_str(), Some("pending") | Some("running")) {
      return body;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
  }
  panic!("execution {} did not finish", execution_id);
}

#[tokio::test]
async fn test_health_reports_counts() {
  let app = app();
  let (status, body) = send(&app, "GET", "/health", None).await;

  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["status"], "healthy");
  assert_eq!(body["registered_count"], 0);
  assert_eq!(body["templates_loaded"], 4);
  assert_eq!(body["active_executions"], 0);
}

#[tokio::test]
async fn test_register_and_manage_services() {
  let app = app();
  let registration = json!({
    "name": "memory",
    "url": "http://localhost:8081",
    "capabilities": ["memory_storage"],
    "health_endpoint": "/status"
  });

  let (status, body) = send(&app, "POST", "/register", Some(registration.clone())).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["status"], "registered");
  let service_id = body["service_id"].as_str().unwrap().to_string();

  let (status, body) = send(&app, "POST", "/register", Some(registration)).await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(body["code"], "CONFLICT");

  let (_, body) = send(&app, "GET", "/services", None).await;
  assert_eq!(body["count"], 1);
  assert_eq!(body["services"][0]["health_path"], "/status");
  assert_eq!(body["services"][0]["status"], "unknown");

  let (status, body) = send(
    &app,
    "POST",
    &format!("/services/{}/heartbeat", service_id),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["status"], "healthy");

  let (status, body) = send(
    &app,
    "PUT",
    &format!("/services/{}", service_id),
    Some(json!({
      "name": "memory",
      "url": "http://localhost:9091",
      "capabilities": ["memory_storage", "search"]
    })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["id"], service_id.as_str());
  assert_eq!(body["base_url"], "http://localhost:9091");

  let uri = format!("/services/{}", service_id);
  let (status, body) = send(&app, "DELETE", &uri, None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["removed"], true);
  let (status, body) = send(&app, "DELETE", &uri, None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["removed"], false);

  let (status, _) = send(
    &app,
    "POST",
    &format!("/services/{}/heartbeat", service_id),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_registration_is_bad_request() {
  let app = app();

  let (status, body) = send(
    &app,
    "POST",
    "/register",
    Some(json!({"name": "x", "url": "not a url"})),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["code"], "BAD_REQUEST");

  let (status, _) = send(&app, "POST", "/register", Some(json!({"url": "http://x"}))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_templates_endpoints() {
  let app = app();

  let (status, body) = send(&app, "GET", "/templates", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["count"], 4);
  assert_eq!(body["templates"][0]["template_id"], "smart_file_organization");
  assert_eq!(body["templates"][0]["steps_count"], 2);

  let (status, body) = send(&app, "GET", "/templates/meeting_preparation", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["steps"].as_array().unwrap().len(), 3);

  let (status, body) = send(&app, "GET", "/templates/nope", None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_trigger_template_runs_to_completion() {
  let registry = Arc::new(ServiceRegistry::new());
  registry
    .register(Registration::new("memory", "http://localhost:8081").capability("memory_storage"))
    .unwrap();
  let app = app_with(registry);

  let (status, body) = send(
    &app,
    "POST",
    "/trigger",
    Some(json!({
      "template_id": "voice_command_basic",
      "payload": {"command_text": "remember the milk"}
    })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["status"], "started");
  assert_eq!(body["template_id"], "voice_command_basic");
  let execution_id = body["execution_id"].as_str().unwrap().to_string();

  let execution = wait_terminal(&app, &execution_id).await;
  assert_eq!(execution["status"], "completed");
  assert!(execution["payload"]["timestamp"].is_string());
  assert_eq!(
    execution["step_results"][0]["output"]["content"],
    "Voice command received: remember the milk"
  );

  let (_, body) = send(&app, "GET", "/executions", None).await;
  assert_eq!(body["count"], 1);
  assert_eq!(body["executions"][0]["execution_id"], execution_id.as_str());

  let (status, body) = send(
    &app,
    "POST",
    &format!("/execution/{}/cancel", execution_id),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(body["code"], "CONFLICT");
}

#[tokio::test]
async fn test_trigger_without_provider_fails_execution() {
  let app = app();

  let (_, body) = send(
    &app,
    "POST",
    "/trigger",
    Some(json!({"template_id": "smart_file_organization", "payload": {}})),
  )
  .await;
  let execution = wait_terminal(&app, body["execution_id"].as_str().unwrap()).await;

  assert_eq!(execution["status"], "failed");
  assert_eq!(execution["failure"]["kind"], "service_unavailable");
  assert_eq!(execution["failure"]["step_index"], 0);
  assert_eq!(execution["step_results"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_trigger_by_type_starts_matching_templates() {
  let app = app();

  let (status, body) = send(
    &app,
    "POST",
    "/trigger",
    Some(json!({
      "trigger_type": "voice_command",
      "payload": {"phrase": "prepare for meeting about budget"}
    })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["trigger_type"], "voice_command");

  let mut started: Vec<_> = body["executions"]
    .as_array()
    .unwrap()
    .iter()
    .map(|e| e["template_id"].as_str().unwrap().to_string())
    .collect();
  started.sort();
  assert_eq!(started, vec!["conversational_voice_ai", "meeting_preparation"]);
}

#[tokio::test]
async fn test_trigger_defaults_to_manual() {
  let app = app();

  let (status, body) = send(
    &app,
    "POST",
    "/trigger",
    Some(json!({"trigger_data": {"source": "menu"}})),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["trigger_type"], "manual");
  assert_eq!(body["executions"], json!([]));
}

#[tokio::test]
async fn test_trigger_errors() {
  let app = app();

  let (status, body) = send(
    &app,
    "POST",
    "/trigger",
    Some(json!({"template_id": "voice_command_basic", "trigger_type": "voice_command"})),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["code"], "BAD_REQUEST");

  let (status, body) = send(&app, "POST", "/trigger", Some(json!({"payload": "nope"}))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["code"], "BAD_REQUEST");

  let (status, _) = send(
    &app,
    "POST",
    "/trigger",
    Some(json!({"template_id": "missing"})),
  )
  .await;
  assert_eq!(status, StatusCode::NOT_FOUND);

  let (status, _) = send(&app, "GET", "/execution/missing/status", None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);

  let (status, _) = send(&app, "POST", "/execution/missing/cancel", None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}
