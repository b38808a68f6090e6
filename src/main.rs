use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use companion_executor::{CompletionRecorder, ExecutionStatus, HttpInvoker, WorkflowExecutor};
use companion_health::{HealthMonitor, HttpProbe};
use companion_registry::ServiceRegistry;
use companion_server::AppState;
use companion_template::{TemplateStore, builtin_templates};

mod config;

use config::OrchestratorConfig;

/// Companion - orchestrates local assistant services through workflow templates
#[derive(Parser)]
#[command(name = "companion")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the config file (default: ~/.companion/config.toml)
  #[arg(long, global = true, env = "COMPANION_CONFIG")]
  config: Option<PathBuf>,

  /// Log filter, e.g. `info` or `companion_executor=debug`
  #[arg(long, global = true)]
  log_level: Option<String>,

  /// Emit logs as JSON
  #[arg(long, global = true)]
  json: bool,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run the orchestrator HTTP server
  Serve {
    /// Address to listen on
    #[arg(long)]
    listen: Option<String>,
  },

  /// Run one template to completion with a JSON payload from stdin
  Run {
    /// The template to execute
    template_id: String,
  },

  /// List the loaded templates
  Templates,
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let config_path = cli.config.clone().or_else(OrchestratorConfig::default_path);
  let mut config =
    OrchestratorConfig::load(config_path.as_deref()).context("failed to load configuration")?;
  if let Some(level) = cli.log_level {
    config.logging.level = level;
  }
  if cli.json {
    config.logging.json = true;
  }

  init_tracing(&config);

  let rt = tokio::runtime::Runtime::new()?;
  match cli.command {
    Some(Commands::Serve { listen }) => {
      if let Some(listen) = listen {
        config.listen_addr = listen;
      }
      rt.block_on(serve(config))
    }
    Some(Commands::Run { template_id }) => rt.block_on(run_template(config, template_id)),
    Some(Commands::Templates) => list_templates(&config),
    None => {
      println!("companion - use --help to see available commands");
      Ok(())
    }
  }
}

fn init_tracing(config: &OrchestratorConfig) {
  let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| config.logging.level.clone().into());

  if config.logging.json {
    tracing_subscriber::registry()
      .with(env_filter)
      .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
      .init();
  } else {
    tracing_subscriber::registry()
      .with(env_filter)
      .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
      .init();
  }
}

fn load_templates(config: &OrchestratorConfig) -> Result<TemplateStore> {
  let mut defs = Vec::new();
  if config.templates.include_builtin {
    defs.extend(builtin_templates());
  }
  if let Some(path) = &config.templates.file {
    let file_defs = TemplateStore::read_definitions(path)
      .with_context(|| format!("failed to read templates file: {}", path.display()))?;
    defs.extend(file_defs);
  }
  TemplateStore::new(defs).context("failed to load workflow templates")
}

/// Build the registry, template store and executor shared by all commands.
fn build_executor(config: &OrchestratorConfig) -> Result<WorkflowExecutor> {
  let registry = Arc::new(ServiceRegistry::new());
  for registration in &config.services {
    registry
      .register(registration.clone())
      .with_context(|| format!("failed to register service '{}'", registration.name))?;
  }

  let templates = Arc::new(load_templates(config)?);
  let invoker = Arc::new(HttpInvoker::new().context("failed to create http client")?);
  let recorder = CompletionRecorder::new(
    registry.clone(),
    invoker.clone(),
    Duration::from_millis(config.executor.step_timeout_ms),
  );

  Ok(WorkflowExecutor::new(registry, templates, invoker, config.executor).with_notifier(recorder))
}

async fn serve(config: OrchestratorConfig) -> Result<()> {
  let executor = build_executor(&config)?;
  let shutdown = CancellationToken::new();

  let probe = HttpProbe::new(config.health.probe_timeout()).context("failed to create health probe")?;
  let monitor = Arc::new(HealthMonitor::new(
    executor.registry().clone(),
    Arc::new(probe),
    config.health.interval(),
  ));
  let monitor_task = monitor.spawn(shutdown.clone());

  let listener = TcpListener::bind(config.listen_addr.as_str())
    .await
    .with_context(|| format!("failed to bind {}", config.listen_addr))?;
  info!(
    listen_addr = %config.listen_addr,
    templates = executor.templates().len(),
    services = executor.registry().len(),
    "orchestrator listening"
  );

  tokio::spawn(shutdown_on_signal(shutdown.clone()));

  companion_server::serve(listener, AppState::new(executor), shutdown.clone())
    .await
    .context("server error")?;

  shutdown.cancel();
  if let Err(e) = monitor_task.await {
    error!(error = %e, "health monitor task failed");
  }
  info!("orchestrator stopped");
  Ok(())
}

async fn run_template(config: OrchestratorConfig, template_id: String) -> Result<()> {
  let executor = build_executor(&config)?;
  let payload = read_payload_from_stdin()?;

  let execution = executor
    .execute(&template_id, payload)
    .await
    .with_context(|| format!("failed to run template '{}'", template_id))?;

  println!("{}", serde_json::to_string_pretty(&execution)?);

  if execution.status != ExecutionStatus::Completed {
    anyhow::bail!("execution {} ended {:?}", execution.execution_id, execution.status);
  }
  Ok(())
}

fn list_templates(config: &OrchestratorConfig) -> Result<()> {
  let store = load_templates(config)?;
  let summaries: Vec<_> = store.list().iter().map(|t| t.summary()).collect();
  println!("{}", serde_json::to_string_pretty(&summaries)?);
  Ok(())
}

async fn shutdown_on_signal(shutdown: CancellationToken) {
  let ctrl_c = async {
    if let Err(e) = tokio::signal::ctrl_c().await {
      error!(error = %e, "failed to listen for ctrl-c");
      std::future::pending::<()>().await;
    }
  };

  #[cfg(unix)]
  let terminate = async {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
      Ok(mut signal) => {
        signal.recv().await;
      }
      Err(e) => {
        error!(error = %e, "failed to listen for SIGTERM");
        std::future::pending::<()>().await;
      }
    }
  };

  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
    _ = ctrl_c => info!("received ctrl-c, shutting down"),
    _ = terminate => info!("received terminate signal, shutting down"),
  }
  shutdown.cancel();
}

fn read_payload_from_stdin() -> Result<serde_json::Map<String, serde_json::Value>> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    // No stdin pipe, use empty object
    return Ok(serde_json::Map::new());
  }

  let mut input = String::new();
  io::stdin()
    .read_to_string(&mut input)
    .context("failed to read payload from stdin")?;

  if input.trim().is_empty() {
    Ok(serde_json::Map::new())
  } else {
    serde_json::from_str(&input).context("payload must be a JSON object")
  }
}
