use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use weft_config::WorkflowDef;
use weft_runtime::{ChannelKey, NodeRegistry, ProgressRegistry, RunManager, RunRequest, RunnerConfig};
use weft_store::SqliteStore;

/// Weft - a workflow execution engine
#[derive(Parser)]
#[command(name = "weft")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.weft)
  #[arg(long, global = true, env = "WEFT_DATA_DIR")]
  data_dir: Option<PathBuf>,

  /// Run history database (default: sqlite in the data directory)
  #[arg(long, global = true, env = "WEFT_DATABASE_URL")]
  database_url: Option<String>,

  /// Log filter, e.g. `info` or `weft_runtime=debug`
  #[arg(long, global = true, env = "WEFT_LOG", default_value = "info")]
  log_filter: String,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Check a workflow definition without running it
  Validate {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,
  },

  /// Run a workflow, printing progress events as JSON lines
  Run {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,

    /// Largest list an iteration node may expand
    #[arg(long, default_value_t = 10_000)]
    max_iterations: usize,

    /// Attempts of a retry node that does not configure its own
    #[arg(long, default_value_t = 3)]
    default_retries: u32,

    /// Do not record the run in the history database
    #[arg(long)]
    no_store: bool,
  },

  /// Print a recorded run
  Show {
    run_id: String,
  },

  /// List recorded runs of a workflow, newest first
  Runs {
    workflow_id: String,
  },

  /// List the available node types
  Nodes,
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  // Logs go to stderr; stdout carries JSON only.
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_new(&cli.log_filter).unwrap_or_else(|_| EnvFilter::new("info")))
    .with_target(false)
    .with_writer(std::io::stderr)
    .init();

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".weft"),
  };
  let database_url = cli
    .database_url
    .unwrap_or_else(|| format!("sqlite://{}", data_dir.join("weft.db").display()));

  let Some(command) = cli.command else {
    println!("weft - use --help to see available commands");
    return Ok(());
  };

  let rt = tokio::runtime::Runtime::new()?;
  match command {
    Commands::Validate { workflow_file } => validate(&workflow_file),
    Commands::Run {
      workflow_file,
      max_iterations,
      default_retries,
      no_store,
    } => {
      let config = RunnerConfig {
        max_iterations,
        default_retries,
      };
      let store = if no_store {
        None
      } else {
        Some(rt.block_on(open_store(&data_dir, &database_url))?)
      };
      rt.block_on(run_workflow(workflow_file, config, store))
    }
    Commands::Show { run_id } => rt.block_on(async {
      let store = open_store(&data_dir, &database_url).await?;
      let record = weft_store::RunStore::get_run(&store, &run_id)
        .await
        .with_context(|| format!("failed to load run {}", run_id))?;
      println!("{}", serde_json::to_string_pretty(&record)?);
      Ok(())
    }),
    Commands::Runs { workflow_id } => rt.block_on(async {
      let store = open_store(&data_dir, &database_url).await?;
      let runs = weft_store::RunStore::list_runs(&store, &workflow_id)
        .await
        .context("failed to list runs")?;
      for run in runs {
        println!(
          "{}\t{:?}\t{}",
          run.run_id,
          run.status,
          run.started_at.to_rfc3339()
        );
      }
      Ok(())
    }),
    Commands::Nodes => {
      let registry = NodeRegistry::with_builtins();
      println!("{}", serde_json::to_string_pretty(&registry.configs())?);
      Ok(())
    }
  }
}

fn load_workflow(workflow_file: &Path) -> Result<WorkflowDef> {
  let content = std::fs::read_to_string(workflow_file)
    .with_context(|| format!("failed to read workflow file: {}", workflow_file.display()))?;
  serde_json::from_str(&content)
    .with_context(|| format!("failed to parse workflow file: {}", workflow_file.display()))
}

async fn open_store(data_dir: &Path, database_url: &str) -> Result<SqliteStore> {
  std::fs::create_dir_all(data_dir)
    .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;
  SqliteStore::connect(database_url)
    .await
    .with_context(|| format!("failed to open run database: {}", database_url))
}

fn validate(workflow_file: &Path) -> Result<()> {
  let workflow = load_workflow(workflow_file)?;
  let manager = RunManager::new(Arc::new(NodeRegistry::with_builtins()), ProgressRegistry::new());
  let errors = manager.validate(&workflow);
  if errors.is_empty() {
    eprintln!("{}: ok", workflow.workflow_id);
    return Ok(());
  }
  println!("{}", serde_json::to_string_pretty(&errors)?);
  bail!("{} node(s) failed validation", errors.len())
}

async fn run_workflow(
  workflow_file: PathBuf,
  config: RunnerConfig,
  store: Option<SqliteStore>,
) -> Result<()> {
  let workflow = load_workflow(&workflow_file)?;
  let workflow_id = workflow.workflow_id.clone();

  let mut manager = RunManager::new(Arc::new(NodeRegistry::with_builtins()), ProgressRegistry::new())
    .with_config(config);
  if let Some(store) = store {
    manager = manager.with_store(Arc::new(store));
  }

  let response = manager
    .submit(RunRequest {
      workflow_id: workflow_id.clone(),
      definition: workflow,
    })
    .context("failed to start run")?;
  let Some(token) = response.token else {
    println!("{}", serde_json::to_string_pretty(&response.validation_errors)?);
    bail!("workflow '{}' failed validation", workflow_id);
  };

  let key = ChannelKey::graph(&token);
  let mut stopping = false;
  loop {
    tokio::select! {
      event = manager.progress().get(&key) => {
        let Some(event) = event else { break };
        println!("{}", serde_json::to_string(&event)?);
        if event.is_finished() {
          break;
        }
      }
      signal = tokio::signal::ctrl_c(), if !stopping => {
        signal.context("failed to listen for ctrl-c")?;
        warn!(run_id = %token, "run_interrupted");
        stopping = true;
        // The run's FlowFinished still arrives on this channel.
        manager.cancel(&workflow_id)?;
      }
    }
  }

  let outcome = manager
    .wait(&workflow_id)
    .await?
    .context("run finished without an outcome")?;
  info!(run_id = %outcome.run_id, status = %outcome.status, "run_finished");
  if outcome.status != weft_runtime::RunStatus::Success {
    bail!("run {} finished {}", outcome.run_id, outcome.status);
  }
  Ok(())
}
