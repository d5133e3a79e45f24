mod logging;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::info;

use kiln_engine::{ExecuteOptions, ExecutorDeps, PipelineExecutor};
use kiln_manifest::{AssetManifest, TaskEntry, TaskState};
use kiln_registry::{FsPipelineLibrary, LookupTables, PipelineLibrary, TaskTypeRegistry};
use kiln_remote::{HttpBackend, HttpBackendConfig, HttpDownloader};

/// Kiln - resumable asset generation pipelines
#[derive(Parser)]
#[command(name = "kiln")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory holding pipelines/, task-types/ and lookups/ (default: ~/.kiln)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Log level used when RUST_LOG is not set
  #[arg(long, global = true, default_value = "info")]
  log_level: String,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run a pipeline against an asset directory
  Run {
    /// Pipeline name, as in {data_dir}/pipelines/{name}.json
    pipeline: String,

    /// Asset directory containing manifest.json
    asset_dir: PathBuf,

    /// Run a single step. Its dependencies must already have succeeded.
    #[arg(long)]
    step: Option<String>,

    #[command(flatten)]
    remote: RemoteArgs,
  },

  /// Print the task types a task type depends on, in execution order
  Chain {
    task_type: String,
  },

  /// List available pipelines
  Pipelines,

  /// Create a manifest for a new asset
  Init {
    asset_dir: PathBuf,

    #[arg(long)]
    name: String,

    /// Asset type, e.g. character or prop
    #[arg(long = "type")]
    asset_type: String,

    /// Asset id (default: the asset directory name)
    #[arg(long)]
    id: Option<String>,

    #[arg(long, default_value = "")]
    description: String,
  },

  /// Show the task states recorded in an asset manifest
  Status {
    asset_dir: PathBuf,
  },
}

#[derive(clap::Args)]
struct RemoteArgs {
  /// Base URL of the generation service
  #[arg(long, env = "KILN_API_URL")]
  api_url: String,

  /// API key, sent as a bearer token
  #[arg(long, env = "KILN_API_KEY", hide_env_values = true)]
  api_key: Option<String>,

  /// Delay between task status polls
  #[arg(long, default_value_t = 5000)]
  poll_interval_ms: u64,
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  logging::init(&cli.log_level);

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".kiln"),
  };

  let rt = tokio::runtime::Runtime::new()?;
  match cli.command {
    Some(Commands::Run {
      pipeline,
      asset_dir,
      step,
      remote,
    }) => rt.block_on(run_pipeline(&data_dir, &pipeline, &asset_dir, step, remote)),
    Some(Commands::Chain { task_type }) => rt.block_on(print_chain(&data_dir, &task_type)),
    Some(Commands::Pipelines) => rt.block_on(list_pipelines(&data_dir)),
    Some(Commands::Init {
      asset_dir,
      name,
      asset_type,
      id,
      description,
    }) => rt.block_on(init_asset(&asset_dir, id, name, asset_type, description)),
    Some(Commands::Status { asset_dir }) => rt.block_on(print_status(&asset_dir)),
    None => {
      println!("kiln - use --help to see available commands");
      Ok(())
    }
  }
}

async fn load_task_types(data_dir: &Path) -> Result<TaskTypeRegistry> {
  let dir = data_dir.join("task-types");
  TaskTypeRegistry::load(&dir)
    .await
    .with_context(|| format!("failed to load task types from {}", dir.display()))
}

async fn run_pipeline(
  data_dir: &Path,
  pipeline: &str,
  asset_dir: &Path,
  step: Option<String>,
  remote: RemoteArgs,
) -> Result<()> {
  let task_types = load_task_types(data_dir).await?;
  info!(task_types = task_types.names().len(), "task types loaded");

  let backend = HttpBackend::new(HttpBackendConfig {
    base_url: remote.api_url,
    api_key: remote.api_key,
    poll_interval: Duration::from_millis(remote.poll_interval_ms),
  })
  .context("invalid api url")?;

  let lookups = LookupTables::new(data_dir.join("lookups"));
  let tables = lookups
    .preload()
    .await
    .context("failed to read lookup tables")?;
  info!(tables, "lookup tables loaded");

  let executor = PipelineExecutor::new(ExecutorDeps {
    pipelines: Arc::new(FsPipelineLibrary::new(data_dir.join("pipelines"))),
    task_types: Arc::new(task_types),
    lookups: Arc::new(lookups),
    backend: Arc::new(backend),
    downloader: Arc::new(HttpDownloader::new()),
  });

  let summary = executor
    .execute(pipeline, asset_dir, ExecuteOptions { step })
    .await
    .with_context(|| format!("pipeline '{}' failed for {}", pipeline, asset_dir.display()))?;

  println!("{}", serde_json::to_string_pretty(&summary)?);
  Ok(())
}

async fn print_chain(data_dir: &Path, task_type: &str) -> Result<()> {
  let task_types = load_task_types(data_dir).await?;
  for name in task_types.dependency_chain(task_type)? {
    println!("{}", name);
  }
  Ok(())
}

async fn list_pipelines(data_dir: &Path) -> Result<()> {
  let library = FsPipelineLibrary::new(data_dir.join("pipelines"));
  for name in library.list().await? {
    println!("{}", name);
  }
  Ok(())
}

async fn init_asset(
  asset_dir: &Path,
  id: Option<String>,
  name: String,
  asset_type: String,
  description: String,
) -> Result<()> {
  if kiln_manifest::load(asset_dir).await?.is_some() {
    bail!(
      "{} already exists",
      kiln_manifest::manifest_path(asset_dir).display()
    );
  }

  let id = match id {
    Some(id) => id,
    None => asset_dir
      .file_name()
      .and_then(|n| n.to_str())
      .map(|n| n.to_string())
      .context("cannot derive an asset id from the directory name, pass --id")?,
  };

  tokio::fs::create_dir_all(asset_dir)
    .await
    .with_context(|| format!("failed to create {}", asset_dir.display()))?;

  let manifest = AssetManifest::new(id, name, asset_type, description);
  kiln_manifest::save(asset_dir, &manifest).await?;

  eprintln!("Created {}", kiln_manifest::manifest_path(asset_dir).display());
  Ok(())
}

async fn print_status(asset_dir: &Path) -> Result<()> {
  let manifest = kiln_manifest::load(asset_dir)
    .await?
    .with_context(|| format!("no manifest in {}", asset_dir.display()))?;

  println!("{} ({}, {})", manifest.name, manifest.id, manifest.asset_type);
  match manifest.seed {
    Some(seed) => println!("seed: {}", seed),
    None => println!("seed: not yet generated"),
  }

  for (task_type, entry) in &manifest.tasks {
    match entry {
      TaskEntry::Single(state) => println!("  {:<16} {}", task_type, describe(state)),
      TaskEntry::Items(items) => {
        println!("  {}", task_type);
        for state in items {
          let item = state.item.as_deref().unwrap_or("?");
          println!("    {:<14} {}", item, describe(state));
        }
      }
    }
  }

  Ok(())
}

fn describe(state: &TaskState) -> String {
  let mut line = state.status.to_string();
  if let Some(task_id) = &state.task_id {
    line.push_str(&format!("  task={}", task_id));
  }
  if let Some(error) = &state.error {
    line.push_str(&format!("  error={}", error));
  }
  line
}
