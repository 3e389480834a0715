//! `workstation`: run a workflow configuration from the command line

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use serde_json::Value;
use thiserror::Error;

use workflow_engine::{
    GraphBuilder, LogEventSink, ModelRegistry, NodeRegistry, WorkflowError, WorkflowExecutor,
};

#[derive(Parser, Debug)]
#[command(name = "workstation", version, about = "Run a workflow configuration")]
struct Cli {
    /// Path to the workflow configuration (JSON)
    cfg: Option<PathBuf>,

    /// Run ID (auto-generated if not provided)
    #[arg(long)]
    run_id: Option<String>,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("Please provide config file.")]
    MissingConfig,

    #[error("Failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config '{path}' is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

fn load_config(path: &Path) -> Result<Value, CliError> {
    let text = std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| CliError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let path = cli.cfg.ok_or(CliError::MissingConfig)?;
    let config = load_config(&path)?;

    let registry = NodeRegistry::with_builtins();
    let missing = workflow_nodes::missing_kinds(&registry);
    if !missing.is_empty() {
        let names: Vec<&str> = missing.iter().map(|kind| kind.name()).collect();
        log::debug!("Node types without a factory: {}", names.join(", "));
    }

    let mut models = ModelRegistry::new();
    let graph = GraphBuilder::new(&registry).build_value(config, &mut models)?;

    let sink = Arc::new(LogEventSink);
    let executor = match cli.run_id {
        Some(run_id) => WorkflowExecutor::new(run_id, sink),
        None => WorkflowExecutor::with_random_id(sink),
    };
    log::info!("Run {}", executor.run_id());
    executor.run(&graph).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    log::info!("Launching...");
    match run(Cli::parse()).await {
        Ok(()) => {
            log::info!("Finished.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
