// SPDX-License-Identifier: MIT

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use flowrun::config::EngineConfig;
use flowrun::integration::{BreakerRegistry, Reliability};
use flowrun::tools::builtin::register_builtins;
use flowrun::tools::http::HttpRequestTool;
use flowrun::tools::ToolRegistry;
use flowrun::workflow::{ToolStepExecutor, WorkflowEngine, WorkflowLoader, YamlWorkflowLoader};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a workflow from a file
    Run {
        /// Path to the workflow file
        #[arg(short, long)]
        file: PathBuf,

        /// Workflow input as key=value (value parsed as JSON when possible)
        #[arg(short, long = "input", value_name = "KEY=VALUE")]
        inputs: Vec<String>,

        /// Workflow inputs as a JSON object
        #[arg(long)]
        inputs_json: Option<String>,

        /// Engine config file (YAML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Load and validate a workflow without running it
    Validate {
        /// Path to the workflow file
        #[arg(short, long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let loader = Arc::new(YamlWorkflowLoader::new());

    match args.command {
        Commands::Run {
            file,
            inputs,
            inputs_json,
            config,
        } => {
            let config = match config {
                Some(path) => EngineConfig::from_file(&path)?,
                None => EngineConfig::default(),
            }
            .with_env_overrides()?;

            let registry = ToolRegistry::new();
            register_builtins(&registry).await;
            registry.register(Arc::new(HttpRequestTool::new())).await;
            for name in registry.names().await {
                log::info!("Registered tool: {}", name);
            }

            let executor = ToolStepExecutor::new(
                registry,
                Reliability::new(config.reliability.clone()),
                BreakerRegistry::new(config.circuit_breaker.clone()),
            );

            let workflow = loader
                .load(&file)
                .await
                .with_context(|| format!("loading {}", file.display()))?;
            let inputs = parse_inputs(inputs_json.as_deref(), &inputs)?;

            let engine = WorkflowEngine::new(Arc::new(executor), loader, config);
            let result = engine.run(&workflow, inputs).await;
            println!("{}", serde_json::to_string_pretty(&result)?);

            if !result.is_success() {
                std::process::exit(1);
            }
        }
        Commands::Validate { file } => {
            let workflow = loader
                .load(&file)
                .await
                .with_context(|| format!("loading {}", file.display()))?;
            println!(
                "Workflow '{}' is valid ({} steps)",
                workflow.display_name(),
                workflow.steps.len()
            );
        }
    }

    Ok(())
}

fn parse_inputs(json: Option<&str>, pairs: &[String]) -> anyhow::Result<Map<String, Value>> {
    let mut inputs = match json {
        Some(raw) => match serde_json::from_str(raw).context("parsing --inputs-json")? {
            Value::Object(map) => map,
            _ => bail!("--inputs-json must be a JSON object"),
        },
        None => Map::new(),
    };

    for pair in pairs {
        let Some((key, raw)) = pair.split_once('=') else {
            bail!("invalid --input '{}', expected KEY=VALUE", pair);
        };
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        inputs.insert(key.trim().to_string(), value);
    }
    Ok(inputs)
}
