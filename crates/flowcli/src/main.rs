// crates/flowcli/src/main.rs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use flowcore::{ExecutionEvent, NodeDefinition, NodeEvent, Workflow};
use flowruntime::{EngineConfig, NodeRegistry, WorkflowEngine, WorkflowParser};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flow")]
#[command(about = "Flow Engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a workflow file
    Run {
        /// Path to workflow JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Engine config JSON file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Worker threads in the execution pool
        #[arg(short, long)]
        workers: Option<usize>,

        /// How long an abort waits for each running node
        #[arg(long)]
        abort_timeout_ms: Option<u64>,

        /// Abort the run after this many milliseconds
        #[arg(long)]
        abort_after_ms: Option<u64>,

        /// Write the resulting workflow document here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Pretty-print the resulting workflow document
        #[arg(long)]
        pretty: bool,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a workflow file
    Validate {
        /// Path to workflow JSON file
        file: PathBuf,
    },

    /// List available node types
    Nodes,

    /// Create a new example workflow
    Init {
        /// Output file path
        #[arg(short, long, default_value = "workflow.json")]
        output: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn registry() -> Arc<NodeRegistry> {
    let mut registry = NodeRegistry::new();
    flownodes::register_all(&mut registry);
    Arc::new(registry)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            config,
            workers,
            abort_timeout_ms,
            abort_after_ms,
            output,
            pretty,
            verbose,
        } => {
            init_tracing(verbose);

            let mut engine_config = match config {
                Some(path) => EngineConfig::from_file(&path)
                    .with_context(|| format!("reading engine config {}", path.display()))?,
                None => EngineConfig::default(),
            };
            if let Some(workers) = workers {
                engine_config.worker_threads = workers;
            }
            if let Some(timeout) = abort_timeout_ms {
                engine_config.abort_timeout_ms = timeout;
            }

            let pool = engine_config.build_pool()?;
            pool.block_on(run_workflow(file, engine_config, abort_after_ms, output, pretty))?;
        }

        Commands::Validate { file } => {
            let pool = EngineConfig::default().build_pool()?;
            pool.block_on(validate_workflow(file))?;
        }

        Commands::Nodes => {
            list_nodes();
        }

        Commands::Init { output } => {
            create_example_workflow(output)?;
        }
    }

    Ok(())
}

async fn run_workflow(
    file: PathBuf,
    config: EngineConfig,
    abort_after_ms: Option<u64>,
    output: Option<PathBuf>,
    pretty: bool,
) -> Result<()> {
    eprintln!("🚀 Loading workflow from: {}", file.display());

    let registry = registry();
    let parser = WorkflowParser::new(registry.clone());
    let workflow = parser.parse_file(&file).await?;

    eprintln!("📋 Strategy: {}", workflow.strategy());
    eprintln!("   Nodes: {}", workflow.nodes().len());
    eprintln!();

    let engine = WorkflowEngine::with_registry(registry, config)?;

    // Subscribe to events for real-time output
    let mut events = engine.subscribe_events();
    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ExecutionEvent::RunStarted { strategy, node_count, .. } => {
                    eprintln!("▶️  Workflow started ({}, {} nodes)", strategy, node_count);
                }
                ExecutionEvent::NodeStarted { node_id, node_type, .. } => {
                    eprintln!("  ⚡ Starting node: {} ({})", node_id, node_type);
                }
                ExecutionEvent::NodeCompleted { node_id, status, duration_ms, .. } => {
                    eprintln!(
                        "  ✅ Node {} finished with {} in {}ms",
                        node_id, status, duration_ms
                    );
                }
                ExecutionEvent::NodeFailed { node_id, error, .. } => {
                    eprintln!("  ❌ Node {} failed: {}", node_id, error);
                }
                ExecutionEvent::NodeAborted { node_id, reason, .. } => {
                    eprintln!("  🛑 Node {} aborted: {}", node_id, reason);
                }
                ExecutionEvent::NodeEvent { node_id, event, .. } => match event {
                    NodeEvent::Info { message } => {
                        eprintln!("     ℹ️  [{}] {}", node_id, message);
                    }
                    NodeEvent::Warning { message } => {
                        eprintln!("     ⚠️  [{}] {}", node_id, message);
                    }
                    NodeEvent::Progress { percent, message } => match message {
                        Some(msg) => eprintln!("     📊 [{}] {}% - {}", node_id, percent, msg),
                        None => eprintln!("     📊 [{}] {}%", node_id, percent),
                    },
                },
                ExecutionEvent::RunCompleted { success, cancelled, duration_ms, .. } => {
                    match (success, cancelled) {
                        (true, false) => eprintln!("✨ Workflow completed in {}ms", duration_ms),
                        (true, true) => eprintln!("🛑 Workflow aborted after {}ms", duration_ms),
                        (false, _) => eprintln!("💥 Workflow failed after {}ms", duration_ms),
                    }
                }
            }
        }
    });

    engine.load(workflow)?;
    let mut handle = engine.execute_async()?;

    let result = match abort_after_ms {
        Some(ms) => {
            tokio::select! {
                result = &mut handle => result,
                _ = tokio::time::sleep(Duration::from_millis(ms)) => {
                    tracing::info!(
                        "Abort deadline of {}ms reached, waiting up to {}ms per running node",
                        ms,
                        engine.config().abort_timeout_ms
                    );
                    engine.abort().await?;
                    handle.await
                }
            }
        }
        None => handle.await,
    };

    // Wait for events to finish printing
    tokio::time::sleep(Duration::from_millis(100)).await;
    event_task.abort();

    let result = result?;
    eprintln!();
    eprintln!("📊 Execution Summary:");
    eprintln!("   Execution ID: {}", result.execution_id);
    eprintln!("   Dispatched: {}/{} nodes", result.dispatched, result.total_nodes);
    eprintln!(
        "   Passed: {}  Failed: {}  Aborted: {}",
        result.passed, result.failed, result.aborted
    );

    let store = engine
        .store()
        .context("workflow was ejected before its results could be read")?;
    let document = parser.serialize(&store.snapshot(), pretty)?;
    match output {
        Some(path) => {
            std::fs::write(&path, document)?;
            eprintln!("📤 Results written to {}", path.display());
        }
        None => println!("{}", document),
    }

    Ok(())
}

async fn validate_workflow(file: PathBuf) -> Result<()> {
    println!("🔍 Validating workflow: {}", file.display());

    let parser = WorkflowParser::new(registry());
    let workflow = parser.parse_file(&file).await?;

    println!("✅ Workflow is valid:");
    println!("   Strategy: {}", workflow.strategy());
    println!("   Nodes: {}", workflow.nodes().len());
    if let Some(author) = &workflow.metadata.author {
        println!("   Author: {}", author);
    }

    Ok(())
}

fn list_nodes() {
    println!("📦 Available Node Types:");
    println!();

    let registry = registry();
    for node_type in registry.list_node_types() {
        if let Some(metadata) = registry.get_metadata(&node_type) {
            println!("  • {} ({})", node_type, metadata.category);
            println!("    {}", metadata.description);
        } else {
            println!("  • {}", node_type);
        }
    }
}

fn create_example_workflow(output: PathBuf) -> Result<()> {
    let mut workflow = Workflow::parallel();
    workflow.metadata.version = Some("1.0".to_string());
    workflow.metadata.author = Some("flow init".to_string());

    workflow.add_node(NodeDefinition::new("greet", "Echo").with_config("message", "hello"));
    workflow.add_node(
        NodeDefinition::new("log", "debug.log").with_config("message", "running in parallel"),
    );
    workflow.add_node(
        NodeDefinition::new("wait", "time.delay")
            .with_config("delay_ms", 2000)
            .with_config("steps", 4),
    );

    // Save to file
    let json = serde_json::to_string_pretty(&workflow)?;
    std::fs::write(&output, json)?;

    println!("✨ Created example workflow: {}", output.display());
    println!();
    println!("Run it with:");
    println!("  flow run --file {} --pretty", output.display());
    println!("  flow run --file {} --abort-after-ms 500", output.display());

    Ok(())
}
