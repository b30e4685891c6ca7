//! SwarmAssistant CLI entry point.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::Table;
use std::sync::Arc;
use std::time::Duration;

use swarm_assistant::adapters::cli::builtin_adapters;
use swarm_assistant::adapters::providers::{
    AnthropicConfig, AnthropicProvider, OpenAiCompatConfig, OpenAiCompatProvider,
};
use swarm_assistant::adapters::sqlite::{create_pool, SqliteEventRepository, SqliteTaskSink};
use swarm_assistant::application::bootstrap;
use swarm_assistant::domain::models::{TaskStatus, TaskSubmission};
use swarm_assistant::domain::ports::{EventRepository, ModelProvider, NullTaskSink, TaskSink};
use swarm_assistant::SwarmConfig;

#[derive(Parser)]
#[command(name = "swarm", version, about = "Multi-agent coding swarm runtime")]
struct Cli {
    /// Path to a configuration file (defaults to .swarm/config.yaml)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a task and stream its lifecycle until it finishes
    Run {
        /// Task title
        title: String,
        /// Task description
        #[arg(default_value = "")]
        description: String,
        /// Task id (generated when omitted)
        #[arg(long)]
        task_id: Option<String>,
        /// Run id to group this task under
        #[arg(long)]
        run_id: Option<String>,
    },
    /// List the built-in CLI adapter catalog
    Adapters,
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("swarm_assistant=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => SwarmConfig::load_from_file(path)?,
        None => SwarmConfig::load()?,
    };

    match cli.command {
        Commands::Run {
            title,
            description,
            task_id,
            run_id,
        } => run_task(config, title, description, task_id, run_id).await,
        Commands::Adapters => {
            let mut table = Table::new();
            table.set_header(vec!["id", "probe", "execute", "internal"]);
            for adapter in builtin_adapters() {
                table.add_row(vec![
                    adapter.id.clone(),
                    adapter.probe_command.clone(),
                    adapter.execute_command.clone(),
                    adapter.is_internal.to_string(),
                ]);
            }
            println!("{table}");
            Ok(())
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn run_task(
    config: SwarmConfig,
    title: String,
    description: String,
    task_id: Option<String>,
    run_id: Option<String>,
) -> Result<()> {
    let (event_repository, task_sink): (Option<Arc<dyn EventRepository>>, Arc<dyn TaskSink>) =
        if config.database_path.is_empty() {
            (None, Arc::new(NullTaskSink))
        } else {
            let pool = create_pool(&config.database_path)
                .await
                .context("Failed to open the swarm database")?;
            (
                Some(Arc::new(SqliteEventRepository::new(pool.clone()))),
                Arc::new(SqliteTaskSink::new(pool)),
            )
        };

    let mut providers: Vec<Arc<dyn ModelProvider>> = Vec::new();
    if std::env::var("ANTHROPIC_API_KEY").is_ok() {
        providers.push(Arc::new(AnthropicProvider::new(AnthropicConfig::default())));
    }
    if std::env::var("OPENAI_API_KEY").is_ok() {
        providers.push(Arc::new(OpenAiCompatProvider::new(
            OpenAiCompatConfig::default(),
        )));
    }

    let (dispatcher, services) =
        bootstrap(config, event_repository, task_sink, providers, Vec::new())
            .context("Failed to bootstrap the swarm runtime")?;

    let task_id = task_id.unwrap_or_else(|| format!("task-{}", uuid::Uuid::new_v4()));
    let mut submission = TaskSubmission::new(&task_id, title, description);
    submission.run_id = run_id;

    let mut events = services.ui.subscribe();
    dispatcher
        .submit_task(submission)
        .await
        .context("Task submission failed")?;

    // Follow the task until it reaches a terminal status
    loop {
        while let Ok(envelope) = events.try_recv() {
            println!("[{}] {} {}", envelope.sequence, envelope.kind, envelope.detail);
        }
        match services.tasks.get(&task_id).await {
            Some(snapshot) if snapshot.is_terminal() => {
                println!("task {} finished: {}", task_id, snapshot.status.as_str());
                if snapshot.status == TaskStatus::Blocked {
                    println!("error: {}", snapshot.error.as_deref().unwrap_or("unknown"));
                }
                if let Some(summary) = snapshot.summary {
                    println!("summary: {summary}");
                }
                return Ok(());
            }
            Some(_) => {}
            None => anyhow::bail!("task {task_id} vanished from the registry"),
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
