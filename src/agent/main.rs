use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;

#[path = "../agent/mod.rs"]
mod agent;
#[path = "../fetcher/mod.rs"]
mod fetcher;
#[path = "../shared/mod.rs"]
mod shared;

#[derive(Parser)]
#[command(name = "esi-tools")]
#[command(about = "ESI Tools - inspect and run the research assistant's tools")]
struct Args {
    /// Path to the ESI config file
    #[arg(long, global = true, env = "ESI_CONFIG_PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List registered tools and their function definitions
    List,
    /// Run a tool with JSON arguments
    Call {
        /// Tool name or alias
        tool: String,
        /// Arguments as a JSON object
        #[arg(default_value = "{}")]
        args: String,
    },
    /// Validate the agent settings and show the selected provider
    Settings,
    /// Print the conversation starters
    Starters,
    /// Replay a JSONL file of agent events through a conversation turn
    Replay {
        events: PathBuf,
        /// User message that opened the turn
        #[arg(long, default_value = "(replayed turn)")]
        message: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let (config, config_path) = shared::config::EsiConfig::load(args.config)?;

    let _ = shared::logging::init_service_logging(&config.log_dir, "esi_tools");
    tracing::info!("Using config: {}", config_path.display());

    match args.command {
        Command::List => {
            let registry =
                agent::build_registry(&config, agent::artifacts::ArtifactChannel::new()).await?;
            let defs = registry.tool_definitions().await;
            println!("{}", serde_json::to_string_pretty(&defs)?);
        }
        Command::Call { tool, args } => {
            let channel = agent::artifacts::ArtifactChannel::new();
            let registry = agent::build_registry(&config, channel.clone()).await?;
            let output = agent::call_tool(&registry, &tool, &args).await?;
            println!("{}", output);
            for artifact in channel.take().await {
                eprintln!(
                    "artifact: {} ({}, {} bytes)",
                    artifact.name,
                    artifact.mime,
                    artifact.data.len()
                );
            }
        }
        Command::Settings => {
            config.agent.validate()?;
            print!("{}", config.agent.summary());
            let backend = shared::provider::build_chat_backend(&config.agent, |key| {
                std::env::var(key).ok()
            })?;
            println!("- Provider: {}", backend.provider);
            println!("- Endpoint: {}", backend.completions_url());
            println!("- API key: {}", backend.masked_key());
        }
        Command::Starters => {
            println!(
                "{}",
                serde_json::to_string_pretty(&shared::prompt::starters())?
            );
        }
        Command::Replay { events, message } => {
            let raw = std::fs::read_to_string(&events)
                .with_context(|| format!("Failed to read events at {}", events.display()))?;
            let parsed = agent::conversation::parse_events(&raw)?;

            let mut stdout = std::io::stdout();
            let output = agent::replay(
                &config.system_prompt_path,
                &message,
                parsed,
                agent::artifacts::ArtifactChannel::new(),
                |token| {
                    let _ = write!(stdout, "{}", token);
                    let _ = stdout.flush();
                },
            )
            .await;
            println!();
            for error in &output.errors {
                eprintln!("error: {}", error);
            }
            if !output.completed {
                eprintln!("warning: event stream ended without a done event");
            }
        }
    }
    Ok(())
}
