// Agent tool surface: scraping and sandbox tools, registry, turn handling
pub mod artifacts;
pub mod builtin_tools;
pub mod conversation;
pub mod extract;
pub mod search;
pub mod tool_registry;
pub mod tools;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::shared::config::EsiConfig;
use crate::shared::prompt::load_system_prompt;
use artifacts::ArtifactChannel;
use builtin_tools::{AdvancedScrapeTool, BatchScrapeTool, PageScrapeTool, PythonSandboxTool};
use conversation::{AgentEvent, Conversation, TurnOutput};
use search::{PaperSearchTool, WikipediaSearchTool};
use tool_registry::ToolRegistry;

pub const PYTHON_ENV: &str = "ESI_PYTHON";

/// Older tool names still emitted by saved prompts and transcripts.
pub const TOOL_ALIASES: &[(&str, &str)] = &[
    ("batch_crawl4ai", "batch_scrape"),
    ("crawl4ai_scraper", "page_scrape"),
    ("advanced_crawl4ai", "advanced_scrape"),
    ("semanticscholar", "paper_search"),
    ("wikipedia", "wikipedia_search"),
];

fn python_interpreter() -> String {
    std::env::var(PYTHON_ENV)
        .ok()
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| "python3".to_string())
}

pub async fn build_registry(
    config: &EsiConfig,
    artifacts: ArtifactChannel,
) -> Result<ToolRegistry> {
    let fetcher = crate::fetcher::http_fetcher(&config.fetch)?;
    let search_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.fetch.timeout_secs.clamp(1, 300)))
        .user_agent(config.fetch.user_agent.as_str())
        .build()
        .context("Failed to create search HTTP client")?;
    let registry = ToolRegistry::new();

    registry
        .register_tool(Arc::new(PageScrapeTool::new(fetcher.backend())))
        .await;
    registry
        .register_tool(Arc::new(AdvancedScrapeTool::new(fetcher.backend())))
        .await;
    registry
        .register_tool(Arc::new(BatchScrapeTool::new(
            fetcher,
            config.fetch.max_concurrent,
        )))
        .await;
    registry
        .register_tool(Arc::new(PythonSandboxTool::new(
            python_interpreter(),
            artifacts,
        )))
        .await;
    registry
        .register_tool(Arc::new(WikipediaSearchTool::new(
            search_client.clone(),
            &config.search,
        )))
        .await;
    registry
        .register_tool(Arc::new(PaperSearchTool::new(search_client, &config.search)))
        .await;

    for (alias, target) in TOOL_ALIASES {
        registry.register_alias(alias, target).await;
    }
    Ok(registry)
}

/// Run one tool by name with a JSON argument string.
pub async fn call_tool(registry: &ToolRegistry, name: &str, raw_args: &str) -> Result<String> {
    let args: serde_json::Value = serde_json::from_str(raw_args)
        .with_context(|| format!("Tool arguments for '{}' are not valid JSON", name))?;
    registry.execute_tool(name, &args).await
}

/// Feed recorded events through a fresh conversation. Streamed tokens are
/// passed to `on_token` as they are produced.
pub async fn replay<F>(
    system_prompt_path: &Path,
    user_message: &str,
    events: Vec<AgentEvent>,
    artifacts: ArtifactChannel,
    mut on_token: F,
) -> TurnOutput
where
    F: FnMut(&str),
{
    let mut conversation = Conversation::new(load_system_prompt(system_prompt_path), artifacts);
    conversation.begin_turn(user_message);
    info!(events = events.len(), "replaying turn");
    for event in events {
        if let Some(token) = conversation.apply(event) {
            on_token(&token);
        }
    }
    conversation.finish_turn().await
}
