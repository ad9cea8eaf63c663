use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Core trait that all agent tools implement
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the arguments object
    fn parameters(&self) -> serde_json::Value;

    /// Execute the tool; the returned string is handed back to the model verbatim
    async fn execute(&self, args: &serde_json::Value) -> Result<String>;
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolDef {
    #[serde(rename = "type")]
    pub typ: String,
    pub function: ToolFunction,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolFunction {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Tools available to the agent, addressable by name or alias.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Arc<RwLock<HashMap<String, Arc<dyn Tool>>>>,
    aliases: Arc<RwLock<HashMap<String, String>>>, // alias -> canonical_name
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_tool(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        info!("Registering tool: {}", name);
        self.tools.write().await.insert(name, tool);
    }

    pub async fn register_alias(&self, alias: &str, target: &str) {
        info!("Registering alias '{}' -> '{}'", alias, target);
        self.aliases
            .write()
            .await
            .insert(alias.to_string(), target.to_string());
    }

    /// Canonical tool name for `name`, checking aliases first
    pub async fn resolve(&self, name: &str) -> Option<String> {
        if let Some(canonical) = self.aliases.read().await.get(name) {
            return Some(canonical.clone());
        }
        if self.tools.read().await.contains_key(name) {
            return Some(name.to_string());
        }
        None
    }

    pub async fn execute_tool(&self, name: &str, args: &serde_json::Value) -> Result<String> {
        let canonical = self
            .resolve(name)
            .await
            .ok_or_else(|| anyhow::anyhow!("Tool '{}' not found", name))?;

        // Clone the handle so the lock is not held across the tool call
        let tool = self
            .tools
            .read()
            .await
            .get(&canonical)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Tool '{}' not found", canonical))?;

        info!(tool = %canonical, requested = %name, "executing tool");
        tool.execute(args).await
    }

    /// OpenAI-style function definitions, aliases included
    pub async fn tool_definitions(&self) -> Vec<ToolDef> {
        let tools = self.tools.read().await;
        let aliases = self.aliases.read().await;

        let mut defs: Vec<ToolDef> = tools
            .iter()
            .map(|(name, tool)| {
                function_def(name, tool.description().to_string(), tool.parameters())
            })
            .collect();

        for (alias, canonical) in aliases.iter() {
            if let Some(tool) = tools.get(canonical) {
                defs.push(function_def(
                    alias,
                    format!("{} (alias for {})", tool.description(), canonical),
                    tool.parameters(),
                ));
            }
        }

        defs.sort_by(|a, b| a.function.name.cmp(&b.function.name));
        defs
    }

    pub async fn list_tools(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.read().await.keys().cloned().collect();
        names.extend(self.aliases.read().await.keys().cloned());
        names.sort();
        names
    }
}

fn function_def(name: &str, description: String, parameters: serde_json::Value) -> ToolDef {
    ToolDef {
        typ: "function".to_string(),
        function: ToolFunction {
            name: name.to_string(),
            description,
            parameters,
        },
    }
}
