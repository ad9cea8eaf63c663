use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use super::settings::AgentSettings;

const CONFIG_RELATIVE_DIR: &str = ".config/esi";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EsiConfig {
    #[serde(default)]
    pub fetch: FetchSettings,
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default = "default_system_prompt_path")]
    pub system_prompt_path: PathBuf,
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchSettings {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: i64,
    #[serde(default = "default_content_limit")]
    pub content_limit: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            content_limit: default_content_limit(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

/// Endpoints and result sizes for the Wikipedia and paper search tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    #[serde(default = "default_wikipedia_base_url")]
    pub wikipedia_base_url: String,
    #[serde(default = "default_semantic_scholar_base_url")]
    pub semantic_scholar_base_url: String,
    #[serde(default = "default_wikipedia_top_k")]
    pub wikipedia_top_k: usize,
    #[serde(default = "default_paper_top_k")]
    pub paper_top_k: usize,
    #[serde(default = "default_search_max_chars")]
    pub max_chars: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            wikipedia_base_url: default_wikipedia_base_url(),
            semantic_scholar_base_url: default_semantic_scholar_base_url(),
            wikipedia_top_k: default_wikipedia_top_k(),
            paper_top_k: default_paper_top_k(),
            max_chars: default_search_max_chars(),
        }
    }
}

impl Default for EsiConfig {
    fn default() -> Self {
        Self {
            fetch: FetchSettings::default(),
            search: SearchSettings::default(),
            agent: AgentSettings::default(),
            system_prompt_path: default_system_prompt_path(),
            database_path: default_database_path(),
            log_dir: default_log_dir(),
        }
    }
}

impl EsiConfig {
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;
        let mut config: EsiConfig = serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse config JSON at {}", path.display()))?;

        config.fetch.user_agent = config.fetch.user_agent.trim().to_string();
        if config.fetch.user_agent.is_empty() {
            config.fetch.user_agent = default_user_agent();
        }
        if config.log_dir.trim().is_empty() {
            config.log_dir = default_log_dir();
        }
        config.search.wikipedia_base_url =
            normalize_base_url(&config.search.wikipedia_base_url, default_wikipedia_base_url);
        config.search.semantic_scholar_base_url = normalize_base_url(
            &config.search.semantic_scholar_base_url,
            default_semantic_scholar_base_url,
        );

        Ok(config)
    }

    /// Load from `explicit`, `ESI_CONFIG_PATH` or the per-user config file,
    /// then apply environment overrides. A missing file yields defaults.
    pub fn load(explicit: Option<PathBuf>) -> Result<(Self, PathBuf)> {
        let path = explicit.unwrap_or_else(resolve_config_path);
        let mut config = if path.exists() {
            Self::load_from_path(&path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok((config, path))
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("ESI_MAX_CONCURRENT") {
            self.fetch.max_concurrent = v
                .trim()
                .parse()
                .map_err(|e| anyhow!("ESI_MAX_CONCURRENT must be an integer: {}", e))?;
        }
        if let Some(v) = lookup("ESI_CONTENT_LIMIT") {
            self.fetch.content_limit = v
                .trim()
                .parse()
                .map_err(|e| anyhow!("ESI_CONTENT_LIMIT must be a non-negative integer: {}", e))?;
        }
        if let Some(v) = lookup("ESI_FETCH_TIMEOUT_SECS") {
            self.fetch.timeout_secs = v
                .trim()
                .parse()
                .map_err(|e| {
                    anyhow!("ESI_FETCH_TIMEOUT_SECS must be a non-negative integer: {}", e)
                })?;
        }
        if let Some(v) = lookup("ESI_LOG_DIR").filter(|v| !v.trim().is_empty()) {
            self.log_dir = v.trim().to_string();
        }
        if let Some(v) = lookup("ESI_DATABASE_PATH").filter(|v| !v.trim().is_empty()) {
            self.database_path = expand_path(v.trim().to_string());
        }
        Ok(())
    }
}

fn default_max_concurrent() -> i64 {
    3
}

fn default_content_limit() -> usize {
    1000
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}

fn normalize_base_url(raw: &str, fallback: fn() -> String) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        fallback()
    } else {
        trimmed.to_string()
    }
}

fn default_wikipedia_base_url() -> String {
    "https://en.wikipedia.org".to_string()
}

fn default_semantic_scholar_base_url() -> String {
    "https://api.semanticscholar.org".to_string()
}

fn default_wikipedia_top_k() -> usize {
    3
}

fn default_paper_top_k() -> usize {
    10
}

fn default_search_max_chars() -> usize {
    4000
}

fn default_system_prompt_path() -> PathBuf {
    PathBuf::from("esi_agent_instruction.md")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("chainlit_app.db")
}

fn default_log_dir() -> String {
    "logs".to_string()
}

pub fn resolve_config_path() -> PathBuf {
    if let Ok(path) = std::env::var("ESI_CONFIG_PATH") {
        return expand_path(path);
    }

    default_config_path()
}

fn expand_path(input: String) -> PathBuf {
    if let Some(stripped) = input.strip_prefix("~/") {
        if let Some(home) = home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(input)
}

fn default_config_path() -> PathBuf {
    home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_RELATIVE_DIR)
        .join(CONFIG_FILE)
}

fn home_dir() -> Option<PathBuf> {
    if cfg!(windows) {
        std::env::var_os("USERPROFILE").map(PathBuf::from)
    } else {
        std::env::var_os("HOME").map(PathBuf::from)
    }
}
