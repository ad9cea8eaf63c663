use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::artifacts::ArtifactChannel;
use super::extract;
use super::tool_registry::Tool;
use super::tools::run_python;
use crate::fetcher::backend::ContentFetchBackend;
use crate::fetcher::batch::{truncate_chars, BoundedBatchFetcher};
use crate::fetcher::error::FetchError;
use crate::fetcher::html;

const STRUCTURED_PREVIEW_CHARS: usize = 2000;
const ADVANCED_PREVIEW_CHARS: usize = 3000;
const DEFAULT_PYTHON_TIMEOUT_SECS: u64 = 60;

/// batch_scrape: fetch several pages at once with bounded concurrency
pub struct BatchScrapeTool {
    fetcher: BoundedBatchFetcher,
    default_concurrency: i64,
}

impl BatchScrapeTool {
    pub fn new(fetcher: BoundedBatchFetcher, default_concurrency: i64) -> Self {
        Self {
            fetcher,
            default_concurrency,
        }
    }
}

fn parse_urls(args: &Value) -> std::result::Result<Vec<String>, FetchError> {
    let list = args
        .get("urls")
        .ok_or_else(|| FetchError::MalformedTargets("urls is required".to_string()))?
        .as_array()
        .ok_or_else(|| FetchError::MalformedTargets("urls must be an array".to_string()))?;

    list.iter()
        .enumerate()
        .map(|(i, v)| {
            v.as_str().map(str::to_string).ok_or_else(|| {
                FetchError::MalformedTargets(format!("urls[{}] must be a string, got {}", i, v))
            })
        })
        .collect()
}

#[async_trait]
impl Tool for BatchScrapeTool {
    fn name(&self) -> &str {
        "batch_scrape"
    }

    fn description(&self) -> &str {
        "Scrape multiple URLs concurrently. Returns a JSON array with one entry per URL (url, success, title, content, error), in the order given. Content is truncated."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "urls": {"type": "array", "items": {"type": "string"}, "description": "List of URLs to scrape"},
                "max_concurrent": {"type": "integer", "minimum": 1, "description": "Maximum concurrent requests (default 3)"}
            },
            "required": ["urls"]
        })
    }

    async fn execute(&self, args: &Value) -> Result<String> {
        let urls = parse_urls(args)?;
        let limit = match args.get("max_concurrent") {
            None | Some(Value::Null) => self.default_concurrency,
            Some(v) => v.as_i64().ok_or_else(|| {
                FetchError::MalformedTargets(format!(
                    "max_concurrent must be an integer, got {}",
                    v
                ))
            })?,
        };
        tracing::info!(tool = "batch_scrape", urls = urls.len(), limit, "tool start");

        let results = self.fetcher.fetch_all(&urls, limit).await?;
        Ok(serde_json::to_string_pretty(&results)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionStrategy {
    #[default]
    Text,
    Markdown,
    Structured,
}

/// Optional narrowing applied to a fetched page before rendering.
#[derive(Debug, Default)]
struct ContentFilter {
    css_selector: Option<String>,
    word_count_threshold: Option<usize>,
}

impl ContentFilter {
    fn from_args(args: &Value) -> Result<Self> {
        let css_selector = match args.get("css_selector") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.trim().is_empty() => None,
            Some(Value::String(s)) => Some(s.trim().to_string()),
            Some(v) => return Err(anyhow!("css_selector must be a string, got {}", v)),
        };
        let word_count_threshold = match args.get("word_count_threshold") {
            None | Some(Value::Null) => None,
            Some(v) => Some(v.as_u64().ok_or_else(|| {
                anyhow!("word_count_threshold must be a non-negative integer, got {}", v)
            })? as usize),
        };
        Ok(Self {
            css_selector,
            word_count_threshold,
        })
    }

    fn is_active(&self) -> bool {
        self.css_selector.is_some() || self.word_count_threshold.is_some()
    }
}

fn filter_args() -> Value {
    json!({
        "css_selector": {"type": "string", "description": "Only keep content inside elements matching this CSS selector"},
        "word_count_threshold": {"type": "integer", "minimum": 0, "description": "Drop text blocks with fewer words than this"}
    })
}

struct Scraped {
    title: Option<String>,
    text: String,
    /// Markup after the CSS selector was applied.
    markup: Option<String>,
    /// Markup of the whole page.
    page_markup: Option<String>,
}

/// Fetch and filter one page. `Err` carries the message handed back to the model.
async fn scrape(
    backend: &dyn ContentFetchBackend,
    url: &str,
    filter: &ContentFilter,
) -> std::result::Result<Scraped, String> {
    let page = match backend.fetch(url).await {
        Ok(page) => page,
        Err(e) => return Err(format!("Error scraping {}: {:#}", url, e)),
    };
    if !page.success {
        return Err(format!(
            "Failed to scrape {}: {}",
            url,
            page.error_message.unwrap_or_else(|| "unknown error".to_string())
        ));
    }

    let markup = match (&filter.css_selector, &page.raw_markup) {
        (Some(css), Some(raw)) => match extract::select_markup(raw, css) {
            Ok(Some(selected)) => Some(selected),
            Ok(None) => {
                return Err(format!(
                    "Failed to scrape {}: no elements match selector '{}'",
                    url, css
                ))
            }
            Err(e) => return Err(format!("Error scraping {}: {:#}", url, e)),
        },
        (_, raw) => raw.clone(),
    };
    let text = match (&markup, filter.is_active()) {
        (Some(m), true) => {
            extract::content_blocks(m, filter.word_count_threshold.unwrap_or(0)).join("\n\n")
        }
        _ => page.cleaned_content.unwrap_or_default(),
    };

    Ok(Scraped {
        title: page.title,
        text,
        markup,
        page_markup: page.raw_markup,
    })
}

fn required_url(args: &Value) -> Result<&str> {
    args.get("url")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow!("url is required"))
}

/// page_scrape: one page as text, markdown or a titled preview
pub struct PageScrapeTool {
    backend: Arc<dyn ContentFetchBackend>,
}

impl PageScrapeTool {
    pub fn new(backend: Arc<dyn ContentFetchBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for PageScrapeTool {
    fn name(&self) -> &str {
        "page_scrape"
    }

    fn description(&self) -> &str {
        "Scrape a single web page. extraction_strategy 'text' returns the readable text, 'markdown' a markdown rendering, 'structured' the title plus a content preview. css_selector and word_count_threshold narrow the content."
    }

    fn parameters(&self) -> Value {
        let mut properties = json!({
            "url": {"type": "string", "description": "The URL to scrape"},
            "extraction_strategy": {"type": "string", "enum": ["text", "markdown", "structured"], "description": "Output format (default text)"}
        });
        if let (Some(props), Value::Object(extra)) = (properties.as_object_mut(), filter_args()) {
            props.extend(extra);
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": ["url"]
        })
    }

    async fn execute(&self, args: &Value) -> Result<String> {
        let url = required_url(args)?;
        let strategy: ExtractionStrategy = match args.get("extraction_strategy") {
            None | Some(Value::Null) => ExtractionStrategy::default(),
            Some(v) => serde_json::from_value(v.clone())
                .map_err(|_| anyhow!("unknown extraction_strategy {}", v))?,
        };
        let filter = ContentFilter::from_args(args)?;
        tracing::info!(tool = "page_scrape", %url, ?strategy, ?filter, "tool start");

        let scraped = match scrape(self.backend.as_ref(), url, &filter).await {
            Ok(scraped) => scraped,
            Err(message) => return Ok(message),
        };

        Ok(match strategy {
            ExtractionStrategy::Text => scraped.text,
            ExtractionStrategy::Markdown => match scraped.markup {
                Some(markup) => html::to_markdown(&markup),
                None => scraped.text,
            },
            ExtractionStrategy::Structured => format!(
                "Title: {}\n\nContent: {}...",
                scraped.title.unwrap_or_default(),
                truncate_chars(scraped.text, STRUCTURED_PREVIEW_CHARS)
            ),
        })
    }
}

/// advanced_scrape: one page as JSON with content, markdown, links and images
pub struct AdvancedScrapeTool {
    backend: Arc<dyn ContentFetchBackend>,
}

impl AdvancedScrapeTool {
    pub fn new(backend: Arc<dyn ContentFetchBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for AdvancedScrapeTool {
    fn name(&self) -> &str {
        "advanced_scrape"
    }

    fn description(&self) -> &str {
        "Scrape a web page and return JSON with url, title, content, markdown (both truncated), the page's internal and external links, and its images."
    }

    fn parameters(&self) -> Value {
        let mut properties = json!({
            "url": {"type": "string", "description": "The URL to scrape"}
        });
        if let (Some(props), Value::Object(extra)) = (properties.as_object_mut(), filter_args()) {
            props.extend(extra);
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": ["url"]
        })
    }

    async fn execute(&self, args: &Value) -> Result<String> {
        let url = required_url(args)?;
        let filter = ContentFilter::from_args(args)?;
        tracing::info!(tool = "advanced_scrape", %url, ?filter, "tool start");

        let scraped = match scrape(self.backend.as_ref(), url, &filter).await {
            Ok(scraped) => scraped,
            Err(message) => return Ok(message),
        };

        let base = Url::parse(url).ok();
        let (links, media) = match &scraped.page_markup {
            Some(page) => (
                extract::extract_links(page, base.as_ref()),
                extract::extract_media(page, base.as_ref()),
            ),
            None => Default::default(),
        };
        let markdown = scraped
            .markup
            .as_deref()
            .map(|m| truncate_chars(html::to_markdown(m), ADVANCED_PREVIEW_CHARS));

        Ok(serde_json::to_string_pretty(&json!({
            "url": url,
            "title": scraped.title,
            "content": truncate_chars(scraped.text, ADVANCED_PREVIEW_CHARS),
            "markdown": markdown,
            "links": links,
            "media": media,
        }))?)
    }
}

/// python_sandbox: run a Python snippet; saved figures go to the turn's artifacts
pub struct PythonSandboxTool {
    python: String,
    artifacts: ArtifactChannel,
}

impl PythonSandboxTool {
    pub fn new(python: impl Into<String>, artifacts: ArtifactChannel) -> Self {
        Self {
            python: python.into(),
            artifacts,
        }
    }
}

#[async_trait]
impl Tool for PythonSandboxTool {
    fn name(&self) -> &str {
        "python_sandbox"
    }

    fn description(&self) -> &str {
        "Execute Python code for calculations and data analysis. Save charts as image files inside the directory named by the ESI_FIGURE_DIR environment variable to show them to the user."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "code": {"type": "string", "description": "Python source to execute"},
                "timeout_secs": {"type": "integer", "description": "Execution timeout in seconds (default 60)"}
            },
            "required": ["code"]
        })
    }

    async fn execute(&self, args: &Value) -> Result<String> {
        let code = args
            .get("code")
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| anyhow!("code is required"))?;
        let timeout_secs = args
            .get("timeout_secs")
            .and_then(|v| v.as_u64())
            .filter(|s| *s > 0)
            .unwrap_or(DEFAULT_PYTHON_TIMEOUT_SECS);

        let run = match run_python(&self.python, code, Duration::from_secs(timeout_secs)).await {
            Ok(run) => run,
            Err(e) => {
                return Ok(
                    json!({"status": "error", "tool": "python_sandbox", "error": format!("{:#}", e)})
                        .to_string(),
                )
            }
        };

        let figure_names: Vec<String> = run.figures.iter().map(|f| f.name.clone()).collect();
        for figure in run.figures {
            self.artifacts.push(figure).await;
        }

        let status = if run.timed_out || run.exit_code != Some(0) {
            "error"
        } else {
            "ok"
        };
        Ok(json!({
            "status": status,
            "tool": "python_sandbox",
            "exit_code": run.exit_code,
            "timed_out": run.timed_out,
            "stdout": run.stdout,
            "stderr": run.stderr,
            "figures": figure_names,
        })
        .to_string())
    }
}
