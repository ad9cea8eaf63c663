//! Reference lookups for the agent: Wikipedia page summaries and
//! Semantic Scholar paper search.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::tool_registry::Tool;
use crate::fetcher::batch::truncate_chars;
use crate::shared::config::SearchSettings;

const NO_WIKIPEDIA_RESULT: &str = "No good Wikipedia Search Result was found";
const NO_PAPER_RESULT: &str = "No results found.";

fn required_query(args: &Value) -> Result<&str> {
    args.get("query")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow!("query is required"))
}

fn query_parameters() -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": {"type": "string", "description": "Search query"}
        },
        "required": ["query"]
    })
}

async fn get_json<T: DeserializeOwned>(
    client: &Client,
    url: &str,
    query: &[(&str, String)],
) -> Result<T> {
    let resp = client
        .get(url)
        .query(query)
        .send()
        .await
        .with_context(|| format!("request to {} failed", url))?;
    let status = resp.status();
    if !status.is_success() {
        bail!(
            "{} returned HTTP {} {}",
            url,
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown")
        );
    }
    resp.json()
        .await
        .with_context(|| format!("invalid JSON from {}", url))
}

#[derive(Debug, Deserialize)]
struct WikiResponse {
    query: Option<WikiQuery>,
}

#[derive(Debug, Deserialize)]
struct WikiQuery {
    #[serde(default)]
    pages: Vec<WikiPage>,
}

#[derive(Debug, Deserialize)]
struct WikiPage {
    title: String,
    #[serde(default)]
    index: u32,
    #[serde(default)]
    extract: String,
}

/// wikipedia_search: intro summaries of the best matching articles
pub struct WikipediaSearchTool {
    client: Client,
    base_url: String,
    top_k: usize,
    max_chars: usize,
}

impl WikipediaSearchTool {
    pub fn new(client: Client, settings: &SearchSettings) -> Self {
        Self {
            client,
            base_url: settings.wikipedia_base_url.clone(),
            top_k: settings.wikipedia_top_k.max(1),
            max_chars: settings.max_chars,
        }
    }
}

#[async_trait]
impl Tool for WikipediaSearchTool {
    fn name(&self) -> &str {
        "wikipedia_search"
    }

    fn description(&self) -> &str {
        "Look up general knowledge, definitions and background on Wikipedia. Returns the page title and intro summary of the best matching articles."
    }

    fn parameters(&self) -> Value {
        query_parameters()
    }

    async fn execute(&self, args: &Value) -> Result<String> {
        let query = required_query(args)?;
        tracing::info!(tool = "wikipedia_search", %query, "tool start");

        let url = format!("{}/w/api.php", self.base_url);
        let params = [
            ("action", "query".to_string()),
            ("format", "json".to_string()),
            ("formatversion", "2".to_string()),
            ("generator", "search".to_string()),
            ("gsrsearch", query.to_string()),
            ("gsrlimit", self.top_k.to_string()),
            ("prop", "extracts".to_string()),
            ("exintro", "1".to_string()),
            ("explaintext", "1".to_string()),
        ];
        let response: WikiResponse = get_json(&self.client, &url, &params).await?;

        let mut pages: Vec<WikiPage> = response
            .query
            .map(|q| q.pages)
            .unwrap_or_default()
            .into_iter()
            .filter(|p| !p.extract.trim().is_empty())
            .collect();
        pages.sort_by_key(|p| p.index);

        if pages.is_empty() {
            return Ok(NO_WIKIPEDIA_RESULT.to_string());
        }
        let summaries: Vec<String> = pages
            .iter()
            .take(self.top_k)
            .map(|p| format!("Page: {}\nSummary: {}", p.title, p.extract.trim()))
            .collect();
        Ok(truncate_chars(summaries.join("\n\n"), self.max_chars))
    }
}

#[derive(Debug, Deserialize)]
struct PaperResponse {
    #[serde(default)]
    data: Vec<Paper>,
}

#[derive(Debug, Deserialize)]
struct Paper {
    title: Option<String>,
    #[serde(rename = "abstract")]
    summary: Option<String>,
    year: Option<i32>,
    #[serde(default)]
    authors: Vec<Author>,
}

#[derive(Debug, Deserialize)]
struct Author {
    name: Option<String>,
}

impl Paper {
    fn render(&self) -> String {
        let authors: Vec<&str> = self.authors.iter().filter_map(|a| a.name.as_deref()).collect();
        format!(
            "Published year: {}\nTitle: {}\nAuthors: {}\nAbstract: {}\n",
            self.year.map_or_else(|| "N/A".to_string(), |y| y.to_string()),
            self.title.as_deref().unwrap_or("N/A"),
            authors.join(", "),
            self.summary.as_deref().unwrap_or("N/A"),
        )
    }
}

/// paper_search: academic papers from Semantic Scholar
pub struct PaperSearchTool {
    client: Client,
    base_url: String,
    top_k: usize,
}

impl PaperSearchTool {
    pub fn new(client: Client, settings: &SearchSettings) -> Self {
        Self {
            client,
            base_url: settings.semantic_scholar_base_url.clone(),
            top_k: settings.paper_top_k.max(1),
        }
    }
}

#[async_trait]
impl Tool for PaperSearchTool {
    fn name(&self) -> &str {
        "paper_search"
    }

    fn description(&self) -> &str {
        "Search Semantic Scholar for academic papers. Returns year, title, authors and abstract for each match."
    }

    fn parameters(&self) -> Value {
        query_parameters()
    }

    async fn execute(&self, args: &Value) -> Result<String> {
        let query = required_query(args)?;
        tracing::info!(tool = "paper_search", %query, "tool start");

        let url = format!("{}/graph/v1/paper/search", self.base_url);
        let params = [
            ("query", query.to_string()),
            ("limit", self.top_k.to_string()),
            ("fields", "title,abstract,authors,year,url".to_string()),
        ];
        let response: PaperResponse = get_json(&self.client, &url, &params).await?;

        if response.data.is_empty() {
            return Ok(NO_PAPER_RESULT.to_string());
        }
        let rendered: Vec<String> = response
            .data
            .iter()
            .take(self.top_k)
            .map(Paper::render)
            .collect();
        Ok(rendered.join("\n\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::{Json, Router};
    use std::collections::HashMap;

    async fn wiki_api(Query(params): Query<HashMap<String, String>>) -> impl IntoResponse {
        assert_eq!(params.get("generator").map(String::as_str), Some("search"));
        assert_eq!(params.get("explaintext").map(String::as_str), Some("1"));
        match params.get("gsrsearch").map(String::as_str) {
            Some("zzzz") => Json(json!({"batchcomplete": true})).into_response(),
            Some("broken") => (StatusCode::SERVICE_UNAVAILABLE, "maintenance").into_response(),
            _ => Json(json!({
                "batchcomplete": true,
                "query": {"pages": [
                    {"pageid": 2, "title": "Cluster sampling", "index": 2,
                     "extract": "Cluster sampling samples whole groups."},
                    {"pageid": 1, "title": "Stratified sampling", "index": 1,
                     "extract": "Stratified sampling divides a population into strata.\n"},
                    {"pageid": 3, "title": "Sampling (disambiguation)", "index": 3, "extract": ""}
                ]}
            }))
            .into_response(),
        }
    }

    async fn paper_api(Query(params): Query<HashMap<String, String>>) -> impl IntoResponse {
        assert_eq!(
            params.get("fields").map(String::as_str),
            Some("title,abstract,authors,year,url")
        );
        match params.get("query").map(String::as_str) {
            Some("nothing here") => {
                Json(json!({"total": 0, "offset": 0, "data": []})).into_response()
            }
            Some("throttled") => (StatusCode::TOO_MANY_REQUESTS, "slow down").into_response(),
            _ => {
                let limit: usize = params
                    .get("limit")
                    .and_then(|l| l.parse().ok())
                    .unwrap_or(10);
                let papers = json!([
                    {"paperId": "a1", "title": "Statistical Power Analysis", "year": 1988,
                     "abstract": "Effect sizes and power.",
                     "authors": [{"authorId": "1", "name": "J. Cohen"}]},
                    {"paperId": "b2", "title": "G*Power 3", "year": 2007, "abstract": null,
                     "authors": [{"authorId": "2", "name": "F. Faul"},
                                 {"authorId": "3", "name": "E. Erdfelder"}]},
                    {"paperId": "c3", "title": "Unused", "year": null, "authors": []}
                ]);
                let data: Vec<Value> =
                    papers.as_array().unwrap().iter().take(limit).cloned().collect();
                Json(json!({"total": 3, "offset": 0, "data": data})).into_response()
            }
        }
    }

    async fn spawn_search_server() -> String {
        let app = Router::new()
            .route("/w/api.php", get(wiki_api))
            .route("/graph/v1/paper/search", get(paper_api));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn settings(base: &str) -> SearchSettings {
        SearchSettings {
            wikipedia_base_url: base.to_string(),
            semantic_scholar_base_url: base.to_string(),
            wikipedia_top_k: 3,
            paper_top_k: 2,
            max_chars: 4000,
        }
    }

    fn client() -> Client {
        Client::builder().no_proxy().build().unwrap()
    }

    #[tokio::test]
    async fn wikipedia_summaries_follow_search_rank() {
        let base = spawn_search_server().await;
        let tool = WikipediaSearchTool::new(client(), &settings(&base));

        let out = tool.execute(&json!({"query": "sampling"})).await.unwrap();
        assert_eq!(
            out,
            "Page: Stratified sampling\nSummary: Stratified sampling divides a population into strata.\n\n\
             Page: Cluster sampling\nSummary: Cluster sampling samples whole groups."
        );
    }

    #[tokio::test]
    async fn wikipedia_output_is_capped_and_empty_results_are_reported() {
        let base = spawn_search_server().await;
        let mut capped = settings(&base);
        capped.max_chars = 25;
        let tool = WikipediaSearchTool::new(client(), &capped);

        let out = tool.execute(&json!({"query": "sampling"})).await.unwrap();
        assert_eq!(out, "Page: Stratified sampling");

        assert_eq!(
            tool.execute(&json!({"query": "zzzz"})).await.unwrap(),
            NO_WIKIPEDIA_RESULT
        );
        let err = tool.execute(&json!({"query": "broken"})).await.unwrap_err();
        assert!(err.to_string().contains("HTTP 503"));
        assert!(tool.execute(&json!({"query": "  "})).await.is_err());
    }

    #[tokio::test]
    async fn paper_search_renders_top_k_papers() {
        let base = spawn_search_server().await;
        let tool = PaperSearchTool::new(client(), &settings(&base));

        let out = tool.execute(&json!({"query": "power analysis"})).await.unwrap();
        assert_eq!(
            out,
            "Published year: 1988\nTitle: Statistical Power Analysis\nAuthors: J. Cohen\n\
             Abstract: Effect sizes and power.\n\n\n\
             Published year: 2007\nTitle: G*Power 3\nAuthors: F. Faul, E. Erdfelder\n\
             Abstract: N/A\n"
        );
    }

    #[tokio::test]
    async fn paper_search_reports_empty_and_failed_lookups() {
        let base = spawn_search_server().await;
        let tool = PaperSearchTool::new(client(), &settings(&base));

        assert_eq!(
            tool.execute(&json!({"query": "nothing here"})).await.unwrap(),
            NO_PAPER_RESULT
        );
        let err = tool.execute(&json!({"query": "throttled"})).await.unwrap_err();
        assert!(err.to_string().contains("HTTP 429 Too Many Requests"));
        assert!(tool.execute(&json!({})).await.is_err());
    }
}
