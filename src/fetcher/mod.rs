// Batch web fetching: bounded fan-out over a content backend
pub mod backend;
pub mod batch;
pub mod error;
pub mod html;
pub mod http;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use crate::shared::config::FetchSettings;
use batch::BoundedBatchFetcher;

/// Build a fetcher over the HTTP backend from the fetch section of the config.
/// A `timeout_secs` of 0 disables the per-target timeout.
pub fn http_fetcher(settings: &FetchSettings) -> Result<BoundedBatchFetcher> {
    let timeout = (settings.timeout_secs > 0).then(|| Duration::from_secs(settings.timeout_secs));
    // The client timeout is a backstop; the per-target timeout reports first.
    let client_timeout = timeout
        .map(|t| t.saturating_add(Duration::from_secs(5)))
        .unwrap_or(Duration::from_secs(300));
    let backend = http::HttpFetchBackend::new(client_timeout, &settings.user_agent)?;
    Ok(BoundedBatchFetcher::new(Arc::new(backend))
        .with_content_limit(settings.content_limit)
        .with_timeout(timeout))
}

/// Fetch `urls` and render the batch as pretty JSON.
pub async fn run(settings: &FetchSettings, urls: &[String], max_concurrent: i64) -> Result<String> {
    tracing::info!("Starting batch fetch of {} URL(s)", urls.len());
    let fetcher = http_fetcher(settings)?;
    let results = fetcher.fetch_all(urls, max_concurrent).await?;
    Ok(serde_json::to_string_pretty(&results)?)
}
