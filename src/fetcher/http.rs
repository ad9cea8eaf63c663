use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::backend::{ContentFetchBackend, PageFetch};
use super::html;

/// Bytes read from one response body before the rest is dropped.
pub const MAX_BODY_BYTES: usize = 5 * 1024 * 1024;

/// Plain HTTP(S) content backend built on reqwest.
#[derive(Clone)]
pub struct HttpFetchBackend {
    client: Client,
    body_limit: usize,
}

impl HttpFetchBackend {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            body_limit: MAX_BODY_BYTES,
        }
    }

    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }
}

/// Read at most `limit` bytes of the body, decoding lossily as UTF-8.
async fn read_body(mut resp: Response, limit: usize) -> Result<(String, bool)> {
    let mut buf: Vec<u8> = Vec::new();
    let mut truncated = false;
    while let Some(chunk) = resp.chunk().await.context("failed to read response body")? {
        let room = limit - buf.len();
        if chunk.len() > room {
            buf.extend_from_slice(&chunk[..room]);
            truncated = true;
            break;
        }
        buf.extend_from_slice(&chunk);
    }

    let mut body = String::from_utf8_lossy(&buf).into_owned();
    if truncated && body.ends_with(char::REPLACEMENT_CHARACTER) {
        // cut inside a multi-byte character
        body.pop();
    }
    Ok((body, truncated))
}

#[async_trait]
impl ContentFetchBackend for HttpFetchBackend {
    async fn fetch(&self, url: &str) -> Result<PageFetch> {
        let parsed = Url::parse(url.trim()).with_context(|| format!("invalid URL '{}'", url))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            bail!(
                "unsupported URL scheme '{}': only http and https are allowed",
                parsed.scheme()
            );
        }

        let resp = self
            .client
            .get(parsed)
            .send()
            .await
            .context("request failed")?;

        let status = resp.status();
        if !status.is_success() {
            return Ok(PageFetch::failed(format!(
                "HTTP {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|h| h.to_str().ok())
            .unwrap_or("")
            .to_string();
        let (body, truncated) = read_body(resp, self.body_limit).await?;
        debug!(%url, %content_type, bytes = body.len(), truncated, "fetched page");

        if html::is_html(&content_type, &body) {
            let title = html::extract_title(&body);
            let cleaned = html::clean_text(&body);
            Ok(PageFetch::ok(title, cleaned, Some(body)))
        } else {
            let cleaned = body.chars().take(html::MAX_CLEAN_CHARS).collect();
            Ok(PageFetch::ok(None, cleaned, None))
        }
    }
}
