use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::backend::{ContentFetchBackend, PageFetch};
use super::error::{FetchError, Result};

pub const DEFAULT_CONCURRENCY: i64 = 3;
pub const DEFAULT_CONTENT_LIMIT: usize = 1000;

/// Outcome for one target of a batch. Serializes with the field names and
/// order the agent tool surface expects: url, success, title, content, error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchResult {
    #[serde(rename = "url")]
    pub target: String,
    #[serde(rename = "success")]
    pub succeeded: bool,
    pub title: Option<String>,
    pub content: Option<String>,
    #[serde(rename = "error")]
    pub error_detail: Option<String>,
}

impl FetchResult {
    pub fn success(target: String, title: String, content: String) -> Self {
        Self {
            target,
            succeeded: true,
            title: Some(title),
            content: Some(content),
            error_detail: None,
        }
    }

    pub fn failure(target: String, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let detail = if detail.trim().is_empty() {
            "fetch failed without an error message".to_string()
        } else {
            detail
        };
        Self {
            target,
            succeeded: false,
            title: None,
            content: None,
            error_detail: Some(detail),
        }
    }
}

/// Fetches a list of URLs with at most `concurrency_limit` backend calls in
/// flight. Failures stay local to their target; results come back in input
/// order.
#[derive(Clone)]
pub struct BoundedBatchFetcher {
    backend: Arc<dyn ContentFetchBackend>,
    content_limit: usize,
    per_target_timeout: Option<Duration>,
}

impl BoundedBatchFetcher {
    pub fn new(backend: Arc<dyn ContentFetchBackend>) -> Self {
        Self {
            backend,
            content_limit: DEFAULT_CONTENT_LIMIT,
            per_target_timeout: None,
        }
    }

    pub fn with_content_limit(mut self, content_limit: usize) -> Self {
        self.content_limit = content_limit;
        self
    }

    pub fn with_timeout(mut self, per_target_timeout: Option<Duration>) -> Self {
        self.per_target_timeout = per_target_timeout;
        self
    }

    pub fn content_limit(&self) -> usize {
        self.content_limit
    }

    pub fn backend(&self) -> Arc<dyn ContentFetchBackend> {
        self.backend.clone()
    }

    pub async fn fetch_all(
        &self,
        targets: &[String],
        concurrency_limit: i64,
    ) -> Result<Vec<FetchResult>> {
        if concurrency_limit < 1 {
            return Err(FetchError::InvalidConcurrency(concurrency_limit));
        }
        if targets.is_empty() {
            debug!("batch fetch called with no targets");
            return Ok(Vec::new());
        }

        // A limit above the batch size behaves exactly like the batch size.
        let permits = usize::try_from(concurrency_limit)
            .map_err(|_| FetchError::InvalidConcurrency(concurrency_limit))?
            .min(targets.len());
        let semaphore = Arc::new(Semaphore::new(permits));

        let started = Instant::now();
        info!(
            targets = targets.len(),
            limit = concurrency_limit,
            "batch fetch start"
        );

        let handles: Vec<_> = targets
            .iter()
            .map(|target| {
                tokio::spawn(fetch_target(
                    self.backend.clone(),
                    target.clone(),
                    semaphore.clone(),
                    self.content_limit,
                    self.per_target_timeout,
                ))
            })
            .collect();

        // join_all yields outputs in input order regardless of completion order.
        let results: Vec<FetchResult> = join_all(handles)
            .await
            .into_iter()
            .zip(targets)
            .map(|(joined, target)| match joined {
                Ok(result) => result,
                Err(e) => {
                    warn!(%target, error = %e, "fetch task aborted");
                    FetchResult::failure(target.clone(), format!("fetch task aborted: {}", e))
                }
            })
            .collect();

        let succeeded = results.iter().filter(|r| r.succeeded).count();
        info!(
            targets = results.len(),
            succeeded,
            failed = results.len() - succeeded,
            took_ms = started.elapsed().as_millis() as u64,
            "batch fetch end"
        );
        Ok(results)
    }
}

async fn fetch_target(
    backend: Arc<dyn ContentFetchBackend>,
    target: String,
    semaphore: Arc<Semaphore>,
    content_limit: usize,
    per_target_timeout: Option<Duration>,
) -> FetchResult {
    if target.trim().is_empty() {
        return FetchResult::failure(target, "empty target URL");
    }

    let permit = match semaphore.acquire_owned().await {
        Ok(permit) => permit,
        Err(e) => return FetchResult::failure(target, format!("fetch slot unavailable: {}", e)),
    };

    debug!(%target, "fetch start");
    let outcome = match per_target_timeout {
        Some(limit) => match tokio::time::timeout(limit, backend.fetch(&target)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(anyhow::anyhow!(
                "timed out after {} ms",
                limit.as_millis()
            )),
        },
        None => backend.fetch(&target).await,
    };
    // Free the slot before any per-item work.
    drop(permit);

    let result = normalize(target, outcome, content_limit);
    if let Some(detail) = &result.error_detail {
        warn!(target = %result.target, error = %detail, "fetch failed");
    } else {
        debug!(target = %result.target, "fetch ok");
    }
    result
}

fn normalize(
    target: String,
    outcome: anyhow::Result<PageFetch>,
    content_limit: usize,
) -> FetchResult {
    match outcome {
        Ok(page) if page.success => {
            let content = truncate_chars(page.cleaned_content.unwrap_or_default(), content_limit);
            FetchResult::success(target, page.title.unwrap_or_default(), content)
        }
        Ok(page) => FetchResult::failure(target, page.error_message.unwrap_or_default()),
        Err(e) => FetchResult::failure(target, format!("{:#}", e)),
    }
}

/// Keep at most `limit` characters of `s`.
pub fn truncate_chars(mut s: String, limit: usize) -> String {
    if let Some((idx, _)) = s.char_indices().nth(limit) {
        s.truncate(idx);
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend scripted per URL, recording how many calls overlap.
    #[derive(Default)]
    struct ScriptedBackend {
        delays_ms: HashMap<String, u64>,
        failures: HashMap<String, String>,
        raises: Vec<String>,
        panics: Vec<String>,
        body: String,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ScriptedBackend {
        fn delay(mut self, url: &str, ms: u64) -> Self {
            self.delays_ms.insert(url.to_string(), ms);
            self
        }

        fn fail(mut self, url: &str, msg: &str) -> Self {
            self.failures.insert(url.to_string(), msg.to_string());
            self
        }

        fn raise(mut self, url: &str) -> Self {
            self.raises.push(url.to_string());
            self
        }

        fn panic_on(mut self, url: &str) -> Self {
            self.panics.push(url.to_string());
            self
        }

        fn body(mut self, body: &str) -> Self {
            self.body = body.to_string();
            self
        }
    }

    #[async_trait]
    impl ContentFetchBackend for ScriptedBackend {
        async fn fetch(&self, url: &str) -> anyhow::Result<PageFetch> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let delay = self.delays_ms.get(url).copied().unwrap_or(10);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.panics.iter().any(|u| u == url) {
                panic!("backend exploded on {}", url);
            }
            if self.raises.iter().any(|u| u == url) {
                anyhow::bail!("connection refused");
            }
            if let Some(msg) = self.failures.get(url) {
                return Ok(PageFetch::failed(msg.clone()));
            }
            let body = if self.body.is_empty() {
                format!("content of {}", url)
            } else {
                self.body.clone()
            };
            Ok(PageFetch::ok(Some(format!("Title {}", url)), body, None))
        }
    }

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn mixed_batch_keeps_order_and_isolates_failure() {
        let backend = Arc::new(ScriptedBackend::default().fail("https://b.test", "404 Not Found"));
        let fetcher = BoundedBatchFetcher::new(backend.clone());

        let targets = urls(&["https://a.test", "https://b.test", "https://c.test"]);
        let results = fetcher.fetch_all(&targets, 2).await.unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].target, "https://a.test");
        assert!(results[0].succeeded);
        assert_eq!(results[0].title.as_deref(), Some("Title https://a.test"));
        assert_eq!(results[1].target, "https://b.test");
        assert!(!results[1].succeeded);
        assert_eq!(results[1].error_detail.as_deref(), Some("404 Not Found"));
        assert!(results[1].title.is_none() && results[1].content.is_none());
        assert!(results[2].succeeded);
        assert!(backend.max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn order_follows_input_not_completion() {
        let backend = Arc::new(
            ScriptedBackend::default()
                .delay("https://slow.test", 120)
                .delay("https://medium.test", 60)
                .delay("https://fast.test", 1),
        );
        let fetcher = BoundedBatchFetcher::new(backend);
        let targets = urls(&["https://slow.test", "https://medium.test", "https://fast.test"]);

        let results = fetcher.fetch_all(&targets, 3).await.unwrap();
        let got: Vec<_> = results.iter().map(|r| r.target.as_str()).collect();
        assert_eq!(got, vec!["https://slow.test", "https://medium.test", "https://fast.test"]);
        assert!(results.iter().all(|r| r.succeeded));
    }

    #[tokio::test]
    async fn in_flight_never_exceeds_limit() {
        let mut backend = ScriptedBackend::default();
        let targets: Vec<String> = (0..12).map(|i| format!("https://site{}.test", i)).collect();
        for t in &targets {
            backend = backend.delay(t, 25);
        }
        let backend = Arc::new(backend);
        let fetcher = BoundedBatchFetcher::new(backend.clone());

        let results = fetcher.fetch_all(&targets, 3).await.unwrap();

        assert_eq!(results.len(), 12);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 12);
        let peak = backend.max_in_flight.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak in-flight was {}", peak);
        assert!(peak >= 2, "batch did not run concurrently (peak {})", peak);
    }

    #[tokio::test]
    async fn invalid_limit_rejected_before_any_call() {
        let backend = Arc::new(ScriptedBackend::default());
        let fetcher = BoundedBatchFetcher::new(backend.clone());
        let targets = urls(&["https://a.test"]);

        assert_eq!(
            fetcher.fetch_all(&targets, 0).await,
            Err(FetchError::InvalidConcurrency(0))
        );
        assert_eq!(
            fetcher.fetch_all(&targets, -4).await,
            Err(FetchError::InvalidConcurrency(-4))
        );
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_batch_makes_no_calls() {
        let backend = Arc::new(ScriptedBackend::default());
        let fetcher = BoundedBatchFetcher::new(backend.clone());
        let results = fetcher.fetch_all(&[], 3).await.unwrap();
        assert!(results.is_empty());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn all_failed_is_still_ok() {
        let backend = Arc::new(
            ScriptedBackend::default()
                .raise("https://a.test")
                .fail("https://b.test", ""),
        );
        let fetcher = BoundedBatchFetcher::new(backend);
        let results = fetcher
            .fetch_all(&urls(&["https://a.test", "https://b.test"]), 1)
            .await
            .unwrap();

        assert!(results.iter().all(|r| !r.succeeded));
        assert_eq!(results[0].error_detail.as_deref(), Some("connection refused"));
        // Empty backend messages still produce a readable detail.
        assert!(!results[1].error_detail.as_deref().unwrap_or("").is_empty());
    }

    #[tokio::test]
    async fn panicking_target_does_not_sink_the_batch() {
        let backend = Arc::new(ScriptedBackend::default().panic_on("https://boom.test"));
        let fetcher = BoundedBatchFetcher::new(backend);
        let results = fetcher
            .fetch_all(&urls(&["https://ok.test", "https://boom.test", "https://ok2.test"]), 1)
            .await
            .unwrap();

        assert!(results[0].succeeded);
        assert!(!results[1].succeeded);
        assert!(results[1]
            .error_detail
            .as_deref()
            .unwrap_or("")
            .contains("fetch task aborted"));
        // The permit held by the panicking task was released.
        assert!(results[2].succeeded);
    }

    #[tokio::test]
    async fn slow_target_times_out_alone() {
        let backend = Arc::new(ScriptedBackend::default().delay("https://slow.test", 2_000));
        let fetcher =
            BoundedBatchFetcher::new(backend).with_timeout(Some(Duration::from_millis(50)));
        let results = fetcher
            .fetch_all(&urls(&["https://slow.test", "https://fast.test"]), 2)
            .await
            .unwrap();

        assert!(!results[0].succeeded);
        assert!(results[0].error_detail.as_deref().unwrap_or("").contains("timed out"));
        assert!(results[1].succeeded);
    }

    #[tokio::test]
    async fn content_cut_to_exact_bound() {
        let long = "é".repeat(1500);
        let backend = Arc::new(ScriptedBackend::default().body(&long));
        let fetcher = BoundedBatchFetcher::new(backend);
        let results = fetcher.fetch_all(&urls(&["https://a.test"]), 1).await.unwrap();
        assert_eq!(results[0].content.as_ref().unwrap().chars().count(), 1000);

        let backend = Arc::new(ScriptedBackend::default().body("short"));
        let fetcher = BoundedBatchFetcher::new(backend).with_content_limit(10);
        let results = fetcher.fetch_all(&urls(&["https://a.test"]), 1).await.unwrap();
        assert_eq!(results[0].content.as_deref(), Some("short"));
    }

    #[tokio::test]
    async fn blank_target_fails_without_backend_call() {
        let backend = Arc::new(ScriptedBackend::default());
        let fetcher = BoundedBatchFetcher::new(backend.clone());
        let results = fetcher
            .fetch_all(&urls(&["  ", "https://a.test"]), 2)
            .await
            .unwrap();
        assert!(!results[0].succeeded);
        assert!(results[1].succeeded);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn result_serializes_in_tool_field_order() {
        let ok = FetchResult::success("https://a.test".into(), "A".into(), "body".into());
        assert_eq!(
            serde_json::to_string(&ok).unwrap(),
            r#"{"url":"https://a.test","success":true,"title":"A","content":"body","error":null}"#
        );
        let failed = FetchResult::failure("https://b.test".into(), "boom");
        assert_eq!(
            serde_json::to_string(&failed).unwrap(),
            r#"{"url":"https://b.test","success":false,"title":null,"content":null,"error":"boom"}"#
        );
    }
}
