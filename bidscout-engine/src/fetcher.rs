//! Evidence Fetcher boundary.
//!
//! The search/scrape provider is external. This module holds the trait the
//! engine consumes, a wrapper that owns the provider's concurrency cap,
//! per-call timeout and retry policy, an HTTP adapter, and an in-memory
//! double for tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::debug;

use bidscout_agent::RetryPolicy;

use crate::config::FetcherConfig;

/// Error types for search and fetch calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// Connection or transport failure
    #[error("Network error: {0}")]
    Network(String),

    /// Call exceeded its time budget
    #[error("Timed out after {0}ms")]
    Timeout(u64),

    /// Provider answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// Response body could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),
}

impl FetchError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Status { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            Self::Decode(_) => false,
        }
    }
}

/// One search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Result title
    pub title: String,
    /// Result URL
    pub url: String,
    /// Short description
    #[serde(default)]
    pub snippet: String,
}

impl SearchResult {
    /// Create a search result.
    pub fn new(title: impl Into<String>, url: impl Into<String>, snippet: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            snippet: snippet.into(),
        }
    }
}

/// Extracted text of a fetched page or document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedContent {
    /// HTTP status of the fetch
    pub status: u16,
    /// Characters in `content`
    pub chars: usize,
    /// Extracted text
    pub content: String,
}

impl FetchedContent {
    /// Successful content.
    pub fn ok(content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            status: 200,
            chars: content.chars().count(),
            content,
        }
    }

    /// Whether there is anything to evaluate.
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// Search and fetch provider.
#[async_trait]
pub trait EvidenceFetcher: Send + Sync {
    /// Run a search query against a named engine.
    async fn search(&self, query: &str, engine: &str) -> Result<Vec<SearchResult>, FetchError>;

    /// Fetch and extract a URL's text content.
    async fn fetch(&self, url: &str) -> Result<FetchedContent, FetchError>;
}

/// Wraps a fetcher with a concurrency cap, timeout and retry policy.
pub struct RetryingFetcher {
    /// Wrapped provider
    inner: Arc<dyn EvidenceFetcher>,
    /// Provider concurrency limiter
    semaphore: Arc<Semaphore>,
    /// Per-call timeout (ms)
    timeout_ms: u64,
    /// Retry policy
    policy: RetryPolicy,
}

impl RetryingFetcher {
    /// Wrap a provider using the fetcher configuration.
    pub fn new(inner: Arc<dyn EvidenceFetcher>, config: &FetcherConfig) -> Self {
        Self {
            inner,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            timeout_ms: config.timeout_ms,
            policy: config.retry.clone(),
        }
    }

    async fn bounded<T, Fut>(&self, call: Fut) -> Result<T, FetchError>
    where
        Fut: std::future::Future<Output = Result<T, FetchError>>,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| FetchError::Network("fetcher semaphore closed".to_string()))?;

        match tokio::time::timeout(Duration::from_millis(self.timeout_ms), call).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(self.timeout_ms)),
        }
    }
}

#[async_trait]
impl EvidenceFetcher for RetryingFetcher {
    async fn search(&self, query: &str, engine: &str) -> Result<Vec<SearchResult>, FetchError> {
        self.policy
            .run(
                "search",
                |_| self.bounded(self.inner.search(query, engine)),
                FetchError::is_retryable,
            )
            .await
            .map(|(results, _)| results)
            .map_err(|(err, attempts)| {
                debug!(query, engine, attempts, error = %err, "Search failed");
                err
            })
    }

    async fn fetch(&self, url: &str) -> Result<FetchedContent, FetchError> {
        self.policy
            .run(
                "fetch",
                |_| self.bounded(self.inner.fetch(url)),
                FetchError::is_retryable,
            )
            .await
            .map(|(content, _)| content)
            .map_err(|(err, attempts)| {
                debug!(url, attempts, error = %err, "Fetch failed");
                err
            })
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

/// HTTP search/fetch provider.
///
/// Searches with `GET {search_url}?q=<query>&engine=<engine>` expecting
/// `{"results": [{"title", "url", "snippet"}]}`; fetches pages directly.
pub struct HttpEvidenceFetcher {
    client: reqwest::Client,
    search_url: String,
    api_key: Option<String>,
    max_chars: usize,
}

impl HttpEvidenceFetcher {
    /// Create a fetcher against a search endpoint.
    pub fn new(search_url: impl Into<String>, max_chars: usize) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("bidscout/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            search_url: search_url.into(),
            api_key: None,
            max_chars,
        })
    }

    /// Send a bearer token with search requests.
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }
}

fn transport_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(0)
    } else if err.is_decode() {
        FetchError::Decode(err.to_string())
    } else {
        FetchError::Network(err.to_string())
    }
}

/// Keep at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[async_trait]
impl EvidenceFetcher for HttpEvidenceFetcher {
    async fn search(&self, query: &str, engine: &str) -> Result<Vec<SearchResult>, FetchError> {
        let mut request = self
            .client
            .get(&self.search_url)
            .query(&[("q", query), ("engine", engine)]);

        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: self.search_url.clone(),
            });
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;
        Ok(body.results)
    }

    async fn fetch(&self, url: &str) -> Result<FetchedContent, FetchError> {
        let response = self.client.get(url).send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let text = response.text().await.map_err(transport_error)?;
        let content = truncate_chars(&text, self.max_chars).to_string();
        Ok(FetchedContent {
            status: status.as_u16(),
            chars: content.chars().count(),
            content,
        })
    }
}

/// In-memory provider for tests and dry runs.
///
/// Search results are keyed by a substring of the query; pages by URL.
#[derive(Debug, Clone, Default)]
pub struct StaticFetcher {
    results: Vec<(String, Vec<SearchResult>)>,
    pages: HashMap<String, Result<FetchedContent, FetchError>>,
}

impl StaticFetcher {
    /// Create an empty fetcher; every search returns no results.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `results` for any query containing `needle`.
    pub fn with_results(mut self, needle: impl Into<String>, results: Vec<SearchResult>) -> Self {
        self.results.push((needle.into(), results));
        self
    }

    /// Serve `content` for `url`.
    pub fn with_page(mut self, url: impl Into<String>, content: impl Into<String>) -> Self {
        self.pages.insert(url.into(), Ok(FetchedContent::ok(content)));
        self
    }

    /// Fail fetches of `url`.
    pub fn with_failure(mut self, url: impl Into<String>, error: FetchError) -> Self {
        self.pages.insert(url.into(), Err(error));
        self
    }
}

#[async_trait]
impl EvidenceFetcher for StaticFetcher {
    async fn search(&self, query: &str, _engine: &str) -> Result<Vec<SearchResult>, FetchError> {
        Ok(self
            .results
            .iter()
            .find(|(needle, _)| query.contains(needle.as_str()))
            .map(|(_, results)| results.clone())
            .unwrap_or_default())
    }

    async fn fetch(&self, url: &str) -> Result<FetchedContent, FetchError> {
        self.pages.get(url).cloned().unwrap_or_else(|| {
            Err(FetchError::Status {
                status: 404,
                url: url.to_string(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FlakyFetcher {
        calls: AtomicU32,
        failures: u32,
        error: FetchError,
    }

    #[async_trait]
    impl EvidenceFetcher for FlakyFetcher {
        async fn search(&self, _query: &str, _engine: &str) -> Result<Vec<SearchResult>, FetchError> {
            Ok(vec![])
        }

        async fn fetch(&self, _url: &str) -> Result<FetchedContent, FetchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                Err(self.error.clone())
            } else {
                Ok(FetchedContent::ok("page"))
            }
        }
    }

    fn fast_config() -> FetcherConfig {
        FetcherConfig {
            retry: RetryPolicy {
                max_attempts: 3,
                initial_backoff_ms: 1,
                max_backoff_ms: 2,
            },
            ..FetcherConfig::default()
        }
    }

    #[tokio::test]
    async fn test_retrying_fetcher_recovers() {
        let inner = Arc::new(FlakyFetcher {
            calls: AtomicU32::new(0),
            failures: 2,
            error: FetchError::Network("reset".to_string()),
        });
        let fetcher = RetryingFetcher::new(inner.clone(), &fast_config());

        let content = fetcher.fetch("https://a.com").await.unwrap();
        assert_eq!(content.content, "page");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retrying_fetcher_gives_up_on_client_error() {
        let inner = Arc::new(FlakyFetcher {
            calls: AtomicU32::new(0),
            failures: 5,
            error: FetchError::Status {
                status: 404,
                url: "https://a.com".to_string(),
            },
        });
        let fetcher = RetryingFetcher::new(inner.clone(), &fast_config());

        assert!(fetcher.fetch("https://a.com").await.is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_http_search_and_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "Arsenal RFP"))
            .and(query_param("engine", "google"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [{"title": "Arsenal RFP", "url": format!("{}/rfp", server.uri()), "snippet": "CRM"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rfp"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Arsenal invites tenders for CRM"))
            .mount(&server)
            .await;

        let fetcher = HttpEvidenceFetcher::new(format!("{}/search", server.uri()), 14).unwrap();
        let results = fetcher.search("Arsenal RFP", "google").await.unwrap();
        assert_eq!(results.len(), 1);

        let page = fetcher.fetch(&results[0].url).await.unwrap();
        assert_eq!(page.content, "Arsenal invite");
        assert_eq!(page.chars, 14);
    }

    #[tokio::test]
    async fn test_http_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let fetcher = HttpEvidenceFetcher::new(format!("{}/search", server.uri()), 100).unwrap();
        let err = fetcher.search("x", "google").await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
