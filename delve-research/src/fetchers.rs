//! Source fetcher implementations

use async_trait::async_trait;
use delve_core::{DelveError, DelveResult, ErrorContext, SearchConfig, SourceFetcher, SourceRecord};
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Fetcher used when no search backend is configured. Always returns nothing.
#[derive(Debug, Default)]
pub struct NoopFetcher {
    warned: AtomicBool,
}

impl NoopFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SourceFetcher for NoopFetcher {
    async fn fetch(&self, query: &str, _max_count: usize) -> DelveResult<Vec<SourceRecord>> {
        if !self.warned.swap(true, Ordering::Relaxed) {
            warn!("No search endpoint configured; research areas will have no sources");
        }
        debug!(query, "Skipping search");
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "noop"
    }
}

/// Fetcher backed by a SearXNG-compatible JSON search API
#[derive(Debug, Clone)]
pub struct SearxngFetcher {
    client: reqwest::Client,
    search_url: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

impl SearxngFetcher {
    pub fn new(endpoint: &str, timeout_secs: u64) -> DelveResult<Self> {
        let endpoint = endpoint.trim().trim_end_matches('/');
        if endpoint.is_empty() {
            return Err(delve_core::config_error!(
                "Search endpoint must not be empty",
                "searxng_fetcher"
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| DelveError::Fetch {
                message: format!("Failed to build search client: {}", e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("searxng_fetcher").with_operation("new"),
            })?;

        Ok(Self {
            client,
            search_url: format!("{}/search", endpoint),
        })
    }

    pub fn search_url(&self) -> &str {
        &self.search_url
    }
}

#[async_trait]
impl SourceFetcher for SearxngFetcher {
    async fn fetch(&self, query: &str, max_count: usize) -> DelveResult<Vec<SourceRecord>> {
        let context = || {
            ErrorContext::new("searxng_fetcher")
                .with_operation("fetch")
                .with_metadata("query", query)
        };

        let response = self
            .client
            .get(&self.search_url)
            .query(&[("q", query), ("format", "json")])
            .send()
            .await
            .map_err(|e| DelveError::Fetch {
                message: format!("Search request failed: {}", e),
                source: Some(Box::new(e)),
                context: context(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DelveError::Fetch {
                message: format!("Search endpoint returned HTTP {}", status.as_u16()),
                source: None,
                context: context(),
            });
        }

        let body: SearchResponse = response.json().await.map_err(|e| DelveError::Fetch {
            message: format!("Invalid search response: {}", e),
            source: Some(Box::new(e)),
            context: context(),
        })?;

        let sources: Vec<SourceRecord> = body
            .results
            .into_iter()
            .filter(|hit| !hit.url.trim().is_empty())
            .take(max_count)
            .map(|hit| SourceRecord::new(hit.title, hit.url, hit.content))
            .collect();

        debug!(query, count = sources.len(), "Search completed");
        Ok(sources)
    }

    fn name(&self) -> &str {
        "searxng"
    }
}

/// Pick the fetcher for a search configuration
pub fn fetcher_from_config(config: &SearchConfig) -> DelveResult<Arc<dyn SourceFetcher>> {
    match config.endpoint.as_deref().map(str::trim) {
        Some(endpoint) if !endpoint.is_empty() => {
            let fetcher = SearxngFetcher::new(endpoint, config.timeout_secs)?;
            info!(url = fetcher.search_url(), "Using SearXNG source fetcher");
            Ok(Arc::new(fetcher))
        }
        _ => Ok(Arc::new(NoopFetcher::new())),
    }
}
