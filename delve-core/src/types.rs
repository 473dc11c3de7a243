//! Core data type definitions

use crate::async_utils::RetryConfig;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};

/// Top-level configuration file layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DelveConfig {
    pub client: ClientConfig,
    pub research: ResearchConfig,
    pub search: SearchConfig,
    pub logging: LoggingConfig,
}

/// Connection settings for the model server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the model server, without trailing slash
    pub base_url: String,
    /// Per-attempt request timeout in seconds
    pub timeout_secs: u64,
    /// Upper bound applied to any requested `max_tokens`
    pub context_window: u32,
    /// Backoff policy for request establishment
    pub retry: RetryConfig,
}

/// Parameters of a single research run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    /// Model identifier passed to the generation endpoint
    pub model: String,
    /// Sampling temperature (0.0-1.0)
    pub temperature: f32,
    /// Maximum output tokens per generation call
    pub max_tokens: u32,
    /// Search iterations per area
    pub search_depth: usize,
    /// Cumulative source cap per area
    pub max_sources: usize,
    /// Upper bound on the number of areas the plan may contain
    pub max_areas: usize,
    /// Use incremental responses for model calls
    pub stream: bool,
}

/// Settings for the optional HTTP search backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Base URL of a SearXNG-compatible JSON search endpoint
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
}

/// A candidate source returned by a fetcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub snippet: String,
}

impl SourceRecord {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        snippet: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            snippet: snippet.into(),
        }
    }
}
