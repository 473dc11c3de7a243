//! Configuration defaults, loading and validation

use crate::error::{DelveError, DelveResult, ErrorContext};
use crate::types::{ClientConfig, DelveConfig, ResearchConfig, SearchConfig};
use crate::{async_utils::RetryConfig, validation_error};

use std::path::Path;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 30,
            context_window: 8192,
            retry: RetryConfig::default(),
        }
    }
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            model: "researcher".to_string(),
            temperature: 0.7,
            max_tokens: 4000,
            search_depth: 3,
            max_sources: 10,
            max_areas: 5,
            stream: false,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: 15,
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> DelveResult<()> {
        if self.base_url.trim().is_empty() {
            return Err(validation_error!(
                "Model server base URL must not be empty",
                "client.base_url",
                "config"
            ));
        }
        if !is_http_url(&self.base_url) {
            return Err(validation_error!(
                format!("Model server base URL {:?} is not an http(s) URL", self.base_url),
                "client.base_url",
                "config"
            ));
        }
        if self.context_window == 0 {
            return Err(validation_error!(
                "Context window must be greater than 0",
                "client.context_window",
                "config"
            ));
        }
        if self.timeout_secs == 0 {
            return Err(validation_error!(
                "Request timeout must be greater than 0",
                "client.timeout_secs",
                "config"
            ));
        }
        if self.retry.max_delay_ms < self.retry.initial_delay_ms {
            return Err(validation_error!(
                "Maximum retry delay must not be below the minimum delay",
                "client.retry.max_delay_ms",
                "config"
            ));
        }
        Ok(())
    }
}

impl ResearchConfig {
    pub fn validate(&self) -> DelveResult<()> {
        if self.model.trim().is_empty() {
            return Err(validation_error!(
                "Model identifier must not be empty",
                "research.model",
                "config"
            ));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(validation_error!(
                format!("Temperature {} is outside 0.0-1.0", self.temperature),
                "research.temperature",
                "config"
            ));
        }
        if self.max_tokens == 0 {
            return Err(validation_error!(
                "max_tokens must be greater than 0",
                "research.max_tokens",
                "config"
            ));
        }
        if self.search_depth == 0 {
            return Err(validation_error!(
                "search_depth must be at least 1",
                "research.search_depth",
                "config"
            ));
        }
        if self.max_sources == 0 {
            return Err(validation_error!(
                "max_sources must be at least 1",
                "research.max_sources",
                "config"
            ));
        }
        if self.max_areas == 0 {
            return Err(validation_error!(
                "max_areas must be at least 1",
                "research.max_areas",
                "config"
            ));
        }
        Ok(())
    }
}

impl DelveConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> DelveResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| DelveError::Config {
            message: format!("Failed to read config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("read_file")
                .with_suggestion("Check if the config file exists and is readable"),
        })?;

        let config: DelveConfig = toml::from_str(&content).map_err(|e| DelveError::Config {
            message: format!("Failed to parse config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("parse_toml")
                .with_suggestion("Check TOML syntax in config file"),
        })?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> DelveResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| DelveError::Config {
            message: format!("Failed to serialize config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config").with_operation("serialize_toml"),
        })?;

        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        std::fs::write(path, content).map_err(|e| DelveError::Config {
            message: format!("Failed to write config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("write_file")
                .with_suggestion("Check if the directory exists and is writable"),
        })?;

        Ok(())
    }

    /// Apply `OLLAMA_API_URL`, `DELVE_MODEL` and `DELVE_SEARCH_URL` if set
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty("OLLAMA_API_URL") {
            self.client.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = non_empty("DELVE_MODEL") {
            self.research.model = model;
        }
        if let Some(endpoint) = non_empty("DELVE_SEARCH_URL") {
            self.search.endpoint = Some(endpoint);
        }
    }

    /// Validate every section
    pub fn validate(&self) -> DelveResult<()> {
        self.client.validate()?;
        self.research.validate()?;
        if self.search.timeout_secs == 0 {
            return Err(validation_error!(
                "Search timeout must be greater than 0",
                "search.timeout_secs",
                "config"
            ));
        }
        if let Some(endpoint) = self.search.endpoint.as_deref() {
            if !endpoint.trim().is_empty() && !is_http_url(endpoint) {
                return Err(validation_error!(
                    format!("Search endpoint {:?} is not an http(s) URL", endpoint),
                    "search.endpoint",
                    "config"
                ));
            }
        }
        Ok(())
    }
}

fn is_http_url(value: &str) -> bool {
    url::Url::parse(value.trim())
        .map(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
        .unwrap_or(false)
}
