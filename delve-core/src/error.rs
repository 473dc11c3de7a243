//! Unified error handling system
//!
//! Provides structured error types with context, recovery suggestions, and proper error chaining

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

pub type DelveResult<T> = Result<T, DelveError>;

/// Error context providing additional information for debugging and recovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Unique error ID for tracking
    pub error_id: String,
    /// Timestamp when error occurred
    pub timestamp: DateTime<Utc>,
    /// Component where error originated
    pub component: String,
    /// Operation being performed when error occurred
    pub operation: Option<String>,
    /// Additional metadata
    pub metadata: std::collections::HashMap<String, String>,
    /// Recovery suggestions
    pub recovery_suggestions: Vec<String>,
}

impl ErrorContext {
    pub fn new(component: &str) -> Self {
        Self {
            error_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            component: component.to_string(),
            operation: None,
            metadata: std::collections::HashMap::new(),
            recovery_suggestions: Vec::new(),
        }
    }

    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_string());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_suggestion(mut self, suggestion: &str) -> Self {
        self.recovery_suggestions.push(suggestion.to_string());
        self
    }
}

/// Main error type for the Delve system
#[derive(Error, Debug)]
pub enum DelveError {
    /// Connection refused, DNS failure, reset while sending the request
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Operation timeout: {operation}")]
    Timeout {
        operation: String,
        duration_ms: u64,
        context: ErrorContext,
    },

    #[error("Model server returned HTTP {status}: {message}")]
    HttpStatus {
        status: u16,
        message: String,
        context: ErrorContext,
    },

    /// Failure while reading an already established response body
    #[error("Payload error: {message}")]
    Payload {
        message: String,
        context: ErrorContext,
    },

    /// Terminal failure reported by a generation call
    #[error("LLM error: {message}")]
    Llm {
        message: String,
        model: Option<String>,
        context: ErrorContext,
    },

    #[error("Research plan error: {message}")]
    Plan {
        message: String,
        context: ErrorContext,
    },

    #[error("Empty model response during {stage}")]
    EmptyResponse {
        stage: String,
        context: ErrorContext,
    },

    #[error("Source fetch error: {message}")]
    Fetch {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
        context: ErrorContext,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },
}

impl DelveError {
    /// Get the error context
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            DelveError::Transport { context, .. } => Some(context),
            DelveError::Timeout { context, .. } => Some(context),
            DelveError::HttpStatus { context, .. } => Some(context),
            DelveError::Payload { context, .. } => Some(context),
            DelveError::Llm { context, .. } => Some(context),
            DelveError::Plan { context, .. } => Some(context),
            DelveError::EmptyResponse { context, .. } => Some(context),
            DelveError::Fetch { context, .. } => Some(context),
            DelveError::Config { context, .. } => Some(context),
            DelveError::Validation { context, .. } => Some(context),
            DelveError::Internal { context, .. } => Some(context),
            DelveError::Io(_) | DelveError::Serialization(_) => None,
        }
    }

    /// Check if error is recoverable by retrying the same request
    pub fn is_recoverable(&self) -> bool {
        match self {
            DelveError::Transport { .. } => true,
            DelveError::Timeout { .. } => true,
            // Any non-2xx reply from the model server counts as a transport failure
            DelveError::HttpStatus { .. } => true,
            _ => false,
        }
    }

    /// Log the error with appropriate level
    pub fn log(&self) {
        match self {
            DelveError::Internal { .. } => {
                error!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Internal error occurred"
                );
            }
            DelveError::Config { .. } | DelveError::Validation { .. } => {
                error!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Configuration or validation error"
                );
            }
            DelveError::Transport { .. }
            | DelveError::Timeout { .. }
            | DelveError::HttpStatus { .. }
            | DelveError::Fetch { .. } => {
                warn!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    recoverable = self.is_recoverable(),
                    "Network error"
                );
            }
            _ => {
                error!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Error occurred"
                );
            }
        }
    }
}

/// Convenience macros for creating errors with context
#[macro_export]
macro_rules! config_error {
    ($msg:expr, $component:expr) => {
        $crate::DelveError::Config {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check your configuration file")
                .with_suggestion("Run 'delve config --init' to create default config"),
        }
    };
}

#[macro_export]
macro_rules! validation_error {
    ($msg:expr, $field:expr, $component:expr) => {
        $crate::DelveError::Validation {
            message: $msg.to_string(),
            field: Some($field.to_string()),
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check the field value and format"),
        }
    };
}

#[macro_export]
macro_rules! transport_error {
    ($msg:expr, $component:expr) => {
        $crate::DelveError::Transport {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check that the model server is running"),
        }
    };
    ($msg:expr, $component:expr, $source:expr) => {
        $crate::DelveError::Transport {
            message: $msg.to_string(),
            source: Some(Box::new($source)),
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check that the model server is running"),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_http_status_is_recoverable() {
        for status in [400, 404, 408, 429, 500, 503] {
            let err = DelveError::HttpStatus {
                status,
                message: "rejected".to_string(),
                context: ErrorContext::new("test"),
            };
            assert!(err.is_recoverable(), "HTTP {} should be retried", status);
        }

        let payload = DelveError::Payload {
            message: "connection reset".to_string(),
            context: ErrorContext::new("test"),
        };
        assert!(!payload.is_recoverable());
    }

    #[test]
    fn context_builder_collects_metadata() {
        let context = ErrorContext::new("client")
            .with_operation("generate")
            .with_metadata("model", "researcher");
        assert_eq!(context.operation.as_deref(), Some("generate"));
        assert_eq!(context.metadata.get("model").map(String::as_str), Some("researcher"));
    }
}
