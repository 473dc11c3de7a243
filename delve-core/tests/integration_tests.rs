//! Integration tests for delve-core infrastructure

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use delve_core::{
    config_error, retry_async, transport_error, validation_error, with_timeout, DelveConfig,
    DelveError, ErrorContext, ResearchConfig, RetryConfig,
};

fn fast_retry(max_attempts: usize) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_delay_ms: 5,
        max_delay_ms: 20,
        backoff_multiplier: 2.0,
        jitter: false,
    }
}

#[tokio::test]
async fn test_error_handling() {
    let error = transport_error!("connection refused", "test_component");

    match &error {
        DelveError::Transport {
            message, context, ..
        } => {
            assert_eq!(message, "connection refused");
            assert_eq!(context.component, "test_component");
            assert!(!context.error_id.is_empty());
        }
        _ => panic!("Expected Transport error"),
    }

    // Should not panic without a subscriber
    error.log();
    assert!(error.is_recoverable());

    let config_error = config_error!("Invalid config", "test");
    assert!(!config_error.is_recoverable());

    let timeout = DelveError::Timeout {
        operation: "generate".to_string(),
        duration_ms: 30_000,
        context: ErrorContext::new("test"),
    };
    assert!(timeout.is_recoverable());
}

#[tokio::test]
async fn test_retry_mechanism() {
    let attempt_count = Arc::new(AtomicUsize::new(0));

    let operation = {
        let attempt_count = Arc::clone(&attempt_count);
        move || {
            let count = attempt_count.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if count < 3 {
                    Err(transport_error!("Temporary failure", "test"))
                } else {
                    Ok("Success")
                }
            }
        }
    };

    let result = retry_async(operation, &fast_retry(3), "test_operation", |e: &DelveError| {
        e.is_recoverable()
    })
    .await;
    assert_eq!(result.unwrap(), "Success");
    assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_retry_gives_up_after_ceiling() {
    let attempt_count = Arc::new(AtomicUsize::new(0));

    let operation = {
        let attempt_count = Arc::clone(&attempt_count);
        move || {
            attempt_count.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(transport_error!("still down", "test")) }
        }
    };

    let result = retry_async(operation, &fast_retry(3), "always_fails", |e: &DelveError| {
        e.is_recoverable()
    })
    .await;
    assert!(matches!(result, Err(DelveError::Transport { .. })));
    assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_retry_skips_non_recoverable_errors() {
    let attempt_count = Arc::new(AtomicUsize::new(0));

    let operation = {
        let attempt_count = Arc::clone(&attempt_count);
        move || {
            attempt_count.fetch_add(1, Ordering::SeqCst);
            async {
                Err::<(), _>(DelveError::Validation {
                    message: "prompt must not be empty".to_string(),
                    field: Some("prompt".to_string()),
                    context: ErrorContext::new("test"),
                })
            }
        }
    };

    let result = retry_async(operation, &fast_retry(3), "invalid_request", |e: &DelveError| {
        e.is_recoverable()
    })
    .await;
    assert!(result.is_err());
    assert_eq!(attempt_count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_timeout_mechanism() {
    let quick_operation = async {
        sleep(Duration::from_millis(10)).await;
        "Success"
    };

    let result = with_timeout(quick_operation, 100, "quick_test").await;
    assert_eq!(result.unwrap(), "Success");

    let slow_operation = async {
        sleep(Duration::from_millis(200)).await;
        "Should not reach here"
    };

    match with_timeout(slow_operation, 50, "slow_test").await {
        Err(DelveError::Timeout {
            operation,
            duration_ms,
            ..
        }) => {
            assert_eq!(operation, "slow_test");
            assert_eq!(duration_ms, 50);
        }
        other => panic!("Expected Timeout error, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_config_validation() {
    let mut config = DelveConfig::default();
    assert!(config.validate().is_ok());

    config.research.search_depth = 0;
    match config.validate() {
        Err(DelveError::Validation { message, field, .. }) => {
            assert!(message.contains("search_depth"));
            assert_eq!(field.as_deref(), Some("research.search_depth"));
        }
        _ => panic!("Expected Validation error"),
    }

    let research = ResearchConfig {
        model: String::new(),
        ..ResearchConfig::default()
    };
    assert!(research.validate().is_err());
}

#[tokio::test]
async fn test_config_round_trips_through_toml_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("delve.toml");

    let mut config = DelveConfig::default();
    config.research.model = "llama3.2".to_string();
    config.research.search_depth = 2;
    config.client.context_window = 4096;
    config.search.endpoint = Some("http://localhost:8888".to_string());

    config.save_to_file(&path).unwrap();
    let loaded = DelveConfig::from_file(&path).unwrap();

    assert_eq!(loaded.research, config.research);
    assert_eq!(loaded.client, config.client);
    assert_eq!(loaded.search, config.search);
}

#[tokio::test]
async fn test_partial_config_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("delve.toml");
    std::fs::write(&path, "[research]\nmodel = \"phi\"\nmax_sources = 5\n").unwrap();

    let loaded = DelveConfig::from_file(&path).unwrap();
    assert_eq!(loaded.research.model, "phi");
    assert_eq!(loaded.research.max_sources, 5);
    assert_eq!(loaded.research.search_depth, 3);
    assert_eq!(loaded.client.context_window, 8192);
    assert_eq!(loaded.client.retry.max_attempts, 3);
}

#[tokio::test]
async fn test_error_macros() {
    let validation_err = validation_error!("Invalid field value", "temperature", "validator");
    match validation_err {
        DelveError::Validation {
            message,
            field,
            context,
        } => {
            assert_eq!(message, "Invalid field value");
            assert_eq!(field, Some("temperature".to_string()));
            assert_eq!(context.component, "validator");
            assert!(!context.recovery_suggestions.is_empty());
        }
        _ => panic!("Expected Validation error"),
    }

    let missing = DelveConfig::from_file("/definitely/not/here/delve.toml");
    assert!(matches!(missing, Err(DelveError::Config { .. })));
}
