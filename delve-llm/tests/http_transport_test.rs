//! Tests for the HTTP transport against a local mock model server

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use delve_core::{ClientConfig, RetryConfig};
use delve_llm::{GenerationClient, GenerationEvent, GenerationRequest};
use futures::StreamExt;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
struct MockServer {
    hits: Arc<AtomicUsize>,
    /// Number of initial requests answered with 503
    failures: usize,
    bodies: Arc<Mutex<Vec<Value>>>,
}

async fn generate(State(server): State<MockServer>, Json(body): Json<Value>) -> Response {
    let hit = server.hits.fetch_add(1, Ordering::SeqCst);
    server.bodies.lock().unwrap().push(body.clone());

    if hit < server.failures {
        return (StatusCode::SERVICE_UNAVAILABLE, "warming up").into_response();
    }

    let model = body["model"].as_str().unwrap_or_default().to_string();
    if body["stream"].as_bool().unwrap_or(false) {
        let lines: String = ["Local ", "models ", "stream."]
            .iter()
            .map(|f| format!("{}\n", json!({ "model": model, "response": f, "done": false })))
            .chain(std::iter::once(format!(
                "{}\n",
                json!({ "model": model, "response": "", "done": true })
            )))
            .collect();
        ([("content-type", "application/x-ndjson")], lines).into_response()
    } else {
        Json(json!({
            "model": model,
            "created_at": "2024-06-01T12:00:00Z",
            "response": "Local models answer.",
            "done": true
        }))
        .into_response()
    }
}

async fn spawn_server(server: MockServer) -> String {
    let app = Router::new()
        .route("/api/generate", post(generate))
        .with_state(server);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn config(base_url: String) -> ClientConfig {
    ClientConfig {
        base_url,
        timeout_secs: 5,
        context_window: 2048,
        retry: RetryConfig {
            max_attempts: 3,
            initial_delay_ms: 5,
            max_delay_ms: 20,
            backoff_multiplier: 2.0,
            jitter: false,
        },
    }
}

#[tokio::test]
async fn non_streaming_round_trip() {
    let server = MockServer::default();
    let base_url = spawn_server(server.clone()).await;
    let client = GenerationClient::new(config(base_url)).unwrap();

    let output = client
        .generate_text(GenerationRequest::new("researcher", "hello").with_max_tokens(4000))
        .await
        .unwrap();

    assert_eq!(output.text, "Local models answer.");
    assert_eq!(output.created_at.as_deref(), Some("2024-06-01T12:00:00Z"));
    let bodies = server.bodies.lock().unwrap();
    assert_eq!(bodies[0]["max_tokens"], 2048);
    assert_eq!(bodies[0]["stream"], false);
}

#[tokio::test]
async fn streaming_round_trip() {
    let server = MockServer::default();
    let base_url = spawn_server(server.clone()).await;
    let client = GenerationClient::new(config(base_url)).unwrap();

    let events: Vec<_> = client
        .generate(GenerationRequest::new("researcher", "hello").streaming(true))
        .collect()
        .await;

    let chunks: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            GenerationEvent::Chunk(t) => Some(t.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(chunks, vec!["Local ", "models ", "stream."]);
    match events.last() {
        Some(GenerationEvent::Done(output)) => assert_eq!(output.text, "Local models stream."),
        other => panic!("expected Done, got {:?}", other),
    }
}

#[tokio::test]
async fn server_errors_are_retried_until_success() {
    let server = MockServer {
        failures: 2,
        ..MockServer::default()
    };
    let base_url = spawn_server(server.clone()).await;
    let client = GenerationClient::new(config(base_url)).unwrap();

    let output = client
        .generate_text(GenerationRequest::new("researcher", "hello"))
        .await
        .unwrap();

    assert_eq!(output.text, "Local models answer.");
    assert_eq!(server.hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn unreachable_server_yields_single_error() {
    // Bind then drop to obtain a port nothing listens on.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = GenerationClient::new(config(format!("http://{}", addr))).unwrap();
    let events: Vec<_> = client
        .generate(GenerationRequest::new("researcher", "hello"))
        .collect()
        .await;

    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], GenerationEvent::Error(_)));
}
