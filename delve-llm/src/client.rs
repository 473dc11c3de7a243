//! Generation client for a local model server
//!
//! Wraps a [`GenerationTransport`] with token clamping, retry with
//! exponential backoff, and normalization of both reply modes into a single
//! [`GenerationEvent`] stream.

use crate::transport::{GenerationTransport, HttpTransport, TransportReply};
use crate::types::{GenerationEvent, GenerationOutput, GenerationRequest, GenerationStream};
use crate::wire::{normalize_body, parse_stream_line, LineBuffer};
use delve_core::{retry_async, ClientConfig, DelveError, DelveResult, ErrorContext};
use futures::StreamExt;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Token count from a loosely typed option value
fn passthrough_tokens(value: &Value) -> Option<u32> {
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|v| *v >= 0.0).map(|v| v as u64))
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
        .map(|tokens| tokens.min(u32::MAX as u64) as u32)
}

/// Client for the model server's generate endpoint.
///
/// Cloning is cheap; clones share the underlying transport but no retry state.
#[derive(Clone)]
pub struct GenerationClient {
    transport: Arc<dyn GenerationTransport>,
    config: ClientConfig,
}

impl GenerationClient {
    /// Create a client that talks HTTP to `config.base_url`
    pub fn new(config: ClientConfig) -> DelveResult<Self> {
        config.validate()?;
        let transport = HttpTransport::new(&config)?;

        info!(
            endpoint = transport.endpoint(),
            context_window = config.context_window,
            max_attempts = config.retry.max_attempts,
            "Created generation client"
        );

        Ok(Self {
            transport: Arc::new(transport),
            config,
        })
    }

    /// Create a client over a custom transport
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn GenerationTransport>) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// `min(requested, context_window)`
    pub fn effective_max_tokens(&self, requested: u32) -> u32 {
        requested.min(self.config.context_window)
    }

    /// Build the JSON payload sent downstream, with `max_tokens` clamped.
    ///
    /// A `max_tokens` passthrough key is folded into the named option first,
    /// so it is clamped too. The named option wins when both are set.
    pub fn prepare_payload(&self, request: &GenerationRequest) -> Value {
        let mut options = request.options.clone();
        if let Some(passthrough) = options.extra.remove("max_tokens") {
            match passthrough_tokens(&passthrough) {
                Some(tokens) => {
                    options.max_tokens.get_or_insert(tokens);
                }
                None => warn!(value = %passthrough, "Dropped non-numeric max_tokens option"),
            }
        }
        if let Some(requested) = options.max_tokens {
            let effective = self.effective_max_tokens(requested);
            if effective != requested {
                debug!(requested, effective, "Clamped max_tokens to context window");
            }
            options.max_tokens = Some(effective);
        }

        let mut payload = Map::new();
        if let Ok(Value::Object(flattened)) = serde_json::to_value(&options) {
            payload.extend(flattened);
        }
        payload.insert("model".to_string(), Value::String(request.model.clone()));
        payload.insert("prompt".to_string(), Value::String(request.prompt.clone()));
        payload.insert("stream".to_string(), Value::Bool(request.stream));
        Value::Object(payload)
    }

    /// Submit a request and return its events.
    ///
    /// The stream is lazy: nothing is sent until it is first polled. It ends
    /// right after its terminal event. Dropping it early closes any open
    /// response body.
    pub fn generate(&self, request: GenerationRequest) -> GenerationStream {
        let transport = Arc::clone(&self.transport);
        let retry = self.config.retry.clone();
        let payload = self.prepare_payload(&request);
        let GenerationRequest { model, prompt, stream: streaming, .. } = request;

        let events = async_stream::stream! {
            if model.trim().is_empty() {
                yield GenerationEvent::Error("Model identifier must not be empty".to_string());
                return;
            }
            if prompt.trim().is_empty() {
                yield GenerationEvent::Error("Prompt must not be empty".to_string());
                return;
            }

            let started = Instant::now();
            let reply = retry_async(
                || transport.send(&payload, streaming),
                &retry,
                "generate",
                DelveError::is_recoverable,
            )
            .await;

            match reply {
                Err(err) => {
                    err.log();
                    yield GenerationEvent::Error(err.to_string());
                }
                Ok(TransportReply::Body(body)) => {
                    let output = normalize_body(&body, &model);
                    debug!(
                        model = %output.model,
                        chars = output.text.len(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Generation completed"
                    );
                    yield GenerationEvent::Done(output);
                }
                Ok(TransportReply::Stream(mut chunks)) => {
                    let mut lines = LineBuffer::new();
                    let mut buffer = String::new();
                    let mut server_model: Option<String> = None;

                    while let Some(chunk) = chunks.next().await {
                        let bytes = match chunk {
                            Ok(bytes) => bytes,
                            Err(err) => {
                                warn!(model = %model, error = %err, "Streaming response failed");
                                yield GenerationEvent::Error(err.to_string());
                                return;
                            }
                        };
                        for line in lines.push(&bytes) {
                            if let Some(fragment) = parse_stream_line(&line) {
                                if server_model.is_none() {
                                    server_model = fragment.model.filter(|m| !m.is_empty());
                                }
                                if !fragment.text.is_empty() {
                                    buffer.push_str(&fragment.text);
                                    yield GenerationEvent::Chunk(fragment.text);
                                }
                            }
                        }
                    }

                    if let Some(fragment) = lines.finish().as_deref().and_then(parse_stream_line) {
                        if !fragment.text.is_empty() {
                            buffer.push_str(&fragment.text);
                            yield GenerationEvent::Chunk(fragment.text);
                        }
                    }

                    debug!(
                        model = %model,
                        chars = buffer.len(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Streaming generation completed"
                    );
                    yield GenerationEvent::Done(GenerationOutput {
                        text: buffer,
                        model: server_model.unwrap_or(model),
                        created_at: None,
                        done: true,
                    });
                }
            }
        };

        events.boxed()
    }

    /// Drain a generation to its terminal event.
    pub async fn generate_text(&self, request: GenerationRequest) -> DelveResult<GenerationOutput> {
        self.generate_with_callback(request, |_| {}).await
    }

    /// Drain a generation, handing every partial fragment to `on_chunk` first.
    pub async fn generate_with_callback<F>(
        &self,
        request: GenerationRequest,
        mut on_chunk: F,
    ) -> DelveResult<GenerationOutput>
    where
        F: FnMut(&str),
    {
        let model = request.model.clone();
        let mut events = self.generate(request);

        while let Some(event) = events.next().await {
            match event {
                GenerationEvent::Chunk(text) => on_chunk(&text),
                GenerationEvent::Done(output) => return Ok(output),
                GenerationEvent::Error(message) => {
                    return Err(DelveError::Llm {
                        message,
                        model: Some(model),
                        context: ErrorContext::new("generation_client")
                            .with_operation("generate"),
                    })
                }
            }
        }

        Err(DelveError::Internal {
            message: "Generation ended without a terminal event".to_string(),
            source: None,
            context: ErrorContext::new("generation_client").with_operation("generate"),
        })
    }
}
