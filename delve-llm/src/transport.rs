//! Transport seam between the client and the model server

use async_trait::async_trait;
use bytes::Bytes;
use delve_core::{
    transport_error, with_timeout, ClientConfig, DelveError, DelveResult, ErrorContext,
};
use futures::stream::{BoxStream, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Reply of an established exchange
pub enum TransportReply {
    /// Complete body of a non-streaming reply
    Body(String),
    /// Raw chunks of a streaming reply, in arrival order
    Stream(BoxStream<'static, DelveResult<Bytes>>),
}

impl std::fmt::Debug for TransportReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportReply::Body(body) => f.debug_tuple("Body").field(body).finish(),
            TransportReply::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Sends a prepared generate payload.
///
/// An `Err` means the exchange could not be established and is subject to the
/// client's retry policy. Failures while reading a `Stream` reply surface as
/// items of that stream and are never retried.
#[async_trait]
pub trait GenerationTransport: Send + Sync {
    async fn send(&self, payload: &Value, stream: bool) -> DelveResult<TransportReply>;
}

/// HTTP transport targeting `{base_url}/api/generate`
pub struct HttpTransport {
    http: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> DelveResult<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| DelveError::Config {
                message: format!("Failed to build HTTP client: {}", e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("http_transport").with_operation("new"),
            })?;

        Ok(Self {
            http,
            endpoint: format!("{}/api/generate", config.base_url.trim_end_matches('/')),
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn map_send_error(&self, err: reqwest::Error) -> DelveError {
        if err.is_timeout() {
            DelveError::Timeout {
                operation: "generate".to_string(),
                duration_ms: self.timeout.as_millis() as u64,
                context: ErrorContext::new("http_transport")
                    .with_metadata("endpoint", &self.endpoint)
                    .with_suggestion("Increase client.timeout_secs for large models"),
            }
        } else {
            transport_error!(
                format!("Request to {} failed: {}", self.endpoint, err),
                "http_transport",
                err
            )
        }
    }
}

#[async_trait]
impl GenerationTransport for HttpTransport {
    async fn send(&self, payload: &Value, stream: bool) -> DelveResult<TransportReply> {
        debug!(endpoint = %self.endpoint, stream, "Sending generate request");

        let request = self.http.post(&self.endpoint).json(payload);

        // Streaming replies may legitimately outlive the timeout, so only the
        // exchange up to the response headers is bounded.
        let response = if stream {
            with_timeout(request.send(), self.timeout.as_millis() as u64, "generate")
                .await?
                .map_err(|e| self.map_send_error(e))?
        } else {
            request
                .timeout(self.timeout)
                .send()
                .await
                .map_err(|e| self.map_send_error(e))?
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DelveError::HttpStatus {
                status: status.as_u16(),
                message: body,
                context: ErrorContext::new("http_transport")
                    .with_metadata("endpoint", &self.endpoint),
            });
        }

        if stream {
            let chunks = response.bytes_stream().map(|chunk| {
                chunk.map_err(|e| DelveError::Payload {
                    message: format!("Failed to read streaming chunk: {}", e),
                    context: ErrorContext::new("http_transport").with_operation("read_stream"),
                })
            });
            Ok(TransportReply::Stream(chunks.boxed()))
        } else {
            let body = response
                .text()
                .await
                .map_err(|e| self.map_send_error(e))?;
            Ok(TransportReply::Body(body))
        }
    }
}
