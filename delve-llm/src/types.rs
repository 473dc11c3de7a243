//! Request and event types for the generation client

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Sampling options sent along with a prompt
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Passed through to the server untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A single prompt submission
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub options: GenerationOptions,
    pub stream: bool,
}

impl GenerationRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            options: GenerationOptions::default(),
            stream: false,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.options.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.options.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.extra.insert(key.into(), value.into());
        self
    }

    pub fn streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }
}

/// Final result of a successful generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOutput {
    pub text: String,
    pub model: String,
    /// Server-reported completion timestamp, when present
    pub created_at: Option<String>,
    pub done: bool,
}

impl GenerationOutput {
    pub(crate) fn text_only(text: String, model: &str) -> Self {
        Self {
            text,
            model: model.to_string(),
            created_at: None,
            done: true,
        }
    }
}

/// Events produced by one generation call.
///
/// Zero or more `Chunk`s are followed by exactly one `Done` or `Error`.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationEvent {
    Chunk(String),
    Done(GenerationOutput),
    Error(String),
}

impl GenerationEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, GenerationEvent::Chunk(_))
    }
}

pub type GenerationStream = BoxStream<'static, GenerationEvent>;
