//! Delve LLM - client for a locally hosted model server
//!
//! This crate provides:
//! - A transport seam with an HTTP implementation for `/api/generate`
//! - Retrying request establishment with exponential backoff
//! - Normalization of streaming and non-streaming replies into one event type

pub mod client;
pub mod transport;
pub mod types;
pub mod wire;

pub use client::GenerationClient;
pub use transport::{GenerationTransport, HttpTransport, TransportReply};
pub use types::*;
pub use wire::{normalize_body, parse_stream_line, LineBuffer, StreamFragment};
