//! Delve Research - research orchestration on top of the generation client
//!
//! This crate drives a [`delve_llm::GenerationClient`] and a
//! [`delve_core::SourceFetcher`] through planning, per-area search,
//! per-area summaries and a final aggregate report.
//!
//! ## Architecture
//!
//! - **Core** (delve-core): configuration, errors, logging, retry
//! - **LLM** (delve-llm): streaming generation client
//! - **Research** (this crate): pipeline state machine and fetchers
//! - **Presentation** (delve-cli): terminal interface

pub mod fetchers;
pub mod research;

pub use fetchers::{fetcher_from_config, NoopFetcher, SearxngFetcher};
pub use research::{
    drive, ProgressEvent, ProgressSink, ProgressTracker, ResearchArea, ResearchEvent,
    ResearchPipeline, ResearchReport, ResearchRun, ResearchStage,
};

/// Outcome error of a driven research run
#[derive(Debug, thiserror::Error)]
pub enum ResearchError {
    #[error("{message}")]
    Failed {
        stage: ResearchStage,
        message: String,
    },

    #[error("Research run ended without a terminal event")]
    Interrupted,
}

impl ResearchError {
    /// Stage the run failed in, if it failed at all
    pub fn stage(&self) -> Option<ResearchStage> {
        match self {
            ResearchError::Failed { stage, .. } => Some(*stage),
            ResearchError::Interrupted => None,
        }
    }
}

/// Result type for research operations
pub type ResearchResult<T> = Result<T, ResearchError>;
