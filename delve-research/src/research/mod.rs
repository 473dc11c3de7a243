//! Multi-step research runs over a local model
//!
//! A run proceeds through a fixed sequence of stages:
//! - Planning: split the topic into named research areas
//! - AreaSearch: query the source fetcher for each area, refining the query
//!   on later iterations
//! - AreaSummary: synthesize each area's sources
//! - Aggregating: combine the area summaries into a final report
//!
//! Progress is reported as a lazy stream of [`ResearchEvent`]s.

pub mod pipeline;
pub mod planner;
pub mod progress;
pub mod prompts;
pub mod sink;
pub mod types;

pub use pipeline::{ResearchPipeline, ResearchRun};
pub use planner::{extract_query, parse_plan, render_plan};
pub use progress::ProgressTracker;
pub use sink::{drive, ProgressSink};
pub use types::*;
