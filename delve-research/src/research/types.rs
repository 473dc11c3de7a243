//! Types for the research pipeline

use chrono::{DateTime, Utc};
use delve_core::SourceRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A sub-topic of the research query, processed independently
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchArea {
    /// Short name of the area
    pub name: String,
    /// What the area should cover
    pub description: String,
    /// Queries issued for this area, one per executed iteration
    pub queries: Vec<String>,
    /// Sources collected across iterations, unique by url
    pub sources: Vec<SourceRecord>,
    /// Synthesis of the sources, set once by the summary stage
    pub summary: String,
}

impl ResearchArea {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            queries: Vec::new(),
            sources: Vec::new(),
            summary: String::new(),
        }
    }

    /// Query used for the first iteration
    pub fn seed_query(&self) -> String {
        if self.description.is_empty() || self.description == self.name {
            self.name.clone()
        } else {
            format!("{} {}", self.name, self.description)
        }
    }

    /// Merge new sources, skipping known urls and anything beyond `cap`.
    ///
    /// Returns the number of sources actually added.
    pub fn merge_sources(&mut self, incoming: Vec<SourceRecord>, cap: usize) -> usize {
        let mut seen: HashSet<String> = self.sources.iter().map(|s| s.url.clone()).collect();
        let before = self.sources.len();

        for source in incoming {
            if self.sources.len() >= cap {
                break;
            }
            if seen.insert(source.url.clone()) {
                self.sources.push(source);
            }
        }

        self.sources.len() - before
    }
}

/// Pipeline stage tags, used by consumers to route events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResearchStage {
    Planning,
    AreaSearch,
    AreaSummary,
    Aggregating,
    Complete,
    Error,
}

impl std::fmt::Display for ResearchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResearchStage::Planning => write!(f, "Planning"),
            ResearchStage::AreaSearch => write!(f, "AreaSearch"),
            ResearchStage::AreaSummary => write!(f, "AreaSummary"),
            ResearchStage::Aggregating => write!(f, "Aggregating"),
            ResearchStage::Complete => write!(f, "Complete"),
            ResearchStage::Error => write!(f, "Error"),
        }
    }
}

/// Progress update emitted by a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub stage: ResearchStage,
    /// Human-readable description of the step that just finished
    pub message: String,
    /// Fraction of the run completed, in [0, 1]
    pub fraction: f64,
}

/// Final result of a successful run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchReport {
    pub run_id: String,
    pub topic: String,
    /// Aggregated report text as produced by the model
    pub text: String,
    /// Areas in plan order, with their sources and summaries
    pub areas: Vec<ResearchArea>,
    pub completed_at: DateTime<Utc>,
}

impl ResearchReport {
    pub fn source_count(&self) -> usize {
        self.areas.iter().map(|a| a.sources.len()).sum()
    }

    /// Render the report and its per-area sources as markdown
    pub fn to_markdown(&self) -> String {
        let mut out = format!("# {}\n\n{}\n", self.topic, self.text.trim());

        for area in &self.areas {
            out.push_str(&format!("\n## {}\n\n{}\n", area.name, area.summary.trim()));
            if !area.sources.is_empty() {
                out.push_str("\nSources:\n");
                for source in &area.sources {
                    out.push_str(&format!("- [{}]({})\n", source.title, source.url));
                }
            }
        }

        out
    }
}

/// Item type of a research run
#[derive(Debug, Clone, PartialEq)]
pub enum ResearchEvent {
    Progress(ProgressEvent),
    Complete {
        progress: ProgressEvent,
        report: ResearchReport,
    },
    Failed {
        progress: ProgressEvent,
        /// Stage that was running when the failure happened
        failed_stage: ResearchStage,
        error: String,
    },
}

impl ResearchEvent {
    pub fn progress(&self) -> &ProgressEvent {
        match self {
            ResearchEvent::Progress(progress) => progress,
            ResearchEvent::Complete { progress, .. } => progress,
            ResearchEvent::Failed { progress, .. } => progress,
        }
    }

    pub fn stage(&self) -> ResearchStage {
        self.progress().stage
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ResearchEvent::Progress(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(url: &str) -> SourceRecord {
        SourceRecord::new(format!("title {}", url), url, "snippet")
    }

    #[test]
    fn merge_deduplicates_by_url() {
        let mut area = ResearchArea::new("Hardware", "Qubit technologies");
        assert_eq!(area.merge_sources(vec![source("a"), source("b"), source("a")], 10), 2);
        assert_eq!(area.merge_sources(vec![source("b"), source("c")], 10), 1);

        let urls: Vec<_> = area.sources.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(urls, vec!["a", "b", "c"]);
    }

    #[test]
    fn merge_respects_cap() {
        let mut area = ResearchArea::new("Hardware", "");
        let added = area.merge_sources((0..8).map(|i| source(&i.to_string())).collect(), 5);
        assert_eq!(added, 5);
        assert_eq!(area.merge_sources(vec![source("late")], 5), 0);
    }

    #[test]
    fn seed_query_falls_back_to_name() {
        assert_eq!(ResearchArea::new("Algorithms", "").seed_query(), "Algorithms");
        assert_eq!(
            ResearchArea::new("Algorithms", "Shor and Grover").seed_query(),
            "Algorithms Shor and Grover"
        );
    }
}
