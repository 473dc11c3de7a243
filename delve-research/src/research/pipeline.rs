//! Research pipeline: plan, iterative per-area search, per-area summary and
//! final aggregation, exposed as a lazy stream of [`ResearchEvent`]s.

use super::planner::{extract_query, parse_plan, render_plan};
use super::progress::ProgressTracker;
use super::prompts;
use super::types::*;
use chrono::Utc;
use delve_core::{
    log_operation_error, log_operation_start, log_operation_success, performance, DelveError,
    DelveResult, ErrorContext, ResearchConfig, SourceFetcher,
};
use delve_llm::{GenerationClient, GenerationRequest};
use futures::stream::{BoxStream, Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Drives a [`GenerationClient`] and a [`SourceFetcher`] through one research run.
///
/// The pipeline itself holds no per-run state; every call to [`run`] gets its
/// own areas, config and progress, so runs can proceed concurrently.
///
/// [`run`]: ResearchPipeline::run
#[derive(Clone)]
pub struct ResearchPipeline {
    client: GenerationClient,
    fetcher: Arc<dyn SourceFetcher>,
}

impl ResearchPipeline {
    pub fn new(client: GenerationClient, fetcher: Arc<dyn SourceFetcher>) -> Self {
        Self { client, fetcher }
    }

    /// Start a research run.
    ///
    /// Nothing happens until the returned run is polled. The run ends with
    /// exactly one `Complete` or `Failed` event.
    pub fn run(&self, topic: impl Into<String>, config: ResearchConfig) -> ResearchRun {
        let run = RunContext {
            run_id: Uuid::new_v4().to_string(),
            topic: topic.into().trim().to_string(),
            config,
            client: self.client.clone(),
            fetcher: Arc::clone(&self.fetcher),
        };
        let run_id = run.run_id.clone();

        ResearchRun::new(run_id, run.into_events())
    }
}

/// A single research run, consumed as a stream of events.
///
/// Dropping the run, or calling [`cleanup`](ResearchRun::cleanup), drops the
/// in-flight state machine together with any open model response.
pub struct ResearchRun {
    run_id: String,
    inner: Option<BoxStream<'static, ResearchEvent>>,
}

impl ResearchRun {
    fn new(run_id: String, inner: BoxStream<'static, ResearchEvent>) -> Self {
        Self {
            run_id,
            inner: Some(inner),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Whether the run has ended, by terminal event or cleanup
    pub fn is_finished(&self) -> bool {
        self.inner.is_none()
    }

    /// Release everything the run holds. Safe to call more than once; no
    /// events are produced afterwards.
    pub fn cleanup(&mut self) {
        if self.inner.take().is_some() {
            debug!(run_id = %self.run_id, "Released research run resources");
        }
    }
}

impl Stream for ResearchRun {
    type Item = ResearchEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };

        match inner.poll_next_unpin(cx) {
            Poll::Ready(Some(event)) => {
                if event.is_terminal() {
                    this.cleanup();
                }
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => {
                this.cleanup();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for ResearchRun {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Everything one run owns
struct RunContext {
    run_id: String,
    topic: String,
    config: ResearchConfig,
    client: GenerationClient,
    fetcher: Arc<dyn SourceFetcher>,
}

impl RunContext {
    fn into_events(self) -> BoxStream<'static, ResearchEvent> {
        let events = async_stream::stream! {
            let started = Instant::now();

            if let Err(err) = self.validate() {
                yield self.failed(
                    ProgressTracker::new(0, 0).snapshot(ResearchStage::Error, "Research could not start"),
                    ResearchStage::Planning,
                    err,
                );
                return;
            }

            log_operation_start!(
                "research_run",
                run_id = %self.run_id,
                topic = %self.topic,
                depth = self.config.search_depth,
                max_sources = self.config.max_sources
            );

            // Planning
            let mut areas = match self.plan().await {
                Ok(areas) => areas,
                Err(err) => {
                    yield self.failed(
                        ProgressTracker::new(0, 0).snapshot(ResearchStage::Error, "Planning failed"),
                        ResearchStage::Planning,
                        err,
                    );
                    return;
                }
            };
            let depth = self.config.search_depth;
            let area_count = areas.len();
            let mut tracker = ProgressTracker::new(area_count, depth);
            yield ResearchEvent::Progress(
                tracker.advance(ResearchStage::Planning, render_plan(&areas)),
            );

            // Search, area by area in plan order
            for (index, area) in areas.iter_mut().enumerate() {
                for iteration in 1..=depth {
                    match self.search_iteration(area, iteration).await {
                        Ok(outcome) => {
                            let message = format!(
                                "Area {}/{} \"{}\", iteration {}/{}: {}",
                                index + 1,
                                area_count,
                                area.name,
                                iteration,
                                depth,
                                outcome
                            );
                            yield ResearchEvent::Progress(
                                tracker.advance(ResearchStage::AreaSearch, message),
                            );
                        }
                        Err(err) => {
                            yield self.failed(
                                tracker.snapshot(ResearchStage::Error, format!("Search failed for \"{}\"", area.name)),
                                ResearchStage::AreaSearch,
                                err,
                            );
                            return;
                        }
                    }
                }
            }

            // Summaries
            for (index, area) in areas.iter_mut().enumerate() {
                match self.summarize(area).await {
                    Ok(()) => {
                        let message = format!(
                            "Summarized area {}/{} \"{}\" from {} sources",
                            index + 1,
                            area_count,
                            area.name,
                            area.sources.len()
                        );
                        yield ResearchEvent::Progress(
                            tracker.advance(ResearchStage::AreaSummary, message),
                        );
                    }
                    Err(err) => {
                        yield self.failed(
                            tracker.snapshot(ResearchStage::Error, format!("Summary failed for \"{}\"", area.name)),
                            ResearchStage::AreaSummary,
                            err,
                        );
                        return;
                    }
                }
            }

            // Aggregation; its completion is the final step
            match self.aggregate(&areas).await {
                Ok(text) => {
                    let report = ResearchReport {
                        run_id: self.run_id.clone(),
                        topic: self.topic.clone(),
                        text,
                        areas,
                        completed_at: Utc::now(),
                    };
                    log_operation_success!(
                        "research_run",
                        run_id = %self.run_id,
                        areas = report.areas.len(),
                        sources = report.source_count(),
                        duration_ms = started.elapsed().as_millis() as u64
                    );
                    let progress = tracker.advance(ResearchStage::Complete, "Research complete");
                    yield ResearchEvent::Complete { progress, report };
                }
                Err(err) => {
                    yield self.failed(
                        tracker.snapshot(ResearchStage::Error, "Aggregation failed"),
                        ResearchStage::Aggregating,
                        err,
                    );
                }
            }
        };

        events.boxed()
    }

    fn validate(&self) -> DelveResult<()> {
        if self.topic.is_empty() {
            return Err(DelveError::Validation {
                message: "Research topic must not be empty".to_string(),
                field: Some("topic".to_string()),
                context: ErrorContext::new("research_pipeline").with_operation("run"),
            });
        }
        self.config.validate()
    }

    fn failed(&self, progress: ProgressEvent, stage: ResearchStage, err: DelveError) -> ResearchEvent {
        log_operation_error!("research_run", err, run_id = %self.run_id, stage = %stage);
        ResearchEvent::Failed {
            error: format!("{} failed: {}", stage, err),
            progress,
            failed_stage: stage,
        }
    }

    async fn plan(&self) -> DelveResult<Vec<ResearchArea>> {
        let prompt = prompts::plan_prompt(&self.topic, self.config.max_areas);
        let reply = self.complete("plan", prompt).await?;
        let areas = parse_plan(&reply, self.config.max_areas)?;

        info!(run_id = %self.run_id, areas = areas.len(), "Research plan ready");
        Ok(areas)
    }

    /// Run one search iteration and describe what it did
    async fn search_iteration(&self, area: &mut ResearchArea, iteration: usize) -> DelveResult<String> {
        let cap = self.config.max_sources;
        if area.sources.len() >= cap {
            debug!(area = %area.name, iteration, "Source limit reached, skipping iteration");
            return Ok(format!("source limit of {} reached, skipped", cap));
        }

        let query = if iteration == 1 {
            area.seed_query()
        } else {
            let prompt = prompts::refine_query_prompt(&self.topic, area);
            let reply = self.complete("refine_query", prompt).await?;
            extract_query(&reply, &area.name)
        };
        area.queries.push(query.clone());

        let budget = cap - area.sources.len();
        let fetched = match self.fetcher.fetch(&query, budget).await {
            Ok(sources) => sources,
            Err(err) => {
                warn!(
                    fetcher = self.fetcher.name(),
                    area = %area.name,
                    query = %query,
                    error = %err,
                    "Source fetch failed, continuing with no new sources"
                );
                Vec::new()
            }
        };
        let added = area.merge_sources(fetched, cap);

        debug!(area = %area.name, iteration, query = %query, added, total = area.sources.len(), "Search iteration done");
        Ok(format!("\"{}\" added {} sources ({} total)", query, added, area.sources.len()))
    }

    async fn summarize(&self, area: &mut ResearchArea) -> DelveResult<()> {
        let prompt = prompts::summary_prompt(&self.topic, area);
        area.summary = self.complete("area_summary", prompt).await?;
        Ok(())
    }

    async fn aggregate(&self, areas: &[ResearchArea]) -> DelveResult<String> {
        let prompt = prompts::aggregate_prompt(&self.topic, areas);
        self.complete("aggregate", prompt).await
    }

    /// One model call, drained to its final text. Blank replies are errors.
    async fn complete(&self, stage: &str, prompt: String) -> DelveResult<String> {
        let request = GenerationRequest::new(self.config.model.clone(), prompt)
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_tokens)
            .streaming(self.config.stream);

        let output = performance::measure_async(stage, self.client.generate_text(request)).await?;
        if output.text.trim().is_empty() {
            return Err(DelveError::EmptyResponse {
                stage: stage.to_string(),
                context: ErrorContext::new("research_pipeline").with_operation(stage),
            });
        }
        Ok(output.text)
    }
}
