//! Delivering run events to a consumer

use super::pipeline::ResearchRun;
use super::types::{ResearchEvent, ResearchReport};
use crate::{ResearchError, ResearchResult};
use futures::StreamExt;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

/// Receives every event of a run, in emission order.
///
/// `accept` must return promptly; the run does not advance until it does.
pub trait ProgressSink: Send {
    fn accept(&mut self, event: &ResearchEvent);
}

impl<F> ProgressSink for F
where
    F: FnMut(&ResearchEvent) + Send,
{
    fn accept(&mut self, event: &ResearchEvent) {
        self(event)
    }
}

/// Forwards events to another task. A closed receiver is ignored.
impl ProgressSink for UnboundedSender<ResearchEvent> {
    fn accept(&mut self, event: &ResearchEvent) {
        if self.send(event.clone()).is_err() {
            debug!("Progress receiver dropped, event discarded");
        }
    }
}

/// Push every event of `run` into `sink` and return the outcome.
///
/// The run is cleaned up before returning, whatever the outcome.
pub async fn drive<S>(mut run: ResearchRun, sink: &mut S) -> ResearchResult<ResearchReport>
where
    S: ProgressSink + ?Sized,
{
    let mut outcome = Err(ResearchError::Interrupted);

    while let Some(event) = run.next().await {
        sink.accept(&event);
        match event {
            ResearchEvent::Progress(_) => {}
            ResearchEvent::Complete { report, .. } => {
                outcome = Ok(report);
                break;
            }
            ResearchEvent::Failed {
                failed_stage,
                error,
                ..
            } => {
                outcome = Err(ResearchError::Failed {
                    stage: failed_stage,
                    message: error,
                });
                break;
            }
        }
    }

    run.cleanup();
    outcome
}
