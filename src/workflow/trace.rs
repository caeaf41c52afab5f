//! Workflow observability — a structured event log collaborator.
//!
//! Steps and the engine report progress here instead of printing; the
//! observer is never a control dependency. The default forwards to
//! `tracing`; `RecordingObserver` captures entries for assertions.

use std::sync::Mutex;

use tracing::info;

use super::events::EventData;
use super::graph::{Source, StepId};

/// Receives structured workflow progress events.
pub trait WorkflowObserver: Send + Sync {
    fn on_step_started(&self, step: StepId, function: &str) {
        let _ = (step, function);
    }

    fn on_step_completed(&self, step: StepId, function: &str) {
        let _ = (step, function);
    }

    fn on_event_emitted(&self, source: Source, event: &str, data: &EventData) {
        let _ = (source, event, data);
    }

    /// A chunk of streamed reply text.
    fn on_reply_chunk(&self, chunk: &str) {
        let _ = chunk;
    }

    fn on_run_suspended(&self, email_id: &str) {
        let _ = email_id;
    }

    fn on_run_completed(&self, email_id: &str) {
        let _ = email_id;
    }
}

/// Default observer: structured tracing output.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl WorkflowObserver for TracingObserver {
    fn on_step_started(&self, step: StepId, function: &str) {
        info!(step = %step, function, "Step started");
    }

    fn on_step_completed(&self, step: StepId, function: &str) {
        info!(step = %step, function, "Step completed");
    }

    fn on_event_emitted(&self, source: Source, event: &str, data: &EventData) {
        let source = match source {
            Source::External => "external",
            Source::Step(id) => id.name(),
        };
        info!(source, event, payload = data.label(), "Event emitted");
    }

    fn on_run_suspended(&self, email_id: &str) {
        info!(email_id, "Run suspended awaiting operator input");
    }

    fn on_run_completed(&self, email_id: &str) {
        info!(email_id, "Run completed");
    }
}

/// One recorded observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    StepStarted(StepId, String),
    StepCompleted(StepId, String),
    EventEmitted(String),
    ReplyChunk(String),
    Suspended(String),
    Completed(String),
}

/// Observer that records everything, for tests.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    entries: Mutex<Vec<Observation>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<Observation> {
        self.entries.lock().expect("observer lock poisoned").clone()
    }

    fn record(&self, observation: Observation) {
        self.entries
            .lock()
            .expect("observer lock poisoned")
            .push(observation);
    }
}

impl WorkflowObserver for RecordingObserver {
    fn on_step_started(&self, step: StepId, function: &str) {
        self.record(Observation::StepStarted(step, function.to_string()));
    }

    fn on_step_completed(&self, step: StepId, function: &str) {
        self.record(Observation::StepCompleted(step, function.to_string()));
    }

    fn on_event_emitted(&self, _source: Source, event: &str, _data: &EventData) {
        self.record(Observation::EventEmitted(event.to_string()));
    }

    fn on_reply_chunk(&self, chunk: &str) {
        self.record(Observation::ReplyChunk(chunk.to_string()));
    }

    fn on_run_suspended(&self, email_id: &str) {
        self.record(Observation::Suspended(email_id.to_string()));
    }

    fn on_run_completed(&self, email_id: &str) {
        self.record(Observation::Completed(email_id.to_string()));
    }
}
