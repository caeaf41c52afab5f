//! The workflow engine — a generic dispatcher over a [`ProcessGraph`].
//!
//! The engine owns the step instances and a FIFO of pending invocations.
//! Dispatching an event looks up the graph's routing table and either
//! enqueues an invocation directly or, for fan-in functions, buffers the
//! payload until every declared parameter has arrived. Queued invocations
//! are drained in waves; distinct steps within a wave run concurrently, so
//! the FAQ and RAG passes overlap.
//!
//! A drive ends when the queue is empty: if a declared stop event fired the
//! run is complete, otherwise it is suspended awaiting an external event.
//! Cancellation is dropping the drive future; the engine persists nothing
//! itself.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::WorkflowError;

use super::events::EventData;
use super::graph::{ProcessGraph, Source, StepId};
use super::trace::WorkflowObserver;
use super::types::{Email, QuestionAnswer, ThreadsCollection};

// ── Step contract ───────────────────────────────────────────────────

/// Input to one step-function invocation.
#[derive(Debug, Clone)]
pub enum StepInput {
    /// Payload of the single triggering event.
    Event(EventData),
    /// Joined payloads of a fan-in function, in declared parameter order.
    Join(Vec<(&'static str, EventData)>),
}

/// Collects the events a step function emits during one invocation.
#[derive(Debug, Default)]
pub struct EventSink {
    emitted: Vec<(&'static str, EventData)>,
}

impl EventSink {
    pub fn emit(&mut self, event: &'static str, data: EventData) {
        self.emitted.push((event, data));
    }

    /// The events emitted so far, in order.
    pub fn emitted(&self) -> &[(&'static str, EventData)] {
        &self.emitted
    }

    fn drain(&mut self) -> Vec<(&'static str, EventData)> {
        std::mem::take(&mut self.emitted)
    }
}

/// A unit of the workflow with one or more named entry points.
///
/// Steps hold their own per-run state (bound threads, accumulated answers)
/// and communicate only through emitted events.
#[async_trait]
pub trait WorkflowStep: Send + Sync {
    fn id(&self) -> StepId;

    async fn invoke(
        &mut self,
        function: &str,
        input: StepInput,
        sink: &mut EventSink,
    ) -> Result<(), WorkflowError>;
}

// ── Run state & snapshots ───────────────────────────────────────────

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    NotStarted,
    Running,
    /// Paused at AskUser, awaiting operator answers.
    Suspended,
    Completed,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotStarted => "not_started",
            Self::Running => "running",
            Self::Suspended => "suspended",
            Self::Completed => "completed",
        };
        write!(f, "{s}")
    }
}

/// Serializable capture of a run, sufficient to resume it.
///
/// The graph's only suspension point is after AskUser, so the orchestrator's
/// accumulated answers plus the run's threads pin the resume position
/// exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    pub email: Email,
    pub threads: ThreadsCollection,
    pub question_answers: Vec<QuestionAnswer>,
    pub status: RunState,
}

/// Result of one drive of the engine.
#[derive(Debug, Clone)]
pub struct DriveOutcome {
    pub status: RunState,
    /// The composed customer reply, present when the run completed.
    pub reply: Option<String>,
}

// ── Engine ──────────────────────────────────────────────────────────

struct Invocation {
    step: StepId,
    function: &'static str,
    input: StepInput,
}

/// Generic dispatcher driving steps over a process graph.
pub struct WorkflowEngine {
    graph: ProcessGraph,
    steps: HashMap<StepId, Box<dyn WorkflowStep>>,
    /// Buffered payloads for fan-in functions, keyed by `(step, function)`.
    pending_joins: HashMap<(StepId, &'static str), HashMap<&'static str, EventData>>,
    queue: VecDeque<Invocation>,
    observer: Arc<dyn WorkflowObserver>,
    stopped: bool,
    reply: Option<String>,
}

impl WorkflowEngine {
    pub fn new(
        graph: ProcessGraph,
        steps: Vec<Box<dyn WorkflowStep>>,
        observer: Arc<dyn WorkflowObserver>,
    ) -> Self {
        Self {
            graph,
            steps: steps.into_iter().map(|s| (s.id(), s)).collect(),
            pending_joins: HashMap::new(),
            queue: VecDeque::new(),
            observer,
            stopped: false,
            reply: None,
        }
    }

    /// Inject an external event and drive the graph to its next suspension
    /// or terminal point.
    ///
    /// A step error aborts the drive and is surfaced as-is; nothing is
    /// persisted here, so the caller's last checkpoint stays untouched.
    pub async fn drive(
        &mut self,
        event: &'static str,
        data: EventData,
    ) -> Result<DriveOutcome, WorkflowError> {
        self.dispatch(Source::External, event, data);

        while !self.queue.is_empty() {
            let wave = self.take_wave();
            let emissions = self.run_wave(wave).await?;
            for (step, events) in emissions {
                for (event, data) in events {
                    self.dispatch(Source::Step(step), event, data);
                }
            }
        }

        let status = if self.stopped {
            RunState::Completed
        } else {
            RunState::Suspended
        };
        Ok(DriveOutcome {
            status,
            reply: self.reply.clone(),
        })
    }

    /// Drain the queue into per-step invocation lists, preserving the order
    /// in which steps first appear.
    fn take_wave(&mut self) -> Vec<(StepId, Vec<Invocation>)> {
        let mut wave: Vec<(StepId, Vec<Invocation>)> = Vec::new();
        for invocation in self.queue.drain(..) {
            match wave.iter_mut().find(|(id, _)| *id == invocation.step) {
                Some((_, list)) => list.push(invocation),
                None => wave.push((invocation.step, vec![invocation])),
            }
        }
        wave
    }

    /// Run one wave. Distinct steps execute concurrently; invocations of the
    /// same step run in order. Returns each step's emissions in wave order.
    async fn run_wave(
        &mut self,
        wave: Vec<(StepId, Vec<Invocation>)>,
    ) -> Result<Vec<(StepId, Vec<(&'static str, EventData)>)>, WorkflowError> {
        if let Some((id, _)) = wave.iter().find(|(id, _)| !self.steps.contains_key(id)) {
            return Err(WorkflowError::UnregisteredStep {
                step: id.to_string(),
            });
        }

        let mut futures = Vec::with_capacity(wave.len());
        for (id, invocations) in wave {
            let mut step = self.steps.remove(&id).expect("step presence checked");
            let observer = Arc::clone(&self.observer);

            futures.push(async move {
                let mut sink = EventSink::default();
                let mut result = Ok(());
                for invocation in invocations {
                    observer.on_step_started(id, invocation.function);
                    match step
                        .invoke(invocation.function, invocation.input, &mut sink)
                        .await
                    {
                        Ok(()) => observer.on_step_completed(id, invocation.function),
                        Err(e) => {
                            result = Err(e);
                            break;
                        }
                    }
                }
                (id, step, sink, result)
            });
        }

        let mut emissions = Vec::new();
        let mut first_error = None;
        for (id, step, mut sink, result) in join_all(futures).await {
            self.steps.insert(id, step);
            match result {
                Ok(()) => emissions.push((id, sink.drain())),
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(emissions),
        }
    }

    /// Route one event through the graph table.
    fn dispatch(&mut self, source: Source, event: &'static str, data: EventData) {
        self.observer.on_event_emitted(source, event, &data);

        let routes: Vec<_> = self
            .graph
            .routes(source, event)
            .into_iter()
            .cloned()
            .collect();

        if routes.is_empty() {
            if self.graph.is_stop_event(event) {
                self.stopped = true;
                if let EventData::Reply(text) = data {
                    self.reply = Some(text);
                }
            } else {
                // A branch that emits an unrouted event simply terminates.
                warn!(event, "Event has no subscribers; branch ends");
            }
            return;
        }

        for edge in routes {
            match self.graph.join_params(edge.to, edge.function) {
                Some(params) => {
                    let params: Vec<&'static str> = params.to_vec();
                    let Some(binding) = edge.binding else {
                        warn!(
                            step = %edge.to,
                            function = edge.function,
                            "Edge into a joining function lacks a parameter binding; dropped"
                        );
                        continue;
                    };
                    let buffer = self
                        .pending_joins
                        .entry((edge.to, edge.function))
                        .or_default();
                    buffer.insert(binding, data.clone());

                    if params.iter().all(|p| buffer.contains_key(p)) {
                        let mut buffer = self
                            .pending_joins
                            .remove(&(edge.to, edge.function))
                            .expect("join buffer just filled");
                        let joined = params
                            .iter()
                            .map(|p| (*p, buffer.remove(p).expect("param just checked")))
                            .collect();
                        self.queue.push_back(Invocation {
                            step: edge.to,
                            function: edge.function,
                            input: StepInput::Join(joined),
                        });
                    }
                }
                None => {
                    self.queue.push_back(Invocation {
                        step: edge.to,
                        function: edge.function,
                        input: StepInput::Event(data.clone()),
                    });
                }
            }
        }
    }
}
