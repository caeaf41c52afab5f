//! Workflow service — the façade over runs.
//!
//! `start_workflow` drives a fresh run to its first suspension or terminal
//! point; `continue_workflow` resumes a suspended run with operator answers.
//! Each call is one atomic drive: the snapshot is persisted only after the
//! drive returns, so a failed or cancelled drive leaves the last checkpoint
//! untouched, and a per-email mutex serializes overlapping drives of the
//! same run.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::error::Error;
use crate::stores::ProcessStore;

use super::engine::{DriveOutcome, RunState, WorkflowEngine, WorkflowSnapshot};
use super::events::{self, EventData};
use super::graph::support_graph;
use super::steps::{OrchestratorState, StepDeps, standard_steps};
use super::types::{Email, QuestionAnswer};

pub struct WorkflowService {
    deps: StepDeps,
    processes: Arc<dyn ProcessStore>,
    /// Per-email drive locks. Keys are independent runs; only drives of the
    /// same email id contend.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl WorkflowService {
    pub fn new(deps: StepDeps, processes: Arc<dyn ProcessStore>) -> Self {
        Self {
            deps,
            processes,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Start a run for a new email and drive it to suspension or completion.
    pub async fn start_workflow(&self, email: Email) -> Result<DriveOutcome, Error> {
        let lock = self.lock_for(&email.id).await;
        let _guard = lock.lock().await;

        info!(email_id = %email.id, from = %email.from, "Starting workflow");

        let state = Arc::new(RwLock::new(OrchestratorState::default()));
        let steps = standard_steps(&self.deps, Arc::clone(&state), None);
        let mut engine =
            WorkflowEngine::new(support_graph(), steps, Arc::clone(&self.deps.observer));

        let outcome = engine
            .drive(events::START_PROCESS, EventData::Email(email.clone()))
            .await?;

        self.checkpoint(&email.id, &state, outcome.status).await?;
        self.report(&email.id, &outcome);
        Ok(outcome)
    }

    /// Resume a suspended run with the operator's answers.
    ///
    /// An unknown or already-completed email id is logged and reported as
    /// `None` — nothing to resume, never an error.
    pub async fn continue_workflow(
        &self,
        email_id: &str,
        answers: Vec<QuestionAnswer>,
    ) -> Result<Option<DriveOutcome>, Error> {
        let lock = self.lock_for(email_id).await;
        let _guard = lock.lock().await;

        let Some(snapshot) = self.processes.get(email_id).await? else {
            warn!(email_id, "No process state found; nothing to resume");
            return Ok(None);
        };
        if snapshot.status == RunState::Completed {
            warn!(email_id, "Run already completed; ignoring answers");
            return Ok(None);
        }

        info!(
            email_id,
            answers = answers.len(),
            "Resuming workflow with operator answers"
        );

        let state = Arc::new(RwLock::new(OrchestratorState {
            email: Some(snapshot.email.clone()),
            threads: Some(snapshot.threads.clone()),
            question_answers: snapshot.question_answers.clone(),
        }));
        let steps = standard_steps(&self.deps, Arc::clone(&state), Some(&snapshot.threads));
        let mut engine =
            WorkflowEngine::new(support_graph(), steps, Arc::clone(&self.deps.observer));

        let outcome = engine
            .drive(events::RECEIVE_USER_MESSAGE, EventData::Questions(answers))
            .await?;

        self.checkpoint(email_id, &state, outcome.status).await?;
        self.report(email_id, &outcome);
        Ok(Some(outcome))
    }

    /// Current lifecycle state of a run.
    pub async fn status(&self, email_id: &str) -> Result<RunState, Error> {
        Ok(self
            .processes
            .get(email_id)
            .await?
            .map(|s| s.status)
            .unwrap_or(RunState::NotStarted))
    }

    /// Persist the run's snapshot. Called only after a successful drive —
    /// all-or-nothing checkpointing.
    async fn checkpoint(
        &self,
        email_id: &str,
        state: &Arc<RwLock<OrchestratorState>>,
        status: RunState,
    ) -> Result<(), Error> {
        let state = state.read().await;
        let (Some(email), Some(threads)) = (state.email.clone(), state.threads.clone()) else {
            // A drive that never initialized has nothing worth resuming.
            warn!(email_id, "Drive finished without bound run state; skipping checkpoint");
            return Ok(());
        };

        let snapshot = WorkflowSnapshot {
            email,
            threads,
            question_answers: state.question_answers.clone(),
            status,
        };
        self.processes.save(email_id, snapshot).await?;
        Ok(())
    }

    fn report(&self, email_id: &str, outcome: &DriveOutcome) {
        match outcome.status {
            RunState::Completed => self.deps.observer.on_run_completed(email_id),
            RunState::Suspended => self.deps.observer.on_run_suspended(email_id),
            _ => {}
        }
    }

    async fn lock_for(&self, email_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(
            locks
                .entry(email_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }
}
