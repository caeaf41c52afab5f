//! Workflow step implementations.

pub mod ask_user;
pub mod init;
pub mod knowledge;
pub mod orchestrator;
pub mod reply;
pub mod triage;

pub use ask_user::AskUserStep;
pub use init::InitStep;
pub use knowledge::{KnowledgeSource, KnowledgeStep};
pub use orchestrator::{OrchestratorState, OrchestratorStep, merge_answers};
pub use reply::ReplyStep;
pub use triage::TriageStep;

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::answerer::{AgentCache, Answerer};
use crate::config::PollConfig;
use crate::notify::UserMessenger;
use crate::workflow::engine::WorkflowStep;
use crate::workflow::trace::WorkflowObserver;
use crate::workflow::types::ThreadsCollection;

/// Shared collaborators injected into every step.
#[derive(Clone)]
pub struct StepDeps {
    pub answerer: Arc<dyn Answerer>,
    pub agents: Arc<AgentCache>,
    pub messenger: Arc<UserMessenger>,
    pub observer: Arc<dyn WorkflowObserver>,
    pub poll: PollConfig,
    /// Bounded retries for transient thread-creation failures.
    pub thread_create_retries: u32,
}

/// Assemble the standard step set for one run.
///
/// `state` is the orchestrator's accumulation, shared with the service so it
/// can snapshot after a drive. On resumption, `restored_threads` pre-binds
/// every step's thread state — the `initialized` event only fires on fresh
/// runs.
pub fn standard_steps(
    deps: &StepDeps,
    state: Arc<RwLock<OrchestratorState>>,
    restored_threads: Option<&ThreadsCollection>,
) -> Vec<Box<dyn WorkflowStep>> {
    vec![
        Box::new(InitStep::new(deps.clone())),
        Box::new(TriageStep::new(deps.clone(), restored_threads.cloned())),
        Box::new(KnowledgeStep::new(
            KnowledgeSource::Faq,
            deps.clone(),
            restored_threads.cloned(),
        )),
        Box::new(KnowledgeStep::new(
            KnowledgeSource::Rag,
            deps.clone(),
            restored_threads.cloned(),
        )),
        Box::new(OrchestratorStep::new(state)),
        Box::new(AskUserStep::new(
            Arc::clone(&deps.messenger),
            restored_threads.cloned(),
        )),
        Box::new(ReplyStep::new(deps.clone(), restored_threads.cloned())),
    ]
}
