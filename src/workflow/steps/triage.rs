//! Triage step — extracts the open questions from the inbound email.

use async_trait::async_trait;
use tracing::info;

use crate::answerer::{AgentRole, extract_json_object};
use crate::error::WorkflowError;
use crate::workflow::engine::{EventSink, StepInput, WorkflowStep};
use crate::workflow::events::{self, EventData};
use crate::workflow::graph::StepId;
use crate::workflow::types::{Email, QuestionAnswer, ThreadsCollection, TriageResult};

use super::StepDeps;

const TRIAGE_SCHEMA: &str = r#"{"questions": ["..."]}"#;

/// Asks the triage agent, bound to the main thread, which questions must be
/// answered before a reply can go out.
pub struct TriageStep {
    deps: StepDeps,
    threads: Option<ThreadsCollection>,
    email: Option<Email>,
}

impl TriageStep {
    pub fn new(deps: StepDeps, threads: Option<ThreadsCollection>) -> Self {
        Self {
            deps,
            threads,
            email: None,
        }
    }

    async fn execute(&mut self, sink: &mut EventSink) -> Result<(), WorkflowError> {
        let (threads, email) = match (&self.threads, &self.email) {
            (Some(t), Some(e)) => (t, e),
            _ => {
                return Err(WorkflowError::UnexpectedInput {
                    step: "triage".into(),
                    function: "execute".into(),
                    reason: "step was not initialized with threads and email".into(),
                });
            }
        };

        let agent = self.deps.agents.resolve(AgentRole::Triage).await?;
        let raw = self
            .deps
            .answerer
            .invoke_structured(
                &agent.id,
                &threads.main_thread_id,
                &build_triage_prompt(email),
                TRIAGE_SCHEMA,
            )
            .await?;

        // Fatal for the run: surfaced, not retried.
        let result: TriageResult = serde_json::from_str(&extract_json_object(&raw))
            .map_err(|e| WorkflowError::MalformedStructuredOutput {
                step: "triage".into(),
                reason: format!("{e}; raw output: {raw}"),
            })?;

        let questions: Vec<QuestionAnswer> = result
            .questions
            .into_iter()
            .map(|q| QuestionAnswer::new_unanswered(&email.id, q))
            .collect();

        info!(
            email_id = %email.id,
            count = questions.len(),
            "Triage extracted open questions"
        );
        sink.emit(events::QUESTIONS_TRIAGED, EventData::Questions(questions));
        Ok(())
    }
}

#[async_trait]
impl WorkflowStep for TriageStep {
    fn id(&self) -> StepId {
        StepId::Triage
    }

    async fn invoke(
        &mut self,
        function: &str,
        input: StepInput,
        sink: &mut EventSink,
    ) -> Result<(), WorkflowError> {
        match (function, input) {
            ("init", StepInput::Event(EventData::Setup(setup))) => {
                self.threads = Some(setup.threads);
                self.email = Some(setup.email);
                // Binding complete — trigger our own execute via the graph.
                sink.emit(events::TRIAGE_READY, EventData::Empty);
                Ok(())
            }
            ("execute", _) => self.execute(sink).await,
            (other, _) => Err(WorkflowError::UnknownFunction {
                step: "triage".into(),
                function: other.into(),
            }),
        }
    }
}

/// Prompt for the triage pass. The email itself is already on the main
/// thread; repeating the body keeps the agent self-contained.
fn build_triage_prompt(email: &Email) -> String {
    format!(
        "Review this customer email and list every open question that must be \
         answered before support can reply.\n\n{}",
        email.as_thread_message()
    )
}
