//! AskUser step — routes open questions to the human operator.
//!
//! Completing this step is the run's suspension point: it emits no event,
//! so the branch goes quiescent and the engine reports the run suspended.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::WorkflowError;
use crate::notify::UserMessenger;
use crate::workflow::engine::{EventSink, StepInput, WorkflowStep};
use crate::workflow::events::EventData;
use crate::workflow::graph::StepId;
use crate::workflow::types::ThreadsCollection;

pub struct AskUserStep {
    messenger: Arc<UserMessenger>,
    pub threads: Option<ThreadsCollection>,
}

impl AskUserStep {
    pub fn new(messenger: Arc<UserMessenger>, threads: Option<ThreadsCollection>) -> Self {
        Self { messenger, threads }
    }
}

#[async_trait]
impl WorkflowStep for AskUserStep {
    fn id(&self) -> StepId {
        StepId::AskUser
    }

    async fn invoke(
        &mut self,
        function: &str,
        input: StepInput,
        _sink: &mut EventSink,
    ) -> Result<(), WorkflowError> {
        match (function, input) {
            ("init", StepInput::Event(EventData::Setup(setup))) => {
                self.threads = Some(setup.threads);
                Ok(())
            }
            ("execute", StepInput::Event(EventData::Questions(unanswered))) => {
                self.messenger
                    .ask_user_to_answer_questions(&unanswered)
                    .await
                    .map_err(WorkflowError::from)
            }
            ("execute", other) => Err(WorkflowError::UnexpectedInput {
                step: "ask_user".into(),
                function: "execute".into(),
                reason: format!("expected a questions payload, got {other:?}"),
            }),
            (other, _) => Err(WorkflowError::UnknownFunction {
                step: "ask_user".into(),
                function: other.into(),
            }),
        }
    }
}
