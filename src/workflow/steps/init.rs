//! Init step — opens the run's three conversational threads.

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::error::{AnswererError, WorkflowError};
use crate::workflow::engine::{EventSink, StepInput, WorkflowStep};
use crate::workflow::events::{self, EventData, RunSetup};
use crate::workflow::graph::StepId;
use crate::workflow::types::{Email, ThreadsCollection};

use super::StepDeps;

/// Opens the main, FAQ, and RAG threads concurrently and seeds the main
/// thread with the email text.
pub struct InitStep {
    deps: StepDeps,
}

impl InitStep {
    pub fn new(deps: StepDeps) -> Self {
        Self { deps }
    }

    async fn execute(&self, email: Email, sink: &mut EventSink) -> Result<(), WorkflowError> {
        // Fixed fan-out of exactly three creations, awaited jointly; any
        // failure fails initialization.
        let (main_thread_id, faq_thread_id, rag_thread_id) = tokio::try_join!(
            self.create_thread_with_retry(),
            self.create_thread_with_retry(),
            self.create_thread_with_retry(),
        )?;

        self.deps
            .answerer
            .post_message(&main_thread_id, &email.as_thread_message())
            .await
            .map_err(WorkflowError::from)?;

        let threads = ThreadsCollection {
            main_thread_id,
            faq_thread_id,
            rag_thread_id,
        };
        sink.emit(
            events::INITIALIZED,
            EventData::Setup(RunSetup { email, threads }),
        );
        Ok(())
    }

    /// Thread creation may fail transiently and is safe to retry: a failed
    /// attempt never leaves a half-created thread behind.
    async fn create_thread_with_retry(&self) -> Result<String, WorkflowError> {
        let attempts = self.deps.thread_create_retries.max(1);
        let mut last_reason = String::new();

        for attempt in 1..=attempts {
            match self.deps.answerer.create_thread().await {
                Ok(id) => return Ok(id),
                Err(e) => {
                    warn!(attempt, attempts, error = %e, "Thread creation failed");
                    last_reason = e.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(Duration::from_millis(100 * u64::from(attempt))).await;
                    }
                }
            }
        }

        Err(WorkflowError::from(AnswererError::ThreadCreation {
            attempts,
            reason: last_reason,
        }))
    }
}

#[async_trait]
impl WorkflowStep for InitStep {
    fn id(&self) -> StepId {
        StepId::Init
    }

    async fn invoke(
        &mut self,
        function: &str,
        input: StepInput,
        sink: &mut EventSink,
    ) -> Result<(), WorkflowError> {
        match (function, input) {
            ("execute", StepInput::Event(EventData::Email(email))) => {
                self.execute(email, sink).await
            }
            ("execute", other) => Err(WorkflowError::UnexpectedInput {
                step: "init".into(),
                function: "execute".into(),
                reason: format!("expected an email payload, got {other:?}"),
            }),
            (other, _) => Err(WorkflowError::UnknownFunction {
                step: "init".into(),
                function: other.into(),
            }),
        }
    }
}
