//! Knowledge step — answers triaged questions from one knowledge source.
//!
//! FAQ and RAG share this implementation: the contracts are structurally
//! identical, only the dedicated thread and agent pair differ. Each instance
//! posts the whole question batch to its thread, drives its agent to
//! completion, then runs a to-JSON pass that converts the conversational
//! answer into `AgentAnswerResults`.

use async_trait::async_trait;
use tracing::info;

use crate::answerer::{AgentRole, extract_json_object, poll_run_until_terminal};
use crate::error::WorkflowError;
use crate::workflow::engine::{EventSink, StepInput, WorkflowStep};
use crate::workflow::events::{self, EventData};
use crate::workflow::graph::StepId;
use crate::workflow::types::{AgentAnswerResults, QuestionAnswer, ThreadsCollection};

use super::StepDeps;

const ANSWER_SCHEMA: &str = r#"{"answered_questions": [{"question_id": "...", "answer": "..."}], "unanswered_questions": ["..."]}"#;

/// Which knowledge source this step instance consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnowledgeSource {
    Faq,
    Rag,
}

impl KnowledgeSource {
    pub fn step_id(&self) -> StepId {
        match self {
            Self::Faq => StepId::Faq,
            Self::Rag => StepId::Rag,
        }
    }

    fn agent_role(&self) -> AgentRole {
        match self {
            Self::Faq => AgentRole::Faq,
            Self::Rag => AgentRole::Rag,
        }
    }

    fn to_json_role(&self) -> AgentRole {
        match self {
            Self::Faq => AgentRole::FaqToJson,
            Self::Rag => AgentRole::RagToJson,
        }
    }

    fn result_event(&self) -> &'static str {
        match self {
            Self::Faq => events::FAQ_ANSWERED,
            Self::Rag => events::RAG_ANSWERED,
        }
    }

    fn thread<'a>(&self, threads: &'a ThreadsCollection) -> &'a str {
        match self {
            Self::Faq => &threads.faq_thread_id,
            Self::Rag => &threads.rag_thread_id,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Faq => "faq",
            Self::Rag => "rag",
        }
    }
}

/// One knowledge source's answering pass.
pub struct KnowledgeStep {
    source: KnowledgeSource,
    deps: StepDeps,
    threads: Option<ThreadsCollection>,
}

impl KnowledgeStep {
    pub fn new(source: KnowledgeSource, deps: StepDeps, threads: Option<ThreadsCollection>) -> Self {
        Self {
            source,
            deps,
            threads,
        }
    }

    async fn execute(
        &self,
        mut questions: Vec<QuestionAnswer>,
        sink: &mut EventSink,
    ) -> Result<(), WorkflowError> {
        let threads = self.threads.as_ref().ok_or_else(|| {
            WorkflowError::UnexpectedInput {
                step: self.source.name().into(),
                function: "execute".into(),
                reason: "step was not initialized with threads".into(),
            }
        })?;

        if questions.is_empty() {
            sink.emit(self.source.result_event(), EventData::Questions(questions));
            return Ok(());
        }

        let thread_id = self.source.thread(threads);
        let agent = self.deps.agents.resolve(self.source.agent_role()).await?;

        // One batch message for the whole question set.
        self.deps
            .answerer
            .post_message(thread_id, &batch_message(&questions))
            .await
            .map_err(WorkflowError::from)?;

        let run = self
            .deps
            .answerer
            .create_run(thread_id, &agent.id)
            .await
            .map_err(WorkflowError::from)?;
        poll_run_until_terminal(self.deps.answerer.as_ref(), thread_id, &run.id, &self.deps.poll)
            .await
            .map_err(WorkflowError::from)?;

        // Second pass: convert the conversational answer into fixed JSON.
        let json_agent = self.deps.agents.resolve(self.source.to_json_role()).await?;
        let raw = self
            .deps
            .answerer
            .invoke_structured(
                &json_agent.id,
                thread_id,
                "Convert your previous answers to structured JSON.",
                ANSWER_SCHEMA,
            )
            .await?;

        let results: AgentAnswerResults = serde_json::from_str(&extract_json_object(&raw))
            .map_err(|e| WorkflowError::MalformedStructuredOutput {
                step: self.source.name().into(),
                reason: format!("{e}; raw output: {raw}"),
            })?;

        // Fill answers for ids present in the input batch; everything else
        // passes through unchanged.
        let mut filled = 0usize;
        for answered in &results.answered_questions {
            if answered.answer.is_empty() {
                continue;
            }
            if let Some(qa) = questions
                .iter_mut()
                .find(|qa| qa.question_id == answered.question_id)
            {
                qa.answer = Some(answered.answer.clone());
                filled += 1;
            }
        }

        info!(
            source = self.source.name(),
            asked = questions.len(),
            answered = filled,
            unanswered = results.unanswered_questions.len(),
            "Knowledge pass finished"
        );
        sink.emit(self.source.result_event(), EventData::Questions(questions));
        Ok(())
    }
}

#[async_trait]
impl WorkflowStep for KnowledgeStep {
    fn id(&self) -> StepId {
        self.source.step_id()
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
                Ok(())
            }
            ("execute", StepInput::Event(EventData::Questions(questions))) => {
                self.execute(questions, sink).await
            }
            ("execute", other) => Err(WorkflowError::UnexpectedInput {
                step: self.source.name().into(),
                function: "execute".into(),
                reason: format!("expected a questions payload, got {other:?}"),
            }),
            (other, _) => Err(WorkflowError::UnknownFunction {
                step: self.source.name().into(),
                function: other.into(),
            }),
        }
    }
}

/// Render the batch message: one `id: question` line per entry.
fn batch_message(questions: &[QuestionAnswer]) -> String {
    questions
        .iter()
        .map(|qa| format!("{}: {}", qa.question_id, qa.question))
        .collect::<Vec<_>>()
        .join("\n")
}
