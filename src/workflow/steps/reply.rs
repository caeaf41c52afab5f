//! Reply step — composes the final customer reply on the main thread.

use async_trait::async_trait;
use futures::StreamExt;
use tracing::info;

use crate::answerer::AgentRole;
use crate::error::WorkflowError;
use crate::workflow::engine::{EventSink, StepInput, WorkflowStep};
use crate::workflow::events::{self, EventData};
use crate::workflow::graph::StepId;
use crate::workflow::types::{QuestionAnswer, ThreadsCollection};

use super::StepDeps;

/// Streams the reply agent's answer, forwarding chunks to the observer, and
/// emits the concatenated text as the run's terminal event.
pub struct ReplyStep {
    deps: StepDeps,
    threads: Option<ThreadsCollection>,
}

impl ReplyStep {
    pub fn new(deps: StepDeps, threads: Option<ThreadsCollection>) -> Self {
        Self { deps, threads }
    }

    async fn execute(
        &self,
        answers: Vec<QuestionAnswer>,
        sink: &mut EventSink,
    ) -> Result<(), WorkflowError> {
        let threads = self.threads.as_ref().ok_or_else(|| {
            WorkflowError::UnexpectedInput {
                step: "reply".into(),
                function: "execute".into(),
                reason: "step was not initialized with threads".into(),
            }
        })?;

        let agent = self.deps.agents.resolve(AgentRole::Reply).await?;
        let mut stream = self
            .deps
            .answerer
            .invoke(
                &agent.id,
                &threads.main_thread_id,
                &build_reply_prompt(&answers),
            )
            .await?;

        let mut reply = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(WorkflowError::from)?;
            self.deps.observer.on_reply_chunk(&chunk);
            reply.push_str(&chunk);
        }

        info!(chars = reply.len(), "Reply composed");
        sink.emit(events::REPLY_SENT, EventData::Reply(reply));
        Ok(())
    }
}

#[async_trait]
impl WorkflowStep for ReplyStep {
    fn id(&self) -> StepId {
        StepId::Reply
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
            ("execute", StepInput::Event(EventData::Questions(answers))) => {
                self.execute(answers, sink).await
            }
            ("execute", other) => Err(WorkflowError::UnexpectedInput {
                step: "reply".into(),
                function: "execute".into(),
                reason: format!("expected a questions payload, got {other:?}"),
            }),
            (other, _) => Err(WorkflowError::UnknownFunction {
                step: "reply".into(),
                function: other.into(),
            }),
        }
    }
}

/// Prompt summarizing every question/answer pair for the reply agent.
fn build_reply_prompt(answers: &[QuestionAnswer]) -> String {
    let mut prompt = String::from(
        "Compose a friendly reply to the customer's email on this thread, \
         addressing each of their questions using these answers:\n",
    );
    for qa in answers {
        prompt.push_str(&format!(
            "- Q: {}\n  A: {}\n",
            qa.question,
            qa.answer.as_deref().unwrap_or("(no answer available)")
        ));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::answerer::{AgentCache, AgentRun, Answerer, AnswerStream};
    use crate::config::{AgentIds, PollConfig};
    use crate::error::AnswererError;
    use crate::notify::{TracingOperatorChannel, UserMessenger};
    use crate::stores::InMemoryConversationStore;
    use crate::workflow::trace::{Observation, RecordingObserver};

    struct StreamingAnswerer {
        chunks: Vec<String>,
    }

    #[async_trait]
    impl Answerer for StreamingAnswerer {
        async fn create_thread(&self) -> Result<String, AnswererError> {
            unimplemented!()
        }
        async fn post_message(&self, _: &str, _: &str) -> Result<(), AnswererError> {
            Ok(())
        }
        async fn create_run(&self, _: &str, _: &str) -> Result<AgentRun, AnswererError> {
            unimplemented!()
        }
        async fn get_run(&self, _: &str, _: &str) -> Result<AgentRun, AnswererError> {
            unimplemented!()
        }
        async fn invoke(&self, _: &str, _: &str, _: &str) -> Result<AnswerStream, AnswererError> {
            let chunks: Vec<Result<String, AnswererError>> =
                self.chunks.iter().cloned().map(Ok).collect();
            Ok(Box::pin(futures::stream::iter(chunks)))
        }
        async fn invoke_structured(
            &self,
            _: &str,
            _: &str,
            _: &str,
            _: &str,
        ) -> Result<String, AnswererError> {
            unimplemented!()
        }
    }

    fn qa(id: &str, answer: &str) -> QuestionAnswer {
        QuestionAnswer {
            email_id: "e1".into(),
            question_id: id.into(),
            question: format!("question {id}"),
            answer: Some(answer.to_string()),
        }
    }

    #[tokio::test]
    async fn streams_chunks_and_emits_full_reply() {
        let observer = Arc::new(RecordingObserver::new());
        let store = Arc::new(InMemoryConversationStore::new());
        let answerer: Arc<dyn Answerer> = Arc::new(StreamingAnswerer {
            chunks: vec!["Dear ".into(), "customer, ".into(), "all set.".into()],
        });
        let agents = Arc::new(AgentCache::new(AgentIds {
            reply: "asst_reply".into(),
            ..Default::default()
        }));
        let deps = StepDeps {
            answerer: answerer.clone(),
            agents: Arc::clone(&agents),
            messenger: Arc::new(UserMessenger::new(
                store,
                Arc::new(TracingOperatorChannel),
                answerer,
                agents,
            )),
            observer: observer.clone(),
            poll: PollConfig::default(),
            thread_create_retries: 1,
        };

        let threads = ThreadsCollection {
            main_thread_id: "t-main".into(),
            faq_thread_id: "t-faq".into(),
            rag_thread_id: "t-rag".into(),
        };
        let mut step = ReplyStep::new(deps, Some(threads));
        let mut sink = EventSink::default();

        step.invoke(
            "execute",
            StepInput::Event(EventData::Questions(vec![qa("q1", "the premium plan")])),
            &mut sink,
        )
        .await
        .unwrap();

        let (event, data) = &sink.emitted()[0];
        assert_eq!(*event, events::REPLY_SENT);
        let EventData::Reply(text) = data else {
            panic!("Expected reply text");
        };
        assert_eq!(text, "Dear customer, all set.");

        // Every chunk reached the observer in order
        let chunks: Vec<_> = observer
            .entries()
            .into_iter()
            .filter_map(|o| match o {
                Observation::ReplyChunk(c) => Some(c),
                _ => None,
            })
            .collect();
        assert_eq!(chunks, vec!["Dear ", "customer, ", "all set."]);
    }

    #[test]
    fn reply_prompt_lists_each_pair() {
        let prompt = build_reply_prompt(&[qa("q1", "answer one"), qa("q2", "answer two")]);
        assert!(prompt.contains("Q: question q1"));
        assert!(prompt.contains("A: answer one"));
        assert!(prompt.contains("A: answer two"));
    }
}
