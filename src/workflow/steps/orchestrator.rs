//! Orchestrator step — merges knowledge-source answers, decides between
//! asking the operator and replying, and applies operator answers on
//! resumption.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

use crate::error::WorkflowError;
use crate::workflow::engine::{EventSink, StepInput, WorkflowStep};
use crate::workflow::events::{self, EventData};
use crate::workflow::graph::StepId;
use crate::workflow::types::{Email, QuestionAnswer, ThreadsCollection};

/// The orchestrator's accumulated view of the run — the single source of
/// truth for what has been asked and answered so far.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorState {
    pub email: Option<Email>,
    pub threads: Option<ThreadsCollection>,
    pub question_answers: Vec<QuestionAnswer>,
}

/// Merge an incoming batch into the tracked list.
///
/// Each incoming entry either overwrites the answer of the tracked entry
/// with the same `question_id` — but only when the incoming answer is
/// non-empty, so a filled answer never regresses — or is appended as new.
/// The list never shrinks, no id is duplicated, and re-applying the same
/// batch is a no-op.
pub fn merge_answers(tracked: &mut Vec<QuestionAnswer>, incoming: &[QuestionAnswer]) {
    for qa in incoming {
        match tracked
            .iter_mut()
            .find(|existing| existing.question_id == qa.question_id)
        {
            Some(existing) => {
                if qa.has_answer() {
                    existing.answer = qa.answer.clone();
                }
            }
            None => tracked.push(qa.clone()),
        }
    }
}

/// The decision core. State is shared with the service so a drive can be
/// snapshotted after suspension.
pub struct OrchestratorStep {
    state: Arc<RwLock<OrchestratorState>>,
}

impl OrchestratorStep {
    pub fn new(state: Arc<RwLock<OrchestratorState>>) -> Self {
        Self { state }
    }

    /// Fan-in point: both knowledge batches have arrived. Parameter order is
    /// the merge order — FAQ first, then RAG, so a non-empty RAG answer wins
    /// a tie deterministically.
    async fn execute(&self, input: StepInput, sink: &mut EventSink) -> Result<(), WorkflowError> {
        let StepInput::Join(params) = input else {
            return Err(WorkflowError::UnexpectedInput {
                step: "orchestrator".into(),
                function: "execute".into(),
                reason: "expected joined knowledge-source batches".into(),
            });
        };

        let mut state = self.state.write().await;
        for (name, data) in &params {
            let EventData::Questions(batch) = data else {
                return Err(WorkflowError::UnexpectedInput {
                    step: "orchestrator".into(),
                    function: "execute".into(),
                    reason: format!("parameter {name} is not a questions payload"),
                });
            };
            merge_answers(&mut state.question_answers, batch);
        }

        Self::decide(&state, sink);
        Ok(())
    }

    /// Resumption entry point: the operator answered some questions.
    /// Operator answers overwrite unconditionally — a human always wins —
    /// but only for questions already tracked.
    async fn receive_user_response(
        &self,
        answers: Vec<QuestionAnswer>,
        sink: &mut EventSink,
    ) -> Result<(), WorkflowError> {
        let mut state = self.state.write().await;
        for qa in &answers {
            if let Some(existing) = state
                .question_answers
                .iter_mut()
                .find(|existing| existing.question_id == qa.question_id)
            {
                existing.answer = qa.answer.clone();
            }
        }

        Self::decide(&state, sink);
        Ok(())
    }

    /// Emit the next event: reply when everything is answered, otherwise
    /// re-ask for whatever is still open.
    fn decide(state: &OrchestratorState, sink: &mut EventSink) {
        let unanswered: Vec<QuestionAnswer> = state
            .question_answers
            .iter()
            .filter(|qa| !qa.has_answer())
            .cloned()
            .collect();

        if unanswered.is_empty() {
            info!(
                tracked = state.question_answers.len(),
                "All questions answered; composing reply"
            );
            sink.emit(
                events::SEND_EMAIL_TO_CUSTOMER,
                EventData::Questions(state.question_answers.clone()),
            );
        } else {
            info!(
                tracked = state.question_answers.len(),
                open = unanswered.len(),
                "Questions remain open; asking the operator"
            );
            sink.emit(events::ASK_USER_FOR_DETAILS, EventData::Questions(unanswered));
        }
    }
}

#[async_trait]
impl WorkflowStep for OrchestratorStep {
    fn id(&self) -> StepId {
        StepId::Orchestrator
    }

    async fn invoke(
        &mut self,
        function: &str,
        input: StepInput,
        sink: &mut EventSink,
    ) -> Result<(), WorkflowError> {
        match (function, input) {
            ("init", StepInput::Event(EventData::Setup(setup))) => {
                let mut state = self.state.write().await;
                state.email = Some(setup.email);
                state.threads = Some(setup.threads);
                Ok(())
            }
            ("execute", input) => self.execute(input, sink).await,
            ("receive_user_response", StepInput::Event(EventData::Questions(answers))) => {
                self.receive_user_response(answers, sink).await
            }
            ("receive_user_response", other) => Err(WorkflowError::UnexpectedInput {
                step: "orchestrator".into(),
                function: "receive_user_response".into(),
                reason: format!("expected a questions payload, got {other:?}"),
            }),
            (other, _) => Err(WorkflowError::UnknownFunction {
                step: "orchestrator".into(),
                function: other.into(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qa(id: &str, answer: Option<&str>) -> QuestionAnswer {
        QuestionAnswer {
            email_id: "e1".into(),
            question_id: id.into(),
            question: format!("question {id}"),
            answer: answer.map(str::to_string),
        }
    }

    fn step_with(tracked: Vec<QuestionAnswer>) -> (OrchestratorStep, Arc<RwLock<OrchestratorState>>) {
        let state = Arc::new(RwLock::new(OrchestratorState {
            email: None,
            threads: None,
            question_answers: tracked,
        }));
        (OrchestratorStep::new(Arc::clone(&state)), state)
    }

    fn join_input(faq: Vec<QuestionAnswer>, rag: Vec<QuestionAnswer>) -> StepInput {
        StepInput::Join(vec![
            ("faq_answers", EventData::Questions(faq)),
            ("rag_answers", EventData::Questions(rag)),
        ])
    }

    // ── merge_answers properties ────────────────────────────────────

    #[test]
    fn merge_never_shrinks_and_never_duplicates() {
        let mut tracked = vec![qa("q1", None), qa("q2", None)];
        merge_answers(&mut tracked, &[qa("q1", Some("a1")), qa("q3", None)]);

        assert_eq!(tracked.len(), 3);
        let mut ids: Vec<_> = tracked.iter().map(|q| q.question_id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn merge_is_idempotent() {
        let batch = vec![qa("q1", Some("a1")), qa("q2", None)];
        let mut once = vec![qa("q1", None), qa("q2", None)];
        merge_answers(&mut once, &batch);
        let mut twice = once.clone();
        merge_answers(&mut twice, &batch);
        assert_eq!(once, twice);
    }

    #[test]
    fn merge_never_regresses_a_filled_answer() {
        let mut tracked = vec![qa("q1", Some("kept"))];
        merge_answers(&mut tracked, &[qa("q1", None)]);
        assert_eq!(tracked[0].answer.as_deref(), Some("kept"));

        merge_answers(&mut tracked, &[qa("q1", Some(""))]);
        assert_eq!(tracked[0].answer.as_deref(), Some("kept"));
    }

    #[test]
    fn merge_last_writer_wins_for_non_empty() {
        let mut tracked = vec![qa("q1", None)];
        merge_answers(&mut tracked, &[qa("q1", Some("faq answer"))]);
        merge_answers(&mut tracked, &[qa("q1", Some("rag answer"))]);
        assert_eq!(tracked[0].answer.as_deref(), Some("rag answer"));
    }

    // ── execute ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn fully_answered_sends_email() {
        let (mut step, _) = step_with(Vec::new());
        let mut sink = EventSink::default();

        step.invoke(
            "execute",
            join_input(vec![qa("q1", Some("a1"))], vec![qa("q2", Some("a2"))]),
            &mut sink,
        )
        .await
        .unwrap();

        let (event, data) = &sink.emitted()[0];
        assert_eq!(*event, events::SEND_EMAIL_TO_CUSTOMER);
        let EventData::Questions(all) = data else {
            panic!("Expected questions");
        };
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|qa| qa.has_answer()));
    }

    #[tokio::test]
    async fn open_questions_ask_the_user() {
        let (mut step, _) = step_with(Vec::new());
        let mut sink = EventSink::default();

        step.invoke(
            "execute",
            join_input(vec![qa("q1", Some("a1"))], vec![qa("q2", None)]),
            &mut sink,
        )
        .await
        .unwrap();

        let (event, data) = &sink.emitted()[0];
        assert_eq!(*event, events::ASK_USER_FOR_DETAILS);
        let EventData::Questions(open) = data else {
            panic!("Expected questions");
        };
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].question_id, "q2");
    }

    #[tokio::test]
    async fn rag_overwrites_faq_on_tie() {
        let (mut step, state) = step_with(Vec::new());
        let mut sink = EventSink::default();

        step.invoke(
            "execute",
            join_input(
                vec![qa("q1", Some("faq answer"))],
                vec![qa("q1", Some("rag answer"))],
            ),
            &mut sink,
        )
        .await
        .unwrap();

        let state = state.read().await;
        assert_eq!(state.question_answers.len(), 1);
        assert_eq!(
            state.question_answers[0].answer.as_deref(),
            Some("rag answer")
        );
    }

    // ── receive_user_response ───────────────────────────────────────

    #[tokio::test]
    async fn human_answers_complete_the_run() {
        let (mut step, _) = step_with(vec![qa("q1", Some("a1")), qa("q2", None)]);
        let mut sink = EventSink::default();

        step.invoke(
            "receive_user_response",
            StepInput::Event(EventData::Questions(vec![qa("q2", Some("human answer"))])),
            &mut sink,
        )
        .await
        .unwrap();

        let (event, data) = &sink.emitted()[0];
        assert_eq!(*event, events::SEND_EMAIL_TO_CUSTOMER);
        let EventData::Questions(all) = data else {
            panic!("Expected questions");
        };
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn partial_human_answers_reask_the_rest() {
        let (mut step, _) = step_with(vec![qa("q1", None), qa("q2", None)]);
        let mut sink = EventSink::default();

        step.invoke(
            "receive_user_response",
            StepInput::Event(EventData::Questions(vec![qa("q1", Some("answered"))])),
            &mut sink,
        )
        .await
        .unwrap();

        let (event, data) = &sink.emitted()[0];
        assert_eq!(*event, events::ASK_USER_FOR_DETAILS);
        let EventData::Questions(open) = data else {
            panic!("Expected questions");
        };
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].question_id, "q2");
    }

    #[tokio::test]
    async fn non_overlapping_human_answers_change_nothing() {
        let tracked = vec![qa("q1", Some("a1")), qa("q2", None)];
        let (mut step, state) = step_with(tracked.clone());
        let mut sink = EventSink::default();

        step.invoke(
            "receive_user_response",
            StepInput::Event(EventData::Questions(vec![qa("q-stranger", Some("noise"))])),
            &mut sink,
        )
        .await
        .unwrap();

        let state = state.read().await;
        // Prior entries unchanged, nothing appended
        assert_eq!(state.question_answers, tracked);
    }

    #[tokio::test]
    async fn human_answer_overwrites_unconditionally() {
        let (mut step, state) = step_with(vec![qa("q1", Some("agent answer"))]);
        let mut sink = EventSink::default();

        step.invoke(
            "receive_user_response",
            StepInput::Event(EventData::Questions(vec![qa("q1", Some("human answer"))])),
            &mut sink,
        )
        .await
        .unwrap();

        let state = state.read().await;
        assert_eq!(
            state.question_answers[0].answer.as_deref(),
            Some("human answer")
        );
    }
}
