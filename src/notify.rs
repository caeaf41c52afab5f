//! Operator messaging — the human side of the workflow.
//!
//! `UserMessenger` owns the conversation-store bookkeeping for two flows:
//! queueing unanswered questions for the operator (the AskUser step) and
//! driving the operator's own support chat. The actual transport (Teams,
//! Slack, a dashboard socket) sits behind [`OperatorChannel`] and is out of
//! scope here.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tracing::{info, warn};

use crate::answerer::{AgentCache, AgentRole, Answerer};
use crate::error::{StoreError, WorkflowError};
use crate::stores::{ConversationState, ConversationStore};
use crate::workflow::types::QuestionAnswer;

/// Conversation reference used when no operator chat has registered yet.
const FALLBACK_CONVERSATION: &str = "default-operator";

/// Delivers a message into an operator's conversation channel.
#[async_trait]
pub trait OperatorChannel: Send + Sync {
    async fn deliver(&self, conversation_reference: &str, text: &str);
}

/// Default channel: log the outbound message. Deployments plug in a real
/// transport.
#[derive(Debug, Default)]
pub struct TracingOperatorChannel;

#[async_trait]
impl OperatorChannel for TracingOperatorChannel {
    async fn deliver(&self, conversation_reference: &str, text: &str) {
        info!(conversation = conversation_reference, %text, "Operator notification");
    }
}

/// Appends pending questions to the operator's backlog, pings them, and
/// drives their support chat.
pub struct UserMessenger {
    store: Arc<dyn ConversationStore>,
    channel: Arc<dyn OperatorChannel>,
    answerer: Arc<dyn Answerer>,
    agents: Arc<AgentCache>,
}

impl UserMessenger {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        channel: Arc<dyn OperatorChannel>,
        answerer: Arc<dyn Answerer>,
        agents: Arc<AgentCache>,
    ) -> Self {
        Self {
            store,
            channel,
            answerer,
            agents,
        }
    }

    /// Queue `questions` for the default operator and notify their channel.
    ///
    /// The backlog accumulates across calls: previously pending entries are
    /// never dropped. When no operator conversation exists yet, a fallback
    /// record is created so the questions are not lost.
    pub async fn ask_user_to_answer_questions(
        &self,
        questions: &[QuestionAnswer],
    ) -> Result<(), StoreError> {
        let mut state = match self.store.get_default().await? {
            Some(state) => state,
            None => {
                warn!("No operator conversation registered; using fallback record");
                ConversationState::new(FALLBACK_CONVERSATION)
            }
        };

        state
            .pending_question_answers
            .extend(questions.iter().cloned());

        let key = state.conversation_reference.clone();
        let pending = state.pending_question_answers.len();
        self.store.save(&key, state).await?;

        info!(
            conversation = %key,
            new = questions.len(),
            pending,
            "Questions queued for operator"
        );

        self.channel
            .deliver(&key, &format_question_prompt(questions))
            .await;
        Ok(())
    }

    /// Drive one turn of the operator's support chat.
    ///
    /// Lazily opens the conversation's thread on first use, streams the
    /// support agent's answer, and persists the updated conversation record.
    pub async fn handle_user_message(
        &self,
        conversation_id: &str,
        text: &str,
    ) -> Result<String, WorkflowError> {
        let mut state = self.store.get(conversation_id).await?;
        let agent = self.agents.resolve(AgentRole::Support).await?;

        let thread_id = match &state.thread_id {
            Some(id) => id.clone(),
            None => {
                let id = self.answerer.create_thread().await?;
                state.thread_id = Some(id.clone());
                id
            }
        };

        let mut stream = self.answerer.invoke(&agent.id, &thread_id, text).await?;
        let mut response = String::new();
        while let Some(chunk) = stream.next().await {
            response.push_str(&chunk?);
        }

        state.conversation_reference = conversation_id.to_string();
        self.store.save(conversation_id, state).await?;
        Ok(response)
    }
}

/// Render the questions as an operator-facing prompt.
fn format_question_prompt(questions: &[QuestionAnswer]) -> String {
    let mut text = String::from(
        "The assistant needs your help answering these customer questions:\n",
    );
    for qa in questions {
        text.push_str(&format!(
            "- [{}/{}] {}\n",
            qa.email_id, qa.question_id, qa.question
        ));
    }
    text.push_str("Reply with one line per answer: [email-id/question-id] your answer");
    text
}
