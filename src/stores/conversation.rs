//! Conversation state store — operator chat sessions and their pending
//! question backlog.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::workflow::types::QuestionAnswer;

/// A human operator's chat session and the cross-run backlog of questions
/// currently awaiting that operator's reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    /// Stable reference to the operator's conversation channel.
    pub conversation_reference: String,
    /// Answerer thread backing the operator chat, once one exists.
    pub thread_id: Option<String>,
    /// Unanswered questions pending this operator, across all runs.
    pub pending_question_answers: Vec<QuestionAnswer>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationState {
    pub fn new(conversation_reference: impl Into<String>) -> Self {
        Self {
            conversation_reference: conversation_reference.into(),
            thread_id: None,
            pending_question_answers: Vec::new(),
            updated_at: Utc::now(),
        }
    }
}

/// Keyed store of conversation records.
///
/// All mutations are single-key read-modify-write operations, atomic per key.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn save(&self, key: &str, state: ConversationState) -> Result<(), StoreError>;

    /// Fetch a conversation record. Missing keys yield a fresh empty record
    /// rather than an error.
    async fn get(&self, key: &str) -> Result<ConversationState, StoreError>;

    /// The most recently saved record, if any — used when a workflow needs
    /// *an* operator and no routing says which.
    async fn get_default(&self) -> Result<Option<ConversationState>, StoreError>;

    /// Record an answer against a pending question, matched by
    /// `(email_id, question_id)`. Unknown ids are ignored.
    async fn answer_question(
        &self,
        key: &str,
        email_id: &str,
        question_id: &str,
        answer: &str,
    ) -> Result<(), StoreError>;
}

/// In-memory conversation store. Reference implementation; best-effort, not
/// crash-durable.
#[derive(Default)]
pub struct InMemoryConversationStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, (u64, ConversationState)>,
    next_seq: u64,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn save(&self, key: &str, mut state: ConversationState) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let seq = inner.next_seq;
        inner.next_seq += 1;
        state.updated_at = Utc::now();
        inner.entries.insert(key.to_string(), (seq, state));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<ConversationState, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .entries
            .get(key)
            .map(|(_, state)| state.clone())
            .unwrap_or_else(|| ConversationState::new(key)))
    }

    async fn get_default(&self) -> Result<Option<ConversationState>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .entries
            .values()
            .max_by_key(|(seq, _)| *seq)
            .map(|(_, state)| state.clone()))
    }

    async fn answer_question(
        &self,
        key: &str,
        email_id: &str,
        question_id: &str,
        answer: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if let Some((_, state)) = inner.entries.get_mut(key) {
            if let Some(qa) = state
                .pending_question_answers
                .iter_mut()
                .find(|qa| qa.question_id == question_id && qa.email_id == email_id)
            {
                qa.answer = Some(answer.to_string());
                state.updated_at = Utc::now();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(email_id: &str, question_id: &str) -> QuestionAnswer {
        QuestionAnswer {
            email_id: email_id.into(),
            question_id: question_id.into(),
            question: "what plan?".into(),
            answer: None,
        }
    }

    #[tokio::test]
    async fn get_missing_key_yields_empty_record() {
        let store = InMemoryConversationStore::new();
        let state = store.get("conv-1").await.unwrap();
        assert_eq!(state.conversation_reference, "conv-1");
        assert!(state.pending_question_answers.is_empty());
    }

    #[tokio::test]
    async fn get_default_is_most_recently_saved() {
        let store = InMemoryConversationStore::new();
        assert!(store.get_default().await.unwrap().is_none());

        store
            .save("conv-1", ConversationState::new("conv-1"))
            .await
            .unwrap();
        store
            .save("conv-2", ConversationState::new("conv-2"))
            .await
            .unwrap();

        let default = store.get_default().await.unwrap().unwrap();
        assert_eq!(default.conversation_reference, "conv-2");

        // Re-saving conv-1 makes it the default again
        store
            .save("conv-1", ConversationState::new("conv-1"))
            .await
            .unwrap();
        let default = store.get_default().await.unwrap().unwrap();
        assert_eq!(default.conversation_reference, "conv-1");
    }

    #[tokio::test]
    async fn answer_question_updates_matching_entry() {
        let store = InMemoryConversationStore::new();
        let mut state = ConversationState::new("conv-1");
        state.pending_question_answers.push(question("e1", "q1"));
        state.pending_question_answers.push(question("e1", "q2"));
        store.save("conv-1", state).await.unwrap();

        store
            .answer_question("conv-1", "e1", "q2", "blue")
            .await
            .unwrap();

        let state = store.get("conv-1").await.unwrap();
        assert!(state.pending_question_answers[0].answer.is_none());
        assert_eq!(
            state.pending_question_answers[1].answer.as_deref(),
            Some("blue")
        );
    }

    #[tokio::test]
    async fn answer_question_requires_both_ids_to_match() {
        let store = InMemoryConversationStore::new();
        let mut state = ConversationState::new("conv-1");
        state.pending_question_answers.push(question("e1", "q1"));
        store.save("conv-1", state).await.unwrap();

        // Same question id, different email — must not match
        store
            .answer_question("conv-1", "e2", "q1", "wrong")
            .await
            .unwrap();

        let state = store.get("conv-1").await.unwrap();
        assert!(state.pending_question_answers[0].answer.is_none());
    }
}
