//! Shared types for the email workflow.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Email ───────────────────────────────────────────────────────────

/// An inbound customer email. Created by the inbound boundary; read-only
/// inside the workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Email {
    /// Stable identifier — also the key for the run's persisted snapshot.
    pub id: String,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl Email {
    /// Render the email as the seed message for the main thread.
    pub fn as_thread_message(&self) -> String {
        format!(
            "From: {}\nTo: {}\nSubject: {}\n\n{}",
            self.from, self.to, self.subject, self.body
        )
    }
}

// ── Question / answer tracking ──────────────────────────────────────

/// A question extracted from an email, with its answer once resolved.
///
/// At most one entry per `(email_id, question_id)` is live in any
/// collection; merges update in place rather than duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionAnswer {
    pub email_id: String,
    pub question_id: String,
    pub question: String,
    /// `None` until some knowledge source or the operator supplies one.
    pub answer: Option<String>,
}

impl QuestionAnswer {
    /// Create an unanswered entry with a freshly generated question id.
    pub fn new_unanswered(email_id: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            email_id: email_id.into(),
            question_id: Uuid::new_v4().to_string(),
            question: question.into(),
            answer: None,
        }
    }

    /// Whether a non-empty answer has been recorded.
    ///
    /// An empty string counts as unanswered, matching the upstream agents
    /// which sometimes emit `""` for questions they could not resolve.
    pub fn has_answer(&self) -> bool {
        self.answer.as_deref().is_some_and(|a| !a.is_empty())
    }
}

// ── Threads ─────────────────────────────────────────────────────────

/// The three conversational contexts opened once per run.
///
/// Immutable after creation; every step that talks to the answerer for this
/// run reuses these ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadsCollection {
    pub main_thread_id: String,
    pub faq_thread_id: String,
    pub rag_thread_id: String,
}

// ── Structured answerer output ──────────────────────────────────────

/// Triage agent output: the open questions that must be answered before a
/// reply can be sent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriageResult {
    #[serde(default)]
    pub questions: Vec<String>,
}

/// One answered question from a knowledge-source agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentAnswer {
    pub question_id: String,
    pub answer: String,
}

/// Structured result of a knowledge-source pass (FAQ or RAG).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentAnswerResults {
    #[serde(default)]
    pub answered_questions: Vec<AgentAnswer>,
    #[serde(default)]
    pub unanswered_questions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_question_is_unanswered() {
        let qa = QuestionAnswer::new_unanswered("email-1", "What plan are you on?");
        assert!(!qa.has_answer());
        assert_eq!(qa.email_id, "email-1");
        assert!(!qa.question_id.is_empty());
    }

    #[test]
    fn empty_answer_counts_as_unanswered() {
        let mut qa = QuestionAnswer::new_unanswered("email-1", "q");
        qa.answer = Some(String::new());
        assert!(!qa.has_answer());
        qa.answer = Some("the premium plan".into());
        assert!(qa.has_answer());
    }

    #[test]
    fn question_ids_are_unique() {
        let a = QuestionAnswer::new_unanswered("e", "q");
        let b = QuestionAnswer::new_unanswered("e", "q");
        assert_ne!(a.question_id, b.question_id);
    }

    #[test]
    fn email_thread_message_format() {
        let email = Email {
            id: "email-1".into(),
            from: "alice@example.com".into(),
            to: "support@example.com".into(),
            subject: "Billing question".into(),
            body: "Why was I charged twice?".into(),
        };
        let rendered = email.as_thread_message();
        assert!(rendered.starts_with("From: alice@example.com\n"));
        assert!(rendered.contains("Subject: Billing question"));
        assert!(rendered.ends_with("Why was I charged twice?"));
    }

    #[test]
    fn agent_answer_results_wire_names() {
        let raw = r#"{
            "answered_questions": [{"question_id": "q1", "answer": "Yes"}],
            "unanswered_questions": ["q2"]
        }"#;
        let parsed: AgentAnswerResults = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.answered_questions.len(), 1);
        assert_eq!(parsed.answered_questions[0].question_id, "q1");
        assert_eq!(parsed.unanswered_questions, vec!["q2"]);
    }

    #[test]
    fn triage_result_tolerates_missing_field() {
        let parsed: TriageResult = serde_json::from_str("{}").unwrap();
        assert!(parsed.questions.is_empty());
    }
}
