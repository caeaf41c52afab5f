//! Named events and their typed payloads.
//!
//! Every edge in the process graph carries one of these names; the payload
//! travels with the event through the dispatcher.

use serde::{Deserialize, Serialize};

use super::types::{Email, QuestionAnswer, ThreadsCollection};

// ── Event names ─────────────────────────────────────────────────────

/// External entry: a new email starts a run.
pub const START_PROCESS: &str = "start_process";
/// Init finished: threads exist, email is seeded on the main thread.
pub const INITIALIZED: &str = "initialized";
/// Triage bound its state; triggers its own execute.
pub const TRIAGE_READY: &str = "triage_ready";
/// Triage extracted the open questions.
pub const QUESTIONS_TRIAGED: &str = "questions_triaged";
/// FAQ pass finished (possibly partial).
pub const FAQ_ANSWERED: &str = "faq_answered";
/// RAG pass finished (possibly partial).
pub const RAG_ANSWERED: &str = "rag_answered";
/// Orchestrator needs the operator to fill in the remaining answers.
pub const ASK_USER_FOR_DETAILS: &str = "ask_user_for_details";
/// Every question is answered; compose the reply.
pub const SEND_EMAIL_TO_CUSTOMER: &str = "send_email_to_customer";
/// External entry: the operator supplied answers for a suspended run.
pub const RECEIVE_USER_MESSAGE: &str = "receive_user_message";
/// The reply was composed — terminal.
pub const REPLY_SENT: &str = "reply_sent";

// ── Payloads ────────────────────────────────────────────────────────

/// Payload of the `initialized` event: everything a step needs to bind its
/// per-run state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSetup {
    pub email: Email,
    pub threads: ThreadsCollection,
}

/// Typed payload carried by a named event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventData {
    Email(Email),
    Setup(RunSetup),
    Questions(Vec<QuestionAnswer>),
    Reply(String),
    Empty,
}

impl EventData {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Email(_) => "email",
            Self::Setup(_) => "setup",
            Self::Questions(_) => "questions",
            Self::Reply(_) => "reply",
            Self::Empty => "empty",
        }
    }
}
