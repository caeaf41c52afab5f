//! The Answerer capability — the workflow's only window onto the remote
//! agents service.
//!
//! Steps never talk HTTP directly: they hold an `Arc<dyn Answerer>` and a
//! role directory (`AgentCache`). The concrete `HttpAnswerer` adapts a
//! persistent-agents REST API; tests script their own implementations.

pub mod agents;
pub mod http;
pub mod json;
pub mod poll;

pub use agents::{AgentCache, AgentHandle, AgentRole};
pub use http::HttpAnswerer;
pub use json::extract_json_object;
pub use poll::poll_run_until_terminal;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::AnswererError;

/// Status of an agent run, as reported by the answerer service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Completed,
    Failed,
    Cancelled,
    Expired,
}

impl RunStatus {
    /// Whether the run has stopped making progress.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Queued | Self::InProgress | Self::RequiresAction)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::RequiresAction => "requires_action",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        };
        write!(f, "{s}")
    }
}

/// A run of an agent against a thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRun {
    pub id: String,
    pub status: RunStatus,
}

/// Streaming answer text, yielded in chunks as the agent produces them.
pub type AnswerStream = BoxStream<'static, Result<String, AnswererError>>;

/// Capability contract for the remote agents service.
#[async_trait]
pub trait Answerer: Send + Sync {
    /// Create a new conversational thread. Returns the thread id.
    async fn create_thread(&self) -> Result<String, AnswererError>;

    /// Post a user message to a thread.
    async fn post_message(&self, thread_id: &str, content: &str) -> Result<(), AnswererError>;

    /// Start a run of `agent_id` against a thread.
    async fn create_run(&self, thread_id: &str, agent_id: &str) -> Result<AgentRun, AnswererError>;

    /// Fetch the current state of a run.
    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<AgentRun, AnswererError>;

    /// Post `prompt` to the thread, drive `agent_id` over it, and stream the
    /// answer text as it arrives.
    async fn invoke(
        &self,
        agent_id: &str,
        thread_id: &str,
        prompt: &str,
    ) -> Result<AnswerStream, AnswererError>;

    /// Like [`Answerer::invoke`] but for agents expected to emit structured
    /// JSON; returns the full response text for the caller to parse.
    /// `schema_hint` describes the expected shape to the agent.
    async fn invoke_structured(
        &self,
        agent_id: &str,
        thread_id: &str,
        prompt: &str,
        schema_hint: &str,
    ) -> Result<String, AnswererError>;
}
