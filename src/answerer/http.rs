//! HTTP answerer — `Answerer` over a persistent-agents REST API.
//!
//! Endpoint shape:
//! - `POST   {base}/threads`                         → `{ "id": ... }`
//! - `POST   {base}/threads/{tid}/messages`          → 2xx
//! - `POST   {base}/threads/{tid}/runs`              → `{ "id", "status" }`
//! - `GET    {base}/threads/{tid}/runs/{rid}`        → `{ "id", "status" }`
//! - `GET    {base}/threads/{tid}/messages?order=desc&limit=1`
//!
//! The service does not expose token-level streaming over this surface, so
//! `invoke` resolves the run and yields the final assistant message as a
//! single-chunk stream.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use crate::config::{AnswererConfig, PollConfig};
use crate::error::AnswererError;

use super::poll::poll_run_until_terminal;
use super::{AgentRun, Answerer, AnswerStream, RunStatus};

/// reqwest-backed answerer client.
pub struct HttpAnswerer {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    poll: PollConfig,
}

#[derive(Debug, Deserialize)]
struct ThreadResource {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RunResource {
    id: String,
    status: RunStatus,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    data: Vec<MessageResource>,
}

#[derive(Debug, Deserialize)]
struct MessageResource {
    #[serde(default)]
    role: String,
    #[serde(default)]
    content: serde_json::Value,
}

impl HttpAnswerer {
    pub fn new(config: &AnswererConfig, poll: PollConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            poll,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, AnswererError> {
        let response = self
            .client
            .post(self.url(path))
            .header("api-key", self.api_key.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|e| AnswererError::Request {
                reason: format!("POST {path}: {e}"),
            })?;

        Self::decode(path, response).await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<T, AnswererError> {
        let response = self
            .client
            .get(self.url(path))
            .header("api-key", self.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| AnswererError::Request {
                reason: format!("GET {path}: {e}"),
            })?;

        Self::decode(path, response).await
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        path: &str,
        response: reqwest::Response,
    ) -> Result<T, AnswererError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnswererError::Request {
                reason: format!("{path} returned {status}: {body}"),
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| AnswererError::InvalidResponse {
                reason: format!("{path}: {e}"),
            })
    }

    /// Run `agent_id` over the thread's current contents and return the
    /// latest assistant message.
    async fn run_and_read(
        &self,
        agent_id: &str,
        thread_id: &str,
        prompt: &str,
    ) -> Result<String, AnswererError> {
        self.post_message(thread_id, prompt).await?;
        let run = self.create_run(thread_id, agent_id).await?;
        poll_run_until_terminal(self, thread_id, &run.id, &self.poll).await?;
        self.latest_assistant_message(thread_id).await
    }

    async fn latest_assistant_message(&self, thread_id: &str) -> Result<String, AnswererError> {
        let list: MessageList = self
            .get_json(&format!(
                "/threads/{thread_id}/messages?order=desc&limit=1"
            ))
            .await?;

        let message = list
            .data
            .into_iter()
            .find(|m| m.role == "assistant" || m.role.is_empty())
            .ok_or_else(|| AnswererError::InvalidResponse {
                reason: format!("thread {thread_id} has no assistant message"),
            })?;

        Ok(message_text(&message.content))
    }
}

/// Flatten a message `content` field into plain text.
///
/// Accepts both a bare string and the structured
/// `[{"type": "text", "text": {"value": ...}}]` part list.
fn message_text(content: &serde_json::Value) -> String {
    match content {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(parts) => parts
            .iter()
            .filter_map(|part| {
                part.get("text")
                    .map(|t| t.get("value").unwrap_or(t))
                    .and_then(|v| v.as_str())
            })
            .collect::<Vec<_>>()
            .join(""),
        other => other.to_string(),
    }
}

#[async_trait]
impl Answerer for HttpAnswerer {
    async fn create_thread(&self) -> Result<String, AnswererError> {
        let thread: ThreadResource = self
            .post_json("/threads", &serde_json::json!({}))
            .await?;
        debug!(thread_id = %thread.id, "Created thread");
        Ok(thread.id)
    }

    async fn post_message(&self, thread_id: &str, content: &str) -> Result<(), AnswererError> {
        let _: serde_json::Value = self
            .post_json(
                &format!("/threads/{thread_id}/messages"),
                &serde_json::json!({ "role": "user", "content": content }),
            )
            .await?;
        Ok(())
    }

    async fn create_run(&self, thread_id: &str, agent_id: &str) -> Result<AgentRun, AnswererError> {
        let run: RunResource = self
            .post_json(
                &format!("/threads/{thread_id}/runs"),
                &serde_json::json!({ "agent_id": agent_id }),
            )
            .await?;
        Ok(AgentRun {
            id: run.id,
            status: run.status,
        })
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<AgentRun, AnswererError> {
        let run: RunResource = self
            .get_json(&format!("/threads/{thread_id}/runs/{run_id}"))
            .await?;
        Ok(AgentRun {
            id: run.id,
            status: run.status,
        })
    }

    async fn invoke(
        &self,
        agent_id: &str,
        thread_id: &str,
        prompt: &str,
    ) -> Result<AnswerStream, AnswererError> {
        let text = self.run_and_read(agent_id, thread_id, prompt).await?;
        Ok(Box::pin(tokio_stream::once(Ok(text))))
    }

    async fn invoke_structured(
        &self,
        agent_id: &str,
        thread_id: &str,
        prompt: &str,
        schema_hint: &str,
    ) -> Result<String, AnswererError> {
        let full_prompt = format!("{prompt}\n\nRespond with ONLY a JSON object:\n{schema_hint}");
        self.run_and_read(agent_id, thread_id, &full_prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_text_from_string() {
        assert_eq!(message_text(&serde_json::json!("hello")), "hello");
    }

    #[test]
    fn message_text_from_parts() {
        let content = serde_json::json!([
            { "type": "text", "text": { "value": "part one " } },
            { "type": "text", "text": { "value": "part two" } }
        ]);
        assert_eq!(message_text(&content), "part one part two");
    }

    #[test]
    fn message_text_from_flat_parts() {
        let content = serde_json::json!([{ "type": "text", "text": "flat" }]);
        assert_eq!(message_text(&content), "flat");
    }
}
