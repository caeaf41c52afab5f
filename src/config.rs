//! Configuration types.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Identifiers of the remote agents the workflow talks to, one per role.
///
/// An empty or missing identifier is a fatal configuration error, surfaced
/// when the role is first resolved — never silently skipped.
#[derive(Debug, Clone, Default)]
pub struct AgentIds {
    pub triage: String,
    pub faq: String,
    pub faq_to_json: String,
    pub rag: String,
    pub rag_to_json: String,
    pub reply: String,
    /// Agent used for the operator-facing support conversation.
    pub support: String,
}

/// Connection settings for the remote answerer service.
#[derive(Debug, Clone)]
pub struct AnswererConfig {
    /// Base URL of the persistent-agents API, without a trailing slash.
    pub base_url: String,
    pub api_key: SecretString,
}

/// Bounded backoff settings for run polling.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay before the first status check.
    pub initial_interval: Duration,
    /// Ceiling for the backoff delay.
    pub max_interval: Duration,
    /// Multiplier applied to the delay after each poll.
    pub multiplier: f64,
    /// Maximum number of status checks before giving up.
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(5),
            multiplier: 1.5,
            max_attempts: 60,
        }
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub agents: AgentIds,
    pub answerer: AnswererConfig,
    pub poll: PollConfig,
    /// Bounded retries for transient thread-creation failures.
    pub thread_create_retries: u32,
    /// Port for the inbound HTTP boundary.
    pub http_port: u16,
    /// Path to a local database file. `None` keeps all state in memory.
    pub db_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            agents: AgentIds::default(),
            answerer: AnswererConfig {
                base_url: "http://localhost:8765".to_string(),
                api_key: SecretString::from(""),
            },
            poll: PollConfig::default(),
            thread_create_retries: 3,
            http_port: 8080,
            db_path: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// `ANSWERER_BASE_URL` and `ANSWERER_API_KEY` are required; agent ids use
    /// the `*_AGENT_ID` names the deployment defines. Agent ids may be left
    /// unset here — resolution fails later, per role, only when the workflow
    /// actually needs that role.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = require_env("ANSWERER_BASE_URL")?;
        let api_key = require_env("ANSWERER_API_KEY")?;

        let agents = AgentIds {
            triage: env_or_default("TRIAGE_AGENT_ID"),
            faq: env_or_default("FAQ_AGENT_ID"),
            faq_to_json: env_or_default("FAQ_AGENT_TO_JSON_ID"),
            rag: env_or_default("RAG_AGENT_ID"),
            rag_to_json: env_or_default("RAG_AGENT_TO_JSON_ID"),
            reply: env_or_default("REPLY_AGENT_ID"),
            support: env_or_default("SUPPORT_AGENT_ID"),
        };

        let http_port = match std::env::var("SUPPORT_ASSIST_PORT") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "SUPPORT_ASSIST_PORT".to_string(),
                message: format!("not a valid port number: {raw}"),
            })?,
            Err(_) => 8080,
        };

        Ok(Self {
            agents,
            answerer: AnswererConfig {
                base_url: base_url.trim_end_matches('/').to_string(),
                api_key: SecretString::from(api_key),
            },
            poll: PollConfig::default(),
            thread_create_retries: 3,
            http_port,
            db_path: std::env::var("SUPPORT_ASSIST_DB_PATH").ok(),
        })
    }
}

fn require_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

fn env_or_default(key: &str) -> String {
    std::env::var(key).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_defaults_are_bounded() {
        let poll = PollConfig::default();
        assert!(poll.max_attempts > 0);
        assert!(poll.initial_interval <= poll.max_interval);
        assert!(poll.multiplier >= 1.0);
    }

    #[test]
    fn default_config_has_no_agents() {
        let config = Config::default();
        assert!(config.agents.triage.is_empty());
        assert!(config.db_path.is_none());
    }
}
