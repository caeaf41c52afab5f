//! Agent role directory.
//!
//! The workflow refers to agents by role; the directory maps roles to the
//! deployment's agent ids and caches resolved handles for the lifetime of
//! the owning service instance. No global state.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::debug;

use crate::config::AgentIds;
use crate::error::ConfigError;

/// The roles the workflow needs an agent for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentRole {
    /// Extracts open questions from the inbound email.
    Triage,
    /// Answers questions from the FAQ knowledge base.
    Faq,
    /// Converts the FAQ thread's conversational answer to JSON.
    FaqToJson,
    /// Answers questions from the retrieval index.
    Rag,
    /// Converts the RAG thread's conversational answer to JSON.
    RagToJson,
    /// Composes the final customer reply.
    Reply,
    /// Drives the operator-facing support conversation.
    Support,
}

impl AgentRole {
    /// Role name used in configuration errors and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Triage => "triage",
            Self::Faq => "faq",
            Self::FaqToJson => "faq_to_json",
            Self::Rag => "rag",
            Self::RagToJson => "rag_to_json",
            Self::Reply => "reply",
            Self::Support => "support",
        }
    }

    /// The environment variable the deployment sets for this role.
    fn env_hint(&self) -> &'static str {
        match self {
            Self::Triage => "Set TRIAGE_AGENT_ID.",
            Self::Faq => "Set FAQ_AGENT_ID.",
            Self::FaqToJson => "Set FAQ_AGENT_TO_JSON_ID.",
            Self::Rag => "Set RAG_AGENT_ID.",
            Self::RagToJson => "Set RAG_AGENT_TO_JSON_ID.",
            Self::Reply => "Set REPLY_AGENT_ID.",
            Self::Support => "Set SUPPORT_AGENT_ID.",
        }
    }
}

/// A resolved agent, ready to run against a thread.
#[derive(Debug, Clone)]
pub struct AgentHandle {
    pub id: String,
    pub role: AgentRole,
}

/// Role → handle cache, scoped to one service instance.
pub struct AgentCache {
    ids: AgentIds,
    resolved: RwLock<HashMap<AgentRole, AgentHandle>>,
}

impl AgentCache {
    pub fn new(ids: AgentIds) -> Self {
        Self {
            ids,
            resolved: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve a role to its agent handle.
    ///
    /// A role whose id is unconfigured is a fatal configuration error — the
    /// run aborts rather than silently skipping a knowledge source.
    pub async fn resolve(&self, role: AgentRole) -> Result<AgentHandle, ConfigError> {
        if let Some(handle) = self.resolved.read().await.get(&role) {
            return Ok(handle.clone());
        }

        let id = match role {
            AgentRole::Triage => &self.ids.triage,
            AgentRole::Faq => &self.ids.faq,
            AgentRole::FaqToJson => &self.ids.faq_to_json,
            AgentRole::Rag => &self.ids.rag,
            AgentRole::RagToJson => &self.ids.rag_to_json,
            AgentRole::Reply => &self.ids.reply,
            AgentRole::Support => &self.ids.support,
        };

        if id.is_empty() {
            return Err(ConfigError::MissingAgentId {
                role: role.name().to_string(),
                hint: role.env_hint().to_string(),
            });
        }

        let handle = AgentHandle {
            id: id.clone(),
            role,
        };
        debug!(role = role.name(), agent_id = %handle.id, "Resolved agent");
        self.resolved
            .write()
            .await
            .insert(role, handle.clone());
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> AgentIds {
        AgentIds {
            triage: "asst_triage".into(),
            faq: "asst_faq".into(),
            faq_to_json: "asst_faq_json".into(),
            rag: String::new(),
            rag_to_json: "asst_rag_json".into(),
            reply: "asst_reply".into(),
            support: "asst_support".into(),
        }
    }

    #[tokio::test]
    async fn resolves_configured_role() {
        let cache = AgentCache::new(ids());
        let handle = cache.resolve(AgentRole::Triage).await.unwrap();
        assert_eq!(handle.id, "asst_triage");
        assert_eq!(handle.role, AgentRole::Triage);
    }

    #[tokio::test]
    async fn missing_id_is_fatal() {
        let cache = AgentCache::new(ids());
        let err = cache.resolve(AgentRole::Rag).await.unwrap_err();
        match err {
            ConfigError::MissingAgentId { role, .. } => assert_eq!(role, "rag"),
            other => panic!("Expected MissingAgentId, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn second_resolve_hits_cache() {
        let cache = AgentCache::new(ids());
        let first = cache.resolve(AgentRole::Faq).await.unwrap();
        let second = cache.resolve(AgentRole::Faq).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(cache.resolved.read().await.len(), 1);
    }
}
