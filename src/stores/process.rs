//! Process state store — suspended workflow snapshots, keyed by email id.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::workflow::engine::WorkflowSnapshot;

/// Keyed store of suspended-run snapshots.
///
/// Single-key operations are atomic per key; keys (email ids) are
/// independent, so no cross-run locking is needed here. Serializing
/// overlapping drives of the *same* run is the service's job.
#[async_trait]
pub trait ProcessStore: Send + Sync {
    async fn save(&self, key: &str, snapshot: WorkflowSnapshot) -> Result<(), StoreError>;

    /// Fetch a snapshot. `None` means nothing to resume.
    async fn get(&self, key: &str) -> Result<Option<WorkflowSnapshot>, StoreError>;

    /// The most recently saved snapshot, if any.
    async fn get_default(&self) -> Result<Option<WorkflowSnapshot>, StoreError>;
}

/// In-memory process store. Reference implementation; best-effort, not
/// crash-durable.
#[derive(Default)]
pub struct InMemoryProcessStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, (u64, WorkflowSnapshot)>,
    next_seq: u64,
}

impl InMemoryProcessStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProcessStore for InMemoryProcessStore {
    async fn save(&self, key: &str, snapshot: WorkflowSnapshot) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.insert(key.to_string(), (seq, snapshot));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<WorkflowSnapshot>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.entries.get(key).map(|(_, s)| s.clone()))
    }

    async fn get_default(&self) -> Result<Option<WorkflowSnapshot>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .entries
            .values()
            .max_by_key(|(seq, _)| *seq)
            .map(|(_, s)| s.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::engine::RunState;
    use crate::workflow::types::{Email, ThreadsCollection};

    fn snapshot(email_id: &str) -> WorkflowSnapshot {
        WorkflowSnapshot {
            email: Email {
                id: email_id.into(),
                from: "a@x.com".into(),
                to: "support@x.com".into(),
                subject: "s".into(),
                body: "b".into(),
            },
            threads: ThreadsCollection {
                main_thread_id: "t-main".into(),
                faq_thread_id: "t-faq".into(),
                rag_thread_id: "t-rag".into(),
            },
            question_answers: Vec::new(),
            status: RunState::Suspended,
        }
    }

    #[tokio::test]
    async fn save_and_get() {
        let store = InMemoryProcessStore::new();
        store.save("e1", snapshot("e1")).await.unwrap();

        let loaded = store.get("e1").await.unwrap().unwrap();
        assert_eq!(loaded.email.id, "e1");
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_overwrites_same_key() {
        let store = InMemoryProcessStore::new();
        store.save("e1", snapshot("e1")).await.unwrap();
        let mut updated = snapshot("e1");
        updated.status = RunState::Completed;
        store.save("e1", updated).await.unwrap();

        let loaded = store.get("e1").await.unwrap().unwrap();
        assert_eq!(loaded.status, RunState::Completed);
    }

    #[tokio::test]
    async fn get_default_is_most_recent() {
        let store = InMemoryProcessStore::new();
        store.save("e1", snapshot("e1")).await.unwrap();
        store.save("e2", snapshot("e2")).await.unwrap();
        let default = store.get_default().await.unwrap().unwrap();
        assert_eq!(default.email.id, "e2");
    }
}
