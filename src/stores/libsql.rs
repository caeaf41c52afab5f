//! libSQL store — persistent `ProcessStore` and `ConversationStore`.
//!
//! Snapshots and conversation records are serde-serialized JSON rows, so the
//! persisted format stays opaque to the workflow. Supports local file and
//! in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::info;

use crate::error::StoreError;
use crate::workflow::engine::WorkflowSnapshot;

use super::conversation::{ConversationState, ConversationStore};
use super::process::ProcessStore;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS process_snapshots (
        email_id TEXT PRIMARY KEY,
        snapshot TEXT NOT NULL,
        seq INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS conversations (
        conversation_key TEXT PRIMARY KEY,
        state TEXT NOT NULL,
        seq INTEGER NOT NULL
    );
"#;

/// libSQL-backed store.
///
/// A single connection is reused for all operations;
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and initialize the schema.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Backend(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to open database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Backend(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.init_schema().await?;
        info!(path = %path.display(), "Store database opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to create in-memory db: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Backend(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        self.conn
            .execute_batch(SCHEMA)
            .await
            .map_err(|e| StoreError::Backend(format!("Schema init failed: {e}")))?;
        Ok(())
    }

    async fn upsert(&self, table: &str, key_column: &str, key: &str, json: &str) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO {table} ({key_column}, {value}, seq) \
             VALUES (?1, ?2, (SELECT COALESCE(MAX(seq), 0) + 1 FROM {table})) \
             ON CONFLICT({key_column}) DO UPDATE SET \
             {value} = excluded.{value}, seq = excluded.seq",
            value = if table == "conversations" { "state" } else { "snapshot" },
        );
        self.conn
            .execute(&sql, params![key, json])
            .await
            .map_err(|e| StoreError::Backend(format!("Write to {table} failed: {e}")))?;
        Ok(())
    }

    async fn fetch_one(&self, sql: &str, key: Option<&str>) -> Result<Option<String>, StoreError> {
        let mut rows = match key {
            Some(key) => self.conn.query(sql, params![key]).await,
            None => self.conn.query(sql, ()).await,
        }
        .map_err(|e| StoreError::Backend(format!("Query failed: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| StoreError::Backend(format!("Row fetch failed: {e}")))?;
        match row {
            Some(row) => {
                let json: String = row
                    .get(0)
                    .map_err(|e| StoreError::Backend(format!("Column read failed: {e}")))?;
                Ok(Some(json))
            }
            None => Ok(None),
        }
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(json: &str) -> Result<T, StoreError> {
    serde_json::from_str(json).map_err(|e| StoreError::Serialization(e.to_string()))
}

#[async_trait]
impl ProcessStore for LibSqlStore {
    async fn save(&self, key: &str, snapshot: WorkflowSnapshot) -> Result<(), StoreError> {
        self.upsert("process_snapshots", "email_id", key, &encode(&snapshot)?)
            .await
    }

    async fn get(&self, key: &str) -> Result<Option<WorkflowSnapshot>, StoreError> {
        self.fetch_one(
            "SELECT snapshot FROM process_snapshots WHERE email_id = ?1",
            Some(key),
        )
        .await?
        .map(|json| decode(&json))
        .transpose()
    }

    async fn get_default(&self) -> Result<Option<WorkflowSnapshot>, StoreError> {
        self.fetch_one(
            "SELECT snapshot FROM process_snapshots ORDER BY seq DESC LIMIT 1",
            None,
        )
        .await?
        .map(|json| decode(&json))
        .transpose()
    }
}

#[async_trait]
impl ConversationStore for LibSqlStore {
    async fn save(&self, key: &str, state: ConversationState) -> Result<(), StoreError> {
        self.upsert("conversations", "conversation_key", key, &encode(&state)?)
            .await
    }

    async fn get(&self, key: &str) -> Result<ConversationState, StoreError> {
        Ok(self
            .fetch_one(
                "SELECT state FROM conversations WHERE conversation_key = ?1",
                Some(key),
            )
            .await?
            .map(|json| decode(&json))
            .transpose()?
            .unwrap_or_else(|| ConversationState::new(key)))
    }

    async fn get_default(&self) -> Result<Option<ConversationState>, StoreError> {
        self.fetch_one(
            "SELECT state FROM conversations ORDER BY seq DESC LIMIT 1",
            None,
        )
        .await?
        .map(|json| decode(&json))
        .transpose()
    }

    async fn answer_question(
        &self,
        key: &str,
        email_id: &str,
        question_id: &str,
        answer: &str,
    ) -> Result<(), StoreError> {
        // Single-key read-modify-write; keys are independent conversations.
        let mut state = ConversationStore::get(self, key).await?;
        let mut changed = false;
        if let Some(qa) = state
            .pending_question_answers
            .iter_mut()
            .find(|qa| qa.question_id == question_id && qa.email_id == email_id)
        {
            qa.answer = Some(answer.to_string());
            changed = true;
        }
        if changed {
            ConversationStore::save(self, key, state).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::engine::RunState;
    use crate::workflow::types::{Email, QuestionAnswer, ThreadsCollection};

    fn snapshot(email_id: &str) -> WorkflowSnapshot {
        WorkflowSnapshot {
            email: Email {
                id: email_id.into(),
                from: "a@x.com".into(),
                to: "s@x.com".into(),
                subject: "subject".into(),
                body: "body".into(),
            },
            threads: ThreadsCollection {
                main_thread_id: "m".into(),
                faq_thread_id: "f".into(),
                rag_thread_id: "r".into(),
            },
            question_answers: vec![QuestionAnswer {
                email_id: email_id.into(),
                question_id: "q1".into(),
                question: "what?".into(),
                answer: None,
            }],
            status: RunState::Suspended,
        }
    }

    #[tokio::test]
    async fn snapshot_roundtrip() {
        let store = LibSqlStore::new_memory().await.unwrap();
        ProcessStore::save(&store, "e1", snapshot("e1")).await.unwrap();

        let loaded = ProcessStore::get(&store, "e1").await.unwrap().unwrap();
        assert_eq!(loaded.email.id, "e1");
        assert_eq!(loaded.status, RunState::Suspended);
        assert_eq!(loaded.question_answers.len(), 1);
        assert!(ProcessStore::get(&store, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn snapshot_overwrite_and_default() {
        let store = LibSqlStore::new_memory().await.unwrap();
        ProcessStore::save(&store, "e1", snapshot("e1")).await.unwrap();
        ProcessStore::save(&store, "e2", snapshot("e2")).await.unwrap();

        let default = ProcessStore::get_default(&store).await.unwrap().unwrap();
        assert_eq!(default.email.id, "e2");

        let mut updated = snapshot("e1");
        updated.status = RunState::Completed;
        ProcessStore::save(&store, "e1", updated).await.unwrap();
        let default = ProcessStore::get_default(&store).await.unwrap().unwrap();
        assert_eq!(default.email.id, "e1");
        assert_eq!(default.status, RunState::Completed);
    }

    #[tokio::test]
    async fn conversation_roundtrip_and_answer() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let mut state = ConversationState::new("conv-1");
        state.pending_question_answers.push(QuestionAnswer {
            email_id: "e1".into(),
            question_id: "q1".into(),
            question: "what?".into(),
            answer: None,
        });
        ConversationStore::save(&store, "conv-1", state).await.unwrap();

        store
            .answer_question("conv-1", "e1", "q1", "this")
            .await
            .unwrap();

        let loaded = ConversationStore::get(&store, "conv-1").await.unwrap();
        assert_eq!(
            loaded.pending_question_answers[0].answer.as_deref(),
            Some("this")
        );
    }

    #[tokio::test]
    async fn local_file_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("support.db");

        {
            let store = LibSqlStore::new_local(&path).await.unwrap();
            ProcessStore::save(&store, "e1", snapshot("e1")).await.unwrap();
        }

        let store = LibSqlStore::new_local(&path).await.unwrap();
        let loaded = ProcessStore::get(&store, "e1").await.unwrap().unwrap();
        assert_eq!(loaded.email.id, "e1");
    }
}
