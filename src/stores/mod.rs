//! State stores — conversation records and suspended-run snapshots.

pub mod conversation;
pub mod libsql;
pub mod process;

pub use conversation::{ConversationState, ConversationStore, InMemoryConversationStore};
pub use libsql::LibSqlStore;
pub use process::{InMemoryProcessStore, ProcessStore};
