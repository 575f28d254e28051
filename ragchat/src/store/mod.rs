//! Persistence contract consumed by the orchestrator, the index and ingestion.
//!
//! Every method is a single independent write or read. Nothing here opens a transaction
//! that spans calls, so multi-step flows (chat + first message + reply, clear + insert
//! chunks) can be left half-done by a crash.

use async_trait::async_trait;
use shared_types::{Chat, Message, Sender};

use crate::retrieval::Chunk;

pub mod sqlite;

pub use sqlite::SqliteStore;

pub type StoreResult<T> = Result<T, sqlx::Error>;

/// Message to append; the store assigns id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub chat_id: String,
    pub sender: Sender,
    pub content: String,
}

impl NewMessage {
    pub fn user(chat_id: &str, content: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.to_string(),
            sender: Sender::User,
            content: content.into(),
        }
    }

    pub fn model(chat_id: &str, content: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.to_string(),
            sender: Sender::Model,
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn create_chat(&self, owner: &str, title: Option<&str>) -> StoreResult<Chat>;

    /// `None` when the chat does not exist or belongs to someone else.
    async fn get_chat(&self, chat_id: &str, owner: &str) -> StoreResult<Option<Chat>>;

    /// Newest first.
    async fn list_chats(&self, owner: &str) -> StoreResult<Vec<Chat>>;

    async fn append_message(&self, message: NewMessage) -> StoreResult<Message>;

    /// The `n` most recent messages, newest first.
    async fn recent_messages(&self, chat_id: &str, n: i64) -> StoreResult<Vec<Message>>;

    /// Oldest first.
    async fn all_messages(&self, chat_id: &str, limit: i64, offset: i64)
        -> StoreResult<Vec<Message>>;

    /// Sets the title only while it is still unset. Returns the number of rows changed.
    async fn set_title(&self, chat_id: &str, owner: &str, title: &str) -> StoreResult<u64>;

    /// Flags a message the owner of its chat marked as unhelpful. Returns rows changed.
    async fn set_feedback(&self, message_id: &str, owner: &str, negative: bool)
        -> StoreResult<u64>;

    async fn all_chunks(&self) -> StoreResult<Vec<Chunk>>;

    async fn clear_chunks(&self) -> StoreResult<()>;

    async fn insert_chunk(&self, text: &str, embedding: &[f32]) -> StoreResult<i64>;

    /// Clear then insert, one write at a time.
    async fn replace_chunks(&self, chunks: &[(String, Vec<f32>)]) -> StoreResult<usize> {
        self.clear_chunks().await?;
        for (text, embedding) in chunks {
            self.insert_chunk(text, embedding).await?;
        }
        Ok(chunks.len())
    }
}
