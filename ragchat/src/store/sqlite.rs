use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared_types::{Chat, Message, Sender};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::warn;
use uuid::Uuid;

use crate::retrieval::Chunk;
use crate::store::{ChatStore, NewMessage, StoreResult};

/// SQLite-backed [`ChatStore`] over a shared pool.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn in_memory() -> StoreResult<Self> {
        Ok(Self::new(crate::db::connect_in_memory().await?))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn chat_from_row(row: &SqliteRow) -> StoreResult<Chat> {
    Ok(Chat {
        id: row.try_get("id")?,
        owner: row.try_get("owner")?,
        title: row.try_get("title")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

fn message_from_row(row: &SqliteRow) -> StoreResult<Message> {
    let sender: String = row.try_get("sender")?;
    Ok(Message {
        id: row.try_get("id")?,
        chat_id: row.try_get("chat_id")?,
        sender: sender
            .parse::<Sender>()
            .map_err(|e| sqlx::Error::Decode(e.into()))?,
        content: row.try_get("content")?,
        timestamp: row.try_get::<DateTime<Utc>, _>("timestamp")?,
        negative_feedback: row.try_get("negative_feedback")?,
    })
}

/// A row whose embedding cannot be decoded still loads, without an embedding.
fn chunk_from_row(row: &SqliteRow) -> StoreResult<Chunk> {
    let id: i64 = row.try_get("id")?;
    let text: String = row.try_get("content")?;
    let raw: Option<String> = row.try_get("embedding_json")?;

    let embedding = match raw.as_deref().map(str::trim) {
        None | Some("") => {
            warn!(chunk_id = id, "chunk has no stored embedding");
            None
        }
        Some(json) => match serde_json::from_str::<Vec<f32>>(json) {
            Ok(values) => Some(values),
            Err(e) => {
                warn!(chunk_id = id, error = %e, "failed to decode chunk embedding");
                None
            }
        },
    };

    Ok(Chunk {
        id,
        text,
        embedding,
    })
}

#[async_trait]
impl ChatStore for SqliteStore {
    async fn create_chat(&self, owner: &str, title: Option<&str>) -> StoreResult<Chat> {
        let chat = Chat {
            id: Uuid::new_v4().to_string(),
            owner: owner.to_string(),
            title: title.map(ToString::to_string),
            created_at: Utc::now(),
        };
        sqlx::query("INSERT INTO chats (id, owner, title, created_at) VALUES (?, ?, ?, ?)")
            .bind(&chat.id)
            .bind(&chat.owner)
            .bind(&chat.title)
            .bind(chat.created_at)
            .execute(&self.pool)
            .await?;
        Ok(chat)
    }

    async fn get_chat(&self, chat_id: &str, owner: &str) -> StoreResult<Option<Chat>> {
        sqlx::query("SELECT id, owner, title, created_at FROM chats WHERE id = ? AND owner = ?")
            .bind(chat_id)
            .bind(owner)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(chat_from_row)
            .transpose()
    }

    async fn list_chats(&self, owner: &str) -> StoreResult<Vec<Chat>> {
        let rows = sqlx::query(
            "SELECT id, owner, title, created_at FROM chats
             WHERE owner = ?
             ORDER BY created_at DESC, rowid DESC",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(chat_from_row).collect()
    }

    async fn append_message(&self, message: NewMessage) -> StoreResult<Message> {
        let stored = Message {
            id: Uuid::new_v4().to_string(),
            chat_id: message.chat_id,
            sender: message.sender,
            content: message.content,
            timestamp: Utc::now(),
            negative_feedback: false,
        };
        sqlx::query(
            "INSERT INTO messages (id, chat_id, sender, content, timestamp, negative_feedback)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&stored.id)
        .bind(&stored.chat_id)
        .bind(stored.sender.as_str())
        .bind(&stored.content)
        .bind(stored.timestamp)
        .bind(stored.negative_feedback)
        .execute(&self.pool)
        .await?;
        Ok(stored)
    }

    async fn recent_messages(&self, chat_id: &str, n: i64) -> StoreResult<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT id, chat_id, sender, content, timestamp, negative_feedback
             FROM messages
             WHERE chat_id = ?
             ORDER BY seq DESC
             LIMIT ?",
        )
        .bind(chat_id)
        .bind(n)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(message_from_row).collect()
    }

    async fn all_messages(
        &self,
        chat_id: &str,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT id, chat_id, sender, content, timestamp, negative_feedback
             FROM messages
             WHERE chat_id = ?
             ORDER BY seq ASC
             LIMIT ? OFFSET ?",
        )
        .bind(chat_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(message_from_row).collect()
    }

    async fn set_title(&self, chat_id: &str, owner: &str, title: &str) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE chats SET title = ?
             WHERE id = ? AND owner = ? AND (title IS NULL OR trim(title) = '')",
        )
        .bind(title)
        .bind(chat_id)
        .bind(owner)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn set_feedback(
        &self,
        message_id: &str,
        owner: &str,
        negative: bool,
    ) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE messages SET negative_feedback = ?
             WHERE id = ? AND chat_id IN (SELECT id FROM chats WHERE owner = ?)",
        )
        .bind(negative)
        .bind(message_id)
        .bind(owner)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn all_chunks(&self) -> StoreResult<Vec<Chunk>> {
        let rows = sqlx::query("SELECT id, content, embedding_json FROM data_chunks ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(chunk_from_row).collect()
    }

    async fn clear_chunks(&self) -> StoreResult<()> {
        sqlx::query("DELETE FROM data_chunks")
            .execute(&self.pool)
            .await?;
        if let Err(e) = sqlx::query("DELETE FROM sqlite_sequence WHERE name = 'data_chunks'")
            .execute(&self.pool)
            .await
        {
            warn!(error = %e, "could not reset data_chunks id sequence");
        }
        Ok(())
    }

    async fn insert_chunk(&self, text: &str, embedding: &[f32]) -> StoreResult<i64> {
        let embedding_json =
            serde_json::to_string(embedding).map_err(|e| sqlx::Error::Encode(e.into()))?;
        let result = sqlx::query("INSERT INTO data_chunks (content, embedding_json) VALUES (?, ?)")
            .bind(text)
            .bind(embedding_json)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }
}
