//! Shared fakes and wiring for the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use ragchat::config::Config;
use ragchat::gateway::{EmbeddingGateway, GatewayError, GenerationGateway, Prompt};
use ragchat::retrieval::ChunkIndex;
use ragchat::retrieval::Chunk;
use ragchat::store::{ChatStore, NewMessage, SqliteStore, StoreResult};
use ragchat::AppState;
use shared_types::{Chat, Message, Sender};

pub const PARIS: &str = "Paris is the capital of France";
pub const SKY: &str = "The sky is blue";

/// Embeds by keyword into three orthogonal axes: geography, weather, everything else.
#[derive(Default)]
pub struct KeywordEmbedder {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

impl KeywordEmbedder {
    pub fn vector_for(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        if lower.contains("capital") || lower.contains("france") || lower.contains("paris") {
            vec![1.0, 0.0, 0.0]
        } else if lower.contains("sky") || lower.contains("blue") {
            vec![0.0, 1.0, 0.0]
        } else {
            vec![0.0, 0.0, 1.0]
        }
    }
}

#[async_trait]
impl EmbeddingGateway for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("embedding service down".to_string()));
        }
        Ok(Self::vector_for(text))
    }
}

#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Empty,
    Fail,
    Hang,
}

/// Scripted generation gateway that records every request it sees.
pub struct ScriptedGenerator {
    reply: Mutex<Reply>,
    titles: Mutex<VecDeque<String>>,
    pub prompts: Mutex<Vec<Prompt>>,
    pub title_seeds: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(reply: Reply) -> Self {
        Self {
            reply: Mutex::new(reply),
            titles: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
            title_seeds: Mutex::new(Vec::new()),
        }
    }

    pub fn set_reply(&self, reply: Reply) {
        *self.reply.lock().unwrap() = reply;
    }

    /// Titles handed out in order; "Untitled Topic" once exhausted.
    pub fn queue_titles(&self, titles: &[&str]) {
        let mut queue = self.titles.lock().unwrap();
        queue.extend(titles.iter().map(|t| t.to_string()));
    }

    pub fn last_prompt(&self) -> Prompt {
        self.prompts.lock().unwrap().last().cloned().expect("no prompt recorded")
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn title_calls(&self) -> usize {
        self.title_seeds.lock().unwrap().len()
    }
}

#[async_trait]
impl GenerationGateway for ScriptedGenerator {
    async fn complete(&self, prompt: &Prompt) -> Result<String, GatewayError> {
        self.prompts.lock().unwrap().push(prompt.clone());
        let reply = self.reply.lock().unwrap().clone();
        match reply {
            Reply::Text(text) => Ok(text),
            Reply::Empty => Ok(String::new()),
            Reply::Fail => Err(GatewayError::Status {
                status: 503,
                body: "overloaded".to_string(),
            }),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok("too late".to_string())
            }
        }
    }

    async fn summarize_title(&self, seed: &str) -> Result<String, GatewayError> {
        self.title_seeds.lock().unwrap().push(seed.to_string());
        let title = self.titles.lock().unwrap().pop_front();
        // Let a concurrent turn interleave before the title is written.
        tokio::task::yield_now().await;
        Ok(title.unwrap_or_else(|| "\"Untitled Topic.\"".to_string()))
    }
}

/// Operations [`FaultyStore`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    RecentMessages,
    AppendUserMessage,
    AppendModelMessage,
}

/// `SqliteStore` that fails chosen operations on demand.
pub struct FaultyStore {
    inner: SqliteStore,
    faults: Mutex<Vec<Fault>>,
}

impl FaultyStore {
    pub async fn in_memory() -> Self {
        Self {
            inner: SqliteStore::in_memory().await.expect("in-memory store"),
            faults: Mutex::new(Vec::new()),
        }
    }

    pub fn inject(&self, fault: Fault) {
        self.faults.lock().unwrap().push(fault);
    }

    pub fn pool(&self) -> &sqlx::SqlitePool {
        self.inner.pool()
    }

    fn check(&self, fault: Fault) -> StoreResult<()> {
        if self.faults.lock().unwrap().contains(&fault) {
            Err(sqlx::Error::PoolClosed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ChatStore for FaultyStore {
    async fn create_chat(&self, owner: &str, title: Option<&str>) -> StoreResult<Chat> {
        self.inner.create_chat(owner, title).await
    }

    async fn get_chat(&self, chat_id: &str, owner: &str) -> StoreResult<Option<Chat>> {
        self.inner.get_chat(chat_id, owner).await
    }

    async fn list_chats(&self, owner: &str) -> StoreResult<Vec<Chat>> {
        self.inner.list_chats(owner).await
    }

    async fn append_message(&self, message: NewMessage) -> StoreResult<Message> {
        match message.sender {
            Sender::User => self.check(Fault::AppendUserMessage)?,
            Sender::Model => self.check(Fault::AppendModelMessage)?,
        }
        self.inner.append_message(message).await
    }

    async fn recent_messages(&self, chat_id: &str, n: i64) -> StoreResult<Vec<Message>> {
        self.check(Fault::RecentMessages)?;
        self.inner.recent_messages(chat_id, n).await
    }

    async fn all_messages(
        &self,
        chat_id: &str,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Message>> {
        self.inner.all_messages(chat_id, limit, offset).await
    }

    async fn set_title(&self, chat_id: &str, owner: &str, title: &str) -> StoreResult<u64> {
        self.inner.set_title(chat_id, owner, title).await
    }

    async fn set_feedback(
        &self,
        message_id: &str,
        owner: &str,
        negative: bool,
    ) -> StoreResult<u64> {
        self.inner.set_feedback(message_id, owner, negative).await
    }

    async fn all_chunks(&self) -> StoreResult<Vec<Chunk>> {
        self.inner.all_chunks().await
    }

    async fn clear_chunks(&self) -> StoreResult<()> {
        self.inner.clear_chunks().await
    }

    async fn insert_chunk(&self, text: &str, embedding: &[f32]) -> StoreResult<i64> {
        self.inner.insert_chunk(text, embedding).await
    }
}

pub struct Harness {
    pub state: Arc<AppState>,
    pub store: Arc<FaultyStore>,
    pub embedder: Arc<KeywordEmbedder>,
    pub generator: Arc<ScriptedGenerator>,
}

impl Harness {
    pub async fn new(reply: Reply) -> Self {
        Self::with_config(reply, test_config()).await
    }

    pub async fn with_config(reply: Reply, config: Config) -> Self {
        let store = Arc::new(FaultyStore::in_memory().await);
        let embedder = Arc::new(KeywordEmbedder::default());
        let generator = Arc::new(ScriptedGenerator::new(reply));
        let index = Arc::new(ChunkIndex::default());

        let state = Arc::new(AppState::new(
            store.clone(),
            index,
            embedder.clone(),
            generator.clone(),
            &config,
        ));

        Self {
            state,
            store,
            embedder,
            generator,
        }
    }

    /// Store `texts` with keyword embeddings and publish them to the index.
    pub async fn seed_chunks(&self, texts: &[&str]) {
        for text in texts {
            self.store
                .insert_chunk(text, &KeywordEmbedder::vector_for(text))
                .await
                .expect("insert chunk");
        }
        self.state
            .index
            .reload(self.store.as_ref())
            .await
            .expect("reload index");
    }

    pub async fn message_count(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM messages")
            .fetch_one(self.store.pool())
            .await
            .expect("count messages")
    }
}

pub fn test_config() -> Config {
    Config {
        embed_interval: Duration::ZERO,
        generation_timeout: Duration::from_secs(5),
        ..Config::default()
    }
}
