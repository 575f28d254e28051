//! Conversation turns.
//!
//! A turn persists the inbound user message, gathers recent history and retrieved context,
//! asks the generation gateway for a reply, and persists that reply. Gateway and retrieval
//! failures never fail the turn: the stored reply degrades to a fixed apology instead.
//! Untitled chats get a title derived in the background once a turn completes.

use std::sync::Arc;
use std::time::Duration;

use shared_types::{Chat, ChatWithMessages, Message, Sender};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};
use crate::gateway::{GatewayError, SharedGenerationGateway};
use crate::retrieval::RetrievalRanker;
use crate::store::{ChatStore, NewMessage};

pub mod prompt;
pub mod title;

pub use prompt::{EMPTY_OUTPUT_REPLY, GENERATION_FAILED_REPLY};

pub const DEFAULT_HISTORY_LIMIT: usize = 5;
pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(60);

pub struct ConversationOrchestrator {
    store: Arc<dyn ChatStore>,
    ranker: Arc<RetrievalRanker>,
    generator: SharedGenerationGateway,
    history_limit: usize,
    generation_timeout: Duration,
    background: TaskTracker,
}

impl ConversationOrchestrator {
    pub fn new(
        store: Arc<dyn ChatStore>,
        ranker: Arc<RetrievalRanker>,
        generator: SharedGenerationGateway,
    ) -> Self {
        Self {
            store,
            ranker,
            generator,
            history_limit: DEFAULT_HISTORY_LIMIT,
            generation_timeout: DEFAULT_GENERATION_TIMEOUT,
            background: TaskTracker::new(),
        }
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }

    /// Tracker for detached title tasks. Shutdown closes it and waits.
    pub fn background(&self) -> &TaskTracker {
        &self.background
    }

    /// Wait for every title task spawned so far, then accept new ones again.
    pub async fn drain_background(&self) {
        self.background.close();
        self.background.wait().await;
        self.background.reopen();
    }

    /// Create a chat, optionally answering its first message in the same call.
    pub async fn create_chat(
        &self,
        owner: &str,
        first_message: Option<&str>,
    ) -> EngineResult<ChatWithMessages> {
        let first_message = first_message.map(str::trim).filter(|m| !m.is_empty());

        let chat = self.store.create_chat(owner, None).await?;
        info!(chat_id = %chat.id, owner, "created chat");

        let Some(content) = first_message else {
            return Ok(ChatWithMessages {
                chat,
                messages: Vec::new(),
            });
        };

        // The chat exists at this point; later write failures still return it.
        let inbound = match self
            .store
            .append_message(NewMessage::user(&chat.id, content))
            .await
        {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!(chat_id = %chat.id, error = %e, "failed to store first message");
                return Ok(ChatWithMessages {
                    chat,
                    messages: Vec::new(),
                });
            }
        };
        let mut messages = vec![inbound.clone()];

        match self.reply_to(&chat, &inbound).await {
            Ok(reply) => messages.push(reply),
            Err(e) => warn!(chat_id = %chat.id, error = %e, "failed to store first reply"),
        }

        self.spawn_title(&chat, owner, content.to_string());

        Ok(ChatWithMessages { chat, messages })
    }

    pub async fn list_chats(&self, owner: &str) -> EngineResult<Vec<Chat>> {
        Ok(self.store.list_chats(owner).await?)
    }

    pub async fn chat_details(
        &self,
        chat_id: &str,
        owner: &str,
        limit: i64,
        offset: i64,
    ) -> EngineResult<ChatWithMessages> {
        if limit <= 0 || offset < 0 {
            return Err(EngineError::Validation(
                "limit must be positive and offset non-negative".to_string(),
            ));
        }
        let chat = self.owned_chat(chat_id, owner).await?;
        let messages = self.store.all_messages(chat_id, limit, offset).await?;
        Ok(ChatWithMessages { chat, messages })
    }

    /// Run one turn and return the stored model reply.
    pub async fn post_message(
        &self,
        chat_id: &str,
        owner: &str,
        content: &str,
    ) -> EngineResult<Message> {
        let content = content.trim();
        if content.is_empty() {
            return Err(EngineError::Validation(
                "message content must not be empty".to_string(),
            ));
        }

        let chat = self.owned_chat(chat_id, owner).await?;
        let inbound = self
            .store
            .append_message(NewMessage::user(chat_id, content))
            .await?;

        let reply = self.reply_to(&chat, &inbound).await?;

        if !chat.has_title() {
            match self.title_seed(chat_id).await {
                Some(seed) => self.spawn_title(&chat, owner, seed),
                None => debug!(chat_id, "no user message to derive a title from"),
            }
        }

        Ok(reply)
    }

    pub async fn set_feedback(
        &self,
        message_id: &str,
        owner: &str,
        negative: bool,
    ) -> EngineResult<()> {
        match self.store.set_feedback(message_id, owner, negative).await? {
            0 => Err(EngineError::NotFound("message")),
            _ => {
                info!(message_id, negative, "recorded message feedback");
                Ok(())
            }
        }
    }

    async fn owned_chat(&self, chat_id: &str, owner: &str) -> EngineResult<Chat> {
        self.store
            .get_chat(chat_id, owner)
            .await?
            .ok_or(EngineError::NotFound("chat"))
    }

    /// Generate and persist the model reply to `inbound`. Only the final write can fail.
    async fn reply_to(&self, chat: &Chat, inbound: &Message) -> EngineResult<Message> {
        let history = self.history_before(chat, inbound).await;

        let context = match self.ranker.retrieve(&inbound.content).await {
            Ok(context) => context,
            Err(e) => {
                warn!(chat_id = %chat.id, error = %e, "retrieval failed, answering without context");
                String::new()
            }
        };
        debug!(
            chat_id = %chat.id,
            history = history.len(),
            context_chars = context.len(),
            "assembled prompt inputs"
        );

        let prompt = prompt::build_prompt(&history, &context, &inbound.content);
        let generated = tokio::time::timeout(self.generation_timeout, self.generator.complete(&prompt))
            .await
            .unwrap_or(Err(GatewayError::Timeout(self.generation_timeout)));
        let text = match generated {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) | Err(GatewayError::EmptyOutput) => {
                warn!(chat_id = %chat.id, "generation returned empty text");
                EMPTY_OUTPUT_REPLY.to_string()
            }
            Err(e) => {
                warn!(chat_id = %chat.id, error = %e, "generation failed");
                GENERATION_FAILED_REPLY.to_string()
            }
        };

        let reply = self
            .store
            .append_message(NewMessage::model(&chat.id, text))
            .await?;
        Ok(reply)
    }

    /// Up to `history_limit` messages preceding `inbound`, oldest first.
    async fn history_before(&self, chat: &Chat, inbound: &Message) -> Vec<Message> {
        if self.history_limit == 0 {
            return Vec::new();
        }
        let fetch = self.history_limit as i64 + 1;
        match self.store.recent_messages(&chat.id, fetch).await {
            Ok(recent) => {
                let mut history: Vec<Message> = recent
                    .into_iter()
                    .filter(|m| m.id != inbound.id)
                    .take(self.history_limit)
                    .collect();
                history.reverse();
                history
            }
            Err(e) => {
                warn!(chat_id = %chat.id, error = %e, "failed to load history, continuing without it");
                Vec::new()
            }
        }
    }

    async fn title_seed(&self, chat_id: &str) -> Option<String> {
        match self.store.all_messages(chat_id, 2, 0).await {
            Ok(messages) => messages
                .into_iter()
                .find(|m| m.sender == Sender::User)
                .map(|m| m.content),
            Err(e) => {
                warn!(chat_id, error = %e, "failed to load first message for title");
                None
            }
        }
    }

    fn spawn_title(&self, chat: &Chat, owner: &str, seed: String) {
        self.background.spawn(title::derive_and_save_title(
            Arc::clone(&self.store),
            Arc::clone(&self.generator),
            self.generation_timeout,
            chat.id.clone(),
            owner.to_string(),
            seed,
        ));
    }
}
