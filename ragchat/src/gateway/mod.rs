//! LLM gateway contracts.
//!
//! The orchestrator and the ingestion pipeline only see these traits; the HTTP client in
//! [`gemini`] is one implementation, test doubles are another.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod gemini;

pub use gemini::GeminiGateway;

pub type SharedEmbeddingGateway = Arc<dyn EmbeddingGateway>;
pub type SharedGenerationGateway = Arc<dyn GenerationGateway>;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway transport error: {0}")]
    Transport(String),

    #[error("gateway returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("gateway response could not be decoded: {0}")]
    Decode(String),

    /// The call succeeded but produced nothing usable.
    #[error("gateway returned no usable output")]
    EmptyOutput,

    #[error("gateway call timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl From<shared_types::Sender> for Role {
    fn from(sender: shared_types::Sender) -> Self {
        match sender {
            shared_types::Sender::User => Role::User,
            shared_types::Sender::Model => Role::Model,
        }
    }
}

/// One prompt turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// A complete generation request: a system instruction plus ordered turns, the last of
/// which is the user turn to answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub turns: Vec<Turn>,
}

#[async_trait]
pub trait EmbeddingGateway: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, GatewayError>;
}

#[async_trait]
pub trait GenerationGateway: Send + Sync {
    async fn complete(&self, prompt: &Prompt) -> Result<String, GatewayError>;

    async fn summarize_title(&self, seed: &str) -> Result<String, GatewayError>;
}
