//! Gemini REST client for embeddings and generation.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::gateway::{EmbeddingGateway, GatewayError, GenerationGateway, Prompt, Role};

const TITLE_SYSTEM_INSTRUCTION: &str = "You are a helpful assistant that generates concise titles for chat conversations. \
The title should be 3-5 words maximum. Just return the title itself, nothing else.";

const TITLE_TEMPERATURE: f32 = 0.3;
const TITLE_MAX_OUTPUT_TOKENS: u32 = 20;

#[derive(Debug, Clone)]
pub struct GeminiGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    chat_model: String,
    title_model: String,
    embedding_model: String,
}

impl GeminiGateway {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            chat_model: "gemini-1.5-flash-latest".to_string(),
            title_model: "gemini-1.5-flash-latest".to_string(),
            embedding_model: "text-embedding-004".to_string(),
        })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let api_key = config
            .gemini_api_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("GEMINI_API_KEY environment variable is required"))?;
        let gateway = Self::new(&config.gemini_base_url, api_key, config.generation_timeout)?
            .with_models(
                &config.chat_model,
                &config.title_model,
                &config.embedding_model,
            );
        Ok(gateway)
    }

    pub fn with_models(mut self, chat: &str, title: &str, embedding: &str) -> Self {
        self.chat_model = chat.to_string();
        self.title_model = title.to_string();
        self.embedding_model = embedding.to_string();
        self
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{model}:{method}", self.base_url)
    }

    async fn post<B: Serialize, R: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<R, GatewayError> {
        let res = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                error!(url, error = %e, "gemini request failed");
                GatewayError::from(e)
            })?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            warn!(url, status = status.as_u16(), "gemini returned an error status");
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body,
            });
        }

        res.json::<R>().await.map_err(GatewayError::from)
    }

    async fn generate(&self, model: &str, request: &GenerateRequest) -> Result<String, GatewayError> {
        let response: GenerateResponse = self
            .post(&self.model_url(model, "generateContent"), request)
            .await?;

        let Some(content) = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
        else {
            debug!(model, "gemini response had no candidates");
            return Err(GatewayError::EmptyOutput);
        };

        let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
        if text.trim().is_empty() {
            return Err(GatewayError::EmptyOutput);
        }
        Ok(text)
    }
}

#[async_trait]
impl EmbeddingGateway for GeminiGateway {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, GatewayError> {
        let request = EmbedRequest {
            model: format!("models/{}", self.embedding_model),
            content: Content {
                role: None,
                parts: vec![Part::text(text)],
            },
        };
        let response: EmbedResponse = self
            .post(&self.model_url(&self.embedding_model, "embedContent"), &request)
            .await?;

        match response.embedding {
            Some(embedding) if !embedding.values.is_empty() => Ok(embedding.values),
            _ => Err(GatewayError::EmptyOutput),
        }
    }
}

#[async_trait]
impl GenerationGateway for GeminiGateway {
    async fn complete(&self, prompt: &Prompt) -> Result<String, GatewayError> {
        let request = GenerateRequest {
            system_instruction: Some(Content {
                role: None,
                parts: vec![Part::text(&prompt.system)],
            }),
            contents: prompt
                .turns
                .iter()
                .map(|turn| Content {
                    role: Some(turn.role),
                    parts: vec![Part::text(&turn.text)],
                })
                .collect(),
            generation_config: None,
        };
        self.generate(&self.chat_model, &request).await
    }

    async fn summarize_title(&self, seed: &str) -> Result<String, GatewayError> {
        let request = GenerateRequest {
            system_instruction: Some(Content {
                role: None,
                parts: vec![Part::text(TITLE_SYSTEM_INSTRUCTION)],
            }),
            contents: vec![Content {
                role: Some(Role::User),
                parts: vec![Part::text(format!(
                    "Generate a very concise title (3-5 words maximum) for a conversation that starts with or is about: \"{seed}\"."
                ))],
            }],
            generation_config: Some(GenerationConfig {
                temperature: Some(TITLE_TEMPERATURE),
                max_output_tokens: Some(TITLE_MAX_OUTPUT_TOKENS),
            }),
        };
        self.generate(&self.title_model, &request).await
    }
}

// ── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

impl Part {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<Role>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    content: Content,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Option<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    #[serde(default)]
    values: Vec<f32>,
}
