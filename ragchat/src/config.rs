use std::path::PathBuf;
use std::time::Duration;

use crate::ingest::DEFAULT_EMBED_INTERVAL;
use crate::orchestrator::{DEFAULT_GENERATION_TIMEOUT, DEFAULT_HISTORY_LIMIT};
use crate::retrieval::ranker::{DEFAULT_SIMILARITY_THRESHOLD, DEFAULT_TOP_K};

#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP API listens on
    pub port: u16,
    /// SQLite database holding chats, messages and chunks
    pub database_url: String,
    /// Required by `serve` and `ingest`; absent is only acceptable in tests.
    pub gemini_api_key: Option<String>,
    pub gemini_base_url: String,
    pub chat_model: String,
    pub title_model: String,
    pub embedding_model: String,
    /// Minimum cosine similarity for a chunk to count as context
    pub similarity_threshold: f32,
    /// Maximum number of chunks joined into the context block
    pub top_k: usize,
    /// Prior messages sent along with each turn
    pub history_limit: usize,
    /// Spacing between embedding calls during ingestion; zero disables pacing
    pub embed_interval: Duration,
    /// Upper bound on a single generation call
    pub generation_timeout: Duration,
    /// Markdown table ingested by `ingest` and `POST /admin/ingest`
    pub data_file: PathBuf,
    /// Callers allowed on `/admin/*`; empty locks the admin routes entirely
    pub admin_users: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        let default_model = "gemini-1.5-flash-latest";
        Self {
            port: 8080,
            database_url: "sqlite:./data/ragchat.db".to_string(),
            gemini_api_key: None,
            gemini_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            chat_model: default_model.to_string(),
            title_model: default_model.to_string(),
            embedding_model: "text-embedding-004".to_string(),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            top_k: DEFAULT_TOP_K,
            history_limit: DEFAULT_HISTORY_LIMIT,
            embed_interval: DEFAULT_EMBED_INTERVAL,
            generation_timeout: DEFAULT_GENERATION_TIMEOUT,
            data_file: PathBuf::from("data.md"),
            admin_users: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let d = Self::default();

        let similarity_threshold: f32 =
            env_parse("RAGCHAT_SIMILARITY_THRESHOLD", d.similarity_threshold)?;
        if !(-1.0..=1.0).contains(&similarity_threshold) {
            anyhow::bail!(
                "RAGCHAT_SIMILARITY_THRESHOLD must be within [-1, 1], got {similarity_threshold}"
            );
        }
        let top_k: usize = env_parse("RAGCHAT_TOP_K", d.top_k)?;
        if top_k == 0 {
            anyhow::bail!("RAGCHAT_TOP_K must be at least 1");
        }

        Ok(Self {
            port: env_parse("RAGCHAT_PORT", d.port)?,
            database_url: env_str("RAGCHAT_DATABASE_URL", &d.database_url),
            gemini_api_key: std::env::var("GEMINI_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            gemini_base_url: env_str("GEMINI_BASE_URL", &d.gemini_base_url),
            chat_model: env_str("RAGCHAT_CHAT_MODEL", &d.chat_model),
            title_model: env_str("RAGCHAT_TITLE_MODEL", &d.title_model),
            embedding_model: env_str("RAGCHAT_EMBEDDING_MODEL", &d.embedding_model),
            similarity_threshold,
            top_k,
            history_limit: env_parse("RAGCHAT_HISTORY_LIMIT", d.history_limit)?,
            embed_interval: Duration::from_millis(env_parse(
                "RAGCHAT_EMBED_INTERVAL_MS",
                d.embed_interval.as_millis() as u64,
            )?),
            generation_timeout: Duration::from_secs(env_parse(
                "RAGCHAT_GENERATION_TIMEOUT_SECS",
                d.generation_timeout.as_secs(),
            )?),
            data_file: std::env::var("RAGCHAT_DATA_FILE")
                .map(PathBuf::from)
                .unwrap_or(d.data_file),
            admin_users: env_csv("RAGCHAT_ADMIN_USERS", &[]),
        })
    }
}

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Failed to parse env var {key}={val}: {e}")),
        Err(_) => Ok(default),
    }
}

fn env_csv(key: &str, default: &[&str]) -> Vec<String> {
    match std::env::var(key) {
        Ok(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect(),
        Err(_) => default.iter().map(|s| (*s).to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_parse_reports_bad_values() {
        std::env::set_var("RAGCHAT_TEST_BAD_PORT", "not-a-port");
        let err = env_parse::<u16>("RAGCHAT_TEST_BAD_PORT", 1).unwrap_err();
        assert!(err.to_string().contains("RAGCHAT_TEST_BAD_PORT=not-a-port"));
        std::env::remove_var("RAGCHAT_TEST_BAD_PORT");
    }

    #[test]
    fn test_env_parse_falls_back_to_default() {
        assert_eq!(env_parse::<usize>("RAGCHAT_TEST_UNSET_KEY", 3).unwrap(), 3);
        assert_eq!(env_str("RAGCHAT_TEST_UNSET_KEY", "data.md"), "data.md");
    }

    #[test]
    fn test_env_csv_trims_and_drops_blanks() {
        std::env::set_var("RAGCHAT_TEST_ADMINS", " ops-1 , ,ops-2,");
        assert_eq!(env_csv("RAGCHAT_TEST_ADMINS", &[]), vec!["ops-1", "ops-2"]);
        std::env::remove_var("RAGCHAT_TEST_ADMINS");
        assert!(env_csv("RAGCHAT_TEST_ADMINS", &[]).is_empty());
    }
}
