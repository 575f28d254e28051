//! Background chat-title derivation.
//!
//! Runs detached from the request that triggered it. Every failure ends here with a log
//! line; nothing is reported back to the caller.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::gateway::{GatewayError, SharedGenerationGateway};
use crate::store::ChatStore;

/// Drop the quoting and punctuation models like to wrap titles in.
pub fn clean_title(raw: &str) -> &str {
    raw.trim_matches(|c: char| matches!(c, '"' | '\'' | '.') || c.is_whitespace())
}

pub(crate) async fn derive_and_save_title(
    store: Arc<dyn ChatStore>,
    generator: SharedGenerationGateway,
    timeout: Duration,
    chat_id: String,
    owner: String,
    seed: String,
) {
    debug!(chat_id = %chat_id, "deriving chat title");

    let raw = match tokio::time::timeout(timeout, generator.summarize_title(&seed))
        .await
        .unwrap_or(Err(GatewayError::Timeout(timeout)))
    {
        Ok(raw) => raw,
        Err(e) => {
            warn!(chat_id = %chat_id, error = %e, "title generation failed");
            return;
        }
    };

    let title = clean_title(&raw);
    if title.is_empty() {
        warn!(chat_id = %chat_id, "title generation returned an empty title");
        return;
    }

    match store.set_title(&chat_id, &owner, title).await {
        Ok(0) => info!(
            chat_id = %chat_id,
            "title not saved: chat gone, not owned, or already titled"
        ),
        Ok(_) => info!(chat_id = %chat_id, title, "saved generated chat title"),
        Err(e) => warn!(chat_id = %chat_id, title, error = %e, "failed to save chat title"),
    }
}
