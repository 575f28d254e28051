//! Brute-force similarity ranking over an index snapshot.

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::gateway::SharedEmbeddingGateway;
use crate::retrieval::index::{Chunk, ChunkIndex, IndexSnapshot};
use crate::retrieval::vector::cosine_similarity;

pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.7;
pub const DEFAULT_TOP_K: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredChunk<'a> {
    pub chunk: &'a Chunk,
    pub similarity: f32,
}

/// Score every rankable chunk, keep those at or above `threshold`, best first.
///
/// The sort is stable so equal scores keep index order.
pub fn rank<'a>(
    snapshot: &'a IndexSnapshot,
    query: &[f32],
    threshold: f32,
    top_k: usize,
) -> Vec<ScoredChunk<'a>> {
    let mut scored: Vec<ScoredChunk<'a>> = Vec::new();
    for chunk in snapshot.chunks() {
        let Some(embedding) = chunk.rankable_embedding() else {
            debug!(chunk_id = chunk.id, "skipping chunk without embedding");
            continue;
        };
        let similarity = match cosine_similarity(query, embedding) {
            Ok(s) => s,
            Err(e) => {
                warn!(chunk_id = chunk.id, error = %e, "similarity failed, skipping chunk");
                continue;
            }
        };
        if similarity >= threshold {
            scored.push(ScoredChunk { chunk, similarity });
        }
    }

    scored.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
    });
    scored.truncate(top_k);
    scored
}

/// Join chunk texts with blank lines between them.
pub fn build_context(scored: &[ScoredChunk<'_>]) -> String {
    let mut context = String::new();
    for hit in scored {
        context.push_str(&hit.chunk.text);
        context.push_str("\n\n");
    }
    context.truncate(context.trim_end().len());
    context
}

pub struct RetrievalRanker {
    index: Arc<ChunkIndex>,
    embedder: SharedEmbeddingGateway,
    threshold: f32,
    top_k: usize,
}

impl RetrievalRanker {
    pub fn new(index: Arc<ChunkIndex>, embedder: SharedEmbeddingGateway) -> Self {
        Self {
            index,
            embedder,
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn index(&self) -> &Arc<ChunkIndex> {
        &self.index
    }

    /// Context string for an already-embedded query. Empty when nothing clears the
    /// threshold.
    pub fn context_for_embedding(&self, query: &[f32]) -> String {
        let snapshot = self.index.snapshot();
        let hits = rank(&snapshot, query, self.threshold, self.top_k);
        if hits.is_empty() {
            info!(
                threshold = self.threshold,
                candidates = snapshot.len(),
                "no chunk cleared the similarity threshold"
            );
            return String::new();
        }
        info!(
            retrieved = hits.len(),
            best = hits[0].similarity,
            "retrieved relevant chunks"
        );
        build_context(&hits)
    }

    /// Embed `query` and build its context. An empty index never reaches the gateway.
    pub async fn retrieve(&self, query: &str) -> Result<String, EngineError> {
        if self.index.snapshot().is_empty() {
            info!("no chunks available for retrieval");
            return Ok(String::new());
        }
        let embedding = self.embedder.embed(query).await?;
        Ok(self.context_for_embedding(&embedding))
    }
}
