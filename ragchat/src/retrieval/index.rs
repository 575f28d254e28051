//! In-memory chunk index.
//!
//! The index is a read-mostly cache of the persisted chunk set. Each load produces an
//! immutable [`IndexSnapshot`]; readers clone the current `Arc` and keep using it even if
//! ingestion swaps a new snapshot in underneath them.

use std::sync::{Arc, RwLock};

use serde::Serialize;
use tracing::{info, warn};

use crate::error::EngineError;
use crate::store::ChatStore;

/// One unit of ingested text with its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: i64,
    pub text: String,
    /// `None` when the stored embedding was missing or could not be decoded.
    pub embedding: Option<Vec<f32>>,
}

impl Chunk {
    /// The embedding, if it can take part in ranking.
    pub fn rankable_embedding(&self) -> Option<&[f32]> {
        self.embedding.as_deref().filter(|e| !e.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub chunks: usize,
    pub rankable: usize,
    pub dimension: Option<usize>,
}

#[derive(Debug, Default)]
pub struct IndexSnapshot {
    chunks: Vec<Chunk>,
    dimension: Option<usize>,
}

impl IndexSnapshot {
    pub fn new(chunks: Vec<Chunk>) -> Self {
        let dimension = chunks
            .iter()
            .find_map(|c| c.rankable_embedding().map(<[f32]>::len));

        if let Some(dim) = dimension {
            let mismatched = chunks
                .iter()
                .filter_map(Chunk::rankable_embedding)
                .filter(|e| e.len() != dim)
                .count();
            if mismatched > 0 {
                warn!(
                    dimension = dim,
                    mismatched, "chunk index holds embeddings of differing dimensionality"
                );
            }
        }

        Self { chunks, dimension }
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            chunks: self.chunks.len(),
            rankable: self
                .chunks
                .iter()
                .filter(|c| c.rankable_embedding().is_some())
                .count(),
            dimension: self.dimension,
        }
    }
}

/// Shared handle to the current snapshot.
#[derive(Debug, Default)]
pub struct ChunkIndex {
    current: RwLock<Arc<IndexSnapshot>>,
}

impl ChunkIndex {
    pub fn new(chunks: Vec<Chunk>) -> Self {
        Self {
            current: RwLock::new(Arc::new(IndexSnapshot::new(chunks))),
        }
    }

    /// Build the index from everything the store currently holds.
    pub async fn load(store: &dyn ChatStore) -> Result<Self, EngineError> {
        let index = Self::default();
        index.reload(store).await?;
        Ok(index)
    }

    /// The snapshot readers should rank against.
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Swap in a freshly built snapshot. The previous one stays alive for readers that
    /// already hold it.
    pub fn replace(&self, chunks: Vec<Chunk>) -> Arc<IndexSnapshot> {
        let next = Arc::new(IndexSnapshot::new(chunks));
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Arc::clone(&next);
        next
    }

    /// Re-read the persisted chunk set and swap it in.
    pub async fn reload(&self, store: &dyn ChatStore) -> Result<IndexStats, EngineError> {
        let chunks = store.all_chunks().await?;
        let snapshot = self.replace(chunks);
        let stats = snapshot.stats();
        if stats.chunks == 0 {
            warn!("chunk index is empty; ingest data before expecting retrieval context");
        } else {
            info!(
                chunks = stats.chunks,
                rankable = stats.rankable,
                dimension = ?stats.dimension,
                "chunk index loaded"
            );
        }
        Ok(stats)
    }
}
