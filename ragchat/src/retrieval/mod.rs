//! Similarity retrieval: vector math, the chunk index, and the ranker.

pub mod index;
pub mod ranker;
pub mod vector;

pub use index::{Chunk, ChunkIndex, IndexSnapshot, IndexStats};
pub use ranker::{RetrievalRanker, ScoredChunk};
pub use vector::{cosine_similarity, SimilarityError};
