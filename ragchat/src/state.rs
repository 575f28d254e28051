use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::gateway::{SharedEmbeddingGateway, SharedGenerationGateway};
use crate::ingest::IngestionPipeline;
use crate::orchestrator::ConversationOrchestrator;
use crate::retrieval::{ChunkIndex, RetrievalRanker};
use crate::store::ChatStore;

pub struct AppState {
    pub orchestrator: Arc<ConversationOrchestrator>,
    pub ingestion: Arc<IngestionPipeline>,
    pub index: Arc<ChunkIndex>,
    /// The only document `POST /admin/ingest` reads.
    pub data_file: PathBuf,
    pub admin_users: HashSet<String>,
}

impl AppState {
    /// Wire the engine components around one store and one index.
    pub fn new(
        store: Arc<dyn ChatStore>,
        index: Arc<ChunkIndex>,
        embedder: SharedEmbeddingGateway,
        generator: SharedGenerationGateway,
        config: &Config,
    ) -> Self {
        let ranker = RetrievalRanker::new(Arc::clone(&index), Arc::clone(&embedder))
            .with_threshold(config.similarity_threshold)
            .with_top_k(config.top_k);

        let orchestrator =
            ConversationOrchestrator::new(Arc::clone(&store), Arc::new(ranker), generator)
                .with_history_limit(config.history_limit)
                .with_generation_timeout(config.generation_timeout);

        let ingestion = IngestionPipeline::new(store, embedder, Arc::clone(&index))
            .with_embed_interval(config.embed_interval);

        Self {
            orchestrator: Arc::new(orchestrator),
            ingestion: Arc::new(ingestion),
            index,
            data_file: config.data_file.clone(),
            admin_users: config.admin_users.iter().cloned().collect(),
        }
    }

    pub fn is_admin(&self, user_id: &str) -> bool {
        self.admin_users.contains(user_id)
    }
}
