//! Ingestion: source document → persisted chunks → fresh index snapshot.
//!
//! A run moves through `Parsing → Clearing → Embedding → Done | Failed`. Clearing deletes
//! the previous chunk set before any new embedding exists, and nothing is transactional:
//! if the process dies during Embedding the store holds only the chunks written so far.
//! The in-memory index keeps serving the old snapshot until the run finishes and reloads.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::error::{EngineError, EngineResult};
use crate::gateway::SharedEmbeddingGateway;
use crate::retrieval::ChunkIndex;
use crate::store::ChatStore;

pub mod table;

pub use table::{parse_table, ParsedTable};

/// Gemini's embedding quota is 1500 requests per minute.
pub const DEFAULT_EMBED_INTERVAL: Duration = Duration::from_millis(40);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum IngestPhase {
    Idle,
    Parsing,
    Clearing,
    Embedding { done: usize, total: usize },
    Done { ingested: usize },
    Failed { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Rows the parser accepted.
    pub candidates: usize,
    /// Rows the parser rejected.
    pub skipped_rows: usize,
    /// Chunks embedded and stored.
    pub ingested: usize,
    /// Candidates dropped because embedding or storing them failed.
    pub failed: usize,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestStatus {
    #[serde(flatten)]
    pub phase: IngestPhase,
    pub last_report: Option<IngestReport>,
}

pub struct IngestionPipeline {
    store: Arc<dyn ChatStore>,
    embedder: SharedEmbeddingGateway,
    index: Arc<ChunkIndex>,
    embed_interval: Duration,
    phase: Mutex<IngestPhase>,
    last_report: Mutex<Option<IngestReport>>,
    running: tokio::sync::Mutex<()>,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<dyn ChatStore>,
        embedder: SharedEmbeddingGateway,
        index: Arc<ChunkIndex>,
    ) -> Self {
        Self {
            store,
            embedder,
            index,
            embed_interval: DEFAULT_EMBED_INTERVAL,
            phase: Mutex::new(IngestPhase::Idle),
            last_report: Mutex::new(None),
            running: tokio::sync::Mutex::new(()),
        }
    }

    /// Minimum spacing between embedding calls. Zero disables pacing.
    pub fn with_embed_interval(mut self, interval: Duration) -> Self {
        self.embed_interval = interval;
        self
    }

    pub fn status(&self) -> IngestStatus {
        IngestStatus {
            phase: lock(&self.phase).clone(),
            last_report: *lock(&self.last_report),
        }
    }

    fn set_phase(&self, phase: IngestPhase) {
        *lock(&self.phase) = phase;
    }

    pub async fn ingest_file(&self, path: &Path) -> EngineResult<IngestReport> {
        let _guard = self.acquire()?;
        self.set_phase(IngestPhase::Parsing);
        let source = match tokio::fs::read_to_string(path).await {
            Ok(source) => source,
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to read data file");
                self.set_phase(IngestPhase::Failed {
                    reason: format!("failed to read {}: {e}", path.display()),
                });
                return Err(e.into());
            }
        };
        info!(path = %path.display(), bytes = source.len(), "ingesting data file");
        self.run(&source).await
    }

    pub async fn ingest_text(&self, source: &str) -> EngineResult<IngestReport> {
        let _guard = self.acquire()?;
        self.set_phase(IngestPhase::Parsing);
        self.run(source).await
    }

    fn acquire(&self) -> EngineResult<tokio::sync::MutexGuard<'_, ()>> {
        self.running
            .try_lock()
            .map_err(|_| EngineError::Validation("ingestion already running".to_string()))
    }

    async fn run(&self, source: &str) -> EngineResult<IngestReport> {
        match self.run_phases(source).await {
            Ok(report) => {
                self.set_phase(IngestPhase::Done {
                    ingested: report.ingested,
                });
                *lock(&self.last_report) = Some(report);
                Ok(report)
            }
            Err(e) => {
                error!(error = %e, "ingestion failed");
                self.set_phase(IngestPhase::Failed {
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn run_phases(&self, source: &str) -> EngineResult<IngestReport> {
        let started = Instant::now();
        let ParsedTable { rows, skipped } = parse_table(source);

        if rows.is_empty() {
            warn!(
                skipped,
                "no chunks parsed from source; expected a Markdown table with a text column"
            );
            return Ok(IngestReport {
                candidates: 0,
                skipped_rows: skipped,
                ingested: 0,
                failed: 0,
                elapsed_ms: elapsed_ms(started),
            });
        }
        let total = rows.len();
        info!(total, skipped, "parsed chunk candidates, embedding (this may take a while)");

        self.set_phase(IngestPhase::Clearing);
        self.store.clear_chunks().await?;

        self.set_phase(IngestPhase::Embedding { done: 0, total });
        let mut pacer = (!self.embed_interval.is_zero()).then(|| {
            let mut interval = tokio::time::interval(self.embed_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        let mut ingested = 0;
        for (i, text) in rows.iter().enumerate() {
            if let Some(pacer) = pacer.as_mut() {
                pacer.tick().await;
            }

            let embedding = match self.embedder.embed(text).await {
                Ok(embedding) => embedding,
                Err(e) => {
                    warn!(chunk = i + 1, error = %e, "embedding failed, skipping chunk");
                    continue;
                }
            };
            if let Err(e) = self.store.insert_chunk(text, &embedding).await {
                warn!(chunk = i + 1, error = %e, "storing chunk failed, skipping");
                continue;
            }

            ingested += 1;
            self.set_phase(IngestPhase::Embedding {
                done: ingested,
                total,
            });
            if ingested % 10 == 0 || ingested == total {
                info!(ingested, total, "ingestion progress");
            }
        }

        let stats = self.index.reload(self.store.as_ref()).await?;
        info!(
            ingested,
            failed = total - ingested,
            rankable = stats.rankable,
            "ingestion complete"
        );

        Ok(IngestReport {
            candidates: total,
            skipped_rows: skipped,
            ingested,
            failed: total - ingested,
            elapsed_ms: elapsed_ms(started),
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{EmbeddingGateway, GatewayError};
    use crate::store::SqliteStore;
    use async_trait::async_trait;
    use std::io::Write;

    /// Embeds by text length; fails for texts containing "FAIL".
    #[derive(Default)]
    struct LengthEmbedder {
        calls: Mutex<Vec<Instant>>,
    }

    #[async_trait]
    impl EmbeddingGateway for LengthEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, GatewayError> {
            lock(&self.calls).push(Instant::now());
            if text.contains("FAIL") {
                return Err(GatewayError::Transport("boom".to_string()));
            }
            Ok(vec![text.len() as f32, 1.0])
        }
    }

    async fn pipeline(
        embedder: Arc<LengthEmbedder>,
    ) -> (IngestionPipeline, Arc<SqliteStore>, Arc<ChunkIndex>) {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let index = Arc::new(ChunkIndex::default());
        let pipeline = IngestionPipeline::new(store.clone(), embedder, index.clone())
            .with_embed_interval(Duration::ZERO);
        (pipeline, store, index)
    }

    const DOC: &str = "| text |\n|---|\n| one |\n| two |\n| three |\n";

    #[tokio::test]
    async fn test_round_trip_counts() {
        let (pipeline, store, index) = pipeline(Arc::default()).await;

        let report = pipeline.ingest_text(DOC).await.unwrap();
        assert_eq!(report.candidates, 3);
        assert_eq!(report.ingested, 3);
        assert_eq!(report.failed, 0);

        assert_eq!(store.all_chunks().await.unwrap().len(), 3);
        assert_eq!(index.snapshot().stats().rankable, 3);
        assert_eq!(pipeline.status().phase, IngestPhase::Done { ingested: 3 });
    }

    #[tokio::test]
    async fn test_embedding_failure_skips_single_chunk() {
        let (pipeline, store, index) = pipeline(Arc::default()).await;

        let report = pipeline
            .ingest_text("| text |\n|---|\n| ok |\n| FAIL here |\n| also ok |\n")
            .await
            .unwrap();
        assert_eq!(report.ingested, 2);
        assert_eq!(report.failed, 1);

        let texts: Vec<String> = store
            .all_chunks()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.text)
            .collect();
        assert_eq!(texts, vec!["ok", "also ok"]);
        assert_eq!(index.snapshot().len(), 2);
    }

    #[tokio::test]
    async fn test_reingestion_replaces_previous_chunks() {
        let (pipeline, store, index) = pipeline(Arc::default()).await;
        pipeline.ingest_text(DOC).await.unwrap();

        pipeline.ingest_text("| text |\n|---|\n| fresh |\n").await.unwrap();

        let chunks = store.all_chunks().await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "fresh");
        assert_eq!(index.snapshot().chunks()[0].text, "fresh");
    }

    #[tokio::test]
    async fn test_empty_document_is_success_and_keeps_existing_chunks() {
        let (pipeline, store, _index) = pipeline(Arc::default()).await;
        pipeline.ingest_text(DOC).await.unwrap();

        let report = pipeline.ingest_text("nothing tabular here").await.unwrap();
        assert_eq!(report.ingested, 0);
        assert_eq!(store.all_chunks().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_calls_are_paced() {
        let embedder = Arc::new(LengthEmbedder::default());
        let (pipeline, _store, _index) = pipeline(embedder.clone()).await;
        let pipeline = pipeline.with_embed_interval(Duration::from_millis(30));

        pipeline.ingest_text(DOC).await.unwrap();

        let calls = lock(&embedder.calls).clone();
        assert_eq!(calls.len(), 3);
        for pair in calls.windows(2) {
            let gap = pair[1].duration_since(pair[0]);
            assert!(gap >= Duration::from_millis(25), "gap too small: {gap:?}");
        }
    }

    #[tokio::test]
    async fn test_ingest_file_and_missing_file() {
        let (pipeline, _store, _index) = pipeline(Arc::default()).await;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(DOC.as_bytes()).unwrap();
        let report = pipeline.ingest_file(file.path()).await.unwrap();
        assert_eq!(report.ingested, 3);

        let err = pipeline
            .ingest_file(Path::new("/definitely/not/here.md"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Io(_)));
        assert!(matches!(pipeline.status().phase, IngestPhase::Failed { .. }));
        assert_eq!(pipeline.status().last_report.map(|r| r.ingested), Some(3));
    }

    #[tokio::test]
    async fn test_concurrent_run_is_rejected() {
        let (pipeline, _store, _index) = pipeline(Arc::default()).await;
        let _held = pipeline.acquire().unwrap();

        let err = pipeline.ingest_text(DOC).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }
}
