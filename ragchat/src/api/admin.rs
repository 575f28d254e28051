use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use shared_types::IngestResponse;
use tracing::info;

use super::ApiError;
use crate::ingest::IngestStatus;
use crate::retrieval::IndexStats;
use crate::AppState;

/// POST /admin/ingest: re-embed the configured data file and swap the index.
/// Runs to completion before responding; a second concurrent request is rejected.
pub async fn run_ingest(
    State(state): State<Arc<AppState>>,
) -> Result<Json<IngestResponse>, ApiError> {
    info!(path = %state.data_file.display(), "admin ingestion requested");
    let report = state.ingestion.ingest_file(&state.data_file).await?;
    Ok(Json(IngestResponse {
        ingested: report.ingested,
    }))
}

/// GET /admin/ingest
pub async fn ingest_status(State(state): State<Arc<AppState>>) -> Json<IngestStatus> {
    Json(state.ingestion.status())
}

/// GET /admin/index
pub async fn index_stats(State(state): State<Arc<AppState>>) -> Json<IndexStats> {
    Json(state.index.snapshot().stats())
}
