use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ragchat::config::Config;
use ragchat::gateway::GeminiGateway;
use ragchat::retrieval::ChunkIndex;
use ragchat::store::{ChatStore, SqliteStore};
use ragchat::{api, db, AppState};

#[derive(Parser)]
#[command(name = "ragchat")]
#[command(about = "Retrieval-augmented chat over an ingested research table", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API (default)
    Serve,

    /// Embed the data file into the chunk store, replacing previous chunks
    Ingest {
        /// Markdown table to ingest; defaults to RAGCHAT_DATA_FILE
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ragchat=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let pool = db::connect(&config.database_url).await?;
    let store: Arc<dyn ChatStore> = Arc::new(SqliteStore::new(pool));
    let gemini = Arc::new(GeminiGateway::from_config(&config)?);

    let index = Arc::new(ChunkIndex::load(store.as_ref()).await?);
    let state = Arc::new(AppState::new(
        store,
        index,
        gemini.clone(),
        gemini,
        &config,
    ));

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(state, &config).await,
        Commands::Ingest { file } => {
            let path = file.unwrap_or_else(|| config.data_file.clone());
            let report = state.ingestion.ingest_file(&path).await?;
            info!(
                path = %path.display(),
                ingested = report.ingested,
                failed = report.failed,
                skipped_rows = report.skipped_rows,
                elapsed_ms = report.elapsed_ms,
                "ingestion finished"
            );
            Ok(())
        }
    }
}

async fn serve(state: Arc<AppState>, config: &Config) -> anyhow::Result<()> {
    let stats = state.index.snapshot().stats();
    info!(
        port = config.port,
        chunks = stats.chunks,
        rankable = stats.rankable,
        "ragchat starting"
    );

    let orchestrator = Arc::clone(&state.orchestrator);
    let app = api::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    info!("listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("waiting for background title tasks");
    orchestrator.background().close();
    orchestrator.background().wait().await;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
