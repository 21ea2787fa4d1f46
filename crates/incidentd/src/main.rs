//! incidentd - incident ticket question answering service
//!
//! `serve` runs the HTTP API; `ingest` loads incident records into the
//! vector store.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use incident_common::{JsonVectorStore, OllamaClient, OllamaEmbedder, RetrievalStore};
use incidentd::config::Config;
use incidentd::ingest::{ingest_records, load_records};
use incidentd::server::{self, AppState};
use incidentd::workflow::Workflow;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "incidentd")]
#[command(about = "Conversational question answering over incident tickets", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Load incident records from a JSON array file into the store
    Ingest {
        #[arg(long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("incidentd v{} starting", env!("CARGO_PKG_VERSION"));

    let embedder = Arc::new(
        OllamaEmbedder::new(config.embeddings.clone()).context("Failed to build embedder")?,
    );

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let llm = Arc::new(
                OllamaClient::new(config.llm.clone()).context("Failed to build LLM client")?,
            );
            let store: Arc<dyn RetrievalStore> =
                Arc::new(JsonVectorStore::open(&config.store.path, embedder));
            let workflow = Arc::new(Workflow::new(llm, store.clone(), &config));
            let state = AppState::new(
                workflow,
                store,
                Duration::from_secs(config.server.request_timeout_secs),
            );

            info!(
                "Model {} at {}, store at {}",
                config.llm.model,
                config.llm.endpoint,
                config.store.path.display()
            );
            server::run(state, &config.server.bind, &config.server.route_prefix).await
        }
        Command::Ingest { file } => {
            let records = load_records(&file)?;
            info!("Loaded {} records from {}", records.len(), file.display());

            let store = JsonVectorStore::create(&config.store.path, embedder)
                .await
                .context("Failed to open vector store")?;
            let report = ingest_records(&records, &store, config.store.ingest_batch_size).await;
            if report.failed_batches > 0 {
                anyhow::bail!(
                    "{} of {} batches failed",
                    report.failed_batches,
                    report.batches
                );
            }
            info!(
                "Vector store at {} now holds {} documents",
                store.dir().display(),
                store.len().await?
            );
            Ok(())
        }
    }
}
