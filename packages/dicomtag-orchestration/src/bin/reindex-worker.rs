//! Reindex worker
//!
//! Backfills extended query tags stored in a SQLite database until Ctrl-C.
//!
//! # Usage
//!
//! ```bash
//! # Run until interrupted
//! reindex-worker --db dicomtag.db --config indexing.yaml
//!
//! # Single pass: finish due jobs, then exit
//! reindex-worker --db dicomtag.db --once
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use dicomtag_core::IndexingConfig;
use dicomtag_orchestration::{DeleteTagService, EntityIndexer, ReindexOrchestrator, ReindexWorker};
use dicomtag_storage::{SqliteStore, TagCatalog, TagErrorLog};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "reindex-worker")]
#[command(about = "Backfill worker for extended query tags", long_about = None)]
struct Cli {
    /// SQLite database file
    #[arg(long)]
    db: PathBuf,

    /// YAML configuration (version 1); defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run due jobs once and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = IndexingConfig::load(cli.config.as_deref()).context("loading configuration")?;

    let store = Arc::new(
        SqliteStore::open(&cli.db)
            .with_context(|| format!("opening database {}", cli.db.display()))?,
    );
    let catalog = TagCatalog::new(store.clone());
    let error_log = TagErrorLog::new(store.clone(), store.clone());
    let indexer = EntityIndexer::new(catalog.clone(), store.clone(), store.clone(), error_log.clone());
    let orchestrator = ReindexOrchestrator::new(
        catalog.clone(),
        store.clone(),
        store.clone(),
        indexer,
        config.reindex.clone(),
    );
    let deleter = DeleteTagService::new(catalog.clone(), error_log, store.clone());
    let worker = ReindexWorker::new(orchestrator, catalog, store, deleter);

    if cli.once {
        let settled = worker.run_once().await?;
        for (operation_id, status) in &settled {
            info!(operation_id = %operation_id, status = %status, "Job settled");
        }
        info!(jobs = settled.len(), "Single pass finished");
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl-C");
            }
            shutdown.cancel();
        }
    });

    worker.run(shutdown).await;
    Ok(())
}
