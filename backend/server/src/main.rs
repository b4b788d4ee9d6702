//! SciFund API server entry point.
//!
//! Serves the funding REST API and, when a contract id is configured, runs a
//! background indexer that polls Soroban `getEvents` for SciFund contract
//! events and persists them to SQLite.

use std::sync::Arc;

use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use scifund_server::api;
use scifund_server::auth::AuthGate;
use scifund_server::config::Config;
use scifund_server::content::{ContentStore, IpfsStore, MemoryContentStore};
use scifund_server::db::{self, SqliteRepository};
use scifund_server::engine::FundingEngine;
use scifund_server::indexer::{self, IndexerState};
use scifund_server::ledger::IndexedLedger;
use scifund_server::repository::Repository;
use scifund_server::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    // Set up the SQLite connection pool and run migrations.
    let pool = db::init_pool(&config.database_url).await?;

    // HTTP client shared between the indexer and the IPFS store.
    let client = Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?;

    let shutdown = CancellationToken::new();

    // ─── Background indexer ───────────────────────────────
    let indexer_handle = match config.contract_id.clone() {
        Some(contract_id) => {
            let indexer_state = Arc::new(IndexerState {
                pool: pool.clone(),
                config: config.clone(),
                client: client.clone(),
                contract_id,
            });
            Some(tokio::spawn(indexer::run(indexer_state, shutdown.clone())))
        }
        None => {
            warn!("CONTRACT_ID not set; chain indexer disabled");
            None
        }
    };

    // ─── Services ─────────────────────────────────────────
    let repo: Arc<dyn Repository> = Arc::new(SqliteRepository::new(pool.clone()));
    let ledger = Arc::new(IndexedLedger::new(pool));
    let content: Arc<dyn ContentStore> = match &config.ipfs_api_url {
        Some(url) => {
            info!("Using IPFS content store at {url}");
            let credentials = config
                .ipfs_project_id
                .clone()
                .zip(config.ipfs_project_secret.clone());
            Arc::new(IpfsStore::new(client, url, credentials))
        }
        None => {
            warn!("IPFS_API_URL not set; documents are kept in memory");
            Arc::new(MemoryContentStore::new())
        }
    };

    let state = AppState {
        engine: Arc::new(FundingEngine::new(repo.clone(), ledger)),
        auth: Arc::new(AuthGate::new(
            repo,
            config.session_secret.clone(),
            config.session_ttl_secs,
        )),
        content,
        gateway: config.ipfs_gateway.clone(),
    };

    // ─── REST API ─────────────────────────────────────────
    let app = api::build_router(state);

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    if let Some(handle) = indexer_handle {
        shutdown.cancel();
        let _ = handle.await;
    }
    info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl-C and cancels background tasks.
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
    shutdown.cancel();
}
