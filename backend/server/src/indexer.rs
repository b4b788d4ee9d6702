//! Long-running background task that polls the Soroban RPC, stores decoded
//! SciFund events and links minted tokens to their research outputs.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::db;
use crate::events::{ChainEvent, EventKind};
use crate::rpc;

pub struct IndexerState {
    pub pool: SqlitePool,
    pub config: Config,
    pub client: Client,
    pub contract_id: String,
}

/// Run the indexer loop until `shutdown` is cancelled.
pub async fn run(state: Arc<IndexerState>, shutdown: CancellationToken) {
    info!("Indexer starting, contract: {}", state.contract_id);

    let last_ledger = db::get_last_ledger(&state.pool).await.unwrap_or(0);
    let cursor_str = db::get_cursor_string(&state.pool).await.unwrap_or(None);

    let mut current_ledger = if last_ledger > 0 {
        last_ledger as u32
    } else {
        state.config.start_ledger
    };
    let mut cursor: Option<String> = cursor_str;

    info!("Resuming from ledger {current_ledger}");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            result = poll_once(&state, current_ledger, cursor.as_deref()) => match result {
                Ok((next_ledger, next_cursor)) => {
                    current_ledger = next_ledger;
                    cursor = next_cursor;
                }
                Err(e) => {
                    error!("Indexer poll error: {e}");
                }
            },
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(Duration::from_secs(state.config.poll_interval_secs)) => {}
        }
    }

    info!("Indexer stopped at ledger {current_ledger}");
}

/// Perform a single poll iteration.
///
/// Returns `(next_start_ledger, next_cursor)`.
async fn poll_once(
    state: &IndexerState,
    start_ledger: u32,
    cursor: Option<&str>,
) -> crate::errors::Result<(u32, Option<String>)> {
    let page = rpc::fetch_events(
        &state.client,
        &state.config.rpc_url,
        &state.contract_id,
        start_ledger,
        cursor,
        state.config.events_per_page,
    )
    .await?;

    if !page.events.is_empty() {
        let decoded = rpc::decode_events(&page.events, &state.contract_id);
        let inserted = db::insert_chain_events(&state.pool, &decoded).await?;
        let linked = link_minted_tokens(&state.pool, &decoded).await?;
        info!(
            "Polled {} events: {} new, {} tokens linked",
            page.events.len(),
            inserted,
            linked
        );
    }

    // A cursor continues inside the same range; without one the scan moves to
    // the latest ledger the RPC reported.
    let next_ledger = page
        .latest_ledger
        .map(|l| (l as u32).max(start_ledger))
        .unwrap_or(start_ledger);

    db::save_cursor(&state.pool, next_ledger as i64, page.cursor.as_deref()).await?;

    Ok((next_ledger, page.cursor))
}

/// Attach each `minted` token to the research output with the same content
/// hash. Returns how many new links were written.
pub async fn link_minted_tokens(
    pool: &SqlitePool,
    events: &[ChainEvent],
) -> crate::errors::Result<usize> {
    let now = chrono::Utc::now().timestamp();
    let mut linked = 0;
    for ev in events.iter().filter(|e| e.kind() == EventKind::OutputMinted) {
        let (Some(token_id), Some(hash)) = (ev.token_id, ev.content_hash.as_deref()) else {
            warn!("Minted event at ledger {} is missing token id or content hash", ev.ledger);
            continue;
        };
        if db::link_token_by_content_hash(pool, hash, token_id, now).await? {
            linked += 1;
        }
    }
    Ok(linked)
}
