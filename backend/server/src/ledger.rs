//! Read access to the on-chain reward ledger.
//!
//! The funding engine asks whether rewards for a research output token have
//! already been paid. In production the answer comes from the indexed
//! `rewarded` contract events.

use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::SqlitePool;
use tokio::sync::RwLock;

use crate::db;
use crate::errors::Result;

#[async_trait]
pub trait RewardLedger: Send + Sync {
    async fn rewards_distributed(&self, token_id: i64) -> Result<bool>;
}

/// Ledger view backed by the indexer's `chain_events` table.
pub struct IndexedLedger {
    pool: SqlitePool,
}

impl IndexedLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RewardLedger for IndexedLedger {
    async fn rewards_distributed(&self, token_id: i64) -> Result<bool> {
        db::rewards_event_exists(&self.pool, token_id).await
    }
}

/// In-process ledger for tests and chain-less deployments.
#[derive(Default)]
pub struct MemoryLedger {
    distributed: RwLock<HashSet<i64>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn mark_distributed(&self, token_id: i64) {
        self.distributed.write().await.insert(token_id);
    }
}

#[async_trait]
impl RewardLedger for MemoryLedger {
    async fn rewards_distributed(&self, token_id: i64) -> Result<bool> {
        Ok(self.distributed.read().await.contains(&token_id))
    }
}
