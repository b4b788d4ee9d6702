//! SciFund API server.
//!
//! Research crowdfunding backend: a funding lifecycle engine over SQLite,
//! wallet sign-in, a content-addressed document store and an indexer for the
//! SciFund Soroban contract.

pub mod api;
pub mod auth;
pub mod config;
pub mod content;
pub mod db;
pub mod engine;
pub mod errors;
pub mod events;
pub mod indexer;
pub mod ledger;
pub mod memory;
pub mod models;
pub mod repository;
pub mod rpc;

use std::sync::Arc;

use auth::AuthGate;
use content::ContentStore;
use engine::FundingEngine;

/// Shared handler state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<FundingEngine>,
    pub auth: Arc<AuthGate>,
    pub content: Arc<dyn ContentStore>,
    /// Public gateway prefix for content URLs.
    pub gateway: String,
}
