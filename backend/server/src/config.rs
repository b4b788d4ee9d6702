//! Application configuration loaded from environment variables.

use rand::RngCore;
use tracing::warn;

use crate::errors::{Result, ServiceError};

#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite connection string
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// HMAC key for session tokens
    pub session_secret: String,
    /// Session lifetime in seconds
    pub session_ttl_secs: u64,
    /// IPFS HTTP API base (e.g. https://ipfs.infura.io:5001). Unset means the
    /// in-process content store is used.
    pub ipfs_api_url: Option<String>,
    pub ipfs_project_id: Option<String>,
    pub ipfs_project_secret: Option<String>,
    /// Public gateway prefix used to build content URLs
    pub ipfs_gateway: String,
    /// Soroban RPC endpoint (e.g. https://soroban-testnet.stellar.org)
    pub rpc_url: String,
    /// The SciFund contract address (Strkey format). Unset disables the indexer.
    pub contract_id: Option<String>,
    /// How often (in seconds) to poll the RPC for new events
    pub poll_interval_secs: u64,
    /// Maximum number of events to fetch per RPC request
    pub events_per_page: u32,
    /// Ledger to start from if no cursor is saved
    pub start_ledger: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let session_secret = match optional_env_var("SESSION_SECRET") {
            Some(secret) => secret,
            None => {
                warn!("SESSION_SECRET not set; generating an ephemeral key, sessions will not survive restarts");
                random_secret()
            }
        };

        Ok(Config {
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./scifund.db".to_string()),
            api_port: env_var("API_PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .map_err(|_| ServiceError::Config("Invalid API_PORT".to_string()))?,
            session_secret,
            session_ttl_secs: env_var("SESSION_TTL_SECS")
                .unwrap_or_else(|_| "86400".to_string())
                .parse()
                .map_err(|_| ServiceError::Config("Invalid SESSION_TTL_SECS".to_string()))?,
            ipfs_api_url: optional_env_var("IPFS_API_URL"),
            ipfs_project_id: optional_env_var("IPFS_PROJECT_ID"),
            ipfs_project_secret: optional_env_var("IPFS_PROJECT_SECRET"),
            ipfs_gateway: env_var("IPFS_GATEWAY")
                .unwrap_or_else(|_| "https://ipfs.io/ipfs/".to_string()),
            rpc_url: env_var("RPC_URL")
                .unwrap_or_else(|_| "https://soroban-testnet.stellar.org".to_string()),
            contract_id: optional_env_var("CONTRACT_ID"),
            poll_interval_secs: env_var("POLL_INTERVAL_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| ServiceError::Config("Invalid POLL_INTERVAL_SECS".to_string()))?,
            events_per_page: env_var("EVENTS_PER_PAGE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .map_err(|_| ServiceError::Config("Invalid EVENTS_PER_PAGE".to_string()))?,
            start_ledger: env_var("START_LEDGER")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .map_err(|_| ServiceError::Config("Invalid START_LEDGER".to_string()))?,
        })
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| ServiceError::Config(format!("Missing env var: {key}")))
}

/// Empty values count as unset.
fn optional_env_var(key: &str) -> Option<String> {
    env_var(key).ok().filter(|v| !v.trim().is_empty())
}

fn random_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
