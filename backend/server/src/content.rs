//! Content-addressed document storage for proposals and research outputs.
//!
//! Documents are JSON values. Each upload also stores a small metadata blob
//! next to the document; only the document hash is returned.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{debug, error};

use crate::errors::{Result, ServiceError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentMetadata {
    pub name: String,
    pub description: String,
    pub version: String,
    /// Unix seconds.
    pub timestamp: i64,
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store `document` and its metadata, returning the document hash.
    async fn put(&self, document: &Value, metadata: &ContentMetadata) -> Result<String>;

    /// Fetch a document previously stored under `hash`.
    async fn get(&self, hash: &str) -> Result<Value>;
}

/// Public URL for `hash` under `gateway`.
pub fn gateway_url(gateway: &str, hash: &str) -> String {
    if gateway.ends_with('/') {
        format!("{gateway}{hash}")
    } else {
        format!("{gateway}/{hash}")
    }
}

// ─────────────────────────────────────────────────────────
// IPFS HTTP API
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

/// Store backed by an IPFS node's HTTP API (`/api/v0/add`, `/api/v0/cat`).
pub struct IpfsStore {
    client: Client,
    api_url: String,
    credentials: Option<(String, String)>,
}

impl IpfsStore {
    pub fn new(client: Client, api_url: &str, credentials: Option<(String, String)>) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            credentials,
        }
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self.client.post(format!("{}{path}", self.api_url));
        match &self.credentials {
            Some((id, secret)) => request.basic_auth(id, Some(secret)),
            None => request,
        }
    }

    async fn add(&self, bytes: Vec<u8>) -> Result<String> {
        let form = Form::new().part("file", Part::bytes(bytes).file_name("data.json"));
        let response = self.post("/api/v0/add").multipart(form).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            error!("IPFS add failed with status {status}");
            return Err(ServiceError::Content(format!(
                "Failed to upload to IPFS ({status})"
            )));
        }
        let body: AddResponse = response.json().await?;
        Ok(body.hash)
    }
}

#[async_trait]
impl ContentStore for IpfsStore {
    async fn put(&self, document: &Value, metadata: &ContentMetadata) -> Result<String> {
        let hash = self.add(serde_json::to_vec(document)?).await?;
        let metadata_hash = self.add(serde_json::to_vec(metadata)?).await?;
        debug!("Stored document {hash} with metadata {metadata_hash}");
        Ok(hash)
    }

    async fn get(&self, hash: &str) -> Result<Value> {
        let response = self
            .post("/api/v0/cat")
            .query(&[("arg", hash)])
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            error!("IPFS cat {hash} failed with status {status}");
            return Err(ServiceError::Content(format!(
                "Failed to retrieve from IPFS ({status})"
            )));
        }
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

// ─────────────────────────────────────────────────────────
// In-memory
// ─────────────────────────────────────────────────────────

/// SHA-256 addressed store kept in process memory.
#[derive(Default)]
pub struct MemoryContentStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn add(&self, bytes: Vec<u8>) -> String {
        let hash = hex::encode(Sha256::digest(&bytes));
        self.blobs.write().await.insert(hash.clone(), bytes);
        hash
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn put(&self, document: &Value, metadata: &ContentMetadata) -> Result<String> {
        let hash = self.add(serde_json::to_vec(document)?).await;
        self.add(serde_json::to_vec(metadata)?).await;
        Ok(hash)
    }

    async fn get(&self, hash: &str) -> Result<Value> {
        let blobs = self.blobs.read().await;
        let bytes = blobs
            .get(hash)
            .ok_or_else(|| ServiceError::NotFound(format!("Content {hash} not found")))?;
        Ok(serde_json::from_slice(bytes)?)
    }
}
