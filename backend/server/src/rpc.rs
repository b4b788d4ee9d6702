//! Client for the Soroban RPC `getEvents` method and decoding of the payloads
//! the SciFund contract publishes.
//!
//! Failed requests, HTTP 429 and recoverable JSON-RPC errors are retried with
//! a doubling delay capped at [`MAX_BACKOFF_SECS`]. Malformed-request codes
//! fail immediately.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::errors::{Result, ServiceError};
use crate::events::{ChainEvent, EventKind};

const MAX_BACKOFF_SECS: u64 = 60;
const INITIAL_BACKOFF_SECS: u64 = 2;

/// JSON-RPC codes that a retry cannot fix.
const FATAL_RPC_CODES: &[i64] = &[-32600, -32601];

#[derive(Debug, Deserialize)]
struct Envelope {
    result: Option<EventPage>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// One page of contract events.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPage {
    pub events: Vec<RawEvent>,
    /// Resume token; `None` once the scan reached the chain tip.
    pub cursor: Option<String>,
    pub latest_ledger: Option<u64>,
}

/// An event as the RPC reports it. Topic entries are the event symbol
/// followed by the project id.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    pub topic: Vec<String>,
    pub value: Value,
    pub contract_id: Option<String>,
    pub tx_hash: Option<String>,
    pub ledger: Option<u64>,
    pub ledger_closed_at: Option<String>,
}

struct Backoff {
    secs: u64,
}

impl Backoff {
    fn new() -> Self {
        Self {
            secs: INITIAL_BACKOFF_SECS,
        }
    }

    async fn wait(&mut self, reason: &str) {
        warn!("getEvents {reason}; retrying in {}s", self.secs);
        tokio::time::sleep(Duration::from_secs(self.secs)).await;
        self.secs = (self.secs * 2).min(MAX_BACKOFF_SECS);
    }
}

/// Fetch one page of `contract_id` events, continuing from `cursor` when the
/// previous page left one and scanning from `start_ledger` otherwise.
pub async fn fetch_events(
    client: &Client,
    rpc_url: &str,
    contract_id: &str,
    start_ledger: u32,
    cursor: Option<&str>,
    limit: u32,
) -> Result<EventPage> {
    let request = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "getEvents",
        "params": build_params(contract_id, start_ledger, cursor, limit),
    });
    let mut backoff = Backoff::new();

    loop {
        let response = match client.post(rpc_url).json(&request).send().await {
            Ok(response) => response,
            Err(e) => {
                backoff.wait(&format!("request failed: {e}")).await;
                continue;
            }
        };
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            backoff.wait("rate limited").await;
            continue;
        }

        let envelope: Envelope = response.json().await?;
        match envelope.error {
            Some(err) if FATAL_RPC_CODES.contains(&err.code) => {
                return Err(ServiceError::EventParse(format!(
                    "getEvents rejected ({}): {}",
                    err.code, err.message
                )));
            }
            Some(err) => {
                backoff
                    .wait(&format!("error {}: {}", err.code, err.message))
                    .await;
                continue;
            }
            None => {}
        }

        let page = envelope.result.ok_or_else(|| {
            ServiceError::EventParse("getEvents returned no result".to_string())
        })?;
        debug!(
            "getEvents page: {} events, latest ledger {:?}",
            page.events.len(),
            page.latest_ledger
        );
        return Ok(page);
    }
}

fn build_params(contract_id: &str, start_ledger: u32, cursor: Option<&str>, limit: u32) -> Value {
    let mut params = json!({
        "filters": [{ "type": "contract", "contractIds": [contract_id] }],
    });
    let mut pagination = json!({ "limit": limit });
    match cursor {
        Some(cursor) => pagination["cursor"] = json!(cursor),
        None => params["startLedger"] = json!(start_ledger),
    }
    params["pagination"] = pagination;
    params
}

// ─────────────────────────────────────────────────────────
// Event decoding
// ─────────────────────────────────────────────────────────

/// Decode a list of raw RPC events into [`ChainEvent`]s. Events whose topic
/// is not one the contract emits are dropped.
pub fn decode_events(raw: &[RawEvent], contract_id: &str) -> Vec<ChainEvent> {
    raw.iter()
        .filter_map(|e| decode_single(e, contract_id))
        .collect()
}

fn decode_single(raw: &RawEvent, contract_id: &str) -> Option<ChainEvent> {
    let first_topic = raw.topic.first()?;
    let kind = EventKind::from_topic(&extract_symbol(first_topic));
    if kind == EventKind::Unknown {
        debug!("Skipping unrecognised event topic {first_topic}");
        return None;
    }

    let ledger = raw.ledger.unwrap_or(0) as i64;
    let timestamp = raw
        .ledger_closed_at
        .as_deref()
        .and_then(parse_iso_to_unix)
        .unwrap_or(0);

    let project_id = raw.topic.get(1).map(|t| extract_u64_or_raw(t));
    let data = decode_data(&raw.value, kind);

    Some(ChainEvent {
        event_type: kind.as_str().to_string(),
        project_id,
        actor: data.actor,
        amount: data.amount,
        token_id: data.token_id,
        content_hash: data.content_hash,
        ledger,
        timestamp,
        contract_id: raw
            .contract_id
            .clone()
            .unwrap_or_else(|| contract_id.to_string()),
        tx_hash: raw.tx_hash.clone(),
    })
}

#[derive(Debug, Default)]
struct EventData {
    actor: Option<String>,
    amount: Option<String>,
    token_id: Option<i64>,
    content_hash: Option<String>,
}

/// Pull apart the JSON `value` blob the RPC returns for event data.
fn decode_data(value: &Value, kind: EventKind) -> EventData {
    match kind {
        EventKind::ProjectCreated => EventData {
            actor: extract_field(value, &["researcher"])
                .or_else(|| find_nested(value, "researcher")),
            amount: extract_field(value, &["funding_goal"]),
            ..Default::default()
        },
        EventKind::ProjectFunded => EventData {
            actor: extract_field(value, &["funder", "address"]),
            amount: extract_field(value, &["amount"]),
            ..Default::default()
        },
        EventKind::StatusUpdated => EventData::default(),
        EventKind::OutputMinted => EventData {
            token_id: extract_token_id(value),
            content_hash: extract_field(value, &["content_hash"])
                .or_else(|| find_nested(value, "content_hash")),
            ..Default::default()
        },
        EventKind::RewardsDistributed => EventData {
            actor: extract_field(value, &["researcher"]),
            amount: extract_field(value, &["amount"]),
            token_id: extract_token_id(value),
            ..Default::default()
        },
        EventKind::FundsWithdrawn => EventData {
            actor: extract_field(value, &["researcher"]),
            amount: extract_field(value, &["amount"]),
            ..Default::default()
        },
        EventKind::Unknown => EventData::default(),
    }
}

fn extract_token_id(value: &Value) -> Option<i64> {
    extract_field(value, &["token_id"]).and_then(|s| s.parse().ok())
}

fn extract_field(value: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(v) = value.get(key) {
            let s = match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                // Typed ScVal wrapper: {"type":"u64","value":"7"}
                Value::Object(_) => v.get("value").and_then(|inner| match inner {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                }),
                _ => None,
            };
            if s.is_some() {
                return s;
            }
        }
    }
    None
}

fn find_nested(value: &Value, key: &str) -> Option<String> {
    if let Value::Object(map) = value {
        for (k, v) in map {
            if k == key {
                return v.as_str().map(String::from);
            }
            if let Some(found) = find_nested(v, key) {
                return Some(found);
            }
        }
    }
    None
}

/// Extract a Soroban Symbol from the topic string.
/// The RPC may return `{"type":"symbol","value":"created"}` or just the raw string.
fn extract_symbol(raw: &str) -> String {
    if let Ok(v) = serde_json::from_str::<Value>(raw) {
        if let Some(s) = v.get("value").and_then(|x| x.as_str()) {
            return s.to_string();
        }
    }
    raw.to_string()
}

/// Extract the project id from a topic entry that might be a JSON object or raw number/string.
fn extract_u64_or_raw(raw: &str) -> String {
    if let Ok(v) = serde_json::from_str::<Value>(raw) {
        if let Some(n) = v.get("value").and_then(|x| x.as_u64()) {
            return n.to_string();
        }
        if let Some(s) = v.get("value").and_then(|x| x.as_str()) {
            return s.to_string();
        }
    }
    raw.to_string()
}

/// Parse an ISO-8601 timestamp string into a Unix epoch (seconds).
fn parse_iso_to_unix(s: &str) -> Option<i64> {
    use chrono::DateTime;
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.timestamp())
}
