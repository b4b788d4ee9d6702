//! Event types emitted by the SciFund contract.
//!
//! Topic symbols mirror the `emit_*` helpers in `contracts/scifund/src/events.rs`.

use serde::{Deserialize, Serialize};

/// All recognised event kinds from the SciFund contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// `created`
    ProjectCreated,
    /// `funded`
    ProjectFunded,
    /// `status`
    StatusUpdated,
    /// `minted`: a research output NFT was minted.
    OutputMinted,
    /// `rewarded`: rewards for an output were paid out to funders.
    RewardsDistributed,
    /// `withdrawn`
    FundsWithdrawn,
    Unknown,
}

impl EventKind {
    /// Parse the leading topic symbol into an [`EventKind`].
    pub fn from_topic(topic: &str) -> Self {
        match topic {
            "created" => Self::ProjectCreated,
            "funded" => Self::ProjectFunded,
            "status" => Self::StatusUpdated,
            "minted" => Self::OutputMinted,
            "rewarded" => Self::RewardsDistributed,
            "withdrawn" => Self::FundsWithdrawn,
            _ => Self::Unknown,
        }
    }

    /// Identifier stored in `chain_events.event_type`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProjectCreated => "project_created",
            Self::ProjectFunded => "project_funded",
            Self::StatusUpdated => "status_updated",
            Self::OutputMinted => "output_minted",
            Self::RewardsDistributed => "rewards_distributed",
            Self::FundsWithdrawn => "funds_withdrawn",
            Self::Unknown => "unknown",
        }
    }
}

/// A decoded contract event, ready to be stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainEvent {
    pub event_type: String,
    pub project_id: Option<String>,
    pub actor: Option<String>,
    pub amount: Option<String>,
    /// Research output token id, for `minted` and `rewarded`.
    pub token_id: Option<i64>,
    pub content_hash: Option<String>,
    pub ledger: i64,
    pub timestamp: i64,
    pub contract_id: String,
    pub tx_hash: Option<String>,
}

impl ChainEvent {
    pub fn kind(&self) -> EventKind {
        match self.event_type.as_str() {
            "project_created" => EventKind::ProjectCreated,
            "project_funded" => EventKind::ProjectFunded,
            "status_updated" => EventKind::StatusUpdated,
            "output_minted" => EventKind::OutputMinted,
            "rewards_distributed" => EventKind::RewardsDistributed,
            "funds_withdrawn" => EventKind::FundsWithdrawn,
            _ => EventKind::Unknown,
        }
    }
}
