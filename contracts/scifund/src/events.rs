//! Contract events.
//!
//! Every event is published under the topic pair `(kind, project_id)` so an
//! off-chain indexer can group the feed by project without decoding data.

use soroban_sdk::{contracttype, symbol_short, Address, Env, String};

use crate::types::ProjectStatus;

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProjectCreated {
    pub project_id: u64,
    pub researcher: Address,
    pub title: String,
    pub funding_goal: i128,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProjectFunded {
    pub project_id: u64,
    pub funder: Address,
    pub amount: i128,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StatusUpdated {
    pub project_id: u64,
    pub status: ProjectStatus,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OutputMinted {
    pub project_id: u64,
    pub token_id: u64,
    pub content_hash: String,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RewardsDistributed {
    pub project_id: u64,
    pub token_id: u64,
    pub researcher: Address,
    pub amount: i128,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FundsWithdrawn {
    pub project_id: u64,
    pub researcher: Address,
    pub amount: i128,
}

pub fn emit_project_created(env: &Env, event: ProjectCreated) {
    env.events()
        .publish((symbol_short!("created"), event.project_id), event);
}

pub fn emit_project_funded(env: &Env, event: ProjectFunded) {
    env.events()
        .publish((symbol_short!("funded"), event.project_id), event);
}

pub fn emit_status_updated(env: &Env, project_id: u64, status: ProjectStatus) {
    env.events().publish(
        (symbol_short!("status"), project_id),
        StatusUpdated { project_id, status },
    );
}

pub fn emit_output_minted(env: &Env, event: OutputMinted) {
    env.events()
        .publish((symbol_short!("minted"), event.project_id), event);
}

pub fn emit_rewards_distributed(env: &Env, event: RewardsDistributed) {
    env.events()
        .publish((symbol_short!("rewarded"), event.project_id), event);
}

pub fn emit_funds_withdrawn(env: &Env, event: FundsWithdrawn) {
    env.events()
        .publish((symbol_short!("withdrawn"), event.project_id), event);
}
