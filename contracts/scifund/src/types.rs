//! # Types
//!
//! Shared data structures used across all modules of the SciFund contract.
//!
//! ## Config / State split
//!
//! A `Project` is stored as two separate ledger entries:
//!
//! - [`ProjectConfig`]: written once at creation; never mutated.
//! - [`ProjectState`]: written on every contribution, mint and withdrawal.
//!
//! The public API exposes the reconstructed [`Project`] struct.
//!
//! ## Status as a Finite-State Machine
//!
//! [`ProjectStatus`] only moves forward:
//!
//! ```text
//! Active ──► Funded ──► Completed
//! ```
//!
//! `fund_project` only accepts `Active` projects and `mint_research_output`
//! only accepts `Funded` ones, so no entry point can move a project backward.

use soroban_sdk::{contracttype, Address, String};

/// Lifecycle status of a project.
#[contracttype]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum ProjectStatus {
    /// Accepting contributions.
    Active = 1,
    /// Funding goal reached; research in progress.
    Funded = 2,
    /// Research output minted.
    Completed = 3,
}

/// Immutable project configuration, written once at creation.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProjectConfig {
    pub id: u64,
    pub researcher: Address,
    pub token: Address,
    pub title: String,
    pub description: String,
    pub funding_goal: i128,
    pub deadline: u64,
    pub content_hash: String,
}

/// Mutable project state.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProjectState {
    /// Total ever contributed. Never decreases.
    pub current_funding: i128,
    /// Amount held by the contract and not yet withdrawn by the researcher.
    pub escrow: i128,
    pub status: ProjectStatus,
}

/// Full on-chain representation of a research project.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Project {
    /// Unique identifier (auto-incremented, starting at 1).
    pub id: u64,
    /// Address that created the project and receives the funds.
    pub researcher: Address,
    /// Token used for contributions and rewards.
    pub token: Address,
    pub title: String,
    pub description: String,
    /// Target funding amount.
    pub funding_goal: i128,
    /// Total contributed so far; may exceed the goal.
    pub current_funding: i128,
    /// Amount still escrowed by the contract.
    pub escrow: i128,
    /// Ledger timestamp after which contributions are refused.
    pub deadline: u64,
    /// Content-store hash of the proposal document.
    pub content_hash: String,
    pub status: ProjectStatus,
}

/// A minted research output NFT.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResearchOutput {
    /// Token identifier (auto-incremented, starting at 1).
    pub id: u64,
    pub project_id: u64,
    pub researcher: Address,
    pub title: String,
    /// Content-store hash of the output document.
    pub content_hash: String,
    /// Set once `distribute_rewards` has paid out for this token.
    pub rewards_distributed: bool,
    pub minted_at: u64,
}
