//! # Storage
//!
//! Typed helpers over Soroban's two storage tiers used by SciFund.
//!
//! ## Instance storage (contract-lifetime TTL)
//!
//! | Key            | Type  | Description                          |
//! |----------------|-------|--------------------------------------|
//! | `ProjectCount` | `u64` | Last issued project ID               |
//! | `OutputCount`  | `u64` | Last issued research output token ID |
//!
//! Instance TTL is bumped by **7 days** whenever it falls below 1 day remaining.
//!
//! ## Persistent storage (per-entry TTL)
//!
//! | Key                        | Type             | Description                    |
//! |----------------------------|------------------|--------------------------------|
//! | `ProjConfig(id)`           | `ProjectConfig`  | Immutable project configuration|
//! | `ProjState(id)`            | `ProjectState`   | Mutable project state          |
//! | `Output(token_id)`         | `ResearchOutput` | Minted research output         |
//! | `Contribution(id, funder)` | `i128`           | Total contributed by a funder  |
//! | `Funders(id)`              | `Vec<Address>`   | Funders in first-seen order    |
//!
//! Persistent TTL is bumped by **30 days** whenever it falls below 7 days remaining.

use soroban_sdk::{contracttype, Address, Env, Vec};

use crate::types::{Project, ProjectConfig, ProjectState, ResearchOutput};

// ── TTL Constants ────────────────────────────────────────────────────

/// Approximate ledgers per day (~5 seconds per ledger).
const DAY_IN_LEDGERS: u32 = 17_280;

const INSTANCE_BUMP_AMOUNT: u32 = 7 * DAY_IN_LEDGERS;
const INSTANCE_LIFETIME_THRESHOLD: u32 = DAY_IN_LEDGERS;

const PERSISTENT_BUMP_AMOUNT: u32 = 30 * DAY_IN_LEDGERS;
const PERSISTENT_LIFETIME_THRESHOLD: u32 = 7 * DAY_IN_LEDGERS;

// ── Storage Keys ─────────────────────────────────────────────────────

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DataKey {
    /// Project ID counter (Instance).
    ProjectCount,
    /// Research output token ID counter (Instance).
    OutputCount,
    /// Immutable project configuration keyed by ID (Persistent).
    ProjConfig(u64),
    /// Mutable project state keyed by ID (Persistent).
    ProjState(u64),
    /// Research output keyed by token ID (Persistent).
    Output(u64),
    /// Per-funder contribution total (Persistent).
    Contribution(u64, Address),
    /// Funder list of a project (Persistent).
    Funders(u64),
}

// ── Instance Storage Helpers ─────────────────────────────────────────

fn bump_instance(env: &Env) {
    env.storage()
        .instance()
        .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
}

/// Increment a counter and return the new value, so IDs start at 1.
fn next_id(env: &Env, key: &DataKey) -> u64 {
    bump_instance(env);
    let current: u64 = env.storage().instance().get(key).unwrap_or(0);
    let next = current + 1;
    env.storage().instance().set(key, &next);
    next
}

pub fn next_project_id(env: &Env) -> u64 {
    next_id(env, &DataKey::ProjectCount)
}

pub fn next_output_id(env: &Env) -> u64 {
    next_id(env, &DataKey::OutputCount)
}

pub fn project_count(env: &Env) -> u64 {
    bump_instance(env);
    env.storage()
        .instance()
        .get(&DataKey::ProjectCount)
        .unwrap_or(0)
}

// ── Persistent Storage Helpers ───────────────────────────────────────

fn bump_persistent(env: &Env, key: &DataKey) {
    env.storage()
        .persistent()
        .extend_ttl(key, PERSISTENT_LIFETIME_THRESHOLD, PERSISTENT_BUMP_AMOUNT);
}

/// Save both the immutable config and initial mutable state for a new project.
pub fn save_project(env: &Env, project: &Project) {
    let config_key = DataKey::ProjConfig(project.id);
    let state_key = DataKey::ProjState(project.id);

    let config = ProjectConfig {
        id: project.id,
        researcher: project.researcher.clone(),
        token: project.token.clone(),
        title: project.title.clone(),
        description: project.description.clone(),
        funding_goal: project.funding_goal,
        deadline: project.deadline,
        content_hash: project.content_hash.clone(),
    };

    let state = ProjectState {
        current_funding: project.current_funding,
        escrow: project.escrow,
        status: project.status,
    };

    env.storage().persistent().set(&config_key, &config);
    env.storage().persistent().set(&state_key, &state);
    bump_persistent(env, &config_key);
    bump_persistent(env, &state_key);
}

/// Load the full `Project` by combining config and state.
pub fn load_project(env: &Env, id: u64) -> Option<Project> {
    let config = load_project_config(env, id)?;
    let state = load_project_state(env, id)?;
    Some(Project {
        id: config.id,
        researcher: config.researcher,
        token: config.token,
        title: config.title,
        description: config.description,
        funding_goal: config.funding_goal,
        current_funding: state.current_funding,
        escrow: state.escrow,
        deadline: config.deadline,
        content_hash: config.content_hash,
        status: state.status,
    })
}

pub fn load_project_config(env: &Env, id: u64) -> Option<ProjectConfig> {
    let key = DataKey::ProjConfig(id);
    let config: Option<ProjectConfig> = env.storage().persistent().get(&key);
    if config.is_some() {
        bump_persistent(env, &key);
    }
    config
}

pub fn load_project_state(env: &Env, id: u64) -> Option<ProjectState> {
    let key = DataKey::ProjState(id);
    let state: Option<ProjectState> = env.storage().persistent().get(&key);
    if state.is_some() {
        bump_persistent(env, &key);
    }
    state
}

/// Save only the mutable project state.
pub fn save_project_state(env: &Env, id: u64, state: &ProjectState) {
    let key = DataKey::ProjState(id);
    env.storage().persistent().set(&key, state);
    bump_persistent(env, &key);
}

// ── Contributions ────────────────────────────────────────────────────

pub fn get_contribution(env: &Env, project_id: u64, funder: &Address) -> i128 {
    let key = DataKey::Contribution(project_id, funder.clone());
    let amount: Option<i128> = env.storage().persistent().get(&key);
    match amount {
        Some(v) => {
            bump_persistent(env, &key);
            v
        }
        None => 0,
    }
}

/// Add `amount` to the funder's running total, registering the funder on
/// their first contribution.
pub fn add_contribution(env: &Env, project_id: u64, funder: &Address, amount: i128) {
    let previous = get_contribution(env, project_id, funder);
    if previous == 0 {
        let mut funders = load_funders(env, project_id);
        funders.push_back(funder.clone());
        let funders_key = DataKey::Funders(project_id);
        env.storage().persistent().set(&funders_key, &funders);
        bump_persistent(env, &funders_key);
    }

    let key = DataKey::Contribution(project_id, funder.clone());
    env.storage().persistent().set(&key, &(previous + amount));
    bump_persistent(env, &key);
}

pub fn load_funders(env: &Env, project_id: u64) -> Vec<Address> {
    let key = DataKey::Funders(project_id);
    let funders: Option<Vec<Address>> = env.storage().persistent().get(&key);
    match funders {
        Some(list) => {
            bump_persistent(env, &key);
            list
        }
        None => Vec::new(env),
    }
}

// ── Research outputs ─────────────────────────────────────────────────

pub fn save_output(env: &Env, output: &ResearchOutput) {
    let key = DataKey::Output(output.id);
    env.storage().persistent().set(&key, output);
    bump_persistent(env, &key);
}

pub fn load_output(env: &Env, token_id: u64) -> Option<ResearchOutput> {
    let key = DataKey::Output(token_id);
    let output: Option<ResearchOutput> = env.storage().persistent().get(&key);
    if output.is_some() {
        bump_persistent(env, &key);
    }
    output
}
