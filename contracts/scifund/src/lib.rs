//! # SciFund Contract
//!
//! On-chain half of SciFund. Researchers open funding projects, funders
//! contribute tokens, researchers mint research output NFTs once funded and
//! later pay contributors back pro rata through `distribute_rewards`.
//!
//! | Phase        | Entry Point(s)                                   |
//! |--------------|--------------------------------------------------|
//! | Registration | [`SciFund::create_project`]                      |
//! | Funding      | [`SciFund::fund_project`], [`SciFund::withdraw_funds`] |
//! | Output       | [`SciFund::mint_research_output`]                |
//! | Rewards      | [`SciFund::distribute_rewards`]                  |
//! | Queries      | `get_project`, `get_research_output`, `get_contribution`, `project_count` |
//!
//! Storage access is delegated to [`storage`], event publication to
//! [`events`]. This file holds the entry points and their guards.

#![no_std]

use soroban_sdk::{contract, contracterror, contractimpl, panic_with_error, token, Address, Env, String};

mod events;
mod storage;
mod types;

#[cfg(test)]
mod invariants;
#[cfg(test)]
mod test_events;
#[cfg(test)]
mod test_lifecycle;

pub use events::{
    FundsWithdrawn, OutputMinted, ProjectCreated, ProjectFunded, RewardsDistributed, StatusUpdated,
};
pub use types::{Project, ProjectStatus, ResearchOutput};

const SECONDS_PER_DAY: u64 = 86_400;

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Error {
    ProjectNotFound = 1,
    OutputNotFound = 2,
    InvalidFundingGoal = 3,
    InvalidDuration = 4,
    InvalidAmount = 5,
    ProjectNotActive = 6,
    DeadlinePassed = 7,
    NotResearcher = 8,
    ProjectNotFunded = 9,
    RewardsAlreadyDistributed = 10,
    NothingToWithdraw = 11,
}

#[contract]
pub struct SciFund;

#[contractimpl]
impl SciFund {
    // ─────────────────────────────────────────────────────────
    // Registration
    // ─────────────────────────────────────────────────────────

    /// Open a new funding project and return its ID.
    ///
    /// The deadline is `duration_days` after the current ledger timestamp.
    pub fn create_project(
        env: Env,
        researcher: Address,
        token: Address,
        title: String,
        description: String,
        funding_goal: i128,
        duration_days: u64,
        content_hash: String,
    ) -> u64 {
        researcher.require_auth();

        if funding_goal <= 0 {
            panic_with_error!(&env, Error::InvalidFundingGoal);
        }
        if duration_days == 0 {
            panic_with_error!(&env, Error::InvalidDuration);
        }

        let id = storage::next_project_id(&env);
        let deadline = env.ledger().timestamp() + duration_days * SECONDS_PER_DAY;

        let project = Project {
            id,
            researcher: researcher.clone(),
            token,
            title: title.clone(),
            description,
            funding_goal,
            current_funding: 0,
            escrow: 0,
            deadline,
            content_hash,
            status: ProjectStatus::Active,
        };
        storage::save_project(&env, &project);

        events::emit_project_created(
            &env,
            ProjectCreated {
                project_id: id,
                researcher,
                title,
                funding_goal,
            },
        );
        id
    }

    // ─────────────────────────────────────────────────────────
    // Funding
    // ─────────────────────────────────────────────────────────

    /// Contribute `amount` of the project token.
    ///
    /// Only `Active` projects before their deadline accept contributions. The
    /// contribution that brings `current_funding` to or past the goal moves
    /// the project to `Funded`; later contributions are refused.
    pub fn fund_project(env: Env, project_id: u64, funder: Address, amount: i128) {
        funder.require_auth();

        if amount <= 0 {
            panic_with_error!(&env, Error::InvalidAmount);
        }

        let config = storage::load_project_config(&env, project_id)
            .unwrap_or_else(|| panic_with_error!(&env, Error::ProjectNotFound));
        let mut state = storage::load_project_state(&env, project_id)
            .unwrap_or_else(|| panic_with_error!(&env, Error::ProjectNotFound));

        if state.status != ProjectStatus::Active {
            panic_with_error!(&env, Error::ProjectNotActive);
        }
        if env.ledger().timestamp() > config.deadline {
            panic_with_error!(&env, Error::DeadlinePassed);
        }

        let token_client = token::Client::new(&env, &config.token);
        token_client.transfer(&funder, &env.current_contract_address(), &amount);

        storage::add_contribution(&env, project_id, &funder, amount);

        state.current_funding += amount;
        state.escrow += amount;
        let reached_goal = state.current_funding >= config.funding_goal;
        if reached_goal {
            state.status = ProjectStatus::Funded;
        }
        storage::save_project_state(&env, project_id, &state);

        events::emit_project_funded(
            &env,
            ProjectFunded {
                project_id,
                funder,
                amount,
            },
        );
        if reached_goal {
            events::emit_status_updated(&env, project_id, ProjectStatus::Funded);
        }
    }

    /// Move the escrowed balance to the researcher.
    ///
    /// Allowed once the project is `Funded` or `Completed`. Returns the amount
    /// transferred.
    pub fn withdraw_funds(env: Env, project_id: u64, researcher: Address) -> i128 {
        researcher.require_auth();

        let config = storage::load_project_config(&env, project_id)
            .unwrap_or_else(|| panic_with_error!(&env, Error::ProjectNotFound));
        if config.researcher != researcher {
            panic_with_error!(&env, Error::NotResearcher);
        }

        let mut state = storage::load_project_state(&env, project_id)
            .unwrap_or_else(|| panic_with_error!(&env, Error::ProjectNotFound));
        if state.status == ProjectStatus::Active {
            panic_with_error!(&env, Error::ProjectNotFunded);
        }
        if state.escrow <= 0 {
            panic_with_error!(&env, Error::NothingToWithdraw);
        }

        let amount = state.escrow;
        let token_client = token::Client::new(&env, &config.token);
        token_client.transfer(&env.current_contract_address(), &researcher, &amount);

        state.escrow = 0;
        storage::save_project_state(&env, project_id, &state);

        events::emit_funds_withdrawn(
            &env,
            FundsWithdrawn {
                project_id,
                researcher,
                amount,
            },
        );
        amount
    }

    // ─────────────────────────────────────────────────────────
    // Research output
    // ─────────────────────────────────────────────────────────

    /// Mint the research output NFT for a funded project and mark the project
    /// `Completed`. Returns the token ID.
    pub fn mint_research_output(
        env: Env,
        project_id: u64,
        researcher: Address,
        title: String,
        content_hash: String,
    ) -> u64 {
        researcher.require_auth();

        let config = storage::load_project_config(&env, project_id)
            .unwrap_or_else(|| panic_with_error!(&env, Error::ProjectNotFound));
        if config.researcher != researcher {
            panic_with_error!(&env, Error::NotResearcher);
        }

        let mut state = storage::load_project_state(&env, project_id)
            .unwrap_or_else(|| panic_with_error!(&env, Error::ProjectNotFound));
        if state.status != ProjectStatus::Funded {
            panic_with_error!(&env, Error::ProjectNotFunded);
        }

        let token_id = storage::next_output_id(&env);
        let output = ResearchOutput {
            id: token_id,
            project_id,
            researcher,
            title,
            content_hash: content_hash.clone(),
            rewards_distributed: false,
            minted_at: env.ledger().timestamp(),
        };
        storage::save_output(&env, &output);

        state.status = ProjectStatus::Completed;
        storage::save_project_state(&env, project_id, &state);

        events::emit_status_updated(&env, project_id, ProjectStatus::Completed);
        events::emit_output_minted(
            &env,
            OutputMinted {
                project_id,
                token_id,
                content_hash,
            },
        );
        token_id
    }

    // ─────────────────────────────────────────────────────────
    // Rewards
    // ─────────────────────────────────────────────────────────

    /// Pay `amount` from the researcher to the project's funders, split in
    /// proportion to what each contributed. Rounding dust stays with the
    /// researcher. Allowed once per token.
    pub fn distribute_rewards(env: Env, token_id: u64, researcher: Address, amount: i128) {
        researcher.require_auth();

        if amount <= 0 {
            panic_with_error!(&env, Error::InvalidAmount);
        }

        let mut output = storage::load_output(&env, token_id)
            .unwrap_or_else(|| panic_with_error!(&env, Error::OutputNotFound));
        if output.researcher != researcher {
            panic_with_error!(&env, Error::NotResearcher);
        }
        if output.rewards_distributed {
            panic_with_error!(&env, Error::RewardsAlreadyDistributed);
        }

        let project = storage::load_project(&env, output.project_id)
            .unwrap_or_else(|| panic_with_error!(&env, Error::ProjectNotFound));

        let token_client = token::Client::new(&env, &project.token);
        for funder in storage::load_funders(&env, project.id).iter() {
            let contributed = storage::get_contribution(&env, project.id, &funder);
            let share = amount * contributed / project.current_funding;
            if share > 0 {
                token_client.transfer(&researcher, &funder, &share);
            }
        }

        output.rewards_distributed = true;
        storage::save_output(&env, &output);

        events::emit_rewards_distributed(
            &env,
            RewardsDistributed {
                project_id: project.id,
                token_id,
                researcher,
                amount,
            },
        );
    }

    // ─────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────

    pub fn get_project(env: Env, id: u64) -> Project {
        storage::load_project(&env, id)
            .unwrap_or_else(|| panic_with_error!(&env, Error::ProjectNotFound))
    }

    pub fn get_research_output(env: Env, token_id: u64) -> ResearchOutput {
        storage::load_output(&env, token_id)
            .unwrap_or_else(|| panic_with_error!(&env, Error::OutputNotFound))
    }

    /// Total contributed by `funder` to `project_id` (0 if none).
    pub fn get_contribution(env: Env, project_id: u64, funder: Address) -> i128 {
        storage::get_contribution(&env, project_id, &funder)
    }

    pub fn project_count(env: Env) -> u64 {
        storage::project_count(&env)
    }
}
