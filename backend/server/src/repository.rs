//! Persistence capability set used by the funding engine.
//!
//! [`crate::db::SqliteRepository`] is the production implementation;
//! [`crate::memory::MemoryRepository`] is an in-process fake with the same
//! semantics, used by tests and local development.

use async_trait::async_trait;

use crate::errors::Result;
use crate::models::{
    Category, ContributionWithUser, FundingOutcome, NewOutput, NewProject, NewReview,
    NewUser, OutputToken, Project, ProjectFilter, ProjectListing, ProjectStatus, ProjectUpdate,
    ResearchOutput, Review, ReviewWithReviewer, RewardDistribution, User,
};

#[async_trait]
pub trait Repository: Send + Sync {
    // ── Users ────────────────────────────────────────────────

    async fn find_user(&self, id: i64) -> Result<Option<User>>;

    /// Look up by lowercase wallet address.
    async fn find_user_by_address(&self, address: &str) -> Result<Option<User>>;

    /// Insert a user, or return the existing row when the address is taken.
    async fn insert_user(&self, user: NewUser) -> Result<User>;

    // ── Categories ───────────────────────────────────────────

    async fn find_category(&self, id: i64) -> Result<Option<Category>>;

    async fn list_categories(&self) -> Result<Vec<Category>>;

    // ── Projects ─────────────────────────────────────────────

    /// Insert an `ACTIVE` project with zero funding.
    async fn insert_project(&self, project: NewProject, now: i64) -> Result<Project>;

    async fn find_project(&self, id: i64) -> Result<Option<Project>>;

    async fn list_projects(&self, filter: &ProjectFilter) -> Result<Vec<ProjectListing>>;

    /// Apply a partial update. When `expected_status` is set the write only
    /// happens while the project is still in that status.
    ///
    /// Returns `None`, with nothing written, when the project is missing or its
    /// status no longer matches.
    async fn update_project(
        &self,
        id: i64,
        expected_status: Option<ProjectStatus>,
        update: &ProjectUpdate,
        now: i64,
    ) -> Result<Option<Project>>;

    /// Delete a project and everything it owns. Returns `false` when absent.
    async fn delete_project(&self, id: i64) -> Result<bool>;

    // ── Contributions ────────────────────────────────────────

    /// Record a contribution as one atomic step: insert the row, add `amount`
    /// to `current_funding` and flip `ACTIVE` to `FUNDED` when the
    /// post-increment total reaches the goal.
    ///
    /// Returns `None`, with nothing written, when the project is missing, no
    /// longer `ACTIVE` at the moment of the write, or `amount` would overflow
    /// `current_funding`.
    async fn record_contribution(
        &self,
        project_id: i64,
        user_id: i64,
        amount: i64,
        now: i64,
    ) -> Result<Option<FundingOutcome>>;

    async fn contributions_for_project(&self, project_id: i64)
        -> Result<Vec<ContributionWithUser>>;

    // ── Research outputs ─────────────────────────────────────

    /// Insert the output and mark its project `COMPLETED` in one step.
    async fn publish_output(&self, output: NewOutput, now: i64) -> Result<ResearchOutput>;

    async fn find_output(&self, id: i64) -> Result<Option<ResearchOutput>>;

    async fn outputs_for_project(&self, project_id: i64) -> Result<Vec<ResearchOutput>>;

    async fn find_output_token(&self, output_id: i64) -> Result<Option<OutputToken>>;

    /// Associate a minted NFT with an output. Fails with `Conflict` when the
    /// output already has a token or the token is linked elsewhere.
    async fn link_output_token(&self, output_id: i64, token_id: i64, now: i64)
        -> Result<OutputToken>;

    // ── Reviews ──────────────────────────────────────────────

    async fn find_review(&self, output_id: i64, reviewer_id: i64) -> Result<Option<Review>>;

    /// Fails with `Conflict` when the reviewer already reviewed the output.
    async fn insert_review(&self, review: NewReview, now: i64) -> Result<Review>;

    /// Newest first.
    async fn reviews_for_output(&self, output_id: i64) -> Result<Vec<ReviewWithReviewer>>;

    async fn reviews_for_project(&self, project_id: i64) -> Result<Vec<ReviewWithReviewer>>;

    // ── Rewards ──────────────────────────────────────────────

    /// Insert a `PENDING` distribution. Fails with `InvalidState` while the
    /// output already has a distribution that is not `FAILED`.
    async fn insert_reward_distribution(
        &self,
        output_id: i64,
        amount: i64,
        now: i64,
    ) -> Result<RewardDistribution>;

    async fn distributions_for_output(&self, output_id: i64) -> Result<Vec<RewardDistribution>>;
}
