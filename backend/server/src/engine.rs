//! Funding lifecycle engine.
//!
//! Owns the legal state transitions of a project and everything hanging off
//! it: contributions, research outputs, reviews and reward distributions.
//! Callers resolve the [`Identity`] once per request and pass it in; the
//! engine never looks at signatures or tokens.

use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use crate::auth::Identity;
use crate::errors::{Result, ServiceError};
use crate::ledger::RewardLedger;
use crate::models::{
    Category, ContributionWithUser, ContributorReward, DistributionView, FundingOutcome,
    NewOutput, NewProject, NewReview, OutputDetail, OutputToken, Project, ProjectBrief,
    ProjectDetail, ProjectFilter, ProjectListing, ProjectStatus, ProjectUpdate, ResearchOutput,
    Review, RewardDistribution, RewardOverview, RewardStatus, User,
};
use crate::repository::Repository;

const DEFAULT_OUTPUT_TITLE: &str = "Research Output";
const DEFAULT_OUTPUT_DESCRIPTION: &str = "Research output description";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProject {
    pub title: String,
    pub description: String,
    pub funding_goal: i64,
    /// Unix seconds.
    pub deadline: i64,
    pub researcher_id: i64,
    pub category_id: Option<i64>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub content_hash: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishOutput {
    pub content_hash: String,
    pub title: Option<String>,
    pub description: Option<String>,
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

pub struct FundingEngine {
    repo: Arc<dyn Repository>,
    ledger: Arc<dyn RewardLedger>,
}

impl FundingEngine {
    pub fn new(repo: Arc<dyn Repository>, ledger: Arc<dyn RewardLedger>) -> Self {
        Self { repo, ledger }
    }

    // ── Projects ─────────────────────────────────────────────

    pub async fn create_project(&self, input: CreateProject) -> Result<Project> {
        if input.funding_goal <= 0 {
            return Err(ServiceError::Validation(
                "Funding goal must be positive".to_string(),
            ));
        }
        if input.title.trim().is_empty() {
            return Err(ServiceError::Validation("Title is required".to_string()));
        }
        let now = now();
        if input.deadline <= now {
            return Err(ServiceError::Validation(
                "Deadline must be in the future".to_string(),
            ));
        }
        if self.repo.find_user(input.researcher_id).await?.is_none() {
            return Err(ServiceError::NotFound("Researcher not found".to_string()));
        }
        if let Some(category_id) = input.category_id {
            if self.repo.find_category(category_id).await?.is_none() {
                return Err(ServiceError::NotFound("Category not found".to_string()));
            }
        }

        let project = self
            .repo
            .insert_project(
                NewProject {
                    researcher_id: input.researcher_id,
                    category_id: input.category_id,
                    title: input.title.trim().to_string(),
                    description: input.description,
                    funding_goal: input.funding_goal,
                    deadline: input.deadline,
                    content_hash: input.content_hash,
                    tags: input.tags,
                },
                now,
            )
            .await?;

        info!(
            "Project {} created by user {} (goal {})",
            project.id, project.researcher_id, project.funding_goal
        );
        Ok(project)
    }

    pub async fn get_project(&self, id: i64) -> Result<ProjectDetail> {
        let project = self.require_project(id).await?;
        let researcher = self.require_user(project.researcher_id).await?;
        let category = match project.category_id {
            Some(category_id) => self.repo.find_category(category_id).await?.map(|c| c.name),
            None => None,
        };
        let contributions = self.repo.contributions_for_project(id).await?;
        let outputs = self.repo.outputs_for_project(id).await?;
        let reviews = self.repo.reviews_for_project(id).await?;

        Ok(ProjectDetail {
            project,
            researcher,
            category,
            contributions,
            outputs,
            reviews,
        })
    }

    pub async fn list_projects(&self, filter: &ProjectFilter) -> Result<Vec<ProjectListing>> {
        self.repo.list_projects(filter).await
    }

    pub async fn list_categories(&self) -> Result<Vec<Category>> {
        self.repo.list_categories().await
    }

    /// Researcher-only partial update. A status change must follow the
    /// forward lifecycle.
    pub async fn update_project(
        &self,
        id: i64,
        identity: &Identity,
        update: ProjectUpdate,
    ) -> Result<Project> {
        let project = self.require_project(id).await?;
        if project.researcher_id != identity.user_id {
            return Err(ServiceError::Forbidden(
                "Only the researcher can update this project".to_string(),
            ));
        }
        if update.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(ServiceError::Validation("Title is required".to_string()));
        }
        if let Some(next) = update.status {
            if !project.status.can_transition_to(next) {
                return Err(ServiceError::InvalidState(format!(
                    "Cannot move project from {} to {}",
                    project.status, next
                )));
            }
        }

        // The transition was checked against `project.status`; the write only
        // lands if nothing moved the project since.
        let expected_status = update.status.map(|_| project.status);
        match self
            .repo
            .update_project(id, expected_status, &update, now())
            .await?
        {
            Some(updated) => Ok(updated),
            None => {
                let current = self.require_project(id).await?;
                Err(ServiceError::InvalidState(format!(
                    "Project moved to {} during the update",
                    current.status
                )))
            }
        }
    }

    pub async fn delete_project(&self, id: i64, identity: &Identity) -> Result<()> {
        let project = self.require_project(id).await?;
        if project.researcher_id != identity.user_id {
            return Err(ServiceError::Forbidden(
                "Only the researcher can delete this project".to_string(),
            ));
        }
        if !self.repo.delete_project(id).await? {
            return Err(ServiceError::NotFound("Project not found".to_string()));
        }
        info!("Project {id} deleted");
        Ok(())
    }

    // ── Funding ──────────────────────────────────────────────

    /// Record a contribution. Only `ACTIVE` projects accept funding; the
    /// contribution that brings the total to the goal flips the project to
    /// `FUNDED`.
    pub async fn contribute(
        &self,
        project_id: i64,
        user_id: i64,
        amount: i64,
    ) -> Result<FundingOutcome> {
        if amount <= 0 {
            return Err(ServiceError::Validation("Invalid amount".to_string()));
        }
        let project = self.require_project(project_id).await?;
        if self.repo.find_user(user_id).await?.is_none() {
            return Err(ServiceError::NotFound("User not found".to_string()));
        }
        if project.status != ProjectStatus::Active {
            return Err(not_accepting_funding());
        }
        if project.current_funding.checked_add(amount).is_none() {
            return Err(funding_overflow());
        }

        // The repository re-checks status and headroom inside the write, so a
        // project that changed since the read above is still refused.
        let outcome = match self
            .repo
            .record_contribution(project_id, user_id, amount, now())
            .await?
        {
            Some(outcome) => outcome,
            None => {
                let current = self.require_project(project_id).await?;
                if current.status == ProjectStatus::Active
                    && current.current_funding.checked_add(amount).is_none()
                {
                    return Err(funding_overflow());
                }
                return Err(not_accepting_funding());
            }
        };

        let after = &outcome.project;
        info!(
            "Project {} received {} from user {} ({}/{})",
            after.id, amount, user_id, after.current_funding, after.funding_goal
        );
        if after.status == ProjectStatus::Funded {
            info!("Project {} reached its funding goal", after.id);
        }
        Ok(outcome)
    }

    // ── Research outputs ─────────────────────────────────────

    /// Publish a research output and complete the project. Only the project's
    /// researcher may publish.
    pub async fn publish_output(
        &self,
        project_id: i64,
        identity: &Identity,
        input: PublishOutput,
    ) -> Result<ResearchOutput> {
        let project = self.require_project(project_id).await?;
        let researcher = self.require_user(project.researcher_id).await?;
        if !identity.is(&researcher.address) {
            return Err(ServiceError::Unauthorized("Unauthorized".to_string()));
        }
        if input.content_hash.trim().is_empty() {
            return Err(ServiceError::Validation(
                "Content hash is required".to_string(),
            ));
        }

        let output = self
            .repo
            .publish_output(
                NewOutput {
                    project_id,
                    researcher_id: researcher.id,
                    title: input
                        .title
                        .unwrap_or_else(|| DEFAULT_OUTPUT_TITLE.to_string()),
                    description: input
                        .description
                        .unwrap_or_else(|| DEFAULT_OUTPUT_DESCRIPTION.to_string()),
                    content_hash: input.content_hash,
                },
                now(),
            )
            .await?;

        info!(
            "Output {} published for project {}; project completed",
            output.id, project_id
        );
        Ok(output)
    }

    /// Output with its researcher, owning project, reviews and token.
    /// The output must belong to `project_id`.
    pub async fn output_detail(&self, project_id: i64, output_id: i64) -> Result<OutputDetail> {
        let output = self.require_project_output(project_id, output_id).await?;
        let researcher = self.require_user(output.researcher_id).await?;
        let project = self.require_project(output.project_id).await?;
        let reviews = self.repo.reviews_for_output(output_id).await?;
        let token = self.repo.find_output_token(output_id).await?;

        Ok(OutputDetail {
            output,
            researcher,
            project: ProjectBrief {
                id: project.id,
                title: project.title,
            },
            reviews,
            token,
        })
    }

    /// Link a minted NFT to an output. Researcher only.
    pub async fn register_output_token(
        &self,
        project_id: i64,
        output_id: i64,
        identity: &Identity,
        token_id: i64,
    ) -> Result<OutputToken> {
        if token_id < 0 {
            return Err(ServiceError::Validation("Invalid token id".to_string()));
        }
        let output = self.require_project_output(project_id, output_id).await?;
        let project = self.require_project(output.project_id).await?;
        if project.researcher_id != identity.user_id {
            return Err(ServiceError::Forbidden(
                "Only the researcher can register the output token".to_string(),
            ));
        }

        let token = self.repo.link_output_token(output_id, token_id, now()).await?;
        info!("Output {output_id} linked to token {token_id}");
        Ok(token)
    }

    // ── Reviews ──────────────────────────────────────────────

    pub async fn submit_review(
        &self,
        project_id: i64,
        output_id: i64,
        identity: &Identity,
        rating: i64,
        comment: String,
    ) -> Result<Review> {
        if !(1..=5).contains(&rating) {
            return Err(ServiceError::Validation(
                "Rating must be between 1 and 5".to_string(),
            ));
        }
        self.require_project_output(project_id, output_id).await?;
        if self
            .repo
            .find_review(output_id, identity.user_id)
            .await?
            .is_some()
        {
            return Err(already_reviewed());
        }

        // A concurrent duplicate that slips past the lookup hits the unique
        // index and comes back as a conflict.
        let review = self
            .repo
            .insert_review(
                NewReview {
                    output_id,
                    reviewer_id: identity.user_id,
                    rating,
                    comment,
                },
                now(),
            )
            .await?;

        info!(
            "User {} reviewed output {} ({}/5)",
            identity.user_id, output_id, rating
        );
        Ok(review)
    }

    // ── Rewards ──────────────────────────────────────────────

    /// Record a pending reward distribution for an output's funders.
    ///
    /// Only the project's researcher may distribute, only through a minted
    /// token, and only once: a token the ledger reports as rewarded, or an
    /// output with a pending or completed distribution, is refused.
    pub async fn distribute_reward(
        &self,
        project_id: i64,
        output_id: i64,
        identity: &Identity,
        amount: i64,
    ) -> Result<RewardDistribution> {
        if amount <= 0 {
            return Err(ServiceError::Validation(
                "Invalid reward amount".to_string(),
            ));
        }
        let output = self.require_project_output(project_id, output_id).await?;
        let project = self.require_project(output.project_id).await?;
        if project.researcher_id != identity.user_id {
            return Err(ServiceError::Forbidden(
                "Only the researcher can distribute rewards".to_string(),
            ));
        }
        let token = self.repo.find_output_token(output_id).await?.ok_or_else(|| {
            ServiceError::NotFound("NFT not found for this research output".to_string())
        })?;

        if self.ledger.rewards_distributed(token.token_id).await? {
            return Err(already_distributed());
        }
        let previous = self.repo.distributions_for_output(output_id).await?;
        if previous.iter().any(|d| d.status != RewardStatus::Failed) {
            return Err(already_distributed());
        }

        // Concurrent calls that all pass the lookups above meet the
        // one-open-distribution rule in the repository; one insert wins.
        let distribution = self
            .repo
            .insert_reward_distribution(output_id, amount, now())
            .await?;
        info!(
            "Reward distribution {} of {} recorded for output {} (token {})",
            distribution.id, amount, output_id, token.token_id
        );
        Ok(distribution)
    }

    /// Output, project, funders and every distribution with each funder's
    /// share of it.
    pub async fn reward_overview(&self, project_id: i64, output_id: i64) -> Result<RewardOverview> {
        let output = self.require_project_output(project_id, output_id).await?;
        let project = self.require_project(output.project_id).await?;
        let contributions = self.repo.contributions_for_project(project.id).await?;
        let reward_distributions = self
            .repo
            .distributions_for_output(output_id)
            .await?
            .into_iter()
            .map(|distribution| DistributionView {
                contributor_rewards: contributor_rewards(distribution.amount, &contributions),
                distribution,
            })
            .collect();
        let token = self.repo.find_output_token(output_id).await?;

        Ok(RewardOverview {
            output,
            project,
            contributions,
            reward_distributions,
            token,
        })
    }

    // ── Lookups ──────────────────────────────────────────────

    async fn require_project(&self, id: i64) -> Result<Project> {
        self.repo
            .find_project(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Project not found".to_string()))
    }

    async fn require_output(&self, id: i64) -> Result<ResearchOutput> {
        self.repo
            .find_output(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Research output not found".to_string()))
    }

    /// The output, provided it belongs to `project_id`.
    async fn require_project_output(
        &self,
        project_id: i64,
        output_id: i64,
    ) -> Result<ResearchOutput> {
        let output = self.require_output(output_id).await?;
        if output.project_id != project_id {
            return Err(ServiceError::NotFound(
                "Research output not found".to_string(),
            ));
        }
        Ok(output)
    }

    async fn require_user(&self, id: i64) -> Result<User> {
        self.repo
            .find_user(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))
    }
}

/// Split `amount` across funders in proportion to what each contributed,
/// rounding down. Funders appear in order of their first contribution.
pub fn contributor_rewards(
    amount: i64,
    contributions: &[ContributionWithUser],
) -> Vec<ContributorReward> {
    let mut rewards: Vec<ContributorReward> = Vec::new();
    for c in contributions {
        match rewards
            .iter_mut()
            .find(|r| r.user_id == c.contribution.user_id)
        {
            Some(reward) => {
                reward.contributed = reward.contributed.saturating_add(c.contribution.amount)
            }
            None => rewards.push(ContributorReward {
                user_id: c.contribution.user_id,
                user_name: c.user_name.clone(),
                user_address: c.user_address.clone(),
                contributed: c.contribution.amount,
                amount: 0,
            }),
        }
    }

    let total: i128 = rewards.iter().map(|r| i128::from(r.contributed)).sum();
    if total > 0 {
        for reward in &mut rewards {
            let share = i128::from(amount) * i128::from(reward.contributed) / total;
            reward.amount = i64::try_from(share).unwrap_or(amount);
        }
    }
    rewards
}

fn not_accepting_funding() -> ServiceError {
    ServiceError::InvalidState("Project is not accepting funding".to_string())
}

fn funding_overflow() -> ServiceError {
    ServiceError::Validation("Amount exceeds the project's funding capacity".to_string())
}

fn already_reviewed() -> ServiceError {
    ServiceError::Conflict("You have already reviewed this research output".to_string())
}

fn already_distributed() -> ServiceError {
    ServiceError::InvalidState("Rewards have already been distributed".to_string())
}
