use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::types::Json;
use tokio::sync::RwLock;

use crate::errors::{Result, ServiceError};
use crate::models::{
    Category, Contribution, ContributionWithUser, FundingOutcome, NewOutput, NewProject, NewReview,
    NewUser, OutputToken, Project, ProjectFilter, ProjectListing, ProjectSort, ProjectStatus,
    ProjectUpdate, ResearchOutput, Review, ReviewWithReviewer, RewardDistribution, RewardStatus,
    User,
};
use crate::repository::Repository;

/// Categories the SQLite migration seeds; mirrored so both backends agree.
const SEED_CATEGORIES: &[&str] = &[
    "Biology",
    "Chemistry",
    "Physics",
    "Medicine",
    "Computer Science",
    "Environmental Science",
    "Social Science",
];

#[derive(Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    categories: BTreeMap<i64, Category>,
    projects: BTreeMap<i64, Project>,
    contributions: BTreeMap<i64, Contribution>,
    outputs: BTreeMap<i64, ResearchOutput>,
    tokens: BTreeMap<i64, OutputToken>,
    reviews: BTreeMap<i64, Review>,
    rewards: BTreeMap<i64, RewardDistribution>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn contribution_view(&self, c: &Contribution) -> Option<ContributionWithUser> {
        let user = self.users.get(&c.user_id)?;
        Some(ContributionWithUser {
            contribution: c.clone(),
            user_name: user.name.clone(),
            user_address: user.address.clone(),
        })
    }

    fn review_view(&self, r: &Review) -> Option<ReviewWithReviewer> {
        let reviewer = self.users.get(&r.reviewer_id)?;
        Some(ReviewWithReviewer {
            review: r.clone(),
            reviewer_name: reviewer.name.clone(),
            reviewer_avatar: reviewer.avatar.clone(),
        })
    }

    fn newest_first(mut reviews: Vec<ReviewWithReviewer>) -> Vec<ReviewWithReviewer> {
        reviews.sort_by(|a, b| {
            b.review
                .created_at
                .cmp(&a.review.created_at)
                .then(b.review.id.cmp(&a.review.id))
        });
        reviews
    }
}

/// In-memory repository for tests and development.
///
/// Every operation takes the single table lock for its whole duration, so
/// multi-row steps such as [`Repository::record_contribution`] are atomic.
#[derive(Clone)]
pub struct MemoryRepository {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        let mut tables = Tables::default();
        for name in SEED_CATEGORIES {
            let id = tables.next_id();
            tables.categories.insert(
                id,
                Category {
                    id,
                    name: (*name).to_string(),
                },
            );
        }
        Self {
            tables: Arc::new(RwLock::new(tables)),
        }
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn find_user(&self, id: i64) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_address(&self, address: &str) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.address == address).cloned())
    }

    async fn insert_user(&self, user: NewUser) -> Result<User> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables.users.values().find(|u| u.address == user.address) {
            return Ok(existing.clone());
        }
        let id = tables.next_id();
        let row = User {
            id,
            address: user.address,
            name: user.name,
            avatar: user.avatar,
            institution: user.institution,
            created_at: chrono::Utc::now().timestamp(),
        };
        tables.users.insert(id, row.clone());
        Ok(row)
    }

    async fn find_category(&self, id: i64) -> Result<Option<Category>> {
        Ok(self.tables.read().await.categories.get(&id).cloned())
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let tables = self.tables.read().await;
        let mut categories: Vec<Category> = tables.categories.values().cloned().collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn insert_project(&self, project: NewProject, now: i64) -> Result<Project> {
        let mut tables = self.tables.write().await;
        let id = tables.next_id();
        let row = Project {
            id,
            researcher_id: project.researcher_id,
            category_id: project.category_id,
            title: project.title,
            description: project.description,
            funding_goal: project.funding_goal,
            current_funding: 0,
            deadline: project.deadline,
            status: ProjectStatus::Active,
            content_hash: project.content_hash,
            tags: Json(project.tags),
            created_at: now,
            updated_at: now,
        };
        tables.projects.insert(id, row.clone());
        Ok(row)
    }

    async fn find_project(&self, id: i64) -> Result<Option<Project>> {
        Ok(self.tables.read().await.projects.get(&id).cloned())
    }

    async fn list_projects(&self, filter: &ProjectFilter) -> Result<Vec<ProjectListing>> {
        let tables = self.tables.read().await;
        let mut listings: Vec<ProjectListing> = tables
            .projects
            .values()
            .filter(|p| filter.status.map_or(true, |s| p.status == s))
            .filter_map(|p| {
                let category_name = p
                    .category_id
                    .and_then(|id| tables.categories.get(&id))
                    .map(|c| c.name.clone());
                if let Some(wanted) = &filter.category {
                    if category_name.as_deref() != Some(wanted.as_str()) {
                        return None;
                    }
                }
                let researcher = tables.users.get(&p.researcher_id)?;
                Some(ProjectListing {
                    project: p.clone(),
                    researcher_name: researcher.name.clone(),
                    researcher_institution: researcher.institution.clone(),
                    category_name,
                })
            })
            .collect();

        listings.sort_by(|a, b| {
            let (a, b) = (&a.project, &b.project);
            match filter.sort {
                ProjectSort::Newest => b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)),
                ProjectSort::Deadline => a.deadline.cmp(&b.deadline).then(a.id.cmp(&b.id)),
                ProjectSort::Funding => b
                    .current_funding
                    .cmp(&a.current_funding)
                    .then(a.id.cmp(&b.id)),
                ProjectSort::Goal => a.funding_goal.cmp(&b.funding_goal).then(a.id.cmp(&b.id)),
            }
        });
        Ok(listings)
    }

    async fn update_project(
        &self,
        id: i64,
        expected_status: Option<ProjectStatus>,
        update: &ProjectUpdate,
        now: i64,
    ) -> Result<Option<Project>> {
        let mut tables = self.tables.write().await;
        let Some(project) = tables.projects.get_mut(&id) else {
            return Ok(None);
        };
        if expected_status.is_some_and(|expected| expected != project.status) {
            return Ok(None);
        }
        if let Some(title) = &update.title {
            project.title = title.clone();
        }
        if let Some(description) = &update.description {
            project.description = description.clone();
        }
        if let Some(status) = update.status {
            project.status = status;
        }
        if let Some(hash) = &update.content_hash {
            project.content_hash = hash.clone();
        }
        project.updated_at = now;
        Ok(Some(project.clone()))
    }

    async fn delete_project(&self, id: i64) -> Result<bool> {
        let mut tables = self.tables.write().await;
        if tables.projects.remove(&id).is_none() {
            return Ok(false);
        }
        tables.contributions.retain(|_, c| c.project_id != id);
        let output_ids: Vec<i64> = tables
            .outputs
            .values()
            .filter(|o| o.project_id == id)
            .map(|o| o.id)
            .collect();
        for output_id in output_ids {
            tables.outputs.remove(&output_id);
            tables.tokens.remove(&output_id);
            tables.reviews.retain(|_, r| r.output_id != output_id);
            tables.rewards.retain(|_, r| r.output_id != output_id);
        }
        Ok(true)
    }

    async fn record_contribution(
        &self,
        project_id: i64,
        user_id: i64,
        amount: i64,
        now: i64,
    ) -> Result<Option<FundingOutcome>> {
        let mut tables = self.tables.write().await;
        let Some(project) = tables.projects.get_mut(&project_id) else {
            return Ok(None);
        };
        if project.status != ProjectStatus::Active {
            return Ok(None);
        }
        let Some(total) = project.current_funding.checked_add(amount) else {
            return Ok(None);
        };

        project.current_funding = total;
        if project.current_funding >= project.funding_goal {
            project.status = ProjectStatus::Funded;
        }
        project.updated_at = now;
        let project = project.clone();

        let id = tables.next_id();
        let contribution = Contribution {
            id,
            project_id,
            user_id,
            amount,
            created_at: now,
        };
        tables.contributions.insert(id, contribution.clone());

        Ok(Some(FundingOutcome {
            contribution,
            project,
        }))
    }

    async fn contributions_for_project(
        &self,
        project_id: i64,
    ) -> Result<Vec<ContributionWithUser>> {
        let tables = self.tables.read().await;
        Ok(tables
            .contributions
            .values()
            .filter(|c| c.project_id == project_id)
            .filter_map(|c| tables.contribution_view(c))
            .collect())
    }

    async fn publish_output(&self, output: NewOutput, now: i64) -> Result<ResearchOutput> {
        let mut tables = self.tables.write().await;
        let Some(project) = tables.projects.get_mut(&output.project_id) else {
            return Err(ServiceError::NotFound("Project not found".to_string()));
        };
        project.status = ProjectStatus::Completed;
        project.updated_at = now;

        let id = tables.next_id();
        let row = ResearchOutput {
            id,
            project_id: output.project_id,
            researcher_id: output.researcher_id,
            title: output.title,
            description: output.description,
            content_hash: output.content_hash,
            created_at: now,
        };
        tables.outputs.insert(id, row.clone());
        Ok(row)
    }

    async fn find_output(&self, id: i64) -> Result<Option<ResearchOutput>> {
        Ok(self.tables.read().await.outputs.get(&id).cloned())
    }

    async fn outputs_for_project(&self, project_id: i64) -> Result<Vec<ResearchOutput>> {
        let tables = self.tables.read().await;
        Ok(tables
            .outputs
            .values()
            .filter(|o| o.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn find_output_token(&self, output_id: i64) -> Result<Option<OutputToken>> {
        Ok(self.tables.read().await.tokens.get(&output_id).cloned())
    }

    async fn link_output_token(
        &self,
        output_id: i64,
        token_id: i64,
        now: i64,
    ) -> Result<OutputToken> {
        let mut tables = self.tables.write().await;
        if tables.tokens.contains_key(&output_id)
            || tables.tokens.values().any(|t| t.token_id == token_id)
        {
            return Err(ServiceError::Conflict(
                "Research output already has a token".to_string(),
            ));
        }
        let row = OutputToken {
            output_id,
            token_id,
            created_at: now,
        };
        tables.tokens.insert(output_id, row.clone());
        Ok(row)
    }

    async fn find_review(&self, output_id: i64, reviewer_id: i64) -> Result<Option<Review>> {
        let tables = self.tables.read().await;
        Ok(tables
            .reviews
            .values()
            .find(|r| r.output_id == output_id && r.reviewer_id == reviewer_id)
            .cloned())
    }

    async fn insert_review(&self, review: NewReview, now: i64) -> Result<Review> {
        let mut tables = self.tables.write().await;
        if tables
            .reviews
            .values()
            .any(|r| r.output_id == review.output_id && r.reviewer_id == review.reviewer_id)
        {
            return Err(ServiceError::Conflict(
                "You have already reviewed this research output".to_string(),
            ));
        }
        let id = tables.next_id();
        let row = Review {
            id,
            output_id: review.output_id,
            reviewer_id: review.reviewer_id,
            rating: review.rating,
            comment: review.comment,
            created_at: now,
        };
        tables.reviews.insert(id, row.clone());
        Ok(row)
    }

    async fn reviews_for_output(&self, output_id: i64) -> Result<Vec<ReviewWithReviewer>> {
        let tables = self.tables.read().await;
        let reviews = tables
            .reviews
            .values()
            .filter(|r| r.output_id == output_id)
            .filter_map(|r| tables.review_view(r))
            .collect();
        Ok(Tables::newest_first(reviews))
    }

    async fn reviews_for_project(&self, project_id: i64) -> Result<Vec<ReviewWithReviewer>> {
        let tables = self.tables.read().await;
        let reviews = tables
            .reviews
            .values()
            .filter(|r| {
                tables
                    .outputs
                    .get(&r.output_id)
                    .is_some_and(|o| o.project_id == project_id)
            })
            .filter_map(|r| tables.review_view(r))
            .collect();
        Ok(Tables::newest_first(reviews))
    }

    async fn insert_reward_distribution(
        &self,
        output_id: i64,
        amount: i64,
        now: i64,
    ) -> Result<RewardDistribution> {
        let mut tables = self.tables.write().await;
        if tables
            .rewards
            .values()
            .any(|r| r.output_id == output_id && r.status != RewardStatus::Failed)
        {
            return Err(ServiceError::InvalidState(
                "Rewards have already been distributed".to_string(),
            ));
        }
        let id = tables.next_id();
        let row = RewardDistribution {
            id,
            output_id,
            amount,
            status: RewardStatus::Pending,
            created_at: now,
        };
        tables.rewards.insert(id, row.clone());
        Ok(row)
    }

    async fn distributions_for_output(&self, output_id: i64) -> Result<Vec<RewardDistribution>> {
        let tables = self.tables.read().await;
        Ok(tables
            .rewards
            .values()
            .filter(|r| r.output_id == output_id)
            .cloned()
            .collect())
    }
}
