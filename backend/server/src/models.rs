//! Persistent entities and the read views assembled from them.
//!
//! All amounts are integers in the smallest currency unit and all times are
//! unix seconds. JSON uses camelCase field names.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::types::Json;

use crate::errors::ServiceError;

// ─────────────────────────────────────────────────────────
// Status enums
// ─────────────────────────────────────────────────────────

/// Project lifecycle. Transitions only move forward:
///
/// ```text
/// ACTIVE ──► FUNDED ──► COMPLETED
///    └─────────────────►┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum ProjectStatus {
    Active,
    Funded,
    Completed,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Funded => "FUNDED",
            Self::Completed => "COMPLETED",
        }
    }

    /// Whether moving from `self` to `next` is a legal forward step.
    /// Staying in place is always allowed.
    pub fn can_transition_to(self, next: ProjectStatus) -> bool {
        self == next
            || matches!(
                (self, next),
                (Self::Active, Self::Funded)
                    | (Self::Active, Self::Completed)
                    | (Self::Funded, Self::Completed)
            )
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectStatus {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(Self::Active),
            "FUNDED" => Ok(Self::Funded),
            "COMPLETED" => Ok(Self::Completed),
            other => Err(ServiceError::Validation(format!(
                "Unknown project status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum RewardStatus {
    Pending,
    Completed,
    Failed,
}

// ─────────────────────────────────────────────────────────
// Entities
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    /// Lowercase `0x`-prefixed wallet address.
    pub address: String,
    pub name: String,
    pub avatar: String,
    pub institution: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub address: String,
    pub name: String,
    pub avatar: String,
    pub institution: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: i64,
    pub researcher_id: i64,
    pub category_id: Option<i64>,
    pub title: String,
    pub description: String,
    pub funding_goal: i64,
    pub current_funding: i64,
    pub deadline: i64,
    pub status: ProjectStatus,
    pub content_hash: String,
    pub tags: Json<Vec<String>>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct NewProject {
    pub researcher_id: i64,
    pub category_id: Option<i64>,
    pub title: String,
    pub description: String,
    pub funding_goal: i64,
    pub deadline: i64,
    pub content_hash: String,
    pub tags: Vec<String>,
}

/// Partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<ProjectStatus>,
    pub content_hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Contribution {
    pub id: i64,
    pub project_id: i64,
    pub user_id: i64,
    pub amount: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ResearchOutput {
    pub id: i64,
    pub project_id: i64,
    pub researcher_id: i64,
    pub title: String,
    pub description: String,
    pub content_hash: String,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct NewOutput {
    pub project_id: i64,
    pub researcher_id: i64,
    pub title: String,
    pub description: String,
    pub content_hash: String,
}

/// Link between a research output and its minted reward NFT.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OutputToken {
    pub output_id: i64,
    pub token_id: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: i64,
    pub output_id: i64,
    pub reviewer_id: i64,
    pub rating: i64,
    pub comment: String,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct NewReview {
    pub output_id: i64,
    pub reviewer_id: i64,
    pub rating: i64,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RewardDistribution {
    pub id: i64,
    pub output_id: i64,
    pub amount: i64,
    pub status: RewardStatus,
    pub created_at: i64,
}

// ─────────────────────────────────────────────────────────
// Listing
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProjectSort {
    #[default]
    Newest,
    /// Soonest deadline first.
    Deadline,
    /// Most funded first.
    Funding,
    /// Smallest goal first.
    Goal,
}

impl ProjectSort {
    /// Unknown or missing values fall back to `Newest`.
    pub fn from_param(param: Option<&str>) -> Self {
        match param {
            Some("deadline") => Self::Deadline,
            Some("funding") => Self::Funding,
            Some("goal") => Self::Goal,
            _ => Self::Newest,
        }
    }

    pub fn order_clause(&self) -> &'static str {
        match self {
            Self::Newest => "p.created_at DESC, p.id DESC",
            Self::Deadline => "p.deadline ASC, p.id ASC",
            Self::Funding => "p.current_funding DESC, p.id ASC",
            Self::Goal => "p.funding_goal ASC, p.id ASC",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProjectFilter {
    /// Category name.
    pub category: Option<String>,
    pub status: Option<ProjectStatus>,
    pub sort: ProjectSort,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProjectListing {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub project: Project,
    pub researcher_name: String,
    pub researcher_institution: Option<String>,
    pub category_name: Option<String>,
}

// ─────────────────────────────────────────────────────────
// Read views
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ContributionWithUser {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub contribution: Contribution,
    pub user_name: String,
    pub user_address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ReviewWithReviewer {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub review: Review,
    pub reviewer_name: String,
    pub reviewer_avatar: String,
}

/// Result of an accepted contribution: the new row and the project after the
/// increment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FundingOutcome {
    pub contribution: Contribution,
    pub project: Project,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDetail {
    #[serde(flatten)]
    pub project: Project,
    pub researcher: User,
    pub category: Option<String>,
    pub contributions: Vec<ContributionWithUser>,
    pub outputs: Vec<ResearchOutput>,
    pub reviews: Vec<ReviewWithReviewer>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectBrief {
    pub id: i64,
    pub title: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputDetail {
    #[serde(flatten)]
    pub output: ResearchOutput,
    pub researcher: User,
    pub project: ProjectBrief,
    /// Newest first.
    pub reviews: Vec<ReviewWithReviewer>,
    pub token: Option<OutputToken>,
}

/// One funder's pro-rata share of a distribution.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributorReward {
    pub user_id: i64,
    pub user_name: String,
    pub user_address: String,
    pub contributed: i64,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionView {
    #[serde(flatten)]
    pub distribution: RewardDistribution,
    pub contributor_rewards: Vec<ContributorReward>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardOverview {
    #[serde(flatten)]
    pub output: ResearchOutput,
    pub project: Project,
    pub contributions: Vec<ContributionWithUser>,
    pub reward_distributions: Vec<DistributionView>,
    pub token: Option<OutputToken>,
}
