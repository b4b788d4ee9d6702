//! Database layer: pool setup, migrations, the SQLite [`Repository`] and
//! the indexer's cursor/event helpers.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::info;

use crate::errors::{Result, ServiceError};
use crate::events::ChainEvent;
use crate::models::{
    Category, Contribution, ContributionWithUser, FundingOutcome, NewOutput, NewProject, NewReview,
    NewUser, OutputToken, Project, ProjectFilter, ProjectListing, ProjectStatus, ProjectUpdate,
    ResearchOutput, Review, ReviewWithReviewer, RewardDistribution, User,
};
use crate::repository::Repository;

const PROJECT_COLUMNS: &str = "id, researcher_id, category_id, title, description, funding_goal, \
     current_funding, deadline, status, content_hash, tags, created_at, updated_at";

/// Establish a SQLite connection pool and run pending migrations.
///
/// In-memory databases are private to a connection, so `:memory:` URLs get a
/// single-connection pool.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };

    let options = SqliteConnectOptions::from_str(&url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let max_connections = if url.contains(":memory:") { 1 } else { 5 };
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

// ─────────────────────────────────────────────────────────
// Repository
// ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn find_user(&self, id: i64) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, address, name, avatar, institution, created_at FROM users WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_address(&self, address: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, address, name, avatar, institution, created_at FROM users WHERE address = ?1",
        )
        .bind(address)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn insert_user(&self, user: NewUser) -> Result<User> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO users (address, name, avatar, institution, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&user.address)
        .bind(&user.name)
        .bind(&user.avatar)
        .bind(&user.institution)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        self.find_user_by_address(&user.address)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))
    }

    async fn find_category(&self, id: i64) -> Result<Option<Category>> {
        let category = sqlx::query_as::<_, Category>("SELECT id, name FROM categories WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(category)
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let rows = sqlx::query_as::<_, Category>("SELECT id, name FROM categories ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn insert_project(&self, project: NewProject, now: i64) -> Result<Project> {
        let tags = serde_json::to_string(&project.tags)?;
        let row = sqlx::query_as::<_, Project>(&format!(
            r#"
            INSERT INTO projects
                (researcher_id, category_id, title, description, funding_goal,
                 current_funding, deadline, status, content_hash, tags, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, 'ACTIVE', ?7, ?8, ?9, ?9)
            RETURNING {PROJECT_COLUMNS}
            "#
        ))
        .bind(project.researcher_id)
        .bind(project.category_id)
        .bind(&project.title)
        .bind(&project.description)
        .bind(project.funding_goal)
        .bind(project.deadline)
        .bind(&project.content_hash)
        .bind(tags)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_project(&self, id: i64) -> Result<Option<Project>> {
        let row = sqlx::query_as::<_, Project>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_projects(&self, filter: &ProjectFilter) -> Result<Vec<ProjectListing>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            r#"
            SELECT p.id, p.researcher_id, p.category_id, p.title, p.description,
                   p.funding_goal, p.current_funding, p.deadline, p.status,
                   p.content_hash, p.tags, p.created_at, p.updated_at,
                   u.name        AS researcher_name,
                   u.institution AS researcher_institution,
                   c.name        AS category_name
            FROM   projects p
            JOIN   users u           ON u.id = p.researcher_id
            LEFT JOIN categories c   ON c.id = p.category_id
            WHERE  1 = 1
            "#,
        );
        if let Some(category) = &filter.category {
            qb.push(" AND c.name = ").push_bind(category.clone());
        }
        if let Some(status) = filter.status {
            qb.push(" AND p.status = ").push_bind(status.as_str());
        }
        qb.push(" ORDER BY ").push(filter.sort.order_clause());

        let rows = qb
            .build_query_as::<ProjectListing>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn update_project(
        &self,
        id: i64,
        expected_status: Option<ProjectStatus>,
        update: &ProjectUpdate,
        now: i64,
    ) -> Result<Option<Project>> {
        let row = sqlx::query_as::<_, Project>(&format!(
            r#"
            UPDATE projects
            SET    title        = COALESCE(?1, title),
                   description  = COALESCE(?2, description),
                   status       = COALESCE(?3, status),
                   content_hash = COALESCE(?4, content_hash),
                   updated_at   = ?5
            WHERE  id = ?6 AND (?7 IS NULL OR status = ?7)
            RETURNING {PROJECT_COLUMNS}
            "#
        ))
        .bind(&update.title)
        .bind(&update.description)
        .bind(update.status.map(|s| s.as_str()))
        .bind(&update.content_hash)
        .bind(now)
        .bind(id)
        .bind(expected_status.map(|s| s.as_str()))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete_project(&self, id: i64) -> Result<bool> {
        let affected = sqlx::query("DELETE FROM projects WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(affected > 0)
    }

    async fn record_contribution(
        &self,
        project_id: i64,
        user_id: i64,
        amount: i64,
        now: i64,
    ) -> Result<Option<FundingOutcome>> {
        let mut tx = self.pool.begin().await?;

        // Increment and compare in one statement: the CASE reads the
        // pre-update row, and the status guard means only the contribution
        // that crosses the goal can flip the project to FUNDED. The headroom
        // guard keeps the sum inside INTEGER; past it SQLite widens to REAL.
        let project = sqlx::query_as::<_, Project>(&format!(
            r#"
            UPDATE projects
            SET    current_funding = current_funding + ?1,
                   status = CASE
                                WHEN current_funding + ?1 >= funding_goal THEN 'FUNDED'
                                ELSE status
                            END,
                   updated_at = ?2
            WHERE  id = ?3
              AND  status = 'ACTIVE'
              AND  current_funding <= 9223372036854775807 - ?1
            RETURNING {PROJECT_COLUMNS}
            "#
        ))
        .bind(amount)
        .bind(now)
        .bind(project_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(project) = project else {
            tx.rollback().await?;
            return Ok(None);
        };

        let contribution = sqlx::query_as::<_, Contribution>(
            r#"
            INSERT INTO contributions (project_id, user_id, amount, created_at)
            VALUES (?1, ?2, ?3, ?4)
            RETURNING id, project_id, user_id, amount, created_at
            "#,
        )
        .bind(project_id)
        .bind(user_id)
        .bind(amount)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(FundingOutcome {
            contribution,
            project,
        }))
    }

    async fn contributions_for_project(
        &self,
        project_id: i64,
    ) -> Result<Vec<ContributionWithUser>> {
        let rows = sqlx::query_as::<_, ContributionWithUser>(
            r#"
            SELECT c.id, c.project_id, c.user_id, c.amount, c.created_at,
                   u.name AS user_name, u.address AS user_address
            FROM   contributions c
            JOIN   users u ON u.id = c.user_id
            WHERE  c.project_id = ?1
            ORDER  BY c.id ASC
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn publish_output(&self, output: NewOutput, now: i64) -> Result<ResearchOutput> {
        let mut tx = self.pool.begin().await?;

        let completed = sqlx::query(
            "UPDATE projects SET status = 'COMPLETED', updated_at = ?1 WHERE id = ?2",
        )
        .bind(now)
        .bind(output.project_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if completed == 0 {
            tx.rollback().await?;
            return Err(ServiceError::NotFound("Project not found".to_string()));
        }

        let row = sqlx::query_as::<_, ResearchOutput>(
            r#"
            INSERT INTO research_outputs
                (project_id, researcher_id, title, description, content_hash, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            RETURNING id, project_id, researcher_id, title, description, content_hash, created_at
            "#,
        )
        .bind(output.project_id)
        .bind(output.researcher_id)
        .bind(&output.title)
        .bind(&output.description)
        .bind(&output.content_hash)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row)
    }

    async fn find_output(&self, id: i64) -> Result<Option<ResearchOutput>> {
        let row = sqlx::query_as::<_, ResearchOutput>(
            r#"
            SELECT id, project_id, researcher_id, title, description, content_hash, created_at
            FROM   research_outputs
            WHERE  id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn outputs_for_project(&self, project_id: i64) -> Result<Vec<ResearchOutput>> {
        let rows = sqlx::query_as::<_, ResearchOutput>(
            r#"
            SELECT id, project_id, researcher_id, title, description, content_hash, created_at
            FROM   research_outputs
            WHERE  project_id = ?1
            ORDER  BY id ASC
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn find_output_token(&self, output_id: i64) -> Result<Option<OutputToken>> {
        let row = sqlx::query_as::<_, OutputToken>(
            "SELECT output_id, token_id, created_at FROM output_tokens WHERE output_id = ?1",
        )
        .bind(output_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn link_output_token(
        &self,
        output_id: i64,
        token_id: i64,
        now: i64,
    ) -> Result<OutputToken> {
        let result = sqlx::query_as::<_, OutputToken>(
            r#"
            INSERT INTO output_tokens (output_id, token_id, created_at)
            VALUES (?1, ?2, ?3)
            RETURNING output_id, token_id, created_at
            "#,
        )
        .bind(output_id)
        .bind(token_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => Ok(row),
            Err(e) if is_unique_violation(&e) => Err(ServiceError::Conflict(
                "Research output already has a token".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_review(&self, output_id: i64, reviewer_id: i64) -> Result<Option<Review>> {
        let row = sqlx::query_as::<_, Review>(
            r#"
            SELECT id, output_id, reviewer_id, rating, comment, created_at
            FROM   reviews
            WHERE  output_id = ?1 AND reviewer_id = ?2
            "#,
        )
        .bind(output_id)
        .bind(reviewer_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn insert_review(&self, review: NewReview, now: i64) -> Result<Review> {
        let result = sqlx::query_as::<_, Review>(
            r#"
            INSERT INTO reviews (output_id, reviewer_id, rating, comment, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            RETURNING id, output_id, reviewer_id, rating, comment, created_at
            "#,
        )
        .bind(review.output_id)
        .bind(review.reviewer_id)
        .bind(review.rating)
        .bind(&review.comment)
        .bind(now)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => Ok(row),
            Err(e) if is_unique_violation(&e) => Err(ServiceError::Conflict(
                "You have already reviewed this research output".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn reviews_for_output(&self, output_id: i64) -> Result<Vec<ReviewWithReviewer>> {
        let rows = sqlx::query_as::<_, ReviewWithReviewer>(
            r#"
            SELECT r.id, r.output_id, r.reviewer_id, r.rating, r.comment, r.created_at,
                   u.name AS reviewer_name, u.avatar AS reviewer_avatar
            FROM   reviews r
            JOIN   users u ON u.id = r.reviewer_id
            WHERE  r.output_id = ?1
            ORDER  BY r.created_at DESC, r.id DESC
            "#,
        )
        .bind(output_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn reviews_for_project(&self, project_id: i64) -> Result<Vec<ReviewWithReviewer>> {
        let rows = sqlx::query_as::<_, ReviewWithReviewer>(
            r#"
            SELECT r.id, r.output_id, r.reviewer_id, r.rating, r.comment, r.created_at,
                   u.name AS reviewer_name, u.avatar AS reviewer_avatar
            FROM   reviews r
            JOIN   research_outputs o ON o.id = r.output_id
            JOIN   users u            ON u.id = r.reviewer_id
            WHERE  o.project_id = ?1
            ORDER  BY r.created_at DESC, r.id DESC
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn insert_reward_distribution(
        &self,
        output_id: i64,
        amount: i64,
        now: i64,
    ) -> Result<RewardDistribution> {
        let result = sqlx::query_as::<_, RewardDistribution>(
            r#"
            INSERT INTO reward_distributions (output_id, amount, status, created_at)
            VALUES (?1, ?2, 'PENDING', ?3)
            RETURNING id, output_id, amount, status, created_at
            "#,
        )
        .bind(output_id)
        .bind(amount)
        .bind(now)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => Ok(row),
            Err(e) if is_unique_violation(&e) => Err(ServiceError::InvalidState(
                "Rewards have already been distributed".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn distributions_for_output(&self, output_id: i64) -> Result<Vec<RewardDistribution>> {
        let rows = sqlx::query_as::<_, RewardDistribution>(
            r#"
            SELECT id, output_id, amount, status, created_at
            FROM   reward_distributions
            WHERE  output_id = ?1
            ORDER  BY id ASC
            "#,
        )
        .bind(output_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

// ─────────────────────────────────────────────────────────
// Indexer cursor helpers
// ─────────────────────────────────────────────────────────

/// Read the last-seen ledger from the cursor row.
/// Returns `0` when no cursor has been persisted yet.
pub async fn get_last_ledger(pool: &SqlitePool) -> Result<i64> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT last_ledger FROM indexer_cursor WHERE id = 1")
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|(v,)| v).unwrap_or(0))
}

/// Persist the last-seen ledger (and optionally a pagination cursor string).
pub async fn save_cursor(
    pool: &SqlitePool,
    last_ledger: i64,
    last_cursor: Option<&str>,
) -> Result<()> {
    sqlx::query("UPDATE indexer_cursor SET last_ledger = ?1, last_cursor = ?2 WHERE id = 1")
        .bind(last_ledger)
        .bind(last_cursor)
        .execute(pool)
        .await?;
    Ok(())
}

/// Read back the raw cursor string (used to resume pagination mid-ledger).
pub async fn get_cursor_string(pool: &SqlitePool) -> Result<Option<String>> {
    let row: Option<(Option<String>,)> =
        sqlx::query_as("SELECT last_cursor FROM indexer_cursor WHERE id = 1")
            .fetch_optional(pool)
            .await?;
    Ok(row.and_then(|(v,)| v))
}

// ─────────────────────────────────────────────────────────
// Chain events
// ─────────────────────────────────────────────────────────

/// Persist a batch of decoded events. Duplicates of an already stored
/// `(ledger, tx_hash, event_type, project_id, token_id)` are ignored, which
/// makes re-polling a ledger range harmless.
pub async fn insert_chain_events(pool: &SqlitePool, events: &[ChainEvent]) -> Result<usize> {
    let mut count = 0usize;
    for ev in events {
        let rows_affected = sqlx::query(
            r#"
            INSERT OR IGNORE INTO chain_events
                (event_type, project_id, actor, amount, token_id, content_hash,
                 ledger, timestamp, contract_id, tx_hash)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&ev.event_type)
        .bind(&ev.project_id)
        .bind(&ev.actor)
        .bind(&ev.amount)
        .bind(ev.token_id)
        .bind(&ev.content_hash)
        .bind(ev.ledger)
        .bind(ev.timestamp)
        .bind(&ev.contract_id)
        .bind(&ev.tx_hash)
        .execute(pool)
        .await?
        .rows_affected();

        count += rows_affected as usize;
    }
    Ok(count)
}

/// Whether a `rewards_distributed` event has been indexed for `token_id`.
pub async fn rewards_event_exists(pool: &SqlitePool, token_id: i64) -> Result<bool> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM chain_events WHERE event_type = 'rewards_distributed' AND token_id = ?1",
    )
    .bind(token_id)
    .fetch_one(pool)
    .await?;
    Ok(row.0 > 0)
}

/// Link a freshly minted token to the newest research output carrying the
/// same content hash. Returns `false` when no output matched or a link
/// already exists.
pub async fn link_token_by_content_hash(
    pool: &SqlitePool,
    content_hash: &str,
    token_id: i64,
    now: i64,
) -> Result<bool> {
    let affected = sqlx::query(
        r#"
        INSERT OR IGNORE INTO output_tokens (output_id, token_id, created_at)
        SELECT id, ?2, ?3
        FROM   research_outputs
        WHERE  content_hash = ?1
        ORDER  BY id DESC
        LIMIT  1
        "#,
    )
    .bind(content_hash)
    .bind(token_id)
    .bind(now)
    .execute(pool)
    .await?
    .rows_affected();
    Ok(affected > 0)
}
