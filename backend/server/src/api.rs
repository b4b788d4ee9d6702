//! Axum REST API handlers.

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Path, Query, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::auth::{is_valid_address, sign_in_message, Identity};
use crate::content::{gateway_url, ContentMetadata};
use crate::engine::{CreateProject, PublishOutput};
use crate::errors::ServiceError;
use crate::models::{
    Category, FundingOutcome, OutputDetail, OutputToken, Project, ProjectDetail, ProjectFilter,
    ProjectListing, ProjectSort, ProjectUpdate, ResearchOutput, Review, RewardDistribution,
    RewardOverview, User,
};
use crate::AppState;

type ApiResult<T> = Result<Json<T>, ServiceError>;

// ─────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServiceError::Validation(_)
            | ServiceError::Conflict(_)
            | ServiceError::InvalidState(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = if self.is_client_error() {
            self.to_string()
        } else {
            error!("Request failed: {self}");
            "Internal server error".to_string()
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

/// `Json` whose rejections use the `{error}` body and a 400 status.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ServiceError::Validation(rejection.body_text()))?;
        Ok(Self(value))
    }
}

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct ListProjectsQuery {
    pub category: Option<String>,
    pub status: Option<String>,
    pub sort: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundRequest {
    pub amount: i64,
    pub user_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub rating: i64,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Deserialize)]
pub struct RewardRequest {
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    pub token_id: i64,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub address: String,
    pub signature: String,
}

#[derive(Serialize)]
pub struct SignInResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    pub document: Value,
    pub metadata: Option<ContentMetadata>,
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub hash: String,
    pub url: String,
}

// ─────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/categories", get(list_categories))
        .route("/projects", get(list_projects).post(create_project))
        .route(
            "/projects/:id",
            get(get_project).put(update_project).delete(delete_project),
        )
        .route("/projects/:id/fund", post(fund_project))
        .route("/projects/:id/output", post(publish_output))
        .route("/projects/:id/output/:output_id", get(get_output))
        .route("/projects/:id/output/:output_id/review", post(submit_review))
        .route(
            "/projects/:id/output/:output_id/rewards",
            get(get_rewards).post(distribute_rewards),
        )
        .route("/projects/:id/output/:output_id/token", post(register_token))
        .route("/auth/message/:address", get(auth_message))
        .route("/auth/signin", post(sign_in))
        .route("/auth/session", get(session))
        .route("/content", post(upload_content))
        .route("/content/:hash", get(get_content))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /categories`
pub async fn list_categories(State(state): State<AppState>) -> ApiResult<Vec<Category>> {
    Ok(Json(state.engine.list_categories().await?))
}

/// `GET /projects?category&status&sort`
///
/// `status=all` is the same as no status filter.
pub async fn list_projects(
    State(state): State<AppState>,
    Query(query): Query<ListProjectsQuery>,
) -> ApiResult<Vec<ProjectListing>> {
    let status = match query.status.as_deref() {
        None | Some("") | Some("all") => None,
        Some(s) => Some(s.parse()?),
    };
    let filter = ProjectFilter {
        category: query.category.filter(|c| !c.is_empty() && c != "all"),
        status,
        sort: ProjectSort::from_param(query.sort.as_deref()),
    };
    Ok(Json(state.engine.list_projects(&filter).await?))
}

/// `POST /projects`
pub async fn create_project(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CreateProject>,
) -> ApiResult<Project> {
    Ok(Json(state.engine.create_project(body).await?))
}

/// `GET /projects/:id`
pub async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<ProjectDetail> {
    Ok(Json(state.engine.get_project(id).await?))
}

/// `PUT /projects/:id`
pub async fn update_project(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<i64>,
    ApiJson(body): ApiJson<ProjectUpdate>,
) -> ApiResult<Project> {
    Ok(Json(state.engine.update_project(id, &identity, body).await?))
}

/// `DELETE /projects/:id`
pub async fn delete_project(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<i64>,
) -> Result<StatusCode, ServiceError> {
    state.engine.delete_project(id, &identity).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /projects/:id/fund`
pub async fn fund_project(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(body): ApiJson<FundRequest>,
) -> ApiResult<FundingOutcome> {
    Ok(Json(
        state.engine.contribute(id, body.user_id, body.amount).await?,
    ))
}

/// `POST /projects/:id/output`
pub async fn publish_output(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<i64>,
    ApiJson(body): ApiJson<PublishOutput>,
) -> ApiResult<ResearchOutput> {
    Ok(Json(state.engine.publish_output(id, &identity, body).await?))
}

/// `GET /projects/:id/output/:output_id`
pub async fn get_output(
    State(state): State<AppState>,
    Path((id, output_id)): Path<(i64, i64)>,
) -> ApiResult<OutputDetail> {
    Ok(Json(state.engine.output_detail(id, output_id).await?))
}

/// `POST /projects/:id/output/:output_id/review`
pub async fn submit_review(
    State(state): State<AppState>,
    identity: Identity,
    Path((id, output_id)): Path<(i64, i64)>,
    ApiJson(body): ApiJson<ReviewRequest>,
) -> ApiResult<Review> {
    Ok(Json(
        state
            .engine
            .submit_review(id, output_id, &identity, body.rating, body.comment)
            .await?,
    ))
}

/// `POST /projects/:id/output/:output_id/rewards`
pub async fn distribute_rewards(
    State(state): State<AppState>,
    identity: Identity,
    Path((id, output_id)): Path<(i64, i64)>,
    ApiJson(body): ApiJson<RewardRequest>,
) -> ApiResult<RewardDistribution> {
    Ok(Json(
        state
            .engine
            .distribute_reward(id, output_id, &identity, body.amount)
            .await?,
    ))
}

/// `GET /projects/:id/output/:output_id/rewards`
pub async fn get_rewards(
    State(state): State<AppState>,
    Path((id, output_id)): Path<(i64, i64)>,
) -> ApiResult<RewardOverview> {
    Ok(Json(state.engine.reward_overview(id, output_id).await?))
}

/// `POST /projects/:id/output/:output_id/token`
pub async fn register_token(
    State(state): State<AppState>,
    identity: Identity,
    Path((id, output_id)): Path<(i64, i64)>,
    ApiJson(body): ApiJson<TokenRequest>,
) -> ApiResult<OutputToken> {
    Ok(Json(
        state
            .engine
            .register_output_token(id, output_id, &identity, body.token_id)
            .await?,
    ))
}

/// `GET /auth/message/:address`
pub async fn auth_message(Path(address): Path<String>) -> ApiResult<MessageResponse> {
    if !is_valid_address(&address) {
        return Err(ServiceError::Validation("Invalid address".to_string()));
    }
    Ok(Json(MessageResponse {
        message: sign_in_message(&address),
    }))
}

/// `POST /auth/signin`
pub async fn sign_in(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<SignInRequest>,
) -> ApiResult<SignInResponse> {
    let (token, user) = state.auth.sign_in(&body.address, &body.signature).await?;
    Ok(Json(SignInResponse { token, user }))
}

/// `GET /auth/session`
pub async fn session(State(state): State<AppState>, identity: Identity) -> ApiResult<User> {
    Ok(Json(state.auth.current_user(&identity).await?))
}

/// `POST /content`
pub async fn upload_content(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<UploadRequest>,
) -> ApiResult<UploadResponse> {
    let metadata = body.metadata.unwrap_or_else(|| ContentMetadata {
        name: "document".to_string(),
        description: String::new(),
        version: "1.0".to_string(),
        timestamp: chrono::Utc::now().timestamp(),
    });
    let hash = state.content.put(&body.document, &metadata).await?;
    let url = gateway_url(&state.gateway, &hash);
    Ok(Json(UploadResponse { hash, url }))
}

/// `GET /content/:hash`
pub async fn get_content(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> ApiResult<Value> {
    Ok(Json(state.content.get(&hash).await?))
}
