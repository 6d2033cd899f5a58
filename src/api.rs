//! HTTP API server
//!
//! Thin routing layer over the domain services: requests are validated into
//! typed arguments, domain results and failures serialize straight back.
//! Credentials travel as `Auth-Id` / `Auth-Password` headers.

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::Json,
    routing::{delete, get, patch, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::pagination::{Page, PageRequest};
use crate::service::accounts::{AccountRecord, AccountService, FeedItem, FollowOutcome};
use crate::service::analytics::{AnalyticsService, CaloriePair, ComplexityEntry, FollowRatio};
use crate::service::auth::{AuthInfo, CredentialStore, Gender, RegisterRequest};
use crate::service::recipes::{RecipeDraft, RecipeRecord, RecipeService, SearchFilter};
use crate::service::reviews::{RatingSummary, ReviewRecord, ReviewService};

/// Shared application state
pub struct AppState {
    pub credentials: CredentialStore,
    pub accounts: AccountService,
    pub recipes: RecipeService,
    pub reviews: ReviewService,
    pub analytics: AnalyticsService,
}

impl AppState {
    pub fn new(pool: PgPool) -> Self {
        let credentials = CredentialStore::new(pool.clone());
        Self {
            accounts: AccountService::new(pool.clone(), credentials.clone()),
            recipes: RecipeService::new(pool.clone(), credentials.clone()),
            reviews: ReviewService::new(pool.clone(), credentials.clone()),
            analytics: AnalyticsService::new(pool),
            credentials,
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Deserialize)]
pub struct PageParams {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_size")]
    pub size: i64,
    pub sort: Option<String>,
}

fn default_page() -> i64 {
    1
}

fn default_size() -> i64 {
    10
}

impl PageParams {
    fn request(&self) -> PageRequest {
        PageRequest::new(self.page, self.size)
    }
}

#[derive(Debug, Deserialize)]
pub struct FeedParams {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_size")]
    pub size: i64,
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub keyword: Option<String>,
    pub category: Option<String>,
    pub min_rating: Option<f64>,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_size")]
    pub size: i64,
    pub sort: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteAccountParams {
    pub target_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct ProfileParams {
    pub gender: Option<Gender>,
    pub age: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct TimesParams {
    pub cook_time: Option<String>,
    pub prep_time: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewParams {
    pub recipe_id: i64,
    pub rating: i32,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRefParams {
    pub recipe_id: i64,
}

/// Build the application router.
pub fn router(state: Arc<AppState>, cors_enabled: bool) -> Router {
    let mut app = Router::new()
        .route("/health", get(health_check))
        // Accounts and follow graph
        .route("/api/account/register", post(register))
        .route("/api/account/login", post(login))
        .route("/api/account/feed", get(feed))
        .route("/api/account/analytics/ratio", get(highest_follow_ratio))
        .route("/api/account/profile", put(update_profile))
        .route("/api/account/follow/:blogger_id", post(follow))
        .route("/api/account/:id", get(get_account))
        .route("/api/account", delete(delete_account))
        // Recipe catalog
        .route("/api/recipe", post(create_recipe))
        .route("/api/recipe/search", get(search_recipes))
        .route("/api/recipe/analytics/calories", get(closest_calorie_pair))
        .route("/api/recipe/analytics/complexity", get(top_complex_recipes))
        .route("/api/recipe/:id", get(get_recipe).delete(delete_recipe))
        .route("/api/recipe/:id/time", patch(update_times))
        // Reviews
        .route("/api/review", post(add_review))
        .route("/api/review/recipe/:recipe_id", get(list_reviews))
        .route("/api/review/refresh/:recipe_id", post(refresh_rating))
        .route("/api/review/:id", put(edit_review).delete(delete_review))
        .route("/api/review/:id/like", post(like_review))
        .route("/api/review/:id/unlike", post(unlike_review))
        .with_state(state);

    if cors_enabled {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    app
}

/// Bind and serve until a shutdown signal arrives.
pub async fn start_server(pool: PgPool, config: &ApiConfig) -> anyhow::Result<()> {
    let state = Arc::new(AppState::new(pool));
    let app = router(state, config.cors_enabled);

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

/// Extract credentials from the auth headers.
fn require_auth(headers: &HeaderMap) -> Result<AuthInfo> {
    let account_id = headers
        .get("Auth-Id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .ok_or(Error::Unauthenticated)?;
    let password = headers
        .get("Auth-Password")
        .and_then(|v| v.to_str().ok())
        .ok_or(Error::Unauthenticated)?
        .to_string();
    Ok(AuthInfo {
        account_id,
        password,
    })
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<i64>> {
    Ok(Json(state.credentials.register(&req).await?))
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(auth): Json<AuthInfo>,
) -> Result<Json<i64>> {
    Ok(Json(state.credentials.authenticate(&auth).await?))
}

async fn get_account(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<AccountRecord>> {
    Ok(Json(state.accounts.get_account(id).await?))
}

async fn delete_account(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<DeleteAccountParams>,
) -> Result<Json<bool>> {
    let auth = require_auth(&headers)?;
    Ok(Json(
        state
            .accounts
            .delete_account(&auth, params.target_id)
            .await?,
    ))
}

async fn update_profile(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<ProfileParams>,
) -> Result<()> {
    let auth = require_auth(&headers)?;
    state
        .accounts
        .update_profile(&auth, params.gender, params.age)
        .await
}

async fn follow(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(blogger_id): Path<i64>,
) -> Result<Json<FollowOutcome>> {
    let auth = require_auth(&headers)?;
    Ok(Json(state.accounts.follow(&auth, blogger_id).await?))
}

async fn feed(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<FeedParams>,
) -> Result<Json<Page<FeedItem>>> {
    let auth = require_auth(&headers)?;
    let page = state
        .accounts
        .feed(
            &auth,
            PageRequest::new(params.page, params.size),
            params.category.as_deref(),
        )
        .await?;
    Ok(Json(page))
}

async fn highest_follow_ratio(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Option<FollowRatio>>> {
    Ok(Json(state.analytics.highest_follow_ratio().await?))
}

async fn create_recipe(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(draft): Json<RecipeDraft>,
) -> Result<Json<i64>> {
    let auth = require_auth(&headers)?;
    Ok(Json(state.recipes.create(&auth, &draft).await?))
}

async fn get_recipe(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<RecipeRecord>> {
    Ok(Json(state.recipes.get(id).await?))
}

async fn delete_recipe(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<()> {
    let auth = require_auth(&headers)?;
    state.recipes.delete(&auth, id).await
}

async fn update_times(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Query(params): Query<TimesParams>,
) -> Result<()> {
    let auth = require_auth(&headers)?;
    state
        .recipes
        .update_times(
            &auth,
            id,
            params.cook_time.as_deref(),
            params.prep_time.as_deref(),
        )
        .await
}

async fn search_recipes(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Page<RecipeRecord>>> {
    let filter = SearchFilter {
        keyword: params.keyword,
        category: params.category,
        min_rating: params.min_rating,
    };
    let page = state
        .recipes
        .search(
            &filter,
            PageRequest::new(params.page, params.size),
            params.sort.as_deref(),
        )
        .await?;
    Ok(Json(page))
}

async fn closest_calorie_pair(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Option<CaloriePair>>> {
    Ok(Json(state.analytics.closest_calorie_pair().await?))
}

async fn top_complex_recipes(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ComplexityEntry>>> {
    Ok(Json(state.analytics.top_complex_recipes().await?))
}

async fn add_review(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<ReviewParams>,
    text: String,
) -> Result<Json<i64>> {
    let auth = require_auth(&headers)?;
    let id = state
        .reviews
        .add(&auth, params.recipe_id, params.rating, Some(&text))
        .await?;
    Ok(Json(id))
}

async fn edit_review(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Query(params): Query<ReviewParams>,
    text: String,
) -> Result<()> {
    let auth = require_auth(&headers)?;
    state
        .reviews
        .edit(&auth, params.recipe_id, id, params.rating, Some(&text))
        .await
}

async fn delete_review(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Query(params): Query<ReviewRefParams>,
) -> Result<()> {
    let auth = require_auth(&headers)?;
    state.reviews.delete(&auth, params.recipe_id, id).await
}

async fn like_review(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<i64>> {
    let auth = require_auth(&headers)?;
    Ok(Json(state.reviews.like(&auth, id).await?))
}

async fn unlike_review(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<i64>> {
    let auth = require_auth(&headers)?;
    Ok(Json(state.reviews.unlike(&auth, id).await?))
}

async fn list_reviews(
    State(state): State<Arc<AppState>>,
    Path(recipe_id): Path<i64>,
    Query(params): Query<PageParams>,
) -> Result<Json<Page<ReviewRecord>>> {
    let page = state
        .reviews
        .list_by_recipe(recipe_id, params.request(), params.sort.as_deref())
        .await?;
    Ok(Json(page))
}

async fn refresh_rating(
    State(state): State<Arc<AppState>>,
    Path(recipe_id): Path<i64>,
) -> Result<Json<RatingSummary>> {
    Ok(Json(state.reviews.refresh_rating(recipe_id).await?))
}
