//! City Fix Backend
//!
//! REST backend for a civic issue tracker: citizens report issues, admins review and
//! dispatch them to field staff, staff work them to resolution. SQLite persistence and
//! Tantivy full-text search over approved issues.

mod api;
mod auth;
mod config;
mod db;
mod errors;
mod lifecycle;
mod models;
mod quota;
mod search;
mod tracking;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, patch},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use auth::{IdentityVerifier, JwtVerifier, RoleGate};
use config::{Config, LogFormat};
use db::Repository;
use models::Membership;
use search::SearchIndex;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub gate: RoleGate,
    pub search: Arc<SearchIndex>,
    pub config: Arc<Config>,
    pub verifier: Arc<dyn IdentityVerifier>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let (pretty_layer, json_layer) = match config.log_format {
        LogFormat::Pretty => (Some(fmt::layer()), None),
        LogFormat::Json => (None, Some(fmt::layer().json())),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(pretty_layer)
        .with(json_layer)
        .init();

    tracing::info!("Starting City Fix Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Index path: {:?}", config.index_path);
    tracing::info!("Bind address: {}", config.bind_addr);
    tracing::info!(
        free = ?config.quota.limit(Membership::Free),
        standard = ?config.quota.limit(Membership::Standard),
        "Post quota"
    );

    // Initialize database
    let pool = db::init_database(&config.db_path, config.db_max_connections).await?;
    let repo = Arc::new(Repository::new(pool));

    // Initialize search index
    let search = Arc::new(SearchIndex::open(&config.index_path)?);

    // Build initial search index from database
    tracing::info!("Building search index...");
    let issues = repo.list_public_issues(None, None).await?;
    search.rebuild(&issues).await?;
    tracing::info!("Search index built with {} issues", issues.len());

    let verifier: Arc<dyn IdentityVerifier> = Arc::new(JwtVerifier::from_config(&config));

    // Create application state
    let state = AppState {
        gate: RoleGate::new(repo.clone()),
        repo,
        search,
        config: Arc::new(config.clone()),
        verifier,
    };

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let verifier = state.verifier.clone();
    let verify_timeout = state.config.verify_timeout;

    // Routes that require a verified identity
    let protected_routes = Router::new()
        // Issues
        .route("/issues", get(api::list_issues).post(api::create_issue))
        .route("/issues/{id}", get(api::get_issue).delete(api::delete_issue))
        .route("/issue-edit/{id}", patch(api::edit_issue))
        .route("/issues/upvote/{id}", patch(api::upvote_issue))
        .route("/issues/assigned/{email}", get(api::list_assigned_issues))
        .route("/track-issue", get(api::track_issues))
        // Lifecycle
        .route("/issues/approve/{id}", patch(api::approve_issue))
        .route("/issues/reject/{id}", patch(api::reject_issue))
        .route("/issues/assign/{id}", patch(api::assign_staff))
        .route("/accept-issu/{id}", patch(api::accept_issue))
        .route("/resolved-issu/{id}", patch(api::resolve_issue))
        // Users
        .route("/user", get(api::list_users).post(api::login_user))
        .route("/user/{id}", delete(api::delete_user))
        .route("/user/role/{email}", get(api::get_user_role))
        .route("/users/{email}", patch(api::update_user))
        .route("/users/usage/{email}", get(api::get_usage))
        // Staff
        .route("/staff", get(api::list_staff).post(api::apply_staff))
        .route(
            "/staff/{id}",
            get(api::get_staff_by_email)
                .patch(api::update_staff)
                .delete(api::delete_staff),
        )
        .route("/approve-staff", get(api::list_approved_staff))
        .route("/staff-approve/{id}", patch(api::approve_staff))
        .route_layer(middleware::from_fn(move |req, next| {
            auth::bearer_auth_layer(verifier.clone(), verify_timeout, req, next)
        }));

    // Public views (no auth required)
    let public_routes = Router::new()
        .route("/approve-issues", get(api::list_public_issues))
        .route("/approve-issues/{id}", get(api::get_public_issue))
        .route("/resolved-issue", get(api::list_resolved_issues))
        .route("/search", get(api::search_issues))
        .route("/health", get(health_check));

    Router::new()
        .merge(protected_routes)
        .merge(public_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(state.config.request_timeout))
                .layer(cors),
        )
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests;
