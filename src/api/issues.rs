//! Issue API endpoints: submission, editing, voting and read views.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;

use super::{require_text, success, ApiResult};
use crate::auth::Identity;
use crate::errors::AppError;
use crate::models::{
    CreateIssueRequest, Issue, IssueStatus, PublicIssueFilter, Role, UpdateIssueRequest,
    UpvoteOutcome, Workflow,
};
use crate::AppState;

/// `?email=` filter used by the owner-scoped listings.
#[derive(Debug, Default, Deserialize)]
pub struct EmailQuery {
    #[serde(default)]
    pub email: Option<String>,
}

/// POST /issues - Submit an issue, charged against the caller's quota.
pub async fn create_issue(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<CreateIssueRequest>,
) -> ApiResult<Issue> {
    require_text(&[
        ("issueName", Some(request.issue_name.as_str())),
        ("description", Some(request.description.as_str())),
        ("category", Some(request.category.as_str())),
    ])?;

    let issue = state
        .repo
        .create_issue(&identity.email, &request, &state.config.quota)
        .await?;
    success(issue)
}

/// GET /issues - The caller's issues, a given reporter's issues, or (admin) all.
pub async fn list_issues(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<EmailQuery>,
) -> ApiResult<Vec<Issue>> {
    let issues = match query.email {
        Some(email) => {
            let email = email.to_ascii_lowercase();
            state.gate.require_self_or_admin(&identity, &email).await?;
            state.repo.list_issues(Some(&email)).await?
        }
        None => match state.gate.role_of(&identity).await? {
            Some(Role::Admin) => state.repo.list_issues(None).await?,
            _ => state.repo.list_issues(Some(identity.email.as_str())).await?,
        },
    };
    success(issues)
}

/// GET /issues/{id} - Approved issues are visible to everyone signed in;
/// others only to their reporter, the assigned staff member and admins.
pub async fn get_issue(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> ApiResult<Issue> {
    let issue = state
        .repo
        .get_issue(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Issue {} not found", id)))?;

    let involved = issue.email == identity.email
        || issue
            .assigned_staff
            .as_ref()
            .is_some_and(|staff| staff.email == identity.email);
    if issue.status != IssueStatus::Approved && !involved {
        state.gate.require_admin(&identity).await?;
    }

    success(issue)
}

/// PATCH /issue-edit/{id} - Reporter edits a pending issue.
pub async fn edit_issue(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    Json(request): Json<UpdateIssueRequest>,
) -> ApiResult<Issue> {
    require_text(&[
        ("issueName", request.issue_name.as_deref()),
        ("description", request.description.as_deref()),
        ("category", request.category.as_deref()),
    ])?;

    let issue = state
        .repo
        .edit_issue(&id, &identity.email, &request)
        .await?;
    success(issue)
}

/// DELETE /issues/{id} - Admin removes an issue.
pub async fn delete_issue(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    state.gate.require_admin(&identity).await?;
    state.repo.delete_issue(&id).await?;

    if let Err(e) = state.search.remove_issue(&id).await {
        tracing::warn!("Failed to remove issue from index: {}", e);
    }

    success(())
}

/// PATCH /issues/upvote/{id} - Toggle the caller's upvote.
pub async fn upvote_issue(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> ApiResult<UpvoteOutcome> {
    let outcome = state.repo.toggle_upvote(&id, &identity.email).await?;
    success(outcome)
}

/// GET /approve-issues - Public listing of approved issues.
pub async fn list_public_issues(
    State(state): State<AppState>,
    Query(filter): Query<PublicIssueFilter>,
) -> ApiResult<Vec<Issue>> {
    let workflow = filter
        .workflow
        .as_deref()
        .map(|w| {
            Workflow::parse(w)
                .ok_or_else(|| AppError::Validation(format!("Unknown workflow '{}'", w)))
        })
        .transpose()?;

    let issues = state
        .repo
        .list_public_issues(filter.category.as_deref(), workflow)
        .await?;
    success(issues)
}

/// GET /approve-issues/{id} - Public detail view of an approved issue.
pub async fn get_public_issue(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Issue> {
    let issue = state
        .repo
        .get_public_issue(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Issue {} not found", id)))?;
    success(issue)
}

/// GET /resolved-issue - Public listing of resolved issues.
pub async fn list_resolved_issues(State(state): State<AppState>) -> ApiResult<Vec<Issue>> {
    success(state.repo.list_resolved_issues().await?)
}

/// GET /track-issue - A reporter's approved issues with their tracking ids.
pub async fn track_issues(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<EmailQuery>,
) -> ApiResult<Vec<Issue>> {
    let email = query
        .email
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_else(|| identity.email.clone());
    state.gate.require_self_or_admin(&identity, &email).await?;

    success(state.repo.list_tracked_issues(&email).await?)
}

/// GET /issues/assigned/{email} - Issues bound to a staff member.
pub async fn list_assigned_issues(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(email): Path<String>,
) -> ApiResult<Vec<Issue>> {
    let email = email.to_ascii_lowercase();
    state.gate.require_self_or_admin(&identity, &email).await?;

    success(state.repo.list_assigned_issues(&email).await?)
}
