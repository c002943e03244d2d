//! Lifecycle transition endpoints: admin review and staff progress.

use axum::{
    extract::{Path, State},
    Extension, Json,
};

use super::{require_text, success, ApiResult};
use crate::auth::Identity;
use crate::models::{AssignStaffRequest, Issue};
use crate::AppState;

/// PATCH /issues/approve/{id} - Approve a pending issue and issue its tracking id.
pub async fn approve_issue(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> ApiResult<Issue> {
    state.gate.require_admin(&identity).await?;

    let issue = state
        .repo
        .approve_issue(&id, &state.config.tracking_prefix)
        .await?;

    if let Err(e) = state.search.index_issue(&issue).await {
        tracing::warn!("Failed to index issue: {}", e);
    }

    success(issue)
}

/// PATCH /issues/reject/{id} - Reject a pending issue.
pub async fn reject_issue(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> ApiResult<Issue> {
    state.gate.require_admin(&identity).await?;
    success(state.repo.reject_issue(&id).await?)
}

/// PATCH /issues/assign/{issueId} - Bind an available staff member.
pub async fn assign_staff(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(issue_id): Path<String>,
    Json(request): Json<AssignStaffRequest>,
) -> ApiResult<Issue> {
    state.gate.require_admin(&identity).await?;
    require_text(&[("staffId", Some(request.staff_id.as_str()))])?;

    success(state.repo.assign_staff(&issue_id, &request.staff_id).await?)
}

/// PATCH /accept-issu/{id} - Assigned staff starts work.
pub async fn accept_issue(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> ApiResult<Issue> {
    let caller = state.gate.caller(&identity).await?;
    success(
        state
            .repo
            .accept_issue(&id, &caller.email, caller.role)
            .await?,
    )
}

/// PATCH /resolved-issu/{id} - Assigned staff marks the issue resolved.
pub async fn resolve_issue(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> ApiResult<Issue> {
    let caller = state.gate.caller(&identity).await?;
    success(
        state
            .repo
            .resolve_issue(&id, &caller.email, caller.role)
            .await?,
    )
}
