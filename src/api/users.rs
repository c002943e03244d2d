//! User API endpoints.

use axum::{
    extract::{Path, State},
    Extension, Json,
};

use super::{require_text, success, ApiResult};
use crate::auth::Identity;
use crate::errors::AppError;
use crate::models::{LoginOutcome, LoginRequest, Role, RoleInfo, UpdateUserRequest, User};
use crate::quota::QuotaReport;
use crate::AppState;

/// POST /user - Create the caller's account on first login, stamp later logins.
pub async fn login_user(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    body: Option<Json<LoginRequest>>,
) -> ApiResult<LoginOutcome> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let outcome = state.repo.login_user(&identity.email, &request).await?;

    if outcome.created {
        tracing::info!(email = %identity.email, "Account created");
    }
    success(outcome)
}

/// GET /user - List all users.
pub async fn list_users(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Vec<User>> {
    state.gate.require_admin(&identity).await?;
    success(state.repo.list_users().await?)
}

/// PATCH /users/{email} - Update a profile; role and membership are admin-only.
pub async fn update_user(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(email): Path<String>,
    Json(request): Json<UpdateUserRequest>,
) -> ApiResult<User> {
    let email = email.to_ascii_lowercase();
    let role = state.gate.require_self_or_admin(&identity, &email).await?;

    if request.touches_privileged_fields() && role != Some(Role::Admin) {
        return Err(AppError::Forbidden(
            "Only admins can change role or membership".to_string(),
        ));
    }
    require_text(&[("name", request.name.as_deref())])?;

    success(state.repo.update_user(&email, &request).await?)
}

/// DELETE /user/{id} - Remove an account. Its issues stay.
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let admin = state.gate.require_admin(&identity).await?;
    if admin.id == id {
        return Err(AppError::Validation(
            "Admins cannot delete their own account".to_string(),
        ));
    }

    state.repo.delete_user(&id).await?;
    success(())
}

/// GET /user/role/{email}
pub async fn get_user_role(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> ApiResult<RoleInfo> {
    let email = email.to_ascii_lowercase();
    let user = state
        .repo
        .get_user_by_email(&email)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", email)))?;

    success(RoleInfo { role: user.role })
}

/// GET /users/usage/{email} - Quota report for the caller (or any user, for admins).
pub async fn get_usage(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(email): Path<String>,
) -> ApiResult<QuotaReport> {
    let email = email.to_ascii_lowercase();
    state.gate.require_self_or_admin(&identity, &email).await?;

    let user = state
        .repo
        .get_user_by_email(&email)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", email)))?;

    success(state.config.quota.report(user.membership, user.post_count))
}
