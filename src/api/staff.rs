//! Staff API endpoints.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};

use super::{require_text, success, ApiResult};
use crate::auth::Identity;
use crate::errors::AppError;
use crate::models::{Staff, StaffApplication, StaffFilter, StaffStatus, UpdateStaffRequest};
use crate::AppState;

/// POST /staff - Apply as field staff under the caller's email.
pub async fn apply_staff(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(application): Json<StaffApplication>,
) -> ApiResult<Staff> {
    require_text(&[("name", Some(application.name.as_str()))])?;

    let staff = state
        .repo
        .create_staff(&identity.email, &application)
        .await?;
    tracing::info!(staff_id = %staff.id, email = %staff.email, "Staff application received");
    success(staff)
}

/// GET /staff - All applications, optionally filtered by status.
pub async fn list_staff(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(filter): Query<StaffFilter>,
) -> ApiResult<Vec<Staff>> {
    state.gate.require_admin(&identity).await?;
    success(state.repo.list_staff(filter.status).await?)
}

/// GET /approve-staff - Approved staff, for the assignment picker.
pub async fn list_approved_staff(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Vec<Staff>> {
    state.gate.require_admin(&identity).await?;
    success(state.repo.list_staff(Some(StaffStatus::Approved)).await?)
}

/// PATCH /staff-approve/{id}
pub async fn approve_staff(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> ApiResult<Staff> {
    state.gate.require_admin(&identity).await?;

    let staff = state.repo.approve_staff(&id).await?;
    tracing::info!(staff_id = %staff.id, email = %staff.email, "Staff approved");
    success(staff)
}

/// DELETE /staff/{id}
pub async fn delete_staff(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    state.gate.require_admin(&identity).await?;
    state.repo.delete_staff(&id).await?;
    success(())
}

/// GET /staff/{email} - A staff record by email (own record, or any for admins).
pub async fn get_staff_by_email(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(email): Path<String>,
) -> ApiResult<Staff> {
    let email = email.to_ascii_lowercase();
    state.gate.require_self_or_admin(&identity, &email).await?;

    let staff = state
        .repo
        .get_staff_by_email(&email)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No staff record for {}", email)))?;
    success(staff)
}

/// PATCH /staff/{id} - Staff member (or admin) updates the profile.
pub async fn update_staff(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    Json(request): Json<UpdateStaffRequest>,
) -> ApiResult<Staff> {
    let staff = state
        .repo
        .get_staff(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Staff {} not found", id)))?;
    state
        .gate
        .require_self_or_admin(&identity, &staff.email)
        .await?;
    require_text(&[("name", request.name.as_deref())])?;

    success(state.repo.update_staff(&id, &request).await?)
}
