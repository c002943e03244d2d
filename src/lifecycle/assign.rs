//! Assignment resolver: decides whether a staff member may take an issue and
//! builds the snapshot that gets embedded into it.

use crate::errors::AppError;
use crate::models::{Staff, StaffSnapshot};

/// Copy the staff identity fields for embedding into an issue.
///
/// Fails with `StaffUnavailable` unless the staff member is approved and not
/// marked `not_available`.
pub fn snapshot_for_assignment(
    staff: &Staff,
    assigned_at: &str,
) -> Result<StaffSnapshot, AppError> {
    if !staff.is_assignable() {
        return Err(AppError::StaffUnavailable(format!(
            "Staff {} is not available for assignment (status {}, availability {})",
            staff.id,
            staff.status.as_str(),
            staff.availability.as_str()
        )));
    }

    Ok(StaffSnapshot {
        staff_id: staff.id.clone(),
        name: staff.name.clone(),
        email: staff.email.clone(),
        phone: staff.phone.clone(),
        photo: staff.photo_url.clone(),
        assigned_at: assigned_at.to_string(),
    })
}
