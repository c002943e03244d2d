//! Database repository for users, staff and issues.
//!
//! Every state change is a single conditional statement or a short transaction
//! whose first statement is a write, so SQLite serializes concurrent writers on
//! the same rows instead of letting read-modify-write cycles interleave.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::errors::AppError;
use crate::lifecycle::{ensure_field_actor, snapshot_for_assignment, IssueState};
use crate::models::{
    AssignState, Availability, CreateIssueRequest, Issue, IssueStatus, LoginOutcome,
    LoginRequest, Membership, Role, Staff, StaffApplication, StaffSnapshot, StaffStatus,
    UpdateIssueRequest, UpdateStaffRequest, UpdateUserRequest, UpvoteOutcome, User, Workflow,
};
use crate::quota::QuotaPolicy;
use crate::tracking;

/// Approval gives up after this many tracking id collisions in a row.
const TRACKING_ID_ATTEMPTS: usize = 5;

const TIERS: [Membership; 3] = [Membership::Free, Membership::Standard, Membership::Premium];

const USER_COLUMNS: &str = "id, email, name, photo_url, role, membership, post_count, created_at, last_logged_in, updated_at";

const STAFF_COLUMNS: &str = "id, email, name, phone, photo_url, district, status, availability, applied_at, approved_at, updated_at";

const ISSUE_SELECT: &str = r#"SELECT id, email, issue_name, description, category, priority,
           division, district, upazila, address, issue_image_url, phone_number,
           status, workflow, assign_state, tracking_id, upvotes, assigned_staff,
           created_at, updated_at, approved_at, rejected_at, accept_at, resolved_at,
           (SELECT json_group_array(v.email) FROM issue_upvotes v WHERE v.issue_id = issues.id) AS upvoted_by
    FROM issues"#;

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ==================== USER OPERATIONS ====================

    /// Create the account on first login; later logins only stamp `last_logged_in`.
    pub async fn login_user(
        &self,
        email: &str,
        request: &LoginRequest,
    ) -> Result<LoginOutcome, AppError> {
        let now = timestamp_now();
        let id = uuid::Uuid::new_v4().to_string();

        let inserted = sqlx::query(
            "INSERT INTO users (id, email, name, photo_url, role, membership, post_count, created_at, last_logged_in) VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?) ON CONFLICT(email) DO NOTHING"
        )
        .bind(&id)
        .bind(email)
        .bind(&request.name)
        .bind(&request.photo_url)
        .bind(Role::User.as_str())
        .bind(Membership::Free.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?
        .rows_affected()
            == 1;

        if !inserted {
            sqlx::query(
                "UPDATE users SET last_logged_in = ?, name = COALESCE(name, ?), photo_url = COALESCE(photo_url, ?) WHERE email = ?"
            )
            .bind(&now)
            .bind(&request.name)
            .bind(&request.photo_url)
            .bind(email)
            .execute(&self.pool)
            .await?;
        }

        let user = self
            .get_user_by_email(email)
            .await?
            .ok_or_else(|| AppError::Internal(format!("User {} vanished after login", email)))?;

        Ok(LoginOutcome {
            created: inserted,
            user,
        })
    }

    /// List all users, newest first.
    pub async fn list_users(&self) -> Result<Vec<User>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM users ORDER BY created_at DESC",
            USER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(user_from_row).collect()
    }

    /// Get a user by email.
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    /// Update profile fields; absent fields keep their value. `post_count` is never touched.
    pub async fn update_user(
        &self,
        email: &str,
        request: &UpdateUserRequest,
    ) -> Result<User, AppError> {
        let now = timestamp_now();

        let result = sqlx::query(
            r#"UPDATE users SET
                name = COALESCE(?, name),
                photo_url = COALESCE(?, photo_url),
                role = COALESCE(?, role),
                membership = COALESCE(?, membership),
                updated_at = ?
            WHERE email = ?"#,
        )
        .bind(&request.name)
        .bind(&request.photo_url)
        .bind(request.role.map(|r| r.as_str()))
        .bind(request.membership.map(|m| m.as_str()))
        .bind(&now)
        .bind(email)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User {} not found", email)));
        }

        self.get_user_by_email(email)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", email)))
    }

    /// Delete a user. Their issues are left untouched.
    pub async fn delete_user(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User {} not found", id)));
        }

        Ok(())
    }

    // ==================== STAFF OPERATIONS ====================

    /// Record a staff application. One application per email.
    pub async fn create_staff(
        &self,
        email: &str,
        application: &StaffApplication,
    ) -> Result<Staff, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = timestamp_now();

        let result = sqlx::query(
            "INSERT INTO staff (id, email, name, phone, photo_url, district, status, availability, applied_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
        )
        .bind(&id)
        .bind(email)
        .bind(&application.name)
        .bind(&application.phone)
        .bind(&application.photo_url)
        .bind(&application.district)
        .bind(StaffStatus::Pending.as_str())
        .bind(Availability::Available.as_str())
        .bind(&now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {}
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(AppError::Conflict(format!(
                    "A staff application for {} already exists",
                    email
                )));
            }
            Err(e) => return Err(e.into()),
        }

        Ok(Staff {
            id,
            name: application.name.clone(),
            email: email.to_string(),
            phone: application.phone.clone(),
            photo_url: application.photo_url.clone(),
            district: application.district.clone(),
            status: StaffStatus::Pending,
            availability: Availability::Available,
            applied_at: now,
            approved_at: None,
            updated_at: None,
        })
    }

    /// List staff records, optionally filtered by status.
    pub async fn list_staff(&self, status: Option<StaffStatus>) -> Result<Vec<Staff>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM staff WHERE (? IS NULL OR status = ?) ORDER BY applied_at DESC",
            STAFF_COLUMNS
        ))
        .bind(status.map(|s| s.as_str()))
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(staff_from_row).collect()
    }

    pub async fn get_staff(&self, id: &str) -> Result<Option<Staff>, AppError> {
        let row = sqlx::query(&format!("SELECT {} FROM staff WHERE id = ?", STAFF_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(staff_from_row).transpose()
    }

    pub async fn get_staff_by_email(&self, email: &str) -> Result<Option<Staff>, AppError> {
        let row = sqlx::query(&format!("SELECT {} FROM staff WHERE email = ?", STAFF_COLUMNS))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(staff_from_row).transpose()
    }

    /// Approve a pending application and promote the linked user to the staff role.
    pub async fn approve_staff(&self, id: &str) -> Result<Staff, AppError> {
        let now = timestamp_now();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE staff SET status = ?, approved_at = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(StaffStatus::Approved.as_str())
        .bind(&now)
        .bind(&now)
        .bind(id)
        .bind(StaffStatus::Pending.as_str())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            drop(tx);
            return match self.get_staff(id).await? {
                Some(_) => Err(AppError::InvalidTransition(format!(
                    "Staff {} is already approved",
                    id
                ))),
                None => Err(AppError::NotFound(format!("Staff {} not found", id))),
            };
        }

        let row = sqlx::query(&format!("SELECT {} FROM staff WHERE id = ?", STAFF_COLUMNS))
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        let staff = staff_from_row(&row)?;

        // Admins keep their role; only plain users are promoted
        let promoted = sqlx::query(
            "UPDATE users SET role = ?, updated_at = ? WHERE email = ? AND role = ?",
        )
        .bind(Role::Staff.as_str())
        .bind(&now)
        .bind(&staff.email)
        .bind(Role::User.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        if promoted.rows_affected() == 0 {
            tracing::info!(staff_id = %staff.id, email = %staff.email, "Approved staff has no plain user account to promote");
        }

        Ok(staff)
    }

    /// Update a staff profile. Issues already assigned keep their snapshot.
    pub async fn update_staff(
        &self,
        id: &str,
        request: &UpdateStaffRequest,
    ) -> Result<Staff, AppError> {
        let now = timestamp_now();

        let result = sqlx::query(
            r#"UPDATE staff SET
                name = COALESCE(?, name),
                phone = COALESCE(?, phone),
                photo_url = COALESCE(?, photo_url),
                district = COALESCE(?, district),
                availability = COALESCE(?, availability),
                updated_at = ?
            WHERE id = ?"#,
        )
        .bind(&request.name)
        .bind(&request.phone)
        .bind(&request.photo_url)
        .bind(&request.district)
        .bind(request.availability.map(|a| a.as_str()))
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Staff {} not found", id)));
        }

        self.get_staff(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Staff {} not found", id)))
    }

    pub async fn delete_staff(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM staff WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Staff {} not found", id)));
        }

        Ok(())
    }

    // ==================== ISSUE QUERIES ====================

    /// List issues, newest first, optionally only those of one reporter.
    pub async fn list_issues(&self, reporter: Option<&str>) -> Result<Vec<Issue>, AppError> {
        let rows = sqlx::query(&format!(
            "{} WHERE (? IS NULL OR email = ?) ORDER BY created_at DESC",
            ISSUE_SELECT
        ))
        .bind(reporter)
        .bind(reporter)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(issue_from_row).collect()
    }

    pub async fn get_issue(&self, id: &str) -> Result<Option<Issue>, AppError> {
        let row = sqlx::query(&format!("{} WHERE id = ?", ISSUE_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(issue_from_row).transpose()
    }

    async fn require_issue(&self, id: &str) -> Result<Issue, AppError> {
        self.get_issue(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Issue {} not found", id)))
    }

    /// Approved issues for the public listing, most upvoted first.
    pub async fn list_public_issues(
        &self,
        category: Option<&str>,
        workflow: Option<Workflow>,
    ) -> Result<Vec<Issue>, AppError> {
        let workflow = workflow.map(|w| w.as_str());
        let rows = sqlx::query(&format!(
            r#"{} WHERE status = ?
                 AND (? IS NULL OR category = ?)
                 AND (? IS NULL OR workflow = ?)
               ORDER BY upvotes DESC, created_at DESC"#,
            ISSUE_SELECT
        ))
        .bind(IssueStatus::Approved.as_str())
        .bind(category)
        .bind(category)
        .bind(workflow)
        .bind(workflow)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(issue_from_row).collect()
    }

    /// A single approved issue; anything else is invisible to the public.
    pub async fn get_public_issue(&self, id: &str) -> Result<Option<Issue>, AppError> {
        Ok(self
            .get_issue(id)
            .await?
            .filter(|issue| issue.status == IssueStatus::Approved))
    }

    pub async fn list_resolved_issues(&self) -> Result<Vec<Issue>, AppError> {
        self.list_public_issues(None, Some(Workflow::Resolved)).await
    }

    /// A reporter's approved issues, for citizen-side tracking.
    pub async fn list_tracked_issues(&self, reporter: &str) -> Result<Vec<Issue>, AppError> {
        let rows = sqlx::query(&format!(
            "{} WHERE email = ? AND status = ? ORDER BY approved_at DESC",
            ISSUE_SELECT
        ))
        .bind(reporter)
        .bind(IssueStatus::Approved.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(issue_from_row).collect()
    }

    /// Issues currently bound to a staff member.
    pub async fn list_assigned_issues(&self, staff_email: &str) -> Result<Vec<Issue>, AppError> {
        let rows = sqlx::query(&format!(
            "{} WHERE assigned_staff_email = ? ORDER BY created_at DESC",
            ISSUE_SELECT
        ))
        .bind(staff_email)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(issue_from_row).collect()
    }

    // ==================== ISSUE LIFECYCLE ====================

    /// Submit an issue, charging it against the reporter's quota.
    ///
    /// The quota guard and the insert share one transaction: a failed insert
    /// rolls the increment back, and a full quota inserts nothing.
    pub async fn create_issue(
        &self,
        reporter: &str,
        request: &CreateIssueRequest,
        quota: &QuotaPolicy,
    ) -> Result<Issue, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = timestamp_now();
        let state = IssueState::submitted();

        let mut tx = self.pool.begin().await?;

        let mut charge = sqlx::query(
            r#"UPDATE users SET post_count = post_count + 1, updated_at = ?
            WHERE email = ? AND (
                   (membership = ? AND (? IS NULL OR post_count < ?))
                OR (membership = ? AND (? IS NULL OR post_count < ?))
                OR (membership = ? AND (? IS NULL OR post_count < ?)))"#,
        )
        .bind(&now)
        .bind(reporter);
        for tier in TIERS {
            let limit = quota.limit(tier).map(i64::from);
            charge = charge.bind(tier.as_str()).bind(limit).bind(limit);
        }

        if charge.execute(&mut *tx).await?.rows_affected() == 0 {
            drop(tx);
            return Err(match self.get_user_by_email(reporter).await? {
                None => AppError::NotFound(format!(
                    "No account for {}; log in before reporting issues",
                    reporter
                )),
                Some(user) => {
                    tracing::info!(reporter, membership = user.membership.as_str(), post_count = user.post_count, "Issue rejected by quota");
                    AppError::QuotaExceeded(format!(
                        "The {} membership allows {} issues; upgrade to report more",
                        user.membership.as_str(),
                        quota.limit(user.membership).unwrap_or_default()
                    ))
                }
            });
        }

        sqlx::query(
            r#"INSERT INTO issues (
                id, email, issue_name, description, category, priority,
                division, district, upazila, address, issue_image_url, phone_number,
                status, workflow, assign_state, upvotes, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?)"#,
        )
        .bind(&id)
        .bind(reporter)
        .bind(&request.issue_name)
        .bind(&request.description)
        .bind(&request.category)
        .bind(&request.priority)
        .bind(&request.division)
        .bind(&request.district)
        .bind(&request.upazila)
        .bind(&request.address)
        .bind(&request.issue_image_url)
        .bind(&request.phone_number)
        .bind(state.status.as_str())
        .bind(state.workflow.as_str())
        .bind(state.assign.as_str())
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(issue_id = %id, reporter, "Issue submitted");

        Ok(Issue {
            id,
            email: reporter.to_string(),
            issue_name: request.issue_name.clone(),
            description: request.description.clone(),
            category: request.category.clone(),
            priority: request.priority.clone(),
            division: request.division.clone(),
            district: request.district.clone(),
            upazila: request.upazila.clone(),
            address: request.address.clone(),
            issue_image_url: request.issue_image_url.clone(),
            phone_number: request.phone_number.clone(),
            status: state.status,
            workflow: state.workflow,
            assign: state.assign,
            tracking_id: None,
            upvotes: 0,
            upvoted_by: Vec::new(),
            assigned_staff: None,
            created_at: now,
            updated_at: None,
            approved_at: None,
            rejected_at: None,
            accept_at: None,
            resolved_at: None,
        })
    }

    /// Edit the content of a pending issue on behalf of its reporter.
    pub async fn edit_issue(
        &self,
        id: &str,
        actor: &str,
        request: &UpdateIssueRequest,
    ) -> Result<Issue, AppError> {
        let existing = self.require_issue(id).await?;

        // Ownership is checked first: strangers get 403 even on approved issues.
        if !existing.email.eq_ignore_ascii_case(actor) {
            return Err(AppError::Forbidden(
                "Only the reporter can edit this issue".to_string(),
            ));
        }
        IssueState::of(&existing).ensure_editable()?;

        let now = timestamp_now();
        let result = sqlx::query(
            r#"UPDATE issues SET
                issue_name = COALESCE(?, issue_name),
                description = COALESCE(?, description),
                category = COALESCE(?, category),
                priority = COALESCE(?, priority),
                division = COALESCE(?, division),
                district = COALESCE(?, district),
                upazila = COALESCE(?, upazila),
                address = COALESCE(?, address),
                issue_image_url = COALESCE(?, issue_image_url),
                phone_number = COALESCE(?, phone_number),
                updated_at = ?
            WHERE id = ? AND status = ?"#,
        )
        .bind(&request.issue_name)
        .bind(&request.description)
        .bind(&request.category)
        .bind(&request.priority)
        .bind(&request.division)
        .bind(&request.district)
        .bind(&request.upazila)
        .bind(&request.address)
        .bind(&request.issue_image_url)
        .bind(&request.phone_number)
        .bind(&now)
        .bind(id)
        .bind(IssueStatus::Pending.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(lost_race(id));
        }

        self.require_issue(id).await
    }

    /// Approve a pending issue and issue its tracking id.
    pub async fn approve_issue(&self, id: &str, tracking_prefix: &str) -> Result<Issue, AppError> {
        self.approve_issue_with(id, |at| tracking::generate(tracking_prefix, at))
            .await
    }

    /// Approve with tracking ids drawn from `next_tracking_id`, retrying on collision.
    pub async fn approve_issue_with<F>(
        &self,
        id: &str,
        mut next_tracking_id: F,
    ) -> Result<Issue, AppError>
    where
        F: FnMut(DateTime<Utc>) -> String,
    {
        let from = IssueState::of(&self.require_issue(id).await?);
        let to = from.approve()?;

        let approved_at = Utc::now();
        let stamp = timestamp(approved_at);

        for attempt in 1..=TRACKING_ID_ATTEMPTS {
            let tracking_id = next_tracking_id(approved_at);

            let result = sqlx::query(
                r#"UPDATE issues SET status = ?, workflow = ?, tracking_id = ?, approved_at = ?, updated_at = ?
                WHERE id = ? AND status = ? AND workflow = ?"#,
            )
            .bind(to.status.as_str())
            .bind(to.workflow.as_str())
            .bind(&tracking_id)
            .bind(&stamp)
            .bind(&stamp)
            .bind(id)
            .bind(from.status.as_str())
            .bind(from.workflow.as_str())
            .execute(&self.pool)
            .await;

            match result {
                Ok(done) if done.rows_affected() == 0 => return Err(lost_race(id)),
                Ok(_) => {
                    tracing::info!(issue_id = id, %tracking_id, "Issue approved");
                    return self.require_issue(id).await;
                }
                Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                    tracing::warn!(
                        issue_id = id,
                        attempt,
                        %tracking_id,
                        "Tracking id collision, retrying"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AppError::Internal(format!(
            "Could not allocate a unique tracking id for issue {}",
            id
        )))
    }

    pub async fn reject_issue(&self, id: &str) -> Result<Issue, AppError> {
        let from = IssueState::of(&self.require_issue(id).await?);
        let to = from.reject()?;

        self.transition(id, from, to, "rejected_at").await?;
        tracing::info!(issue_id = id, "Issue rejected");
        self.require_issue(id).await
    }

    /// Bind an approved, available staff member to an issue.
    pub async fn assign_staff(&self, issue_id: &str, staff_id: &str) -> Result<Issue, AppError> {
        let issue = self.require_issue(issue_id).await?;

        let staff = self
            .get_staff(staff_id)
            .await?
            .ok_or_else(|| AppError::StaffUnavailable(format!("Staff {} not found", staff_id)))?;
        let now = timestamp_now();
        let snapshot = snapshot_for_assignment(&staff, &now)?;

        let from = IssueState::of(&issue);
        let to = from.assign_staff()?;

        let snapshot_json = serde_json::to_string(&snapshot)
            .map_err(|e| AppError::Internal(format!("Failed to encode staff snapshot: {}", e)))?;

        // Staff must still be approved and reachable at write time.
        let result = sqlx::query(
            r#"UPDATE issues SET workflow = ?, assign_state = ?, assigned_staff = ?,
                   assigned_staff_email = ?, updated_at = ?
            WHERE id = ? AND status = ? AND workflow = ? AND assign_state = ?
              AND EXISTS (
                  SELECT 1 FROM staff
                  WHERE id = ? AND status = ? AND availability != ?
              )"#,
        )
        .bind(to.workflow.as_str())
        .bind(to.assign.as_str())
        .bind(&snapshot_json)
        .bind(&snapshot.email)
        .bind(&now)
        .bind(issue_id)
        .bind(from.status.as_str())
        .bind(from.workflow.as_str())
        .bind(from.assign.as_str())
        .bind(staff_id)
        .bind(StaffStatus::Approved.as_str())
        .bind(Availability::NotAvailable.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.get_staff(staff_id).await? {
                Some(staff) if staff.is_assignable() => Err(lost_race(issue_id)),
                _ => Err(AppError::StaffUnavailable(format!(
                    "Staff {} became unavailable",
                    staff_id
                ))),
            };
        }

        tracing::info!(issue_id, staff_id, "Staff assigned");
        self.require_issue(issue_id).await
    }

    /// Assigned staff starts working on the issue.
    pub async fn accept_issue(
        &self,
        id: &str,
        actor: &str,
        actor_role: Role,
    ) -> Result<Issue, AppError> {
        let issue = self.require_issue(id).await?;
        ensure_field_actor(&issue, actor, actor_role)?;

        let from = IssueState::of(&issue);
        let to = from.accept()?;

        self.transition(id, from, to, "accept_at").await?;
        tracing::info!(issue_id = id, actor, "Issue accepted");
        self.require_issue(id).await
    }

    pub async fn resolve_issue(
        &self,
        id: &str,
        actor: &str,
        actor_role: Role,
    ) -> Result<Issue, AppError> {
        let issue = self.require_issue(id).await?;
        ensure_field_actor(&issue, actor, actor_role)?;

        let from = IssueState::of(&issue);
        let to = from.resolve()?;

        self.transition(id, from, to, "resolved_at").await?;
        tracing::info!(issue_id = id, actor, "Issue resolved");
        self.require_issue(id).await
    }

    /// Apply a lifecycle transition only if the issue is still in `from`.
    async fn transition(
        &self,
        id: &str,
        from: IssueState,
        to: IssueState,
        stamp_column: &'static str,
    ) -> Result<(), AppError> {
        let now = timestamp_now();

        let result = sqlx::query(&format!(
            r#"UPDATE issues SET status = ?, workflow = ?, assign_state = ?, {} = ?, updated_at = ?
            WHERE id = ? AND status = ? AND workflow = ? AND assign_state = ?"#,
            stamp_column
        ))
        .bind(to.status.as_str())
        .bind(to.workflow.as_str())
        .bind(to.assign.as_str())
        .bind(&now)
        .bind(&now)
        .bind(id)
        .bind(from.status.as_str())
        .bind(from.workflow.as_str())
        .bind(from.assign.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(lost_race(id));
        }

        Ok(())
    }

    /// Add the voter's upvote, or withdraw it if already present.
    ///
    /// The vote delete runs first so the transaction holds the write lock before
    /// anything is read; `upvotes` is then recomputed from the vote rows, keeping
    /// it equal to the number of voters.
    pub async fn toggle_upvote(&self, id: &str, voter: &str) -> Result<UpvoteOutcome, AppError> {
        let now = timestamp_now();
        let mut tx = self.pool.begin().await?;

        let withdrawn = sqlx::query("DELETE FROM issue_upvotes WHERE issue_id = ? AND email = ?")
            .bind(id)
            .bind(voter)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            > 0;

        let reporter: Option<String> = sqlx::query_scalar("SELECT email FROM issues WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(reporter) = reporter else {
            return Err(AppError::NotFound(format!("Issue {} not found", id)));
        };
        if reporter.eq_ignore_ascii_case(voter) {
            return Err(AppError::Forbidden(
                "You cannot upvote your own issue".to_string(),
            ));
        }

        if !withdrawn {
            sqlx::query("INSERT INTO issue_upvotes (issue_id, email, created_at) VALUES (?, ?, ?)")
                .bind(id)
                .bind(voter)
                .bind(&now)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            "UPDATE issues SET upvotes = (SELECT COUNT(*) FROM issue_upvotes WHERE issue_id = ?) WHERE id = ?",
        )
        .bind(id)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let upvotes: i64 = sqlx::query_scalar("SELECT upvotes FROM issues WHERE id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::debug!(issue_id = id, voter, upvoted = !withdrawn, upvotes, "Upvote toggled");

        Ok(UpvoteOutcome {
            upvoted: !withdrawn,
            upvotes,
        })
    }

    /// Remove an issue and its votes.
    pub async fn delete_issue(&self, id: &str) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM issues WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Issue {} not found", id)));
        }

        sqlx::query("DELETE FROM issue_upvotes WHERE issue_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(issue_id = id, "Issue deleted");
        Ok(())
    }
}

// Helper functions for timestamps and row conversion

/// RFC 3339 in UTC with fixed precision, so stored timestamps sort as text.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn timestamp_now() -> String {
    timestamp(Utc::now())
}

fn lost_race(id: &str) -> AppError {
    AppError::InvalidTransition(format!("Issue {} changed state concurrently", id))
}

fn parse_column<T>(
    row: &SqliteRow,
    column: &str,
    parse: fn(&str) -> Option<T>,
) -> Result<T, AppError> {
    let raw: String = row.get(column);
    parse(&raw).ok_or_else(|| {
        AppError::Internal(format!("Unknown {} value '{}' in storage", column, raw))
    })
}

fn user_from_row(row: &SqliteRow) -> Result<User, AppError> {
    Ok(User {
        id: row.get("id"),
        email: row.get("email"),
        name: row.get("name"),
        photo_url: row.get("photo_url"),
        role: parse_column(row, "role", Role::parse)?,
        membership: parse_column(row, "membership", Membership::parse)?,
        post_count: row.get("post_count"),
        created_at: row.get("created_at"),
        last_logged_in: row.get("last_logged_in"),
        updated_at: row.get("updated_at"),
    })
}

fn staff_from_row(row: &SqliteRow) -> Result<Staff, AppError> {
    Ok(Staff {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        phone: row.get("phone"),
        photo_url: row.get("photo_url"),
        district: row.get("district"),
        status: parse_column(row, "status", StaffStatus::parse)?,
        availability: parse_column(row, "availability", Availability::parse)?,
        applied_at: row.get("applied_at"),
        approved_at: row.get("approved_at"),
        updated_at: row.get("updated_at"),
    })
}

fn issue_from_row(row: &SqliteRow) -> Result<Issue, AppError> {
    let assigned_staff: Option<String> = row.get("assigned_staff");
    let assigned_staff = assigned_staff
        .map(|s| serde_json::from_str::<StaffSnapshot>(&s))
        .transpose()
        .map_err(|e| AppError::Internal(format!("Corrupt staff snapshot: {}", e)))?;
    let upvoted_by: Option<String> = row.get("upvoted_by");

    Ok(Issue {
        id: row.get("id"),
        email: row.get("email"),
        issue_name: row.get("issue_name"),
        description: row.get("description"),
        category: row.get("category"),
        priority: row.get("priority"),
        division: row.get("division"),
        district: row.get("district"),
        upazila: row.get("upazila"),
        address: row.get("address"),
        issue_image_url: row.get("issue_image_url"),
        phone_number: row.get("phone_number"),
        status: parse_column(row, "status", IssueStatus::parse)?,
        workflow: parse_column(row, "workflow", Workflow::parse)?,
        assign: parse_column(row, "assign_state", AssignState::parse)?,
        tracking_id: row.get("tracking_id"),
        upvotes: row.get("upvotes"),
        upvoted_by: upvoted_by.map(|s| parse_json_array(&s)).unwrap_or_default(),
        assigned_staff,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        approved_at: row.get("approved_at"),
        rejected_at: row.get("rejected_at"),
        accept_at: row.get("accept_at"),
        resolved_at: row.get("resolved_at"),
    })
}

fn parse_json_array(s: &str) -> Vec<String> {
    serde_json::from_str(s).unwrap_or_default()
}
