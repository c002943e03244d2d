//! Issue lifecycle engine.
//!
//! An issue carries two axes of state: the admin approval `status` and the
//! staff-facing `workflow`, plus the `assign` flag. Transitions are pure functions
//! from one [`IssueState`] to the next; the repository applies them with a
//! conditional update keyed on the state they started from, so a concurrent
//! transition makes the second writer fail instead of overwriting.
//!
//! ```text
//! pending ──approve──▶ approved / in-progress ──assign──▶ assigned
//!    │                                                       │
//!    └──reject──▶ rejected            Working ◀──accept──────┘
//!                                        │
//!                                        └──resolve──▶ resolved
//! ```

mod assign;

pub use assign::*;

use crate::errors::AppError;
use crate::models::{AssignState, Issue, IssueStatus, Role, Workflow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssueState {
    pub status: IssueStatus,
    pub workflow: Workflow,
    pub assign: AssignState,
}

impl IssueState {
    /// State of a freshly submitted issue.
    pub fn submitted() -> Self {
        Self {
            status: IssueStatus::Pending,
            workflow: Workflow::InQueue,
            assign: AssignState::Waiting,
        }
    }

    pub fn of(issue: &Issue) -> Self {
        Self {
            status: issue.status,
            workflow: issue.workflow,
            assign: issue.assign,
        }
    }

    /// Content fields may only change while the issue awaits review.
    pub fn ensure_editable(&self) -> Result<(), AppError> {
        match self.status {
            IssueStatus::Pending => Ok(()),
            IssueStatus::Approved => Err(AppError::InvalidTransition(
                "Approved issues cannot be edited".to_string(),
            )),
            IssueStatus::Rejected => Err(AppError::InvalidTransition(
                "Rejected issues cannot be edited".to_string(),
            )),
        }
    }

    pub fn approve(self) -> Result<Self, AppError> {
        self.require_pending("approved")?;
        Ok(Self {
            status: IssueStatus::Approved,
            workflow: Workflow::InProgress,
            ..self
        })
    }

    pub fn reject(self) -> Result<Self, AppError> {
        self.require_pending("rejected")?;
        Ok(Self {
            status: IssueStatus::Rejected,
            workflow: Workflow::Rejected,
            ..self
        })
    }

    /// Binding (or rebinding) staff is allowed until the work has been accepted.
    pub fn assign_staff(self) -> Result<Self, AppError> {
        if self.status != IssueStatus::Approved || self.workflow != Workflow::InProgress {
            return Err(AppError::InvalidTransition(format!(
                "Staff can only be assigned to approved issues awaiting work (status {}, workflow {})",
                self.status.as_str(),
                self.workflow.as_str()
            )));
        }
        Ok(Self {
            workflow: Workflow::InProgress,
            assign: AssignState::Assigned,
            ..self
        })
    }

    pub fn accept(self) -> Result<Self, AppError> {
        if self.status != IssueStatus::Approved
            || self.workflow != Workflow::InProgress
            || self.assign != AssignState::Assigned
        {
            return Err(AppError::InvalidTransition(format!(
                "Only assigned in-progress issues can be accepted (workflow {}, assign {})",
                self.workflow.as_str(),
                self.assign.as_str()
            )));
        }
        Ok(Self {
            workflow: Workflow::Working,
            ..self
        })
    }

    pub fn resolve(self) -> Result<Self, AppError> {
        if self.status != IssueStatus::Approved || self.workflow != Workflow::Working {
            return Err(AppError::InvalidTransition(format!(
                "Only issues being worked on can be resolved (workflow {})",
                self.workflow.as_str()
            )));
        }
        Ok(Self {
            workflow: Workflow::Resolved,
            ..self
        })
    }

    fn require_pending(&self, target: &str) -> Result<(), AppError> {
        if self.status != IssueStatus::Pending {
            return Err(AppError::InvalidTransition(format!(
                "Issue is already {} and cannot be {}",
                self.status.as_str(),
                target
            )));
        }
        Ok(())
    }
}

/// Accept and resolve are reserved for the staff member the issue is bound to,
/// with admins allowed to act on their behalf.
pub fn ensure_field_actor(
    issue: &Issue,
    actor_email: &str,
    actor_role: Role,
) -> Result<(), AppError> {
    if actor_role == Role::Admin {
        return Ok(());
    }
    match &issue.assigned_staff {
        Some(snapshot) if snapshot.email.eq_ignore_ascii_case(actor_email) => Ok(()),
        _ => Err(AppError::Forbidden(
            "Only the assigned staff member can update this issue".to_string(),
        )),
    }
}
