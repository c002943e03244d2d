//! Issue model: a citizen-filed infrastructure report.

use serde::{Deserialize, Serialize};

/// Admin approval status of an issue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IssueStatus {
    Pending,
    Approved,
    Rejected,
}

impl IssueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueStatus::Pending => "pending",
            IssueStatus::Approved => "approved",
            IssueStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(IssueStatus::Pending),
            "approved" => Some(IssueStatus::Approved),
            "rejected" => Some(IssueStatus::Rejected),
            _ => None,
        }
    }
}

/// Staff-facing progress of an issue, distinct from its approval status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Workflow {
    #[serde(rename = "in queue")]
    InQueue,
    #[serde(rename = "in-progress")]
    InProgress,
    #[serde(rename = "Working")]
    Working,
    #[serde(rename = "resolved")]
    Resolved,
    #[serde(rename = "rejected")]
    Rejected,
}

impl Workflow {
    pub fn as_str(&self) -> &'static str {
        match self {
            Workflow::InQueue => "in queue",
            Workflow::InProgress => "in-progress",
            Workflow::Working => "Working",
            Workflow::Resolved => "resolved",
            Workflow::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in queue" => Some(Workflow::InQueue),
            "in-progress" => Some(Workflow::InProgress),
            "Working" => Some(Workflow::Working),
            "resolved" => Some(Workflow::Resolved),
            "rejected" => Some(Workflow::Rejected),
            _ => None,
        }
    }
}

/// Whether a staff member has been bound to the issue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AssignState {
    Waiting,
    Assigned,
}

impl AssignState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignState::Waiting => "waiting",
            AssignState::Assigned => "assigned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(AssignState::Waiting),
            "assigned" => Some(AssignState::Assigned),
            _ => None,
        }
    }
}

/// Staff identity copied into an issue at assignment time.
///
/// This is not a live reference: later edits to the staff profile do not
/// reach issues that were already assigned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StaffSnapshot {
    pub staff_id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    pub assigned_at: String,
}

/// A citizen-submitted complaint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub id: String,
    /// Reporter email
    pub email: String,
    pub issue_name: String,
    pub description: String,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub division: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upazila: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(rename = "issueImageURL", skip_serializing_if = "Option::is_none")]
    pub issue_image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    pub status: IssueStatus,
    pub workflow: Workflow,
    pub assign: AssignState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_id: Option<String>,
    pub upvotes: i64,
    pub upvoted_by: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_staff: Option<StaffSnapshot>,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accept_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<String>,
}

/// Request body for submitting a new issue.
///
/// The reporter is taken from the verified identity, never from the body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIssueRequest {
    pub issue_name: String,
    pub description: String,
    pub category: String,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub division: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default)]
    pub upazila: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default, rename = "issueImageURL")]
    pub issue_image_url: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
}

/// Request body for editing a pending issue. Absent fields keep their value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateIssueRequest {
    #[serde(default)]
    pub issue_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub division: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default)]
    pub upazila: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default, rename = "issueImageURL")]
    pub issue_image_url: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
}

/// Request body for binding a staff member to an issue.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignStaffRequest {
    pub staff_id: String,
}

/// Result of an upvote toggle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpvoteOutcome {
    /// True when the vote was added, false when it was withdrawn
    pub upvoted: bool,
    pub upvotes: i64,
}

/// Optional filters for the public approved-issue listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublicIssueFilter {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub workflow: Option<String>,
}
