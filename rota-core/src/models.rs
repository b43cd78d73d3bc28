//! Domain records: teams, users, pull requests and reviewer assignments

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

/// A team of users who review each other's pull requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    /// Surrogate identifier
    pub id: i64,

    /// Unique human-readable name
    pub team_name: String,

    /// When the team was first referenced
    pub created_at: DateTime<Utc>,
}

/// A team member who can author and review pull requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Externally supplied identifier
    pub user_id: String,

    /// Display name
    pub username: String,

    /// Owning team
    pub team_id: i64,

    /// Inactive users are never selected as reviewers
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Pull request lifecycle. `Open -> Merged` is the only transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PullRequestStatus {
    Open,
    Merged,
}

impl PullRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PullRequestStatus::Open => "OPEN",
            PullRequestStatus::Merged => "MERGED",
        }
    }
}

impl fmt::Display for PullRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PullRequestStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(PullRequestStatus::Open),
            "MERGED" => Ok(PullRequestStatus::Merged),
            other => Err(Error::InvalidStatus(other.to_string())),
        }
    }
}

/// A pull request awaiting (or done with) review
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    /// Externally supplied identifier
    pub pull_request_id: String,

    pub pull_request_name: String,

    /// User id of the author
    pub author_id: String,

    pub status: PullRequestStatus,

    pub created_at: DateTime<Utc>,

    /// Set once, on the transition to `Merged`
    pub merged_at: Option<DateTime<Utc>>,
}

impl PullRequest {
    /// Check if reviewers may still change
    pub fn is_open(&self) -> bool {
        self.status == PullRequestStatus::Open
    }
}

/// Edge linking a pull request to one of its reviewers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewerAssignment {
    pub pull_request_id: String,
    pub user_id: String,
    pub assigned_at: DateTime<Utc>,
}

/// Pull request together with its reviewer edges
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestWithReviewers {
    pub pull_request: PullRequest,
    pub reviewers: Vec<ReviewerAssignment>,
}

impl PullRequestWithReviewers {
    /// Reviewer user ids in assignment order
    pub fn reviewer_ids(&self) -> Vec<&str> {
        self.reviewers.iter().map(|r| r.user_id.as_str()).collect()
    }
}

/// Reviewer edge on an open pull request whose user is no longer active
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InactiveReviewer {
    pub pull_request_id: String,
    pub author_id: String,
    pub inactive_user_id: String,
    /// Team of the inactive reviewer
    pub team_id: i64,
}

/// Team together with its members
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamWithMembers {
    pub team: Team,
    pub members: Vec<User>,
}

/// Requested state of one team member in an upsert
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    pub user_id: String,
    pub username: String,
    pub is_active: bool,
}

impl TeamMember {
    /// Create an active member
    pub fn new(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            is_active: true,
        }
    }

    /// Set the active flag
    pub fn with_active(mut self, is_active: bool) -> Self {
        self.is_active = is_active;
        self
    }
}

/// Open-review load of one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserWorkload {
    pub user_id: String,
    pub username: String,
    pub team_name: String,
    pub is_active: bool,
    pub open_reviews: i64,
}

/// Per-team totals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamStats {
    pub team_name: String,
    pub total_members: i64,
    pub active_members: i64,
    pub pull_requests_authored: i64,
    /// Reviewer edges held by members of the team
    pub review_assignments: i64,
}

/// Reviewer count of one pull request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestStats {
    pub pull_request_id: String,
    pub pull_request_name: String,
    pub author_id: String,
    pub status: PullRequestStatus,
    pub reviewer_count: i64,
}

/// Per-user assignment history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentStats {
    pub user_id: String,
    pub username: String,
    pub total_assignments: i64,
    pub open_assignments: i64,
    pub merged_assignments: i64,
}
