//! Row types decoded from queries and their domain conversions

use chrono::{DateTime, Utc};
use rota_core::models::{
    AssignmentStats, InactiveReviewer, PullRequest, PullRequestStats, PullRequestStatus,
    ReviewerAssignment, Team, TeamStats, User, UserWorkload,
};
use sqlx::FromRow;

use crate::error::Error;

#[derive(Debug, FromRow)]
pub(crate) struct TeamRow {
    pub id: i64,
    pub team_name: String,
    pub created_at: DateTime<Utc>,
}

impl From<TeamRow> for Team {
    fn from(row: TeamRow) -> Self {
        Team {
            id: row.id,
            team_name: row.team_name,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct UserRow {
    pub user_id: String,
    pub username: String,
    pub team_id: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            user_id: row.user_id,
            username: row.username,
            team_id: row.team_id,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct PullRequestRow {
    pub pull_request_id: String,
    pub pull_request_name: String,
    pub author_id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
}

impl TryFrom<PullRequestRow> for PullRequest {
    type Error = Error;

    fn try_from(row: PullRequestRow) -> Result<Self, Self::Error> {
        let status: PullRequestStatus = row
            .status
            .parse()
            .map_err(|e: rota_core::Error| Error::InvalidData(e.to_string()))?;
        Ok(PullRequest {
            pull_request_id: row.pull_request_id,
            pull_request_name: row.pull_request_name,
            author_id: row.author_id,
            status,
            created_at: row.created_at,
            merged_at: row.merged_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct AssignmentRow {
    pub pull_request_id: String,
    pub user_id: String,
    pub assigned_at: DateTime<Utc>,
}

impl From<AssignmentRow> for ReviewerAssignment {
    fn from(row: AssignmentRow) -> Self {
        ReviewerAssignment {
            pull_request_id: row.pull_request_id,
            user_id: row.user_id,
            assigned_at: row.assigned_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct InactiveReviewerRow {
    pub pull_request_id: String,
    pub author_id: String,
    pub inactive_user_id: String,
    pub team_id: i64,
}

impl From<InactiveReviewerRow> for InactiveReviewer {
    fn from(row: InactiveReviewerRow) -> Self {
        InactiveReviewer {
            pull_request_id: row.pull_request_id,
            author_id: row.author_id,
            inactive_user_id: row.inactive_user_id,
            team_id: row.team_id,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct WorkloadRow {
    pub user_id: String,
    pub username: String,
    pub team_name: String,
    pub is_active: bool,
    pub open_reviews: i64,
}

impl From<WorkloadRow> for UserWorkload {
    fn from(row: WorkloadRow) -> Self {
        UserWorkload {
            user_id: row.user_id,
            username: row.username,
            team_name: row.team_name,
            is_active: row.is_active,
            open_reviews: row.open_reviews,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct TeamStatsRow {
    pub team_name: String,
    pub total_members: i64,
    pub active_members: i64,
    pub pull_requests_authored: i64,
    pub review_assignments: i64,
}

impl From<TeamStatsRow> for TeamStats {
    fn from(row: TeamStatsRow) -> Self {
        TeamStats {
            team_name: row.team_name,
            total_members: row.total_members,
            active_members: row.active_members,
            pull_requests_authored: row.pull_requests_authored,
            review_assignments: row.review_assignments,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct AssignmentStatsRow {
    pub user_id: String,
    pub username: String,
    pub total_assignments: i64,
    pub open_assignments: i64,
    pub merged_assignments: i64,
}

impl From<AssignmentStatsRow> for AssignmentStats {
    fn from(row: AssignmentStatsRow) -> Self {
        AssignmentStats {
            user_id: row.user_id,
            username: row.username,
            total_assignments: row.total_assignments,
            open_assignments: row.open_assignments,
            merged_assignments: row.merged_assignments,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct PullRequestStatsRow {
    pub pull_request_id: String,
    pub pull_request_name: String,
    pub author_id: String,
    pub status: String,
    pub reviewer_count: i64,
}

impl TryFrom<PullRequestStatsRow> for PullRequestStats {
    type Error = Error;

    fn try_from(row: PullRequestStatsRow) -> Result<Self, Self::Error> {
        let status: PullRequestStatus = row
            .status
            .parse()
            .map_err(|e: rota_core::Error| Error::InvalidData(e.to_string()))?;
        Ok(PullRequestStats {
            pull_request_id: row.pull_request_id,
            pull_request_name: row.pull_request_name,
            author_id: row.author_id,
            status,
            reviewer_count: row.reviewer_count,
        })
    }
}
