//! SQLite persistence gateway
//!
//! Every operation runs on a [`SqliteTransaction`]. Dropping one without
//! committing rolls it back, which sqlx guarantees for `Transaction`.
//!
//! Transactions start with `BEGIN IMMEDIATE` so the write lock is taken up
//! front. A deferred transaction that reads and then writes fails with
//! `SQLITE_BUSY` without consulting the busy timeout when another writer
//! got there first.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use rota_core::gateway::{ReviewRepository, ReviewStore, ReviewTransaction};
use rota_core::models::{
    AssignmentStats, InactiveReviewer, PullRequest, PullRequestStats, PullRequestStatus,
    ReviewerAssignment, Team, TeamMember, TeamStats, User, UserWorkload,
};
use sqlx::sqlite::{Sqlite, SqlitePool};
use sqlx::{QueryBuilder, Transaction};

use crate::error::storage;
use crate::rows::{
    AssignmentRow, AssignmentStatsRow, InactiveReviewerRow, PullRequestRow, PullRequestStatsRow,
    TeamRow, TeamStatsRow, UserRow, WorkloadRow,
};

const USER_COLUMNS: &str = "user_id, username, team_id, is_active, created_at, updated_at";
const PULL_REQUEST_COLUMNS: &str =
    "pull_request_id, pull_request_name, author_id, status, created_at, merged_at";

/// Gateway backed by a SQLite pool
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReviewStore for SqliteStore {
    type Tx = SqliteTransaction;

    async fn begin(&self) -> rota_core::Result<Self::Tx> {
        let tx = self
            .pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(storage)?;
        Ok(SqliteTransaction { tx })
    }
}

/// One database transaction exposed through the gateway interface
pub struct SqliteTransaction {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl ReviewTransaction for SqliteTransaction {
    async fn commit(self) -> rota_core::Result<()> {
        self.tx.commit().await.map_err(storage)
    }

    async fn rollback(self) -> rota_core::Result<()> {
        self.tx.rollback().await.map_err(storage)
    }
}

fn decode_pull_request(row: PullRequestRow) -> rota_core::Result<PullRequest> {
    PullRequest::try_from(row).map_err(rota_core::Error::from)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl ReviewRepository for SqliteTransaction {
    async fn ensure_team(&mut self, team_name: &str) -> rota_core::Result<Team> {
        sqlx::query("INSERT INTO teams (team_name, created_at) VALUES (?, ?) ON CONFLICT(team_name) DO NOTHING")
            .bind(team_name)
            .bind(Utc::now())
            .execute(&mut *self.tx)
            .await
            .map_err(storage)?;

        self.team_by_name(team_name).await
    }

    async fn team_by_name(&mut self, team_name: &str) -> rota_core::Result<Team> {
        sqlx::query_as::<_, TeamRow>("SELECT id, team_name, created_at FROM teams WHERE team_name = ?")
            .bind(team_name)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(storage)?
            .map(Team::from)
            .ok_or_else(|| rota_core::Error::TeamNotFound(team_name.to_string()))
    }

    async fn user_by_external_id(&mut self, user_id: &str) -> rota_core::Result<User> {
        sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = ?"))
            .bind(user_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(storage)?
            .map(User::from)
            .ok_or_else(|| rota_core::Error::UserNotFound(user_id.to_string()))
    }

    async fn upsert_user(&mut self, team_id: i64, member: &TeamMember) -> rota_core::Result<User> {
        let now = Utc::now();
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (user_id, username, team_id, is_active, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                username = excluded.username,
                team_id = excluded.team_id,
                is_active = excluded.is_active,
                updated_at = excluded.updated_at
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&member.user_id)
        .bind(&member.username)
        .bind(team_id)
        .bind(member.is_active)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(storage)?;

        Ok(row.into())
    }

    async fn users_in_team(&mut self, team_id: i64) -> rota_core::Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE team_id = ? ORDER BY user_id"
        ))
        .bind(team_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(storage)?;

        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn active_users_in_team(
        &mut self,
        team_id: i64,
        exclude_user_id: Option<&str>,
    ) -> rota_core::Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users
             WHERE team_id = ? AND is_active = 1 AND (? IS NULL OR user_id <> ?)
             ORDER BY user_id"
        ))
        .bind(team_id)
        .bind(exclude_user_id)
        .bind(exclude_user_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(storage)?;

        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn set_user_active(&mut self, user_id: &str, is_active: bool) -> rota_core::Result<User> {
        sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET is_active = ?, updated_at = ? WHERE user_id = ? RETURNING {USER_COLUMNS}"
        ))
        .bind(is_active)
        .bind(Utc::now())
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(storage)?
        .map(User::from)
        .ok_or_else(|| rota_core::Error::UserNotFound(user_id.to_string()))
    }

    async fn deactivate_all_users_in_team(&mut self, team_id: i64) -> rota_core::Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET is_active = 0, updated_at = ?
             WHERE team_id = ? AND is_active = 1
             RETURNING {USER_COLUMNS}"
        ))
        .bind(Utc::now())
        .bind(team_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(storage)?;

        // RETURNING order is unspecified
        let mut users: Vec<User> = rows.into_iter().map(User::from).collect();
        users.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(users)
    }

    async fn create_pull_request(
        &mut self,
        pull_request_id: &str,
        pull_request_name: &str,
        author_id: &str,
    ) -> rota_core::Result<PullRequest> {
        let row = sqlx::query_as::<_, PullRequestRow>(&format!(
            "INSERT INTO pull_requests (pull_request_id, pull_request_name, author_id, status, created_at)
             VALUES (?, ?, ?, 'OPEN', ?)
             RETURNING {PULL_REQUEST_COLUMNS}"
        ))
        .bind(pull_request_id)
        .bind(pull_request_name)
        .bind(author_id)
        .bind(Utc::now())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                rota_core::Error::PullRequestExists(pull_request_id.to_string())
            } else {
                storage(e)
            }
        })?;

        decode_pull_request(row)
    }

    async fn pull_request_by_external_id(
        &mut self,
        pull_request_id: &str,
    ) -> rota_core::Result<PullRequest> {
        let row = sqlx::query_as::<_, PullRequestRow>(&format!(
            "SELECT {PULL_REQUEST_COLUMNS} FROM pull_requests WHERE pull_request_id = ?"
        ))
        .bind(pull_request_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(storage)?
        .ok_or_else(|| rota_core::Error::PullRequestNotFound(pull_request_id.to_string()))?;

        decode_pull_request(row)
    }

    async fn merge_pull_request(&mut self, pull_request_id: &str) -> rota_core::Result<PullRequest> {
        sqlx::query(
            "UPDATE pull_requests SET status = 'MERGED', merged_at = ?
             WHERE pull_request_id = ? AND status = 'OPEN'",
        )
        .bind(Utc::now())
        .bind(pull_request_id)
        .execute(&mut *self.tx)
        .await
        .map_err(storage)?;

        self.pull_request_by_external_id(pull_request_id).await
    }

    async fn pull_requests_reviewed_by(
        &mut self,
        user_id: &str,
        status: Option<PullRequestStatus>,
    ) -> rota_core::Result<Vec<PullRequest>> {
        let status = status.map(|s| s.as_str());
        let rows = sqlx::query_as::<_, PullRequestRow>(
            "SELECT p.pull_request_id, p.pull_request_name, p.author_id, p.status, p.created_at, p.merged_at
             FROM pull_requests p
             JOIN pr_reviewers r ON r.pull_request_id = p.pull_request_id
             WHERE r.user_id = ? AND (? IS NULL OR p.status = ?)
             ORDER BY p.id",
        )
        .bind(user_id)
        .bind(status)
        .bind(status)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(storage)?;

        rows.into_iter().map(decode_pull_request).collect()
    }

    async fn pull_requests_by_status(
        &mut self,
        status: PullRequestStatus,
    ) -> rota_core::Result<Vec<PullRequest>> {
        let rows = sqlx::query_as::<_, PullRequestRow>(&format!(
            "SELECT {PULL_REQUEST_COLUMNS} FROM pull_requests WHERE status = ? ORDER BY id"
        ))
        .bind(status.as_str())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(storage)?;

        rows.into_iter().map(decode_pull_request).collect()
    }

    async fn is_user_assigned(&mut self, pull_request_id: &str, user_id: &str) -> rota_core::Result<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM pr_reviewers WHERE pull_request_id = ? AND user_id = ?)",
        )
        .bind(pull_request_id)
        .bind(user_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(storage)?;

        Ok(exists)
    }

    async fn reviewer_assignments_for(
        &mut self,
        pull_request_id: &str,
    ) -> rota_core::Result<Vec<ReviewerAssignment>> {
        let rows = sqlx::query_as::<_, AssignmentRow>(
            "SELECT pull_request_id, user_id, assigned_at FROM pr_reviewers
             WHERE pull_request_id = ?
             ORDER BY id",
        )
        .bind(pull_request_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(storage)?;

        Ok(rows.into_iter().map(ReviewerAssignment::from).collect())
    }

    async fn create_assignment(
        &mut self,
        pull_request_id: &str,
        user_id: &str,
    ) -> rota_core::Result<ReviewerAssignment> {
        let row = sqlx::query_as::<_, AssignmentRow>(
            "INSERT INTO pr_reviewers (pull_request_id, user_id, assigned_at)
             VALUES (?, ?, ?)
             RETURNING pull_request_id, user_id, assigned_at",
        )
        .bind(pull_request_id)
        .bind(user_id)
        .bind(Utc::now())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(storage)?;

        Ok(row.into())
    }

    async fn delete_assignment(&mut self, pull_request_id: &str, user_id: &str) -> rota_core::Result<bool> {
        let result = sqlx::query("DELETE FROM pr_reviewers WHERE pull_request_id = ? AND user_id = ?")
            .bind(pull_request_id)
            .bind(user_id)
            .execute(&mut *self.tx)
            .await
            .map_err(storage)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_assignments(
        &mut self,
        pull_request_id: &str,
        user_ids: &[String],
    ) -> rota_core::Result<u64> {
        if user_ids.is_empty() {
            return Ok(0);
        }

        let mut query =
            QueryBuilder::<Sqlite>::new("DELETE FROM pr_reviewers WHERE pull_request_id = ");
        query.push_bind(pull_request_id);
        query.push(" AND user_id IN (");
        let mut ids = query.separated(", ");
        for user_id in user_ids {
            ids.push_bind(user_id.as_str());
        }
        ids.push_unseparated(")");

        let result = query
            .build()
            .execute(&mut *self.tx)
            .await
            .map_err(storage)?;
        Ok(result.rows_affected())
    }

    async fn replace_assignment(
        &mut self,
        pull_request_id: &str,
        old_user_id: &str,
        new_user_id: &str,
    ) -> rota_core::Result<ReviewerAssignment> {
        if !self.delete_assignment(pull_request_id, old_user_id).await? {
            return Err(rota_core::Error::NotAssigned {
                pull_request_id: pull_request_id.to_string(),
                user_id: old_user_id.to_string(),
            });
        }
        self.create_assignment(pull_request_id, new_user_id).await
    }

    async fn open_review_counts_by_user(&mut self) -> rota_core::Result<HashMap<String, i64>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT r.user_id, COUNT(*)
             FROM pr_reviewers r
             JOIN pull_requests p ON p.pull_request_id = r.pull_request_id
             WHERE p.status = 'OPEN'
             GROUP BY r.user_id",
        )
        .fetch_all(&mut *self.tx)
        .await
        .map_err(storage)?;

        Ok(rows.into_iter().collect())
    }

    async fn open_prs_with_inactive_reviewers(&mut self) -> rota_core::Result<Vec<InactiveReviewer>> {
        let rows = sqlx::query_as::<_, InactiveReviewerRow>(
            "SELECT p.pull_request_id, p.author_id, u.user_id AS inactive_user_id, u.team_id
             FROM pr_reviewers r
             JOIN pull_requests p ON p.pull_request_id = r.pull_request_id
             JOIN users u ON u.user_id = r.user_id
             WHERE p.status = 'OPEN' AND u.is_active = 0
             ORDER BY p.pull_request_id, u.user_id",
        )
        .fetch_all(&mut *self.tx)
        .await
        .map_err(storage)?;

        Ok(rows.into_iter().map(InactiveReviewer::from).collect())
    }

    async fn user_workloads(&mut self) -> rota_core::Result<Vec<UserWorkload>> {
        let rows = sqlx::query_as::<_, WorkloadRow>(
            "SELECT u.user_id, u.username, t.team_name, u.is_active, COUNT(p.id) AS open_reviews
             FROM users u
             JOIN teams t ON t.id = u.team_id
             LEFT JOIN pr_reviewers r ON r.user_id = u.user_id
             LEFT JOIN pull_requests p ON p.pull_request_id = r.pull_request_id AND p.status = 'OPEN'
             GROUP BY u.id
             ORDER BY open_reviews DESC, u.user_id",
        )
        .fetch_all(&mut *self.tx)
        .await
        .map_err(storage)?;

        Ok(rows.into_iter().map(UserWorkload::from).collect())
    }

    async fn team_stats(&mut self) -> rota_core::Result<Vec<TeamStats>> {
        let rows = sqlx::query_as::<_, TeamStatsRow>(
            "SELECT t.team_name,
                (SELECT COUNT(*) FROM users u WHERE u.team_id = t.id) AS total_members,
                (SELECT COUNT(*) FROM users u WHERE u.team_id = t.id AND u.is_active = 1) AS active_members,
                (SELECT COUNT(*) FROM pull_requests p
                    JOIN users u ON u.user_id = p.author_id
                    WHERE u.team_id = t.id) AS pull_requests_authored,
                (SELECT COUNT(*) FROM pr_reviewers r
                    JOIN users u ON u.user_id = r.user_id
                    WHERE u.team_id = t.id) AS review_assignments
             FROM teams t
             ORDER BY t.team_name",
        )
        .fetch_all(&mut *self.tx)
        .await
        .map_err(storage)?;

        Ok(rows.into_iter().map(TeamStats::from).collect())
    }

    async fn assignment_stats(&mut self) -> rota_core::Result<Vec<AssignmentStats>> {
        let rows = sqlx::query_as::<_, AssignmentStatsRow>(
            "SELECT u.user_id, u.username,
                COUNT(p.id) AS total_assignments,
                COALESCE(SUM(CASE WHEN p.status = 'OPEN' THEN 1 ELSE 0 END), 0) AS open_assignments,
                COALESCE(SUM(CASE WHEN p.status = 'MERGED' THEN 1 ELSE 0 END), 0) AS merged_assignments
             FROM users u
             LEFT JOIN pr_reviewers r ON r.user_id = u.user_id
             LEFT JOIN pull_requests p ON p.pull_request_id = r.pull_request_id
             GROUP BY u.id
             ORDER BY total_assignments DESC, u.user_id",
        )
        .fetch_all(&mut *self.tx)
        .await
        .map_err(storage)?;

        Ok(rows.into_iter().map(AssignmentStats::from).collect())
    }

    async fn pull_request_stats(&mut self) -> rota_core::Result<Vec<PullRequestStats>> {
        let rows = sqlx::query_as::<_, PullRequestStatsRow>(
            "SELECT p.pull_request_id, p.pull_request_name, p.author_id, p.status,
                COUNT(r.id) AS reviewer_count
             FROM pull_requests p
             LEFT JOIN pr_reviewers r ON r.pull_request_id = p.pull_request_id
             GROUP BY p.id
             ORDER BY p.id",
        )
        .fetch_all(&mut *self.tx)
        .await
        .map_err(storage)?;

        rows.into_iter()
            .map(|row| PullRequestStats::try_from(row).map_err(rota_core::Error::from))
            .collect()
    }
}
