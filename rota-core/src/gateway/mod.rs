//! Persistence gateway abstraction.
//!
//! `ReviewRepository` is the capability interface the engines consume. All
//! access goes through a transaction obtained from a [`ReviewStore`]; the
//! transaction exposes the same interface, so one operation's reads see its own
//! writes and commit all-or-nothing.
//!
//! A transaction that is dropped without [`ReviewTransaction::commit`] rolls
//! back. This covers early returns, panics and futures abandoned on deadline or
//! cancellation.

mod memory;

pub use memory::InMemoryStore;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::models::{
    AssignmentStats, InactiveReviewer, PullRequest, PullRequestStats, PullRequestStatus,
    ReviewerAssignment, Team, TeamMember, TeamStats, User, UserWorkload,
};
use crate::Result;

/// Queries and mutations over teams, users, pull requests and reviewer edges.
///
/// Lookups by external id return the matching `*NotFound` error when the record
/// is absent. Writes that violate the (pull request, user) uniqueness
/// constraint return [`crate::Error::Conflict`].
#[async_trait]
pub trait ReviewRepository: Send {
    /// Get a team by name, creating it on first reference
    async fn ensure_team(&mut self, team_name: &str) -> Result<Team>;

    async fn team_by_name(&mut self, team_name: &str) -> Result<Team>;

    async fn user_by_external_id(&mut self, user_id: &str) -> Result<User>;

    /// Create the user or update name, team and active flag of an existing one
    async fn upsert_user(&mut self, team_id: i64, member: &TeamMember) -> Result<User>;

    /// All members of a team ordered by user id
    async fn users_in_team(&mut self, team_id: i64) -> Result<Vec<User>>;

    /// Active members of a team ordered by user id, optionally excluding one user
    async fn active_users_in_team(
        &mut self,
        team_id: i64,
        exclude_user_id: Option<&str>,
    ) -> Result<Vec<User>>;

    async fn set_user_active(&mut self, user_id: &str, is_active: bool) -> Result<User>;

    async fn deactivate_user(&mut self, user_id: &str) -> Result<User> {
        self.set_user_active(user_id, false).await
    }

    /// Deactivate every active member of a team, returning the users that changed
    async fn deactivate_all_users_in_team(&mut self, team_id: i64) -> Result<Vec<User>>;

    /// Insert an OPEN pull request. A taken id yields `PullRequestExists`.
    async fn create_pull_request(
        &mut self,
        pull_request_id: &str,
        pull_request_name: &str,
        author_id: &str,
    ) -> Result<PullRequest>;

    async fn pull_request_by_external_id(&mut self, pull_request_id: &str) -> Result<PullRequest>;

    /// Mark a pull request MERGED. `merged_at` is only set on the first call.
    async fn merge_pull_request(&mut self, pull_request_id: &str) -> Result<PullRequest>;

    /// Pull requests the user reviews, optionally filtered by status
    async fn pull_requests_reviewed_by(
        &mut self,
        user_id: &str,
        status: Option<PullRequestStatus>,
    ) -> Result<Vec<PullRequest>>;

    /// Pull requests with the given status in creation order
    async fn pull_requests_by_status(&mut self, status: PullRequestStatus)
        -> Result<Vec<PullRequest>>;

    async fn is_user_assigned(&mut self, pull_request_id: &str, user_id: &str) -> Result<bool>;

    /// Reviewer edges of one pull request in assignment order
    async fn reviewer_assignments_for(
        &mut self,
        pull_request_id: &str,
    ) -> Result<Vec<ReviewerAssignment>>;

    async fn create_assignment(
        &mut self,
        pull_request_id: &str,
        user_id: &str,
    ) -> Result<ReviewerAssignment>;

    /// Remove one edge, returning whether it existed
    async fn delete_assignment(&mut self, pull_request_id: &str, user_id: &str) -> Result<bool>;

    /// Remove several edges of one pull request, returning how many existed
    async fn delete_assignments(&mut self, pull_request_id: &str, user_ids: &[String])
        -> Result<u64>;

    /// Swap `old_user_id` for `new_user_id` on a pull request
    async fn replace_assignment(
        &mut self,
        pull_request_id: &str,
        old_user_id: &str,
        new_user_id: &str,
    ) -> Result<ReviewerAssignment>;

    /// Open-review count per user id. Users without open reviews may be absent.
    async fn open_review_counts_by_user(&mut self) -> Result<HashMap<String, i64>>;

    /// Reviewer edges on OPEN pull requests held by inactive users, ordered by
    /// pull request id then user id
    async fn open_prs_with_inactive_reviewers(&mut self) -> Result<Vec<InactiveReviewer>>;

    async fn user_workloads(&mut self) -> Result<Vec<UserWorkload>>;

    async fn team_stats(&mut self) -> Result<Vec<TeamStats>>;

    async fn assignment_stats(&mut self) -> Result<Vec<AssignmentStats>>;

    /// Reviewer counts per pull request in creation order
    async fn pull_request_stats(&mut self) -> Result<Vec<PullRequestStats>>;
}

/// A unit of work over a [`ReviewRepository`]
#[async_trait]
pub trait ReviewTransaction: ReviewRepository + Sized {
    /// Make every write of this transaction visible
    async fn commit(self) -> Result<()>;

    /// Discard every write of this transaction
    async fn rollback(self) -> Result<()>;
}

/// Source of transactions
#[async_trait]
pub trait ReviewStore: Send + Sync {
    type Tx: ReviewTransaction + 'static;

    async fn begin(&self) -> Result<Self::Tx>;
}

/// Commit `tx` when `outcome` is `Ok`, roll it back otherwise.
///
/// A failed rollback is logged and the original error returned, since the
/// storage layer discards the transaction's writes either way.
pub async fn settle<Tx, T>(tx: Tx, outcome: Result<T>) -> Result<T>
where
    Tx: ReviewTransaction,
{
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            tracing::debug!(error = %err, "Rolling back transaction");
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(error = %rollback_err, "Rollback failed");
            }
            Err(err)
        }
    }
}
