//! Reviewer assignment on creation and manual reviewer changes

use std::sync::Arc;

use crate::balance::{select_least_loaded, select_one_least_loaded, WorkloadIndex};
use crate::config::AssignmentConfig;
use crate::context::OperationContext;
use crate::gateway::{settle, ReviewRepository, ReviewStore};
use crate::models::{PullRequest, PullRequestWithReviewers, ReviewerAssignment, User};
use crate::{Error, Result};

/// Reject reviewer mutation on a pull request that is not open
pub(crate) fn require_open(pr: &PullRequest) -> Result<()> {
    if pr.is_open() {
        Ok(())
    } else {
        Err(Error::InvalidState {
            pull_request_id: pr.pull_request_id.clone(),
            status: pr.status,
        })
    }
}

/// Check that `user_id` may be added as a reviewer of `pr`.
///
/// Checks run in order: exists, active, not the author, not already assigned.
async fn validate_candidate<R>(repo: &mut R, pr: &PullRequest, user_id: &str) -> Result<User>
where
    R: ReviewRepository + ?Sized,
{
    let user = repo.user_by_external_id(user_id).await?;
    if !user.is_active {
        return Err(Error::UserInactive(user.user_id));
    }
    if user.user_id == pr.author_id {
        return Err(Error::CannotAssignAuthor {
            pull_request_id: pr.pull_request_id.clone(),
            user_id: user.user_id,
        });
    }
    if repo.is_user_assigned(&pr.pull_request_id, &user.user_id).await? {
        return Err(Error::AlreadyAssigned {
            pull_request_id: pr.pull_request_id.clone(),
            user_id: user.user_id,
        });
    }
    Ok(user)
}

async fn require_assigned<R>(repo: &mut R, pull_request_id: &str, user_id: &str) -> Result<()>
where
    R: ReviewRepository + ?Sized,
{
    if repo.is_user_assigned(pull_request_id, user_id).await? {
        Ok(())
    } else {
        Err(Error::NotAssigned {
            pull_request_id: pull_request_id.to_string(),
            user_id: user_id.to_string(),
        })
    }
}

/// Active members of `team_id` who could join `pr`: not the author and not
/// already reviewing it. Ordered by user id.
pub(crate) async fn eligible_reviewers<R>(
    repo: &mut R,
    team_id: i64,
    pr_id: &str,
    author_id: &str,
) -> Result<Vec<User>>
where
    R: ReviewRepository + ?Sized,
{
    let assigned: Vec<String> = repo
        .reviewer_assignments_for(pr_id)
        .await?
        .into_iter()
        .map(|a| a.user_id)
        .collect();

    let pool = repo
        .active_users_in_team(team_id, Some(author_id))
        .await?
        .into_iter()
        .filter(|u| !assigned.contains(&u.user_id))
        .collect();
    Ok(pool)
}

/// Assign up to `count` least-loaded reviewers from the author's team
pub(crate) async fn auto_assign_in<R>(
    repo: &mut R,
    pr: &PullRequest,
    count: usize,
) -> Result<Vec<ReviewerAssignment>>
where
    R: ReviewRepository + ?Sized,
{
    require_open(pr)?;
    if count == 0 {
        return Ok(Vec::new());
    }

    let author = repo.user_by_external_id(&pr.author_id).await?;
    let pool = eligible_reviewers(repo, author.team_id, &pr.pull_request_id, &author.user_id).await?;
    if pool.is_empty() {
        return Err(Error::NoEligibleReviewers(pr.pull_request_id.clone()));
    }

    let index = WorkloadIndex::load(repo).await?;
    let picked = select_least_loaded(&pool, &index, count);

    let mut created = Vec::with_capacity(picked.len());
    for reviewer in &picked {
        let assignment = repo
            .create_assignment(&pr.pull_request_id, &reviewer.user_id)
            .await
            .map_err(|e| e.into_assignment_conflict(&pr.pull_request_id, &reviewer.user_id))?;
        created.push(assignment);
    }

    tracing::info!(
        pull_request_id = %pr.pull_request_id,
        requested = count,
        assigned = created.len(),
        "Auto-assigned reviewers"
    );
    Ok(created)
}

/// Create an OPEN pull request and auto-assign up to `target_reviewers`.
///
/// An empty reviewer pool is not an error here: the pull request is still
/// created, with no reviewers.
pub(crate) async fn create_in<R>(
    repo: &mut R,
    pull_request_id: &str,
    pull_request_name: &str,
    author_id: &str,
    target_reviewers: usize,
) -> Result<PullRequestWithReviewers>
where
    R: ReviewRepository + ?Sized,
{
    repo.user_by_external_id(author_id).await?;
    let pull_request = repo
        .create_pull_request(pull_request_id, pull_request_name, author_id)
        .await?;

    let reviewers = match auto_assign_in(repo, &pull_request, target_reviewers).await {
        Ok(reviewers) => reviewers,
        Err(Error::NoEligibleReviewers(_)) => {
            tracing::warn!(
                pull_request_id,
                author_id,
                "No eligible reviewers, pull request created without reviewers"
            );
            Vec::new()
        }
        Err(e) => return Err(e),
    };

    Ok(PullRequestWithReviewers {
        pull_request,
        reviewers,
    })
}

async fn assign_in<R>(repo: &mut R, pull_request_id: &str, user_id: &str) -> Result<ReviewerAssignment>
where
    R: ReviewRepository + ?Sized,
{
    let pr = repo.pull_request_by_external_id(pull_request_id).await?;
    require_open(&pr)?;
    let user = validate_candidate(repo, &pr, user_id).await?;

    let assignment = repo
        .create_assignment(pull_request_id, &user.user_id)
        .await
        .map_err(|e| e.into_assignment_conflict(pull_request_id, &user.user_id))?;
    tracing::info!(pull_request_id, user_id, "Assigned reviewer");
    Ok(assignment)
}

async fn replace_in<R>(
    repo: &mut R,
    pull_request_id: &str,
    old_user_id: &str,
    new_user_id: &str,
) -> Result<ReviewerAssignment>
where
    R: ReviewRepository + ?Sized,
{
    let pr = repo.pull_request_by_external_id(pull_request_id).await?;
    require_open(&pr)?;
    require_assigned(repo, pull_request_id, old_user_id).await?;
    let new_user = validate_candidate(repo, &pr, new_user_id).await?;

    let assignment = repo
        .replace_assignment(pull_request_id, old_user_id, &new_user.user_id)
        .await
        .map_err(|e| e.into_assignment_conflict(pull_request_id, &new_user.user_id))?;
    tracing::info!(pull_request_id, old_user_id, new_user_id, "Replaced reviewer");
    Ok(assignment)
}

async fn reassign_in<R>(
    repo: &mut R,
    pull_request_id: &str,
    old_user_id: &str,
) -> Result<ReviewerAssignment>
where
    R: ReviewRepository + ?Sized,
{
    let pr = repo.pull_request_by_external_id(pull_request_id).await?;
    require_open(&pr)?;
    require_assigned(repo, pull_request_id, old_user_id).await?;
    let old_user = repo.user_by_external_id(old_user_id).await?;

    let pool = eligible_reviewers(repo, old_user.team_id, pull_request_id, &pr.author_id).await?;
    let index = WorkloadIndex::load(repo).await?;
    let new_user = select_one_least_loaded(&pool, &index)
        .ok_or_else(|| Error::NoEligibleReviewers(pull_request_id.to_string()))?;

    let assignment = repo
        .replace_assignment(pull_request_id, old_user_id, &new_user.user_id)
        .await
        .map_err(|e| e.into_assignment_conflict(pull_request_id, &new_user.user_id))?;
    tracing::info!(
        pull_request_id,
        old_user_id,
        new_user_id = %new_user.user_id,
        "Reassigned reviewer"
    );
    Ok(assignment)
}

async fn remove_in<R>(repo: &mut R, pull_request_id: &str, user_id: &str) -> Result<()>
where
    R: ReviewRepository + ?Sized,
{
    let pr = repo.pull_request_by_external_id(pull_request_id).await?;
    require_open(&pr)?;
    if !repo.delete_assignment(pull_request_id, user_id).await? {
        return Err(Error::NotAssigned {
            pull_request_id: pull_request_id.to_string(),
            user_id: user_id.to_string(),
        });
    }
    tracing::info!(pull_request_id, user_id, "Removed reviewer");
    Ok(())
}

/// Creates pull requests and changes their reviewers.
///
/// Each call runs in its own transaction under the caller's
/// [`OperationContext`]; nothing is kept between calls.
pub struct AssignmentEngine<S> {
    store: Arc<S>,
    config: AssignmentConfig,
}

impl<S> Clone for AssignmentEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config,
        }
    }
}

impl<S: ReviewStore> AssignmentEngine<S> {
    pub fn new(store: Arc<S>, config: AssignmentConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &AssignmentConfig {
        &self.config
    }

    /// Create a pull request with the configured number of reviewers
    pub async fn create_pull_request(
        &self,
        ctx: &OperationContext,
        pull_request_id: &str,
        pull_request_name: &str,
        author_id: &str,
    ) -> Result<PullRequestWithReviewers> {
        self.create_and_auto_assign(
            ctx,
            pull_request_id,
            pull_request_name,
            author_id,
            self.config.reviewers_per_pull_request,
        )
        .await
    }

    pub async fn create_and_auto_assign(
        &self,
        ctx: &OperationContext,
        pull_request_id: &str,
        pull_request_name: &str,
        author_id: &str,
        target_reviewers: usize,
    ) -> Result<PullRequestWithReviewers> {
        ctx.run(async {
            let mut tx = self.store.begin().await?;
            let outcome = create_in(
                &mut tx,
                pull_request_id,
                pull_request_name,
                author_id,
                target_reviewers,
            )
            .await;
            settle(tx, outcome).await
        })
        .await
    }

    /// Assign up to `count` more reviewers to an existing pull request
    pub async fn auto_assign(
        &self,
        ctx: &OperationContext,
        pull_request_id: &str,
        count: usize,
    ) -> Result<Vec<ReviewerAssignment>> {
        ctx.run(async {
            let mut tx = self.store.begin().await?;
            let outcome = match tx.pull_request_by_external_id(pull_request_id).await {
                Ok(pr) => auto_assign_in(&mut tx, &pr, count).await,
                Err(e) => Err(e),
            };
            settle(tx, outcome).await
        })
        .await
    }

    /// Add one specific reviewer
    pub async fn assign_reviewer(
        &self,
        ctx: &OperationContext,
        pull_request_id: &str,
        user_id: &str,
    ) -> Result<ReviewerAssignment> {
        ctx.run(async {
            let mut tx = self.store.begin().await?;
            let outcome = assign_in(&mut tx, pull_request_id, user_id).await;
            settle(tx, outcome).await
        })
        .await
    }

    /// Swap `old_user_id` for `new_user_id` as one atomic change
    pub async fn replace_reviewer(
        &self,
        ctx: &OperationContext,
        pull_request_id: &str,
        old_user_id: &str,
        new_user_id: &str,
    ) -> Result<ReviewerAssignment> {
        ctx.run(async {
            let mut tx = self.store.begin().await?;
            let outcome = replace_in(&mut tx, pull_request_id, old_user_id, new_user_id).await;
            settle(tx, outcome).await
        })
        .await
    }

    /// Replace `old_user_id` with the least-loaded eligible member of their team
    pub async fn reassign_reviewer(
        &self,
        ctx: &OperationContext,
        pull_request_id: &str,
        old_user_id: &str,
    ) -> Result<ReviewerAssignment> {
        ctx.run(async {
            let mut tx = self.store.begin().await?;
            let outcome = reassign_in(&mut tx, pull_request_id, old_user_id).await;
            settle(tx, outcome).await
        })
        .await
    }

    /// Remove one reviewer without topping up
    pub async fn remove_reviewer(
        &self,
        ctx: &OperationContext,
        pull_request_id: &str,
        user_id: &str,
    ) -> Result<()> {
        ctx.run(async {
            let mut tx = self.store.begin().await?;
            let outcome = remove_in(&mut tx, pull_request_id, user_id).await;
            settle(tx, outcome).await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::gateway::InMemoryStore;
    use crate::models::PullRequestStatus;
    use crate::testing::{
        merge, open_reviews, reviewers_of, seed_pull_request, seed_team, set_active,
    };

    fn engine(store: &InMemoryStore) -> AssignmentEngine<InMemoryStore> {
        AssignmentEngine::new(Arc::new(store.clone()), AssignmentConfig::default())
    }

    #[tokio::test]
    async fn test_create_assigns_two_least_loaded_teammates() {
        let store = InMemoryStore::new();
        seed_team(&store, "backend", &["u1", "u2", "u3", "u4"]).await;
        seed_pull_request(&store, "pr-0", "u1", &["u2"]).await;
        let engine = engine(&store);
        let ctx = OperationContext::new();

        let created = engine
            .create_pull_request(&ctx, "pr-1", "Add search", "u1")
            .await
            .unwrap();

        assert_eq!(created.pull_request.status, PullRequestStatus::Open);
        assert_eq!(created.reviewer_ids(), vec!["u3", "u4"]);
    }

    #[tokio::test]
    async fn test_create_never_assigns_author_or_inactive() {
        let store = InMemoryStore::new();
        seed_team(&store, "backend", &["u1", "u2", "u3"]).await;
        set_active(&store, "u2", false).await;
        let engine = engine(&store);
        let ctx = OperationContext::new();

        let created = engine
            .create_and_auto_assign(&ctx, "pr-1", "Add search", "u1", 5)
            .await
            .unwrap();

        assert_eq!(created.reviewer_ids(), vec!["u3"]);
    }

    #[tokio::test]
    async fn test_create_with_empty_pool_still_creates() {
        let store = InMemoryStore::new();
        seed_team(&store, "solo", &["u1"]).await;
        let engine = engine(&store);
        let ctx = OperationContext::new();

        let created = engine
            .create_pull_request(&ctx, "pr-1", "Lonely change", "u1")
            .await
            .unwrap();

        assert!(created.reviewers.is_empty());
        assert!(reviewers_of(&store, "pr-1").await.is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_author_and_duplicate_id() {
        let store = InMemoryStore::new();
        seed_team(&store, "backend", &["u1", "u2"]).await;
        let engine = engine(&store);
        let ctx = OperationContext::new();

        let err = engine
            .create_pull_request(&ctx, "pr-1", "Ghost", "nobody")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UserNotFound(_)));

        engine
            .create_pull_request(&ctx, "pr-1", "Real", "u1")
            .await
            .unwrap();
        let err = engine
            .create_pull_request(&ctx, "pr-1", "Again", "u2")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PullRequestExists(id) if id == "pr-1"));
        assert_eq!(reviewers_of(&store, "pr-1").await, vec!["u2"]);
    }

    #[tokio::test]
    async fn test_balanced_distribution_over_many_pull_requests() {
        let store = InMemoryStore::new();
        seed_team(&store, "backend", &["u1", "u2", "u3", "u4", "u5"]).await;
        let engine = engine(&store);
        let ctx = OperationContext::new();

        for n in 0..10 {
            let id = format!("pr-{n}");
            let created = engine
                .create_pull_request(&ctx, &id, "Change", "u1")
                .await
                .unwrap();
            assert_eq!(created.reviewers.len(), 2);
        }

        assert_eq!(open_reviews(&store, "u1").await, 0);
        for user in ["u2", "u3", "u4", "u5"] {
            assert_eq!(open_reviews(&store, user).await, 5, "workload of {user}");
        }
    }

    #[tokio::test]
    async fn test_auto_assign_skips_current_reviewers() {
        let store = InMemoryStore::new();
        seed_team(&store, "backend", &["u1", "u2", "u3"]).await;
        seed_pull_request(&store, "pr-1", "u1", &["u2"]).await;
        let engine = engine(&store);
        let ctx = OperationContext::new();

        let added = engine.auto_assign(&ctx, "pr-1", 2).await.unwrap();
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].user_id, "u3");

        let err = engine.auto_assign(&ctx, "pr-1", 1).await.unwrap_err();
        assert!(matches!(err, Error::NoEligibleReviewers(_)));
    }

    #[tokio::test]
    async fn test_assign_validation_order() {
        let store = InMemoryStore::new();
        seed_team(&store, "backend", &["u1", "u2", "u3"]).await;
        seed_pull_request(&store, "pr-1", "u1", &["u2"]).await;
        set_active(&store, "u3", false).await;
        let engine = engine(&store);
        let ctx = OperationContext::new();

        let err = engine.assign_reviewer(&ctx, "pr-9", "u3").await.unwrap_err();
        assert!(matches!(err, Error::PullRequestNotFound(_)));

        let err = engine.assign_reviewer(&ctx, "pr-1", "ghost").await.unwrap_err();
        assert!(matches!(err, Error::UserNotFound(_)));

        let err = engine.assign_reviewer(&ctx, "pr-1", "u3").await.unwrap_err();
        assert!(matches!(err, Error::UserInactive(_)));

        let err = engine.assign_reviewer(&ctx, "pr-1", "u1").await.unwrap_err();
        assert!(matches!(err, Error::CannotAssignAuthor { .. }));

        let err = engine.assign_reviewer(&ctx, "pr-1", "u2").await.unwrap_err();
        assert!(matches!(err, Error::AlreadyAssigned { .. }));
    }

    #[tokio::test]
    async fn test_assign_to_merged_rejected() {
        let store = InMemoryStore::new();
        seed_team(&store, "backend", &["u1", "u2", "u3"]).await;
        seed_pull_request(&store, "pr-1", "u1", &["u2"]).await;
        merge(&store, "pr-1").await;
        let engine = engine(&store);
        let ctx = OperationContext::new();

        let err = engine.assign_reviewer(&ctx, "pr-1", "u3").await.unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidState {
                status: PullRequestStatus::Merged,
                ..
            }
        ));
        let err = engine
            .replace_reviewer(&ctx, "pr-1", "u2", "u3")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState { .. }));
        let err = engine.remove_reviewer(&ctx, "pr-1", "u2").await.unwrap_err();
        assert!(matches!(err, Error::InvalidState { .. }));

        assert_eq!(reviewers_of(&store, "pr-1").await, vec!["u2"]);
    }

    #[tokio::test]
    async fn test_concurrent_assign_produces_one_edge() {
        let store = InMemoryStore::new();
        seed_team(&store, "backend", &["u1", "u2"]).await;
        seed_pull_request(&store, "pr-1", "u1", &[]).await;
        let engine = engine(&store);
        let ctx = OperationContext::new();

        let (a, b) = tokio::join!(
            engine.assign_reviewer(&ctx, "pr-1", "u2"),
            engine.assign_reviewer(&ctx, "pr-1", "u2"),
        );

        let outcomes = [a, b];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .any(|r| matches!(r, Err(Error::AlreadyAssigned { .. }))));
        assert_eq!(reviewers_of(&store, "pr-1").await, vec!["u2"]);
    }

    #[tokio::test]
    async fn test_replace_swaps_atomically() {
        let store = InMemoryStore::new();
        seed_team(&store, "backend", &["u1", "u2", "u3", "u4"]).await;
        seed_pull_request(&store, "pr-1", "u1", &["u2", "u3"]).await;
        let engine = engine(&store);
        let ctx = OperationContext::new();

        engine
            .replace_reviewer(&ctx, "pr-1", "u2", "u4")
            .await
            .unwrap();
        assert_eq!(reviewers_of(&store, "pr-1").await, vec!["u3", "u4"]);
    }

    #[tokio::test]
    async fn test_replace_failure_leaves_edges_untouched() {
        let store = InMemoryStore::new();
        seed_team(&store, "backend", &["u1", "u2", "u3", "u4"]).await;
        seed_pull_request(&store, "pr-1", "u1", &["u2", "u3"]).await;
        set_active(&store, "u4", false).await;
        let engine = engine(&store);
        let ctx = OperationContext::new();

        let err = engine
            .replace_reviewer(&ctx, "pr-1", "u4", "u2")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotAssigned { .. }));

        let err = engine
            .replace_reviewer(&ctx, "pr-1", "u2", "u4")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UserInactive(_)));

        let err = engine
            .replace_reviewer(&ctx, "pr-1", "u2", "u3")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyAssigned { .. }));

        let err = engine
            .replace_reviewer(&ctx, "pr-1", "u2", "u1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CannotAssignAuthor { .. }));

        assert_eq!(reviewers_of(&store, "pr-1").await, vec!["u2", "u3"]);
    }

    #[tokio::test]
    async fn test_reassign_picks_least_loaded_teammate() {
        let store = InMemoryStore::new();
        seed_team(&store, "backend", &["u1", "u2", "u3", "u4", "u5"]).await;
        seed_pull_request(&store, "pr-0", "u1", &["u4"]).await;
        seed_pull_request(&store, "pr-1", "u1", &["u2", "u3"]).await;
        let engine = engine(&store);
        let ctx = OperationContext::new();

        let assignment = engine.reassign_reviewer(&ctx, "pr-1", "u2").await.unwrap();
        assert_eq!(assignment.user_id, "u5");
        assert_eq!(reviewers_of(&store, "pr-1").await, vec!["u3", "u5"]);
    }

    #[tokio::test]
    async fn test_reassign_without_candidates() {
        let store = InMemoryStore::new();
        seed_team(&store, "backend", &["u1", "u2", "u3"]).await;
        seed_pull_request(&store, "pr-1", "u1", &["u2", "u3"]).await;
        let engine = engine(&store);
        let ctx = OperationContext::new();

        let err = engine.reassign_reviewer(&ctx, "pr-1", "u2").await.unwrap_err();
        assert!(matches!(err, Error::NoEligibleReviewers(_)));
        assert_eq!(reviewers_of(&store, "pr-1").await, vec!["u2", "u3"]);
    }

    #[tokio::test]
    async fn test_remove_does_not_top_up() {
        let store = InMemoryStore::new();
        seed_team(&store, "backend", &["u1", "u2", "u3", "u4"]).await;
        seed_pull_request(&store, "pr-1", "u1", &["u2", "u3"]).await;
        let engine = engine(&store);
        let ctx = OperationContext::new();

        engine.remove_reviewer(&ctx, "pr-1", "u2").await.unwrap();
        assert_eq!(reviewers_of(&store, "pr-1").await, vec!["u3"]);

        let err = engine.remove_reviewer(&ctx, "pr-1", "u2").await.unwrap_err();
        assert!(matches!(err, Error::NotAssigned { .. }));
    }

    #[tokio::test]
    async fn test_storage_failure_rolls_back_creation() {
        let store = InMemoryStore::new();
        seed_team(&store, "backend", &["u1", "u2", "u3"]).await;
        store.inject_failure("create_assignment").await;
        let engine = engine(&store);
        let ctx = OperationContext::new();

        let err = engine
            .create_pull_request(&ctx, "pr-1", "Add search", "u1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Storage(_)));

        store.clear_faults().await;
        let mut tx = store.begin().await.unwrap();
        let err = tx.pull_request_by_external_id("pr-1").await.unwrap_err();
        assert!(matches!(err, Error::PullRequestNotFound(_)));
    }

    #[tokio::test]
    async fn test_deadline_rolls_back_creation() {
        let store = InMemoryStore::new();
        seed_team(&store, "backend", &["u1", "u2", "u3"]).await;
        store.inject_stall("open_review_counts_by_user").await;
        let engine = engine(&store);
        let ctx = OperationContext::new().with_timeout(Duration::from_millis(20));

        let err = engine
            .create_pull_request(&ctx, "pr-1", "Add search", "u1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DeadlineExceeded));

        store.clear_faults().await;
        let mut tx = store.begin().await.unwrap();
        assert!(tx.pull_request_by_external_id("pr-1").await.is_err());
    }
}
