//! Team, user and pull request management plus reporting queries

use std::sync::Arc;

use serde::Serialize;

use crate::context::OperationContext;
use crate::engine::{heal_user_reviews, HealingReport};
use crate::gateway::{settle, ReviewRepository, ReviewStore};
use crate::models::{
    AssignmentStats, PullRequest, PullRequestStats, PullRequestStatus, PullRequestWithReviewers,
    TeamMember, TeamStats, TeamWithMembers, User, UserWorkload,
};
use crate::Result;

/// Result of a team upsert
#[derive(Debug, Clone, Serialize)]
pub struct TeamUpsert {
    pub team: TeamWithMembers,
    /// Healing of members the upsert deactivated
    pub healing: HealingReport,
}

async fn upsert_team_in<R>(repo: &mut R, team_name: &str, members: &[TeamMember]) -> Result<TeamUpsert>
where
    R: ReviewRepository + ?Sized,
{
    let team = repo.ensure_team(team_name).await?;
    let mut healing = HealingReport::default();

    for member in members {
        let was_active = match repo.user_by_external_id(&member.user_id).await {
            Ok(existing) => existing.is_active,
            Err(crate::Error::UserNotFound(_)) => false,
            Err(e) => return Err(e),
        };

        let user = repo.upsert_user(team.id, member).await?;
        if was_active && !user.is_active {
            healing.merge(heal_user_reviews(repo, &user).await?);
        }
    }

    let members = repo.users_in_team(team.id).await?;
    tracing::info!(team_name, members = members.len(), "Upserted team");
    Ok(TeamUpsert {
        team: TeamWithMembers { team, members },
        healing,
    })
}

async fn pull_request_in<R>(repo: &mut R, pull_request_id: &str) -> Result<PullRequestWithReviewers>
where
    R: ReviewRepository + ?Sized,
{
    let pull_request = repo.pull_request_by_external_id(pull_request_id).await?;
    let reviewers = repo.reviewer_assignments_for(pull_request_id).await?;
    Ok(PullRequestWithReviewers {
        pull_request,
        reviewers,
    })
}

/// Management and reporting operations that sit beside the engines
pub struct Directory<S> {
    store: Arc<S>,
}

impl<S> Clone for Directory<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: ReviewStore> Directory<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Create the team if needed and create or update its members.
    ///
    /// Members switched from active to inactive are healed in the same
    /// transaction.
    pub async fn upsert_team(
        &self,
        ctx: &OperationContext,
        team_name: &str,
        members: &[TeamMember],
    ) -> Result<TeamUpsert> {
        ctx.run(async {
            let mut tx = self.store.begin().await?;
            let outcome = upsert_team_in(&mut tx, team_name, members).await;
            settle(tx, outcome).await
        })
        .await
    }

    pub async fn team(&self, ctx: &OperationContext, team_name: &str) -> Result<TeamWithMembers> {
        ctx.run(async {
            let mut tx = self.store.begin().await?;
            let team = tx.team_by_name(team_name).await?;
            let members = tx.users_in_team(team.id).await?;
            Ok(TeamWithMembers { team, members })
        })
        .await
    }

    pub async fn user(&self, ctx: &OperationContext, user_id: &str) -> Result<User> {
        ctx.run(async {
            let mut tx = self.store.begin().await?;
            tx.user_by_external_id(user_id).await
        })
        .await
    }

    /// Mark a user active again. Deactivation goes through the healing engine.
    pub async fn activate_user(&self, ctx: &OperationContext, user_id: &str) -> Result<User> {
        ctx.run(async {
            let mut tx = self.store.begin().await?;
            let outcome = tx.set_user_active(user_id, true).await;
            settle(tx, outcome).await
        })
        .await
    }

    /// Mark a pull request MERGED. Merging twice is not an error.
    pub async fn merge_pull_request(
        &self,
        ctx: &OperationContext,
        pull_request_id: &str,
    ) -> Result<PullRequestWithReviewers> {
        ctx.run(async {
            let mut tx = self.store.begin().await?;
            let outcome = match tx.merge_pull_request(pull_request_id).await {
                Ok(pr) => {
                    tracing::info!(pull_request_id, merged_at = ?pr.merged_at, "Merged pull request");
                    pull_request_in(&mut tx, pull_request_id).await
                }
                Err(e) => Err(e),
            };
            settle(tx, outcome).await
        })
        .await
    }

    pub async fn pull_request(
        &self,
        ctx: &OperationContext,
        pull_request_id: &str,
    ) -> Result<PullRequestWithReviewers> {
        ctx.run(async {
            let mut tx = self.store.begin().await?;
            pull_request_in(&mut tx, pull_request_id).await
        })
        .await
    }

    /// Pull requests of any status that the user reviews
    pub async fn reviews_of(&self, ctx: &OperationContext, user_id: &str) -> Result<Vec<PullRequest>> {
        ctx.run(async {
            let mut tx = self.store.begin().await?;
            tx.user_by_external_id(user_id).await?;
            tx.pull_requests_reviewed_by(user_id, None).await
        })
        .await
    }

    /// Pull requests with `status` in creation order
    pub async fn pull_requests_by_status(
        &self,
        ctx: &OperationContext,
        status: PullRequestStatus,
    ) -> Result<Vec<PullRequest>> {
        ctx.run(async {
            let mut tx = self.store.begin().await?;
            tx.pull_requests_by_status(status).await
        })
        .await
    }

    pub async fn user_workloads(&self, ctx: &OperationContext) -> Result<Vec<UserWorkload>> {
        ctx.run(async {
            let mut tx = self.store.begin().await?;
            tx.user_workloads().await
        })
        .await
    }

    pub async fn team_stats(&self, ctx: &OperationContext) -> Result<Vec<TeamStats>> {
        ctx.run(async {
            let mut tx = self.store.begin().await?;
            tx.team_stats().await
        })
        .await
    }

    pub async fn assignment_stats(&self, ctx: &OperationContext) -> Result<Vec<AssignmentStats>> {
        ctx.run(async {
            let mut tx = self.store.begin().await?;
            tx.assignment_stats().await
        })
        .await
    }

    pub async fn pull_request_stats(&self, ctx: &OperationContext) -> Result<Vec<PullRequestStats>> {
        ctx.run(async {
            let mut tx = self.store.begin().await?;
            tx.pull_request_stats().await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::InMemoryStore;
    use crate::testing::{reviewers_of, seed_pull_request, seed_team};
    use crate::Error;

    fn directory(store: &InMemoryStore) -> Directory<InMemoryStore> {
        Directory::new(Arc::new(store.clone()))
    }

    #[tokio::test]
    async fn test_upsert_creates_and_updates_members() {
        let store = InMemoryStore::new();
        let directory = directory(&store);
        let ctx = OperationContext::new();

        let created = directory
            .upsert_team(
                &ctx,
                "backend",
                &[TeamMember::new("u1", "Alice"), TeamMember::new("u2", "Bob")],
            )
            .await
            .unwrap();
        assert_eq!(created.team.members.len(), 2);

        let updated = directory
            .upsert_team(&ctx, "backend", &[TeamMember::new("u2", "Robert")])
            .await
            .unwrap();
        assert_eq!(updated.team.team.id, created.team.team.id);
        let bob = updated
            .team
            .members
            .iter()
            .find(|u| u.user_id == "u2")
            .unwrap();
        assert_eq!(bob.username, "Robert");
    }

    #[tokio::test]
    async fn test_upsert_moves_user_between_teams() {
        let store = InMemoryStore::new();
        let directory = directory(&store);
        let ctx = OperationContext::new();

        directory
            .upsert_team(&ctx, "backend", &[TeamMember::new("u1", "Alice")])
            .await
            .unwrap();
        directory
            .upsert_team(&ctx, "payments", &[TeamMember::new("u1", "Alice")])
            .await
            .unwrap();

        assert!(directory.team(&ctx, "backend").await.unwrap().members.is_empty());
        assert_eq!(directory.team(&ctx, "payments").await.unwrap().members.len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_deactivation_heals_reviews() {
        let store = InMemoryStore::new();
        seed_team(&store, "backend", &["u1", "u2", "u3"]).await;
        seed_pull_request(&store, "pr-1", "u1", &["u2"]).await;
        let directory = directory(&store);
        let ctx = OperationContext::new();

        let result = directory
            .upsert_team(
                &ctx,
                "backend",
                &[TeamMember::new("u2", "U2").with_active(false)],
            )
            .await
            .unwrap();

        assert_eq!(result.healing.reassigned(), 1);
        assert_eq!(reviewers_of(&store, "pr-1").await, vec!["u3"]);
    }

    #[tokio::test]
    async fn test_team_not_found() {
        let store = InMemoryStore::new();
        let directory = directory(&store);
        let err = directory
            .team(&OperationContext::new(), "nope")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TeamNotFound(_)));
    }

    #[tokio::test]
    async fn test_merge_is_idempotent_and_keeps_reviewers() {
        let store = InMemoryStore::new();
        seed_team(&store, "backend", &["u1", "u2"]).await;
        seed_pull_request(&store, "pr-1", "u1", &["u2"]).await;
        let directory = directory(&store);
        let ctx = OperationContext::new();

        let first = directory.merge_pull_request(&ctx, "pr-1").await.unwrap();
        let second = directory.merge_pull_request(&ctx, "pr-1").await.unwrap();

        assert_eq!(first.pull_request.status, PullRequestStatus::Merged);
        assert_eq!(first.pull_request.merged_at, second.pull_request.merged_at);
        assert_eq!(second.reviewer_ids(), vec!["u2"]);

        let err = directory.merge_pull_request(&ctx, "pr-9").await.unwrap_err();
        assert!(matches!(err, Error::PullRequestNotFound(_)));
    }

    #[tokio::test]
    async fn test_reviews_of_lists_every_status() {
        let store = InMemoryStore::new();
        seed_team(&store, "backend", &["u1", "u2"]).await;
        seed_pull_request(&store, "pr-1", "u1", &["u2"]).await;
        seed_pull_request(&store, "pr-2", "u1", &["u2"]).await;
        let directory = directory(&store);
        let ctx = OperationContext::new();
        directory.merge_pull_request(&ctx, "pr-1").await.unwrap();

        let reviews = directory.reviews_of(&ctx, "u2").await.unwrap();
        let ids: Vec<&str> = reviews.iter().map(|pr| pr.pull_request_id.as_str()).collect();
        assert_eq!(ids, vec!["pr-1", "pr-2"]);

        let err = directory.reviews_of(&ctx, "ghost").await.unwrap_err();
        assert!(matches!(err, Error::UserNotFound(_)));
    }

    #[tokio::test]
    async fn test_statistics() {
        let store = InMemoryStore::new();
        seed_team(&store, "backend", &["u1", "u2", "u3"]).await;
        seed_pull_request(&store, "pr-1", "u1", &["u2", "u3"]).await;
        seed_pull_request(&store, "pr-2", "u1", &["u2"]).await;
        let directory = directory(&store);
        let ctx = OperationContext::new();
        directory.merge_pull_request(&ctx, "pr-1").await.unwrap();

        let workloads = directory.user_workloads(&ctx).await.unwrap();
        assert_eq!(workloads[0].user_id, "u2");
        assert_eq!(workloads[0].open_reviews, 1);
        assert_eq!(workloads[0].team_name, "backend");

        let teams = directory.team_stats(&ctx).await.unwrap();
        assert_eq!(teams.len(), 1);
        assert_eq!(teams[0].total_members, 3);
        assert_eq!(teams[0].pull_requests_authored, 2);
        assert_eq!(teams[0].review_assignments, 3);

        let stats = directory.assignment_stats(&ctx).await.unwrap();
        let u2 = stats.iter().find(|s| s.user_id == "u2").unwrap();
        assert_eq!(u2.total_assignments, 2);
        assert_eq!(u2.open_assignments, 1);
        assert_eq!(u2.merged_assignments, 1);
    }

    #[tokio::test]
    async fn test_pull_requests_by_status() {
        let store = InMemoryStore::new();
        seed_team(&store, "backend", &["u1", "u2"]).await;
        for id in ["pr-1", "pr-2", "pr-3"] {
            seed_pull_request(&store, id, "u1", &["u2"]).await;
        }
        let directory = directory(&store);
        let ctx = OperationContext::new();
        directory.merge_pull_request(&ctx, "pr-2").await.unwrap();

        let open = directory
            .pull_requests_by_status(&ctx, PullRequestStatus::Open)
            .await
            .unwrap();
        let ids: Vec<&str> = open.iter().map(|pr| pr.pull_request_id.as_str()).collect();
        assert_eq!(ids, vec!["pr-1", "pr-3"]);

        let merged = directory
            .pull_requests_by_status(&ctx, PullRequestStatus::Merged)
            .await
            .unwrap();
        assert_eq!(merged.len(), 1);
        assert!(merged[0].merged_at.is_some());
    }

    #[tokio::test]
    async fn test_pull_request_stats() {
        let store = InMemoryStore::new();
        seed_team(&store, "backend", &["u1", "u2", "u3"]).await;
        seed_pull_request(&store, "pr-1", "u1", &["u2", "u3"]).await;
        seed_pull_request(&store, "pr-2", "u2", &[]).await;
        let directory = directory(&store);
        let ctx = OperationContext::new();
        directory.merge_pull_request(&ctx, "pr-1").await.unwrap();

        let stats = directory.pull_request_stats(&ctx).await.unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].pull_request_id, "pr-1");
        assert_eq!(stats[0].status, PullRequestStatus::Merged);
        assert_eq!(stats[0].reviewer_count, 2);
        assert_eq!(stats[1].author_id, "u2");
        assert_eq!(stats[1].reviewer_count, 0);
    }

    #[tokio::test]
    async fn test_activate_user() {
        let store = InMemoryStore::new();
        seed_team(&store, "backend", &["u1"]).await;
        crate::testing::set_active(&store, "u1", false).await;
        let directory = directory(&store);
        let ctx = OperationContext::new();

        let user = directory.activate_user(&ctx, "u1").await.unwrap();
        assert!(user.is_active);
    }
}
