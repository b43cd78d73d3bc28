//! Repairing reviewer assignments after users are deactivated
//!
//! Two passes exist. Reviewer-level healing swaps one deactivated reviewer for
//! the least-loaded active teammate on each of their open pull requests. The
//! team cascade deactivates a whole team, strips every inactive reviewer from
//! open pull requests in bulk and tops each one back up from the author's team.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use super::assignment::eligible_reviewers;
use crate::balance::{select_least_loaded, select_one_least_loaded, WorkloadIndex};
use crate::config::AssignmentConfig;
use crate::context::OperationContext;
use crate::gateway::{settle, ReviewRepository, ReviewStore};
use crate::models::{PullRequestStatus, User};
use crate::Result;

/// One reviewer edge swapped for another
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Replacement {
    pub pull_request_id: String,
    pub old_user_id: String,
    pub new_user_id: String,
}

/// One reviewer edge dropped because no replacement was eligible
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Removal {
    pub pull_request_id: String,
    pub user_id: String,
}

/// Outcome of reviewer-level healing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HealingReport {
    pub replacements: Vec<Replacement>,
    pub removals: Vec<Removal>,
}

impl HealingReport {
    /// Number of edges that received a new reviewer
    pub fn reassigned(&self) -> usize {
        self.replacements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replacements.is_empty() && self.removals.is_empty()
    }

    pub(crate) fn merge(&mut self, other: HealingReport) {
        self.replacements.extend(other.replacements);
        self.removals.extend(other.removals);
    }
}

/// Outcome of a team cascade
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamDeactivationReport {
    pub team_name: String,

    /// Users whose active flag changed in this pass
    pub deactivated_users: usize,

    /// Reviewer slots filled during top-up, counted per edge
    pub reassigned: usize,

    /// Affected open pull requests still below the minimum after top-up
    pub under_reviewed: Vec<String>,
}

/// Replace `user_id` on every open pull request they review, or remove the
/// edge when their team has no eligible member left.
pub(crate) async fn heal_user_reviews<R>(repo: &mut R, user: &User) -> Result<HealingReport>
where
    R: ReviewRepository + ?Sized,
{
    let reviews = repo
        .pull_requests_reviewed_by(&user.user_id, Some(PullRequestStatus::Open))
        .await?;
    if reviews.is_empty() {
        return Ok(HealingReport::default());
    }

    let mut index = WorkloadIndex::load(repo).await?;
    let mut report = HealingReport::default();

    for pr in &reviews {
        let pool = eligible_reviewers(repo, user.team_id, &pr.pull_request_id, &pr.author_id).await?;
        match select_one_least_loaded(&pool, &index) {
            Some(replacement) => {
                repo.replace_assignment(&pr.pull_request_id, &user.user_id, &replacement.user_id)
                    .await
                    .map_err(|e| {
                        e.into_assignment_conflict(&pr.pull_request_id, &replacement.user_id)
                    })?;
                index.record_removal(&user.user_id);
                index.record_assignment(&replacement.user_id);
                tracing::debug!(
                    pull_request_id = %pr.pull_request_id,
                    old_user_id = %user.user_id,
                    new_user_id = %replacement.user_id,
                    "Replaced inactive reviewer"
                );
                report.replacements.push(Replacement {
                    pull_request_id: pr.pull_request_id.clone(),
                    old_user_id: user.user_id.clone(),
                    new_user_id: replacement.user_id,
                });
            }
            None => {
                repo.delete_assignment(&pr.pull_request_id, &user.user_id)
                    .await?;
                index.record_removal(&user.user_id);
                tracing::warn!(
                    pull_request_id = %pr.pull_request_id,
                    user_id = %user.user_id,
                    "No replacement available, removed inactive reviewer"
                );
                report.removals.push(Removal {
                    pull_request_id: pr.pull_request_id.clone(),
                    user_id: user.user_id.clone(),
                });
            }
        }
    }

    tracing::info!(
        user_id = %user.user_id,
        replaced = report.replacements.len(),
        removed = report.removals.len(),
        "Healed reviews of deactivated user"
    );
    Ok(report)
}

/// Deactivate `user_id` and heal their open reviews
async fn deactivate_and_heal_in<R>(repo: &mut R, user_id: &str) -> Result<(User, HealingReport)>
where
    R: ReviewRepository + ?Sized,
{
    let user = repo.deactivate_user(user_id).await?;
    let report = heal_user_reviews(repo, &user).await?;
    Ok((user, report))
}

async fn heal_after_user_in<R>(repo: &mut R, user_id: &str) -> Result<HealingReport>
where
    R: ReviewRepository + ?Sized,
{
    let user = repo.user_by_external_id(user_id).await?;
    if user.is_active {
        tracing::debug!(user_id, "User is active, nothing to heal");
        return Ok(HealingReport::default());
    }
    heal_user_reviews(repo, &user).await
}

async fn heal_inactive_in<R>(repo: &mut R) -> Result<HealingReport>
where
    R: ReviewRepository + ?Sized,
{
    let mut inactive: Vec<String> = repo
        .open_prs_with_inactive_reviewers()
        .await?
        .into_iter()
        .map(|row| row.inactive_user_id)
        .collect();
    inactive.sort();
    inactive.dedup();

    let mut report = HealingReport::default();
    for user_id in &inactive {
        let user = repo.user_by_external_id(user_id).await?;
        report.merge(heal_user_reviews(repo, &user).await?);
    }
    Ok(report)
}

async fn cascade_in<R>(
    repo: &mut R,
    team_name: &str,
    min_reviewers: usize,
) -> Result<TeamDeactivationReport>
where
    R: ReviewRepository + ?Sized,
{
    let team = repo.team_by_name(team_name).await?;
    let deactivated = repo.deactivate_all_users_in_team(team.id).await?;
    tracing::info!(
        team_name,
        deactivated = deactivated.len(),
        "Deactivated team members"
    );

    // Group inactive edges by pull request, keeping the author alongside
    let mut affected: BTreeMap<String, (String, Vec<String>)> = BTreeMap::new();
    for row in repo.open_prs_with_inactive_reviewers().await? {
        affected
            .entry(row.pull_request_id)
            .or_insert_with(|| (row.author_id, Vec::new()))
            .1
            .push(row.inactive_user_id);
    }

    for (pull_request_id, (_, inactive)) in &affected {
        let removed = repo.delete_assignments(pull_request_id, inactive).await?;
        tracing::debug!(%pull_request_id, removed, "Removed inactive reviewers");
    }

    let mut index = WorkloadIndex::load(repo).await?;
    let mut reassigned = 0;
    let mut under_reviewed = Vec::new();

    for (pull_request_id, (author_id, _)) in &affected {
        let current = repo.reviewer_assignments_for(pull_request_id).await?.len();
        if current < min_reviewers {
            let author = repo.user_by_external_id(author_id).await?;
            let pool = eligible_reviewers(repo, author.team_id, pull_request_id, author_id).await?;
            let picked = select_least_loaded(&pool, &index, min_reviewers - current);

            for reviewer in &picked {
                repo.create_assignment(pull_request_id, &reviewer.user_id)
                    .await
                    .map_err(|e| e.into_assignment_conflict(pull_request_id, &reviewer.user_id))?;
                index.record_assignment(&reviewer.user_id);
                reassigned += 1;
            }

            if current + picked.len() < min_reviewers {
                tracing::warn!(
                    %pull_request_id,
                    reviewers = current + picked.len(),
                    min_reviewers,
                    "Pull request left under-reviewed"
                );
                under_reviewed.push(pull_request_id.clone());
            }
        }
    }

    tracing::info!(
        team_name,
        affected = affected.len(),
        reassigned,
        under_reviewed = under_reviewed.len(),
        "Team cascade complete"
    );
    Ok(TeamDeactivationReport {
        team_name: team.team_name,
        deactivated_users: deactivated.len(),
        reassigned,
        under_reviewed,
    })
}

/// Heals reviewer assignments after deactivations
pub struct HealingEngine<S> {
    store: Arc<S>,
    config: AssignmentConfig,
}

impl<S> Clone for HealingEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config,
        }
    }
}

impl<S: ReviewStore> HealingEngine<S> {
    pub fn new(store: Arc<S>, config: AssignmentConfig) -> Self {
        Self { store, config }
    }

    /// Heal the open reviews of a user who is already inactive.
    ///
    /// A user who is still active has nothing to heal.
    pub async fn heal_after_user_deactivation(
        &self,
        ctx: &OperationContext,
        user_id: &str,
    ) -> Result<HealingReport> {
        ctx.run(async {
            let mut tx = self.store.begin().await?;
            let outcome = heal_after_user_in(&mut tx, user_id).await;
            settle(tx, outcome).await
        })
        .await
    }

    /// Deactivate a user and heal their open reviews in one transaction
    pub async fn deactivate_user(
        &self,
        ctx: &OperationContext,
        user_id: &str,
    ) -> Result<(User, HealingReport)> {
        ctx.run(async {
            let mut tx = self.store.begin().await?;
            let outcome = deactivate_and_heal_in(&mut tx, user_id).await;
            settle(tx, outcome).await
        })
        .await
    }

    /// Heal every inactive reviewer still sitting on an open pull request
    pub async fn heal_inactive_reviewers(&self, ctx: &OperationContext) -> Result<HealingReport> {
        ctx.run(async {
            let mut tx = self.store.begin().await?;
            let outcome = heal_inactive_in(&mut tx).await;
            settle(tx, outcome).await
        })
        .await
    }

    /// Deactivate every member of a team and top affected pull requests back
    /// up to the configured minimum from their authors' teams
    pub async fn heal_after_team_deactivation(
        &self,
        ctx: &OperationContext,
        team_name: &str,
    ) -> Result<TeamDeactivationReport> {
        ctx.run(async {
            let mut tx = self.store.begin().await?;
            let outcome = cascade_in(&mut tx, team_name, self.config.min_reviewers).await;
            settle(tx, outcome).await
        })
        .await
    }
}
