//! In-memory persistence gateway
//!
//! Transactions are serialised by an owned mutex guard and work on a private
//! copy of the state. `commit` writes the copy back; dropping the transaction
//! discards it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{ReviewRepository, ReviewStore, ReviewTransaction};
use crate::models::{
    AssignmentStats, InactiveReviewer, PullRequest, PullRequestStats, PullRequestStatus,
    ReviewerAssignment, Team, TeamMember, TeamStats, User, UserWorkload,
};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    Fail,
    Stall,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    teams: BTreeMap<i64, Team>,
    users: BTreeMap<String, User>,
    /// Insertion order doubles as creation order
    pull_requests: Vec<PullRequest>,
    /// Insertion order doubles as assignment order
    assignments: Vec<ReviewerAssignment>,
    next_team_id: i64,
    faults: HashMap<String, Fault>,
}

impl MemoryState {
    fn pull_request(&self, pull_request_id: &str) -> Option<&PullRequest> {
        self.pull_requests
            .iter()
            .find(|pr| pr.pull_request_id == pull_request_id)
    }

    fn is_assigned(&self, pull_request_id: &str, user_id: &str) -> bool {
        self.assignments
            .iter()
            .any(|a| a.pull_request_id == pull_request_id && a.user_id == user_id)
    }

    fn is_open(&self, pull_request_id: &str) -> bool {
        self.pull_request(pull_request_id)
            .is_some_and(PullRequest::is_open)
    }

    fn team_name(&self, team_id: i64) -> String {
        self.teams
            .get(&team_id)
            .map(|t| t.team_name.clone())
            .unwrap_or_default()
    }

    fn insert_assignment(&mut self, pull_request_id: &str, user_id: &str) -> Result<ReviewerAssignment> {
        let pr = self
            .pull_request(pull_request_id)
            .ok_or_else(|| foreign_key_violation("pull_request_id"))?;
        if !self.users.contains_key(user_id) {
            return Err(foreign_key_violation("user_id"));
        }
        if pr.author_id == user_id {
            return Err(Error::Storage(
                "author cannot be assigned as a reviewer".to_string(),
            ));
        }
        if self.is_assigned(pull_request_id, user_id) {
            return Err(Error::Conflict(
                "UNIQUE constraint failed: pr_reviewers.pull_request_id, pr_reviewers.user_id"
                    .to_string(),
            ));
        }

        let assignment = ReviewerAssignment {
            pull_request_id: pull_request_id.to_string(),
            user_id: user_id.to_string(),
            assigned_at: Utc::now(),
        };
        self.assignments.push(assignment.clone());
        Ok(assignment)
    }
}

fn foreign_key_violation(column: &str) -> Error {
    Error::Storage(format!("FOREIGN KEY constraint failed: {}", column))
}

/// Gateway backed by process memory, used by engine tests and ephemeral runs
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the named gateway operation fail with a storage error
    pub async fn inject_failure(&self, operation: &str) {
        self.state
            .lock()
            .await
            .faults
            .insert(operation.to_string(), Fault::Fail);
    }

    /// Make the named gateway operation never complete
    pub async fn inject_stall(&self, operation: &str) {
        self.state
            .lock()
            .await
            .faults
            .insert(operation.to_string(), Fault::Stall);
    }

    pub async fn clear_faults(&self) {
        self.state.lock().await.faults.clear();
    }
}

#[async_trait]
impl ReviewStore for InMemoryStore {
    type Tx = InMemoryTransaction;

    async fn begin(&self) -> Result<Self::Tx> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(InMemoryTransaction { guard, working })
    }
}

/// Exclusive unit of work over an [`InMemoryStore`]
pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

impl InMemoryTransaction {
    async fn check(&self, operation: &str) -> Result<()> {
        match self.working.faults.get(operation) {
            Some(Fault::Fail) => Err(Error::Storage(format!("injected failure in {}", operation))),
            Some(Fault::Stall) => {
                std::future::pending::<()>().await;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ReviewTransaction for InMemoryTransaction {
    async fn commit(self) -> Result<()> {
        let Self { mut guard, working } = self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl ReviewRepository for InMemoryTransaction {
    async fn ensure_team(&mut self, team_name: &str) -> Result<Team> {
        self.check("ensure_team").await?;
        if let Some(team) = self.working.teams.values().find(|t| t.team_name == team_name) {
            return Ok(team.clone());
        }

        self.working.next_team_id += 1;
        let team = Team {
            id: self.working.next_team_id,
            team_name: team_name.to_string(),
            created_at: Utc::now(),
        };
        self.working.teams.insert(team.id, team.clone());
        Ok(team)
    }

    async fn team_by_name(&mut self, team_name: &str) -> Result<Team> {
        self.check("team_by_name").await?;
        self.working
            .teams
            .values()
            .find(|t| t.team_name == team_name)
            .cloned()
            .ok_or_else(|| Error::TeamNotFound(team_name.to_string()))
    }

    async fn user_by_external_id(&mut self, user_id: &str) -> Result<User> {
        self.check("user_by_external_id").await?;
        self.working
            .users
            .get(user_id)
            .cloned()
            .ok_or_else(|| Error::UserNotFound(user_id.to_string()))
    }

    async fn upsert_user(&mut self, team_id: i64, member: &TeamMember) -> Result<User> {
        self.check("upsert_user").await?;
        if !self.working.teams.contains_key(&team_id) {
            return Err(foreign_key_violation("team_id"));
        }

        let now = Utc::now();
        let user = self
            .working
            .users
            .entry(member.user_id.clone())
            .and_modify(|u| {
                u.username = member.username.clone();
                u.team_id = team_id;
                u.is_active = member.is_active;
                u.updated_at = now;
            })
            .or_insert_with(|| User {
                user_id: member.user_id.clone(),
                username: member.username.clone(),
                team_id,
                is_active: member.is_active,
                created_at: now,
                updated_at: now,
            });
        Ok(user.clone())
    }

    async fn users_in_team(&mut self, team_id: i64) -> Result<Vec<User>> {
        self.check("users_in_team").await?;
        Ok(self
            .working
            .users
            .values()
            .filter(|u| u.team_id == team_id)
            .cloned()
            .collect())
    }

    async fn active_users_in_team(
        &mut self,
        team_id: i64,
        exclude_user_id: Option<&str>,
    ) -> Result<Vec<User>> {
        self.check("active_users_in_team").await?;
        Ok(self
            .working
            .users
            .values()
            .filter(|u| u.team_id == team_id && u.is_active)
            .filter(|u| exclude_user_id != Some(u.user_id.as_str()))
            .cloned()
            .collect())
    }

    async fn set_user_active(&mut self, user_id: &str, is_active: bool) -> Result<User> {
        self.check("set_user_active").await?;
        let user = self
            .working
            .users
            .get_mut(user_id)
            .ok_or_else(|| Error::UserNotFound(user_id.to_string()))?;
        user.is_active = is_active;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn deactivate_all_users_in_team(&mut self, team_id: i64) -> Result<Vec<User>> {
        self.check("deactivate_all_users_in_team").await?;
        let now = Utc::now();
        let mut changed = Vec::new();
        for user in self.working.users.values_mut() {
            if user.team_id == team_id && user.is_active {
                user.is_active = false;
                user.updated_at = now;
                changed.push(user.clone());
            }
        }
        Ok(changed)
    }

    async fn create_pull_request(
        &mut self,
        pull_request_id: &str,
        pull_request_name: &str,
        author_id: &str,
    ) -> Result<PullRequest> {
        self.check("create_pull_request").await?;
        if self.working.pull_request(pull_request_id).is_some() {
            return Err(Error::PullRequestExists(pull_request_id.to_string()));
        }
        if !self.working.users.contains_key(author_id) {
            return Err(foreign_key_violation("author_id"));
        }

        let pr = PullRequest {
            pull_request_id: pull_request_id.to_string(),
            pull_request_name: pull_request_name.to_string(),
            author_id: author_id.to_string(),
            status: PullRequestStatus::Open,
            created_at: Utc::now(),
            merged_at: None,
        };
        self.working.pull_requests.push(pr.clone());
        Ok(pr)
    }

    async fn pull_request_by_external_id(&mut self, pull_request_id: &str) -> Result<PullRequest> {
        self.check("pull_request_by_external_id").await?;
        self.working
            .pull_request(pull_request_id)
            .cloned()
            .ok_or_else(|| Error::PullRequestNotFound(pull_request_id.to_string()))
    }

    async fn merge_pull_request(&mut self, pull_request_id: &str) -> Result<PullRequest> {
        self.check("merge_pull_request").await?;
        let pr = self
            .working
            .pull_requests
            .iter_mut()
            .find(|pr| pr.pull_request_id == pull_request_id)
            .ok_or_else(|| Error::PullRequestNotFound(pull_request_id.to_string()))?;
        if pr.is_open() {
            pr.status = PullRequestStatus::Merged;
            pr.merged_at = Some(Utc::now());
        }
        Ok(pr.clone())
    }

    async fn pull_requests_reviewed_by(
        &mut self,
        user_id: &str,
        status: Option<PullRequestStatus>,
    ) -> Result<Vec<PullRequest>> {
        self.check("pull_requests_reviewed_by").await?;
        let state = &self.working;
        Ok(state
            .pull_requests
            .iter()
            .filter(|pr| status.map_or(true, |s| pr.status == s))
            .filter(|pr| state.is_assigned(&pr.pull_request_id, user_id))
            .cloned()
            .collect())
    }

    async fn pull_requests_by_status(
        &mut self,
        status: PullRequestStatus,
    ) -> Result<Vec<PullRequest>> {
        self.check("pull_requests_by_status").await?;
        Ok(self
            .working
            .pull_requests
            .iter()
            .filter(|pr| pr.status == status)
            .cloned()
            .collect())
    }

    async fn is_user_assigned(&mut self, pull_request_id: &str, user_id: &str) -> Result<bool> {
        self.check("is_user_assigned").await?;
        Ok(self.working.is_assigned(pull_request_id, user_id))
    }

    async fn reviewer_assignments_for(
        &mut self,
        pull_request_id: &str,
    ) -> Result<Vec<ReviewerAssignment>> {
        self.check("reviewer_assignments_for").await?;
        Ok(self
            .working
            .assignments
            .iter()
            .filter(|a| a.pull_request_id == pull_request_id)
            .cloned()
            .collect())
    }

    async fn create_assignment(
        &mut self,
        pull_request_id: &str,
        user_id: &str,
    ) -> Result<ReviewerAssignment> {
        self.check("create_assignment").await?;
        self.working.insert_assignment(pull_request_id, user_id)
    }

    async fn delete_assignment(&mut self, pull_request_id: &str, user_id: &str) -> Result<bool> {
        self.check("delete_assignment").await?;
        let before = self.working.assignments.len();
        self.working
            .assignments
            .retain(|a| !(a.pull_request_id == pull_request_id && a.user_id == user_id));
        Ok(self.working.assignments.len() < before)
    }

    async fn delete_assignments(
        &mut self,
        pull_request_id: &str,
        user_ids: &[String],
    ) -> Result<u64> {
        self.check("delete_assignments").await?;
        let before = self.working.assignments.len();
        self.working
            .assignments
            .retain(|a| !(a.pull_request_id == pull_request_id && user_ids.contains(&a.user_id)));
        Ok((before - self.working.assignments.len()) as u64)
    }

    async fn replace_assignment(
        &mut self,
        pull_request_id: &str,
        old_user_id: &str,
        new_user_id: &str,
    ) -> Result<ReviewerAssignment> {
        self.check("replace_assignment").await?;
        let position = self
            .working
            .assignments
            .iter()
            .position(|a| a.pull_request_id == pull_request_id && a.user_id == old_user_id)
            .ok_or_else(|| Error::NotAssigned {
                pull_request_id: pull_request_id.to_string(),
                user_id: old_user_id.to_string(),
            })?;

        let removed = self.working.assignments.remove(position);
        match self.working.insert_assignment(pull_request_id, new_user_id) {
            Ok(assignment) => Ok(assignment),
            Err(err) => {
                self.working.assignments.insert(position, removed);
                Err(err)
            }
        }
    }

    async fn open_review_counts_by_user(&mut self) -> Result<HashMap<String, i64>> {
        self.check("open_review_counts_by_user").await?;
        let mut counts = HashMap::new();
        for assignment in &self.working.assignments {
            if self.working.is_open(&assignment.pull_request_id) {
                *counts.entry(assignment.user_id.clone()).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    async fn open_prs_with_inactive_reviewers(&mut self) -> Result<Vec<InactiveReviewer>> {
        self.check("open_prs_with_inactive_reviewers").await?;
        let state = &self.working;
        let mut rows: Vec<InactiveReviewer> = state
            .assignments
            .iter()
            .filter_map(|a| {
                let pr = state.pull_request(&a.pull_request_id).filter(|pr| pr.is_open())?;
                let user = state.users.get(&a.user_id).filter(|u| !u.is_active)?;
                Some(InactiveReviewer {
                    pull_request_id: pr.pull_request_id.clone(),
                    author_id: pr.author_id.clone(),
                    inactive_user_id: user.user_id.clone(),
                    team_id: user.team_id,
                })
            })
            .collect();
        rows.sort_by(|a, b| {
            (&a.pull_request_id, &a.inactive_user_id).cmp(&(&b.pull_request_id, &b.inactive_user_id))
        });
        Ok(rows)
    }

    async fn user_workloads(&mut self) -> Result<Vec<UserWorkload>> {
        self.check("user_workloads").await?;
        let counts = self.open_review_counts_by_user().await?;
        let state = &self.working;
        let mut workloads: Vec<UserWorkload> = state
            .users
            .values()
            .map(|u| UserWorkload {
                user_id: u.user_id.clone(),
                username: u.username.clone(),
                team_name: state.team_name(u.team_id),
                is_active: u.is_active,
                open_reviews: counts.get(&u.user_id).copied().unwrap_or(0),
            })
            .collect();
        workloads.sort_by(|a, b| {
            b.open_reviews
                .cmp(&a.open_reviews)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        Ok(workloads)
    }

    async fn team_stats(&mut self) -> Result<Vec<TeamStats>> {
        self.check("team_stats").await?;
        let state = &self.working;
        let mut stats: Vec<TeamStats> = state
            .teams
            .values()
            .map(|team| {
                let members: Vec<&User> =
                    state.users.values().filter(|u| u.team_id == team.id).collect();
                let pull_requests_authored = state
                    .pull_requests
                    .iter()
                    .filter(|pr| members.iter().any(|m| m.user_id == pr.author_id))
                    .count();
                let review_assignments = state
                    .assignments
                    .iter()
                    .filter(|a| members.iter().any(|m| m.user_id == a.user_id))
                    .count();
                TeamStats {
                    team_name: team.team_name.clone(),
                    total_members: members.len() as i64,
                    active_members: members.iter().filter(|m| m.is_active).count() as i64,
                    pull_requests_authored: pull_requests_authored as i64,
                    review_assignments: review_assignments as i64,
                }
            })
            .collect();
        stats.sort_by(|a, b| a.team_name.cmp(&b.team_name));
        Ok(stats)
    }

    async fn assignment_stats(&mut self) -> Result<Vec<AssignmentStats>> {
        self.check("assignment_stats").await?;
        let state = &self.working;
        let mut stats: Vec<AssignmentStats> = state
            .users
            .values()
            .map(|u| {
                let mut total = 0;
                let mut open = 0;
                let mut merged = 0;
                for a in state.assignments.iter().filter(|a| a.user_id == u.user_id) {
                    total += 1;
                    match state.pull_request(&a.pull_request_id).map(|pr| pr.status) {
                        Some(PullRequestStatus::Open) => open += 1,
                        Some(PullRequestStatus::Merged) => merged += 1,
                        None => {}
                    }
                }
                AssignmentStats {
                    user_id: u.user_id.clone(),
                    username: u.username.clone(),
                    total_assignments: total,
                    open_assignments: open,
                    merged_assignments: merged,
                }
            })
            .collect();
        stats.sort_by(|a, b| {
            b.total_assignments
                .cmp(&a.total_assignments)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        Ok(stats)
    }

    async fn pull_request_stats(&mut self) -> Result<Vec<PullRequestStats>> {
        self.check("pull_request_stats").await?;
        let state = &self.working;
        Ok(state
            .pull_requests
            .iter()
            .map(|pr| PullRequestStats {
                pull_request_id: pr.pull_request_id.clone(),
                pull_request_name: pr.pull_request_name.clone(),
                author_id: pr.author_id.clone(),
                status: pr.status,
                reviewer_count: state
                    .assignments
                    .iter()
                    .filter(|a| a.pull_request_id == pr.pull_request_id)
                    .count() as i64,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let team = tx.ensure_team("backend").await.unwrap();
        for (id, name) in [("u1", "Alice"), ("u2", "Bob"), ("u3", "Carol")] {
            tx.upsert_user(team.id, &TeamMember::new(id, name)).await.unwrap();
        }
        tx.create_pull_request("pr-1", "Add search", "u1").await.unwrap();
        tx.commit().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_dropped_transaction_discards_writes() {
        let store = seeded().await;

        {
            let mut tx = store.begin().await.unwrap();
            tx.create_assignment("pr-1", "u2").await.unwrap();
            assert!(tx.is_user_assigned("pr-1", "u2").await.unwrap());
        }

        let mut tx = store.begin().await.unwrap();
        assert!(!tx.is_user_assigned("pr-1", "u2").await.unwrap());
    }

    #[tokio::test]
    async fn test_commit_publishes_writes() {
        let store = seeded().await;

        let mut tx = store.begin().await.unwrap();
        tx.create_assignment("pr-1", "u2").await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let edges = tx.reviewer_assignments_for("pr-1").await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].user_id, "u2");
    }

    #[tokio::test]
    async fn test_duplicate_edge_is_conflict() {
        let store = seeded().await;
        let mut tx = store.begin().await.unwrap();
        tx.create_assignment("pr-1", "u2").await.unwrap();

        let err = tx.create_assignment("pr-1", "u2").await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn test_author_edge_rejected() {
        let store = seeded().await;
        let mut tx = store.begin().await.unwrap();

        let err = tx.create_assignment("pr-1", "u1").await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[tokio::test]
    async fn test_replace_assignment_requires_old_edge() {
        let store = seeded().await;
        let mut tx = store.begin().await.unwrap();

        let err = tx.replace_assignment("pr-1", "u2", "u3").await.unwrap_err();
        assert!(matches!(err, Error::NotAssigned { .. }));

        tx.create_assignment("pr-1", "u2").await.unwrap();
        tx.replace_assignment("pr-1", "u2", "u3").await.unwrap();
        assert!(!tx.is_user_assigned("pr-1", "u2").await.unwrap());
        assert!(tx.is_user_assigned("pr-1", "u3").await.unwrap());
    }

    #[tokio::test]
    async fn test_open_review_counts_ignore_merged() {
        let store = seeded().await;
        let mut tx = store.begin().await.unwrap();
        tx.create_pull_request("pr-2", "Fix cache", "u1").await.unwrap();
        tx.create_assignment("pr-1", "u2").await.unwrap();
        tx.create_assignment("pr-2", "u2").await.unwrap();
        tx.merge_pull_request("pr-2").await.unwrap();

        let counts = tx.open_review_counts_by_user().await.unwrap();
        assert_eq!(counts.get("u2"), Some(&1));
        assert_eq!(counts.get("u3"), None);
    }

    #[tokio::test]
    async fn test_merge_sets_merged_at_once() {
        let store = seeded().await;
        let mut tx = store.begin().await.unwrap();

        let first = tx.merge_pull_request("pr-1").await.unwrap();
        let second = tx.merge_pull_request("pr-1").await.unwrap();
        assert_eq!(first.status, PullRequestStatus::Merged);
        assert!(first.merged_at.is_some());
        assert_eq!(first.merged_at, second.merged_at);
    }

    #[tokio::test]
    async fn test_deactivate_all_returns_changed_only() {
        let store = seeded().await;
        let mut tx = store.begin().await.unwrap();
        tx.deactivate_user("u3").await.unwrap();

        let team = tx.team_by_name("backend").await.unwrap();
        let changed = tx.deactivate_all_users_in_team(team.id).await.unwrap();
        let ids: Vec<&str> = changed.iter().map(|u| u.user_id.as_str()).collect();
        assert_eq!(ids, vec!["u1", "u2"]);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let store = seeded().await;
        store.inject_failure("create_assignment").await;

        let mut tx = store.begin().await.unwrap();
        let err = tx.create_assignment("pr-1", "u2").await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }
}
