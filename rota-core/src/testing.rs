//! Seeding helpers shared by engine tests

use crate::gateway::{InMemoryStore, ReviewRepository, ReviewStore, ReviewTransaction};
use crate::models::TeamMember;

/// Create a team with active members
pub(crate) async fn seed_team(store: &InMemoryStore, team_name: &str, members: &[&str]) {
    let mut tx = store.begin().await.unwrap();
    let team = tx.ensure_team(team_name).await.unwrap();
    for id in members {
        tx.upsert_user(team.id, &TeamMember::new(*id, id.to_uppercase()))
            .await
            .unwrap();
    }
    tx.commit().await.unwrap();
}

/// Create an open pull request with the given reviewers
pub(crate) async fn seed_pull_request(
    store: &InMemoryStore,
    pull_request_id: &str,
    author_id: &str,
    reviewers: &[&str],
) {
    let mut tx = store.begin().await.unwrap();
    tx.create_pull_request(pull_request_id, pull_request_id, author_id)
        .await
        .unwrap();
    for reviewer in reviewers {
        tx.create_assignment(pull_request_id, reviewer).await.unwrap();
    }
    tx.commit().await.unwrap();
}

pub(crate) async fn set_active(store: &InMemoryStore, user_id: &str, is_active: bool) {
    let mut tx = store.begin().await.unwrap();
    tx.set_user_active(user_id, is_active).await.unwrap();
    tx.commit().await.unwrap();
}

pub(crate) async fn merge(store: &InMemoryStore, pull_request_id: &str) {
    let mut tx = store.begin().await.unwrap();
    tx.merge_pull_request(pull_request_id).await.unwrap();
    tx.commit().await.unwrap();
}

/// Committed reviewer ids of a pull request, in assignment order
pub(crate) async fn reviewers_of(store: &InMemoryStore, pull_request_id: &str) -> Vec<String> {
    let mut tx = store.begin().await.unwrap();
    tx.reviewer_assignments_for(pull_request_id)
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.user_id)
        .collect()
}

pub(crate) async fn is_active(store: &InMemoryStore, user_id: &str) -> bool {
    let mut tx = store.begin().await.unwrap();
    tx.user_by_external_id(user_id).await.unwrap().is_active
}

pub(crate) async fn open_reviews(store: &InMemoryStore, user_id: &str) -> i64 {
    let mut tx = store.begin().await.unwrap();
    tx.open_review_counts_by_user()
        .await
        .unwrap()
        .get(user_id)
        .copied()
        .unwrap_or(0)
}
