//! Least-loaded candidate selection

use super::WorkloadIndex;
use crate::models::User;

/// Pick up to `count` users with the smallest workloads.
///
/// The sort is stable, so users with equal workloads keep the order of
/// `candidates`. Callers filter eligibility beforehand.
pub fn select_least_loaded(candidates: &[User], index: &WorkloadIndex, count: usize) -> Vec<User> {
    let mut ranked: Vec<&User> = candidates.iter().collect();
    ranked.sort_by_key(|u| index.workload(&u.user_id));
    ranked.into_iter().take(count).cloned().collect()
}

/// Pick the single least-loaded user, the first one on ties
pub fn select_one_least_loaded(candidates: &[User], index: &WorkloadIndex) -> Option<User> {
    candidates
        .iter()
        .min_by_key(|u| index.workload(&u.user_id))
        .cloned()
}
