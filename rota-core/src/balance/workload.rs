//! Per-user open-review counts

use std::collections::HashMap;

use crate::gateway::ReviewRepository;
use crate::Result;

/// Snapshot of how many OPEN pull requests each user reviews.
///
/// Built fresh inside each operation's transaction and never written back.
/// Users absent from the snapshot have a workload of zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkloadIndex {
    counts: HashMap<String, i64>,
}

impl WorkloadIndex {
    /// Compute the index from the current reviewer edges
    pub async fn load<R>(repo: &mut R) -> Result<Self>
    where
        R: ReviewRepository + ?Sized,
    {
        let counts = repo.open_review_counts_by_user().await?;
        tracing::debug!(users = counts.len(), "Loaded workload index");
        Ok(Self { counts })
    }

    pub fn from_counts(counts: HashMap<String, i64>) -> Self {
        Self { counts }
    }

    pub fn workload(&self, user_id: &str) -> i64 {
        self.counts.get(user_id).copied().unwrap_or(0)
    }

    /// Account for an edge created later in the same operation
    pub fn record_assignment(&mut self, user_id: &str) {
        *self.counts.entry(user_id.to_string()).or_insert(0) += 1;
    }

    /// Account for an edge removed later in the same operation
    pub fn record_removal(&mut self, user_id: &str) {
        if let Some(count) = self.counts.get_mut(user_id) {
            *count = (*count - 1).max(0);
        }
    }
}
