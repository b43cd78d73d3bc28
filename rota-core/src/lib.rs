//! Rota Core - reviewer assignment and workload balancing
//!
//! This crate picks reviewers for pull requests from the author's team,
//! keeps open-review workload even across team members, and heals
//! assignments when reviewers are deactivated.

pub mod balance;
pub mod config;
pub mod context;
pub mod directory;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod models;

#[cfg(test)]
mod testing;

pub use balance::{select_least_loaded, select_one_least_loaded, WorkloadIndex};
pub use config::{AssignmentConfig, Config, LogFormat};
pub use context::OperationContext;
pub use directory::{Directory, TeamUpsert};
pub use engine::{
    AssignmentEngine, HealingEngine, HealingReport, Removal, Replacement, TeamDeactivationReport,
};
pub use error::{Error, ErrorKind, Result};
pub use gateway::{settle, InMemoryStore, ReviewRepository, ReviewStore, ReviewTransaction};
pub use models::{
    AssignmentStats, InactiveReviewer, PullRequest, PullRequestStats, PullRequestStatus,
    PullRequestWithReviewers, ReviewerAssignment, Team, TeamMember, TeamStats, TeamWithMembers,
    User, UserWorkload,
};
