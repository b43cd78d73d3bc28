//! Error types for Rota

use thiserror::Error;

use crate::models::PullRequestStatus;

/// Result type alias for Rota operations
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`]
///
/// Request-handling layers translate these into their own response codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Team, user or pull request absent
    NotFound,
    /// Duplicate assignment or duplicate pull request
    Conflict,
    /// Mutating a pull request that is not open, or an unknown status value
    InvalidState,
    /// Author self-assignment, inactive target, target not currently assigned
    InvalidAssignment,
    /// Eligible reviewer pool is empty
    NoEligibleCandidates,
    /// Caller deadline elapsed or operation was cancelled
    Interrupted,
    /// Persistence or environment failure not otherwise classified
    Upstream,
}

/// Error type for Rota operations
#[derive(Error, Debug)]
pub enum Error {
    /// Team does not exist
    #[error("Team '{0}' not found")]
    TeamNotFound(String),

    /// User does not exist
    #[error("User '{0}' not found")]
    UserNotFound(String),

    /// Pull request does not exist
    #[error("Pull request '{0}' not found")]
    PullRequestNotFound(String),

    /// Pull request id is already taken
    #[error("Pull request '{0}' already exists")]
    PullRequestExists(String),

    /// User is already a reviewer of the pull request
    #[error("User '{user_id}' is already assigned to pull request '{pull_request_id}'")]
    AlreadyAssigned {
        pull_request_id: String,
        user_id: String,
    },

    /// Storage rejected a write because of a uniqueness constraint
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Reviewer mutation on a pull request that is not open
    #[error("Pull request '{pull_request_id}' is {status}, reviewers can only change while OPEN")]
    InvalidState {
        pull_request_id: String,
        status: PullRequestStatus,
    },

    /// Unknown pull request status value
    #[error("Invalid pull request status: {0}")]
    InvalidStatus(String),

    /// The author cannot review their own pull request
    #[error("User '{user_id}' is the author of pull request '{pull_request_id}'")]
    CannotAssignAuthor {
        pull_request_id: String,
        user_id: String,
    },

    /// Inactive users cannot be assigned
    #[error("User '{0}' is inactive")]
    UserInactive(String),

    /// User is not a reviewer of the pull request
    #[error("User '{user_id}' is not assigned to pull request '{pull_request_id}'")]
    NotAssigned {
        pull_request_id: String,
        user_id: String,
    },

    /// No active team member is left to review
    #[error("No eligible reviewers for pull request '{0}'")]
    NoEligibleReviewers(String),

    /// Caller deadline elapsed before the operation finished
    #[error("Operation deadline exceeded")]
    DeadlineExceeded,

    /// Caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// Persistence failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::TeamNotFound(_) | Error::UserNotFound(_) | Error::PullRequestNotFound(_) => {
                ErrorKind::NotFound
            }
            Error::PullRequestExists(_) | Error::AlreadyAssigned { .. } | Error::Conflict(_) => {
                ErrorKind::Conflict
            }
            Error::InvalidState { .. } | Error::InvalidStatus(_) => ErrorKind::InvalidState,
            Error::CannotAssignAuthor { .. }
            | Error::UserInactive(_)
            | Error::NotAssigned { .. } => ErrorKind::InvalidAssignment,
            Error::NoEligibleReviewers(_) => ErrorKind::NoEligibleCandidates,
            Error::DeadlineExceeded | Error::Cancelled => ErrorKind::Interrupted,
            Error::Storage(_) | Error::Io(_) | Error::Config(_) => ErrorKind::Upstream,
        }
    }

    /// Map a storage uniqueness conflict on a reviewer edge to `AlreadyAssigned`
    pub(crate) fn into_assignment_conflict(self, pull_request_id: &str, user_id: &str) -> Self {
        match self {
            Error::Conflict(detail) => {
                tracing::debug!(%detail, pull_request_id, user_id, "Unique constraint hit on reviewer edge");
                Error::AlreadyAssigned {
                    pull_request_id: pull_request_id.to_string(),
                    user_id: user_id.to_string(),
                }
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(Error::UserNotFound("u1".into()).kind(), ErrorKind::NotFound);
        assert_eq!(
            Error::CannotAssignAuthor {
                pull_request_id: "pr-1".into(),
                user_id: "u1".into()
            }
            .kind(),
            ErrorKind::InvalidAssignment
        );
        assert_eq!(
            Error::InvalidState {
                pull_request_id: "pr-1".into(),
                status: PullRequestStatus::Merged
            }
            .kind(),
            ErrorKind::InvalidState
        );
        assert_eq!(Error::Storage("disk".into()).kind(), ErrorKind::Upstream);
        assert_eq!(Error::DeadlineExceeded.kind(), ErrorKind::Interrupted);
    }

    #[test]
    fn test_conflict_maps_to_already_assigned() {
        let err = Error::Conflict("UNIQUE constraint failed".into())
            .into_assignment_conflict("pr-1", "u2");
        match err {
            Error::AlreadyAssigned {
                pull_request_id,
                user_id,
            } => {
                assert_eq!(pull_request_id, "pr-1");
                assert_eq!(user_id, "u2");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = Error::Storage("io".into()).into_assignment_conflict("pr-1", "u2");
        assert!(matches!(err, Error::Storage(_)));
    }

    #[test]
    fn test_error_messages_carry_identifiers() {
        let err = Error::NotAssigned {
            pull_request_id: "pr-7".into(),
            user_id: "u9".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("pr-7"));
        assert!(msg.contains("u9"));
    }
}
