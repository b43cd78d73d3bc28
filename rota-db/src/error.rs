//! Error types for database operations

use thiserror::Error;

/// Database error types
#[derive(Error, Debug)]
pub enum Error {
    /// SQLx database error
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored value that does not decode into a domain type
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl Error {
    fn is_unique_violation(&self) -> bool {
        match self {
            Error::Sqlx(sqlx::Error::Database(db)) => db.is_unique_violation(),
            _ => false,
        }
    }
}

/// Result type alias for database operations
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for rota_core::Error {
    fn from(err: Error) -> Self {
        if err.is_unique_violation() {
            rota_core::Error::Conflict(err.to_string())
        } else {
            rota_core::Error::Storage(err.to_string())
        }
    }
}

/// Convert a driver error for the gateway boundary
pub(crate) fn storage(err: sqlx::Error) -> rota_core::Error {
    Error::from(err).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_errors_map_to_storage() {
        let err: rota_core::Error = Error::InvalidData("bad status".into()).into();
        assert!(matches!(err, rota_core::Error::Storage(msg) if msg.contains("bad status")));

        let err = storage(sqlx::Error::RowNotFound);
        assert_eq!(err.kind(), rota_core::ErrorKind::Upstream);
    }
}
