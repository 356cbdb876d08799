//! Database error types
//!
//! This module defines the error types that can occur during pool creation,
//! transaction handling, and migration runs. All operations return these as
//! ordinary `Result` values; escalation policy belongs to the caller.

use thiserror::Error;

/// Errors that can occur during database operations
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to establish a database connection or open a transaction
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Commit or rollback of a transaction failed
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// A transaction context was used after it was finalized
    #[error("Transaction context already finalized")]
    ContextFinalized,

    /// A migration script failed; `file` is the ledger identity key
    #[error("Migration '{file}' failed: {reason}")]
    MigrationFailed { file: String, reason: String },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Unique constraint violation
    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    /// Pool exhaustion - no available connections
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Generic SQL error
    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Creates a migration error for a specific file
    pub fn migration(file: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        DatabaseError::MigrationFailed {
            file: file.into(),
            reason: reason.to_string(),
        }
    }

    /// Checks if this error is a connection-related issue
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            DatabaseError::ConnectionFailed(_) | DatabaseError::PoolExhausted
        )
    }

    /// Checks if this error is a unique constraint violation
    pub fn is_duplicate(&self) -> bool {
        matches!(self, DatabaseError::DuplicateEntry(_))
    }
}

/// Converts SQLx errors to more specific DatabaseError variants
///
/// Maps PostgreSQL error codes to dedicated variants where it matters:
/// a unique violation (23505) is how a losing concurrent ledger insert
/// surfaces, so it gets its own variant.
impl From<&sqlx::Error> for DatabaseError {
    fn from(error: &sqlx::Error) -> Self {
        match error {
            sqlx::Error::PoolTimedOut => DatabaseError::PoolExhausted,
            sqlx::Error::Database(db_err) => {
                // https://www.postgresql.org/docs/current/errcodes-appendix.html
                match db_err.code().as_deref() {
                    Some("23505") => DatabaseError::DuplicateEntry(db_err.message().to_string()),
                    _ => DatabaseError::QueryFailed(db_err.message().to_string()),
                }
            }
            _ => DatabaseError::QueryFailed(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_error_names_file() {
        let err = DatabaseError::migration("002_seed.sql", "syntax error");
        let message = err.to_string();
        assert!(message.contains("002_seed.sql"));
        assert!(message.contains("syntax error"));
    }

    #[test]
    fn test_connection_error_classification() {
        assert!(DatabaseError::ConnectionFailed("refused".into()).is_connection_error());
        assert!(DatabaseError::PoolExhausted.is_connection_error());
        assert!(!DatabaseError::ContextFinalized.is_connection_error());
    }

    #[test]
    fn test_pool_timeout_maps_to_exhausted() {
        let err = DatabaseError::from(&sqlx::Error::PoolTimedOut);
        assert!(matches!(err, DatabaseError::PoolExhausted));
    }
}
