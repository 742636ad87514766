//! # Database Error Types
//!
//! Error types for database operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError (this module) ← Adds context and categorization               │
//! │       │                                                                 │
//! │       │  inside InvoiceStore: non-constraint faults become             │
//! │       │  TransactionAborted { stage } and the transaction rolls back   │
//! │       ▼                                                                 │
//! │  FileError::Db (in farma-ingest) ← Tagged with the file path           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  { filename, success: false, error } entry in the batch report         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    ///
    /// ## When This Occurs
    /// - Deleting an invoice id that does not exist
    /// - `fetch_one` returns no rows
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A UNIQUE, FOREIGN KEY or CHECK constraint rejected a write.
    ///
    /// ## When This Occurs
    /// - A natural-key collision the upsert clause did not absorb
    /// - Line item pointing at a missing invoice or product
    /// - Non-positive quantity (`CHECK (quantidade > 0)`)
    #[error("Constraint violation ({constraint}): {message}")]
    ConstraintViolation { constraint: String, message: String },

    /// A persistence step failed and the invoice transaction was rolled back.
    ///
    /// `stage` names the step that failed (`supplier upsert`,
    /// `invoice upsert`, `item 3`, `commit`, ...).
    #[error("Transaction aborted at {stage}: {reason}")]
    TransactionAborted { stage: String, reason: String },

    /// Database connection failed.
    ///
    /// ## When This Occurs
    /// - Database file can't be created
    /// - File permissions issue
    /// - Disk full
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a TransactionAborted error for a failing stage.
    pub fn aborted(stage: impl Into<String>, reason: impl ToString) -> Self {
        DbError::TransactionAborted {
            stage: stage.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns true for constraint violations.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, DbError::ConstraintViolation { .. })
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → Analyze message for constraint type
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Record", "unknown"),

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                // SQLite messages:
                // "UNIQUE constraint failed: <table>.<column>"
                // "FOREIGN KEY constraint failed"
                // "CHECK constraint failed: <expr>"
                let constraint = ["UNIQUE", "FOREIGN KEY", "CHECK"]
                    .into_iter()
                    .find(|kind| msg.contains(&format!("{kind} constraint failed")));

                match constraint {
                    Some(kind) => DbError::ConstraintViolation {
                        constraint: kind.to_string(),
                        message: msg.to_string(),
                    },
                    None => DbError::QueryFailed(msg.to_string()),
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = DbError::aborted("item 5", "simulated fault");
        assert_eq!(
            err.to_string(),
            "Transaction aborted at item 5: simulated fault"
        );
        assert!(!err.is_constraint_violation());

        let err = DbError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, DbError::PoolExhausted));
    }
}
