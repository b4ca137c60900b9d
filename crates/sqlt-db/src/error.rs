//! Error types for sqlt-db

use thiserror::Error;

/// Failures of metadata lookups against a database
#[derive(Error, Debug, Clone)]
pub enum DbError {
    /// D001: Could not open the database
    #[error("[D001] Could not open database: {0}")]
    ConnectionError(String),

    /// D002: A metadata query failed
    #[error("[D002] Metadata query failed: {0}")]
    ExecutionError(String),

    /// D003: The table (or its partition metadata table) does not exist
    #[error("[D003] Table or view not found: {0}")]
    TableNotFound(String),

    /// D004: Partition helpers were pointed at an unpartitioned table
    #[error("[D004] The table should have one partitioned field: {0}")]
    NotPartitioned(String),

    /// D005: Partition filters do not match the table's partition key
    #[error("[D005] {0}")]
    InvalidPartitionRequest(String),

    /// D006: The connection lock was poisoned by a panicking thread
    #[error("[D006] Connection lock poisoned: {0}")]
    MutexPoisoned(String),

    /// D007: Anything the backend reported that fits no other variant
    #[error("[D007] Internal database error: {0}")]
    Internal(String),
}

/// Result alias for metadata lookups
pub type DbResult<T> = Result<T, DbError>;

impl From<duckdb::Error> for DbError {
    fn from(err: duckdb::Error) -> Self {
        // Catalog errors carry no structured variant; only the text tells.
        let msg = err.to_string();
        let missing_table = msg.contains("Table with name")
            || msg.contains("Table or view with name")
            || (msg.contains("Catalog Error") && msg.contains("does not exist"));
        if missing_table {
            DbError::TableNotFound(msg)
        } else {
            DbError::ExecutionError(msg)
        }
    }
}
