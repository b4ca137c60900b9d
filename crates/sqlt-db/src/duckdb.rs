//! DuckDB database backend implementation
//!
//! DuckDB has no partition catalog of its own. Partition metadata is read
//! from a companion `"table$partitions"` table laid out the way Presto and
//! Trino expose it, which lets a local DuckDB file stand in for those
//! engines.

use crate::error::{DbError, DbResult};
use crate::traits::{Database, Row};
use duckdb::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// DuckDB database backend
pub struct DuckDbBackend {
    conn: Mutex<Connection>,
    backend: String,
}

impl DuckDbBackend {
    /// Create a new in-memory DuckDB connection
    pub fn in_memory() -> DbResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(Self::with_connection(conn))
    }

    /// Create a new DuckDB connection from a file path
    pub fn from_path(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path).map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(Self::with_connection(conn))
    }

    /// Create from path string (handles :memory: special case)
    pub fn new(path: &str) -> DbResult<Self> {
        if path == ":memory:" {
            Self::in_memory()
        } else {
            Self::from_path(Path::new(path))
        }
    }

    fn with_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            backend: "duckdb".to_string(),
        }
    }

    /// Report a different backend name, so this connection is served by
    /// that backend's template processor (e.g. `trino`).
    pub fn with_backend_name(mut self, backend: impl Into<String>) -> Self {
        self.backend = backend.into();
        self
    }

    /// Execute batch SQL, used to set up metadata tables
    pub fn execute_batch(&self, sql: &str) -> DbResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(sql)
            .map_err(|e| DbError::ExecutionError(e.to_string()))
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| DbError::MutexPoisoned(e.to_string()))
    }
}

impl Database for DuckDbBackend {
    fn backend(&self) -> &str {
        &self.backend
    }

    fn partition_columns(&self, table: &str, schema: Option<&str>) -> DbResult<Vec<String>> {
        let conn = self.lock()?;
        let partitions_table = format!("{table}$partitions");
        let mut stmt = conn.prepare(
            "SELECT column_name FROM information_schema.columns \
             WHERE table_schema = ? AND table_name = ? \
             ORDER BY ordinal_position",
        )?;
        let columns = stmt
            .query_map(
                duckdb::params![schema.unwrap_or("main"), partitions_table],
                |row| row.get::<_, String>(0),
            )?
            .collect::<Result<Vec<_>, _>>()?;
        log::debug!("Partition columns of {table}: {columns:?}");
        Ok(columns)
    }

    fn query_rows(&self, sql: &str, width: usize) -> DbResult<Vec<Row>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map([], |row| {
                (0..width)
                    .map(|i| row.get::<_, Option<String>>(i))
                    .collect::<Result<Row, _>>()
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
#[path = "duckdb_test.rs"]
mod tests;
