//! Database trait definition

use crate::error::DbResult;
use sqlt_core::SqlDialect;

/// One result row, every column rendered as text.
pub type Row = Vec<Option<String>>;

/// The metadata surface template helpers may call.
///
/// Calls are blocking: a render that uses a backend helper waits for the
/// metadata query. Implementations must be `Send + Sync` so one handle can
/// serve renders on many threads.
pub trait Database: Send + Sync {
    /// Backend identifier used to pick a template processor (e.g. `trino`)
    fn backend(&self) -> &str;

    /// Literal quoting rules of this database
    fn dialect(&self) -> SqlDialect {
        SqlDialect::from_backend(self.backend())
    }

    /// Partition columns of `table`, in partition-key order.
    ///
    /// An unpartitioned table yields an empty list.
    fn partition_columns(&self, table: &str, schema: Option<&str>) -> DbResult<Vec<String>>;

    /// Run a metadata query returning `width` text columns per row.
    fn query_rows(&self, sql: &str, width: usize) -> DbResult<Vec<Row>>;
}
