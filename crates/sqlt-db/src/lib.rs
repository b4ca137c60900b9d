//! sqlt-db - metadata database abstraction for sqlt
//!
//! Backend template helpers such as `presto.latest_partition` need to ask
//! the target database about its partitions. This crate provides the
//! [`Database`] trait they call through, the partition engine specs that
//! build those metadata queries, and a DuckDB implementation.

pub mod duckdb;
pub mod error;
pub mod partitions;
pub mod traits;

pub use duckdb::DuckDbBackend;
pub use error::{DbError, DbResult};
pub use partitions::{LatestPartition, PartitionStyle};
pub use traits::{Database, Row};
