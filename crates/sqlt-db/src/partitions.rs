//! Latest-partition lookups
//!
//! Two engine families are supported. Presto-style engines (Presto, Trino)
//! expose a `"table$partitions"` metadata table that can be queried with
//! ordinary SQL. Hive-style engines (Hive, Spark) answer
//! `SHOW PARTITIONS`, one `k1=v1/k2=v2` string per partition.

use crate::error::{DbError, DbResult};
use crate::traits::Database;
use sqlt_core::sql_utils::{quote_ident, quote_ident_backtick};
use sqlt_core::SqlDialect;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// How partition metadata is read from a database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionStyle {
    /// Query the `"table$partitions"` metadata table
    Presto,
    /// Parse the output of `SHOW PARTITIONS`
    Hive,
}

/// The newest partition of a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestPartition {
    /// Partition columns in key order
    pub columns: Vec<String>,
    /// Values of the newest partition, aligned with `columns`.
    ///
    /// `None` when the table has no partitions yet.
    pub values: Option<Vec<Option<String>>>,
}

impl LatestPartition {
    /// Value of the first partition column
    pub fn first(&self) -> Option<&str> {
        self.values
            .as_ref()
            .and_then(|values| values.first())
            .and_then(|v| v.as_deref())
    }
}

impl PartitionStyle {
    fn dialect(&self) -> SqlDialect {
        match self {
            PartitionStyle::Presto => SqlDialect::Presto,
            PartitionStyle::Hive => SqlDialect::Hive,
        }
    }

    /// Build the metadata query selecting `columns` of the partitions of
    /// `table`, restricted by `filters`, newest first.
    pub fn partition_query(
        &self,
        table: &str,
        schema: Option<&str>,
        columns: &[String],
        filters: &BTreeMap<String, String>,
    ) -> String {
        match self {
            PartitionStyle::Presto => {
                let dialect = self.dialect();
                // Unaliased casts: ORDER BY must see the native column type.
                let select = columns
                    .iter()
                    .map(|c| format!("CAST({} AS VARCHAR)", quote_ident(c)))
                    .collect::<Vec<_>>()
                    .join(", ");
                let partitions_table = format!("{table}$partitions");
                let from = match schema {
                    Some(s) => format!("{}.{}", quote_ident(s), quote_ident(&partitions_table)),
                    None => quote_ident(&partitions_table),
                };
                let mut sql = format!("SELECT {select} FROM {from}");
                if !filters.is_empty() {
                    let predicates = filters
                        .iter()
                        .map(|(k, v)| format!("{} = {}", quote_ident(k), dialect.quote_literal(v)))
                        .collect::<Vec<_>>()
                        .join(" AND ");
                    sql.push_str(&format!(" WHERE {predicates}"));
                }
                let order = columns
                    .iter()
                    .map(|c| format!("{} DESC", quote_ident(c)))
                    .collect::<Vec<_>>()
                    .join(", ");
                sql.push_str(&format!(" ORDER BY {order} LIMIT 1"));
                sql
            }
            PartitionStyle::Hive => {
                let dialect = self.dialect();
                let target = match schema {
                    Some(s) => format!("{}.{}", quote_ident_backtick(s), quote_ident_backtick(table)),
                    None => quote_ident_backtick(table),
                };
                let mut sql = format!("SHOW PARTITIONS {target}");
                if !filters.is_empty() {
                    let spec = filters
                        .iter()
                        .map(|(k, v)| format!("{}={}", quote_ident_backtick(k), dialect.quote_literal(v)))
                        .collect::<Vec<_>>()
                        .join(", ");
                    sql.push_str(&format!(" PARTITION ({spec})"));
                }
                sql
            }
        }
    }

    /// Find the newest partition of `table`.
    ///
    /// Unless `allow_multiple` is set the table must be partitioned on
    /// exactly one column.
    pub fn latest_partition(
        &self,
        db: &dyn Database,
        table: &str,
        schema: Option<&str>,
        allow_multiple: bool,
    ) -> DbResult<LatestPartition> {
        let columns = db.partition_columns(table, schema)?;
        if columns.is_empty() {
            return Err(DbError::NotPartitioned(table.to_string()));
        }
        if !allow_multiple && columns.len() > 1 {
            return Err(DbError::InvalidPartitionRequest(
                "The table should have a single partitioned field to use this function. \
                 You may want to use `latest_sub_partition`"
                    .to_string(),
            ));
        }

        let values = match self {
            PartitionStyle::Presto => {
                let sql = self.partition_query(table, schema, &columns, &BTreeMap::new());
                log::debug!("Latest partition query: {sql}");
                db.query_rows(&sql, columns.len())?.into_iter().next()
            }
            PartitionStyle::Hive => {
                let partitions = self.hive_partitions(db, table, schema, &BTreeMap::new())?;
                partitions
                    .into_iter()
                    .map(|(_, parsed)| {
                        columns
                            .iter()
                            .map(|c| parsed.get(c).cloned())
                            .collect::<Vec<_>>()
                    })
                    .max_by(|a, b| compare_partition_rows(a, b))
            }
        };

        Ok(LatestPartition { columns, values })
    }

    /// Find the newest value of the one partition column not named in
    /// `filters`, among partitions matching every filter.
    pub fn latest_sub_partition(
        &self,
        db: &dyn Database,
        table: &str,
        schema: Option<&str>,
        filters: &BTreeMap<String, String>,
    ) -> DbResult<Option<String>> {
        let columns = db.partition_columns(table, schema)?;
        if columns.is_empty() {
            return Err(DbError::NotPartitioned(table.to_string()));
        }
        for key in filters.keys() {
            if !columns.contains(key) {
                return Err(DbError::InvalidPartitionRequest(format!(
                    "Field [{key}] is not part of the partitioning key"
                )));
            }
        }
        if filters.len() + 1 != columns.len() {
            return Err(DbError::InvalidPartitionRequest(format!(
                "A filter needs to be specified for {} out of the {} fields.",
                columns.len() - 1,
                columns.len()
            )));
        }
        let Some(field) = columns.iter().find(|c| !filters.contains_key(*c)).cloned() else {
            return Err(DbError::Internal(format!(
                "no unfiltered partition column on {table}"
            )));
        };

        match self {
            PartitionStyle::Presto => {
                let sql = self.partition_query(table, schema, std::slice::from_ref(&field), filters);
                log::debug!("Latest sub-partition query: {sql}");
                Ok(db
                    .query_rows(&sql, 1)?
                    .into_iter()
                    .next()
                    .and_then(|row| row.into_iter().next().flatten()))
            }
            PartitionStyle::Hive => {
                let partitions = self.hive_partitions(db, table, schema, filters)?;
                Ok(partitions
                    .into_iter()
                    .filter(|(_, parsed)| {
                        filters.iter().all(|(k, v)| parsed.get(k) == Some(v))
                    })
                    .filter_map(|(_, mut parsed)| parsed.remove(&field))
                    .max_by(|a, b| compare_partition_values(a, b)))
            }
        }
    }

    fn hive_partitions(
        &self,
        db: &dyn Database,
        table: &str,
        schema: Option<&str>,
        filters: &BTreeMap<String, String>,
    ) -> DbResult<Vec<(String, BTreeMap<String, String>)>> {
        let sql = self.partition_query(table, schema, &[], filters);
        log::debug!("Partition listing: {sql}");
        Ok(db
            .query_rows(&sql, 1)?
            .into_iter()
            .filter_map(|row| row.into_iter().next().flatten())
            .map(|raw| {
                let parsed = parse_partition_spec(&raw);
                (raw, parsed)
            })
            .collect())
    }
}

/// Order partition values numerically when both are numbers, else as text.
fn compare_partition_values(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.cmp(b),
    }
}

/// Column-by-column order of two partitions, missing values first.
fn compare_partition_rows(a: &[Option<String>], b: &[Option<String>]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| match (x, y) {
            (Some(x), Some(y)) => compare_partition_values(x, y),
            (x, y) => x.is_some().cmp(&y.is_some()),
        })
        .find(|o| o.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// Parse a Hive partition spec such as `ds=2024-01-01/hour=12`.
///
/// Segments without `=` are skipped.
pub fn parse_partition_spec(spec: &str) -> BTreeMap<String, String> {
    spec.split('/')
        .filter_map(|segment| segment.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[cfg(test)]
#[path = "partitions_test.rs"]
mod tests;
